//! Virtual dispatch: host classes the engine can instantiate.
//!
//! [`register_class`] runs [`HostClass::register`] once, freezes what it
//! declared into a per-class record, and hands the engine a descriptor whose
//! callbacks are shared trampolines. Overrides live in a table keyed by
//! interned name; the engine asks for each virtual once and caches the
//! answer, so a virtual call never looks a name up.
//!
//! The record stays owned by a registry for as long as the engine knows the
//! class. Classes are unregistered per [`InitLevel`], in reverse
//! registration order, when the engine tears that level down.

use std::cell::RefCell;
use std::ptr;

use extbind_sys as sys;

use crate::class::{Class, HostClass};
use crate::diagnostics::report_warning;
use crate::entry::{self, InitLevel};
use crate::error::{BindError, BindResult};
use crate::loader;
use crate::string_name::StringName;
use crate::variant::VariantKind;

mod builder;
mod instance;
mod trampoline;

pub use builder::ClassBuilder;
pub(crate) use instance::InstanceStorage;
pub(crate) use trampoline::catch_host;

use trampoline::{ClassRecord, MethodRecord};

struct Registered {
    name: &'static str,
    level: InitLevel,
    // Pointed to by the engine's class and method userdata.
    record: Box<ClassRecord>,
}

thread_local! {
    static REGISTRY: RefCell<Vec<Registered>> = const { RefCell::new(Vec::new()) };
}

fn property_info(name: StringName, kind: VariantKind) -> sys::PropertyInfo {
    sys::PropertyInfo {
        type_: kind.sys(),
        name: name.sys(),
        class_name: StringName::default().sys(),
    }
}

fn refused(what: String) -> BindError {
    BindError::Registration(format!("engine refused {what}"))
}

/// Registers `T` with the engine at the current initialization level.
pub fn register_class<T: HostClass>() -> BindResult<()> {
    let class = <T as HostClass>::NAME;
    if is_registered(class) {
        return Err(BindError::Registration(format!(
            "class '{class}' is already registered"
        )));
    }
    let mut builder = ClassBuilder::<T>::new();
    T::register(&mut builder);
    let record = Box::new(builder.finish()?);

    let fns = loader::fns();
    let library = loader::library();
    let class_name = StringName::new(class);
    let parent = StringName::new(<<T as HostClass>::Base as Class>::NAME);
    let info = sys::ClassCreationInfo {
        is_virtual: sys::FALSE,
        is_abstract: sys::FALSE,
        create_instance_func: Some(instance::create_instance::<T>),
        free_instance_func: Some(instance::free_instance::<T>),
        get_virtual_call_data_func: Some(trampoline::virtual_call_data),
        call_virtual_with_data_func: Some(trampoline::call_virtual_with_data),
        class_userdata: ptr::from_ref::<ClassRecord>(&record).cast_mut().cast(),
    };
    let accepted = unsafe {
        (fns.classdb_register_extension_class)(library, class_name.sys(), parent.sys(), &info)
    };
    if !sys::to_bool(accepted) {
        return Err(refused(format!("class '{class}' (parent '{parent}')")));
    }
    if let Err(error) = unsafe { register_members(class_name, &record) } {
        unsafe { (fns.classdb_unregister_extension_class)(library, class_name.sys()) };
        return Err(error);
    }

    let level = entry::current_level();
    log::debug!(
        "registered {class} (base {parent}, level {level:?}): {} overrides, {} methods, {} signals",
        record.virtuals.len(),
        record.methods.len(),
        record.signals.len()
    );
    REGISTRY.with_borrow_mut(|registry| {
        registry.push(Registered {
            name: class,
            level,
            record,
        })
    });
    Ok(())
}

unsafe fn register_members(class_name: StringName, record: &ClassRecord) -> BindResult<()> {
    let fns = loader::fns();
    let library = loader::library();
    let unnamed = StringName::default();

    for method in &record.methods {
        let arguments: Vec<sys::PropertyInfo> = method
            .params
            .iter()
            .map(|kind| property_info(unnamed, *kind))
            .collect();
        let info = sys::ClassMethodInfo {
            name: method.name.sys(),
            method_userdata: ptr::from_ref::<MethodRecord>(method).cast_mut().cast(),
            call_func: Some(trampoline::method_call),
            ptrcall_func: Some(trampoline::method_ptrcall),
            has_return_value: sys::from_bool(method.ret.is_some()),
            return_value_info: property_info(unnamed, method.ret.unwrap_or(VariantKind::Nil)),
            argument_count: arguments.len() as u32,
            arguments_info: arguments.as_ptr(),
        };
        let accepted = unsafe {
            (fns.classdb_register_extension_class_method)(library, class_name.sys(), &info)
        };
        if !sys::to_bool(accepted) {
            return Err(refused(format!("method {}", method.label)));
        }
    }

    for signal in &record.signals {
        let arguments: Vec<sys::PropertyInfo> = signal
            .params
            .iter()
            .map(|(name, kind)| property_info(*name, *kind))
            .collect();
        let accepted = unsafe {
            (fns.classdb_register_extension_class_signal)(
                library,
                class_name.sys(),
                signal.name.sys(),
                arguments.as_ptr(),
                arguments.len() as i64,
            )
        };
        if !sys::to_bool(accepted) {
            return Err(refused(format!("signal '{}' of '{}'", signal.name, record.name)));
        }
    }
    Ok(())
}

fn unregister_by_name(class: &str) -> BindResult<()> {
    let removed = REGISTRY.with_borrow_mut(|registry| {
        let index = registry.iter().position(|registered| registered.name == class)?;
        Some(registry.remove(index))
    });
    let Some(registered) = removed else {
        return Err(BindError::Registration(format!("class '{class}' is not registered")));
    };
    let accepted = unsafe {
        (loader::fns().classdb_unregister_extension_class)(
            loader::library(),
            StringName::new(class).sys(),
        )
    };
    let methods = registered.record.methods.len();
    // The engine no longer hands out the record's pointers.
    drop(registered);
    if !sys::to_bool(accepted) {
        return Err(refused(format!("to unregister '{class}'")));
    }
    log::debug!("unregistered {class} and its {methods} methods");
    Ok(())
}

/// Unregisters `T`. Instances must be gone by then.
pub fn unregister_class<T: HostClass>() -> BindResult<()> {
    unregister_by_name(<T as HostClass>::NAME)
}

/// Unregisters every class registered at `level`, newest first.
pub(crate) fn unregister_level(level: InitLevel) -> usize {
    let classes: Vec<&'static str> = REGISTRY.with_borrow(|registry| {
        registry
            .iter()
            .rev()
            .filter(|registered| registered.level == level)
            .map(|registered| registered.name)
            .collect()
    });
    for class in &classes {
        if let Err(error) = unregister_by_name(class) {
            report_warning(&error.to_string());
        }
    }
    classes.len()
}

pub fn is_registered(class: &str) -> bool {
    REGISTRY.with_borrow(|registry| registry.iter().any(|registered| registered.name == class))
}

/// Callable methods of a registered host class, in declaration order.
pub fn registered_methods(class: &str) -> Option<Vec<StringName>> {
    REGISTRY.with_borrow(|registry| {
        let registered = registry.iter().find(|registered| registered.name == class)?;
        Some(registered.record.methods.iter().map(|method| method.name).collect())
    })
}

/// Names of the registered host classes, oldest first.
pub fn registered_classes() -> Vec<&'static str> {
    REGISTRY.with_borrow(|registry| registry.iter().map(|registered| registered.name).collect())
}
