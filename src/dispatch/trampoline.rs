//! Engine-facing callbacks of registered classes.
//!
//! The `extern "C"` functions here are shared by every host class. Each one
//! recovers its record from the userdata pointer the engine hands back, so
//! the per-method work lives in the boxed closures of [`MethodRecord`],
//! which are generic over the host function and built once at registration.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use extbind_sys as sys;
use rustc_hash::FxHashMap;

use crate::class::HostClass;
use crate::diagnostics::{panic_message, report_error};
use crate::dispatch::instance::InstanceStorage;
use crate::error::CallError;
use crate::marshal::{HostReturn, ReturnValue};
use crate::signature::{HostFn, Signature};
use crate::string_name::StringName;
use crate::variant::{Variant, VariantKind};

type PtrCallFn = dyn Fn(sys::ClassInstancePtr, *const sys::ConstTypePtr, sys::TypePtr);
type VarCallFn = dyn Fn(sys::ClassInstancePtr, &[&Variant]) -> Result<Variant, CallError>;

/// Runs host code called by the engine. Panics come back as their message.
pub(crate) fn catch_host<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// One host function reachable from the engine, as an override or a method.
pub(crate) struct MethodRecord {
    pub(crate) name: StringName,
    pub(crate) label: String,
    pub(crate) params: Vec<VariantKind>,
    pub(crate) ret: Option<VariantKind>,
    ptrcall: Box<PtrCallFn>,
    varcall: Box<VarCallFn>,
}

impl MethodRecord {
    pub(crate) fn new<T, A, R, F>(name: &str, f: F) -> MethodRecord
    where
        T: HostClass,
        A: Signature,
        R: HostReturn + 'static,
        F: HostFn<T, A, R>,
    {
        let label = format!("{}::{name}", <T as HostClass>::NAME);
        let f = Rc::new(f);

        let ptr_fn = Rc::clone(&f);
        let ptr_label = label.clone();
        let ptrcall = Box::new(
            move |instance: sys::ClassInstancePtr, args: *const sys::ConstTypePtr, ret: sys::TypePtr| {
                let outcome = catch_host(|| unsafe { call_ptr::<T, A, R, F>(&ptr_fn, instance, args) });
                match outcome.and_then(|result| result) {
                    Ok(value) if !ret.is_null() => unsafe { value.write_ptr(ret) },
                    Ok(_) => {}
                    Err(message) => {
                        report_error(&format!("{ptr_label}: {message}"));
                        if !ret.is_null() {
                            unsafe { <R::Value as ReturnValue>::write_default(ret) };
                        }
                    }
                }
            },
        );

        let var_label = label.clone();
        let varcall = Box::new(move |instance: sys::ClassInstancePtr, args: &[&Variant]| {
            let outcome = catch_host(|| -> Result<Variant, CallError> {
                let storage = unsafe { InstanceStorage::<T>::from_instance(instance) }
                    .ok_or(CallError::InstanceIsNull)?;
                let args = A::from_variant_args(args)?;
                let mut this = storage.borrow_mut()?;
                match HostFn::call(&*f, &mut *this, args).into_result() {
                    Ok(value) => Ok(value.into_variant()),
                    Err(message) => {
                        report_error(&format!("{var_label}: {message}"));
                        Ok(Variant::nil())
                    }
                }
            });
            outcome.unwrap_or_else(|message| {
                report_error(&format!("{var_label} panicked: {message}"));
                Err(CallError::InvalidMethod)
            })
        });

        MethodRecord {
            name: StringName::new(name),
            label,
            params: A::param_kinds(),
            ret: <R::Value as ReturnValue>::KIND,
            ptrcall,
            varcall,
        }
    }

    /// # Safety
    /// `args` must hold pointers to native values of `params`; `ret` must be
    /// null or writable for a native value of `ret`.
    pub(crate) unsafe fn ptrcall(
        &self,
        instance: sys::ClassInstancePtr,
        args: *const sys::ConstTypePtr,
        ret: sys::TypePtr,
    ) {
        (self.ptrcall)(instance, args, ret)
    }

    pub(crate) fn varcall(
        &self,
        instance: sys::ClassInstancePtr,
        args: &[&Variant],
    ) -> Result<Variant, CallError> {
        (self.varcall)(instance, args)
    }
}

/// Decodes pointer-call arguments and runs the host function.
///
/// The decoded arguments are dropped when the call returns; the engine keeps
/// ownership of the originals.
unsafe fn call_ptr<T, A, R, F>(
    f: &F,
    instance: sys::ClassInstancePtr,
    args: *const sys::ConstTypePtr,
) -> Result<R::Value, String>
where
    T: HostClass,
    A: Signature,
    R: HostReturn,
    F: HostFn<T, A, R>,
{
    let storage = unsafe { InstanceStorage::<T>::from_instance(instance) }
        .ok_or_else(|| CallError::InstanceIsNull.to_string())?;
    let args = unsafe { A::from_ptr_args(args) }.map_err(|error| error.to_string())?;
    let mut this = storage.borrow_mut().map_err(|error| error.to_string())?;
    HostFn::call(f, &mut *this, args).into_result()
}

pub(crate) struct SignalRecord {
    pub(crate) name: StringName,
    pub(crate) params: Vec<(StringName, VariantKind)>,
}

/// Everything registered for one host class; the engine's class userdata.
pub(crate) struct ClassRecord {
    pub(crate) name: &'static str,
    pub(crate) virtuals: FxHashMap<StringName, Box<MethodRecord>>,
    pub(crate) methods: Vec<Box<MethodRecord>>,
    pub(crate) signals: Vec<SignalRecord>,
}

/// Override resolver. Null tells the engine to keep the parent's behavior.
pub(crate) unsafe extern "C" fn virtual_call_data(
    class_userdata: *mut c_void,
    name: sys::StringNamePtr,
) -> *mut c_void {
    let Some(class) = (unsafe { class_userdata.cast::<ClassRecord>().as_ref() }) else {
        return ptr::null_mut();
    };
    let name = unsafe { StringName::from_sys(name) };
    match class.virtuals.get(&name) {
        Some(method) => {
            log::trace!("{} overrides {}", class.name, method.label);
            ptr::from_ref::<MethodRecord>(method).cast_mut().cast()
        }
        None => ptr::null_mut(),
    }
}

pub(crate) unsafe extern "C" fn call_virtual_with_data(
    instance: sys::ClassInstancePtr,
    _name: sys::StringNamePtr,
    call_data: *mut c_void,
    args: *const sys::ConstTypePtr,
    r_ret: sys::TypePtr,
) {
    if let Some(method) = unsafe { call_data.cast::<MethodRecord>().as_ref() } {
        unsafe { method.ptrcall(instance, args, r_ret) };
    }
}

pub(crate) unsafe extern "C" fn method_call(
    method_userdata: *mut c_void,
    instance: sys::ClassInstancePtr,
    args: *const sys::ConstVariantPtr,
    argument_count: i64,
    r_return: sys::UninitVariantPtr,
    r_error: *mut sys::CallError,
) {
    let result = match unsafe { method_userdata.cast::<MethodRecord>().as_ref() } {
        Some(method) => {
            let args: Vec<&Variant> = (0..argument_count.max(0) as usize)
                .map(|index| unsafe { Variant::borrow_sys(*args.add(index)) })
                .collect();
            method.varcall(instance, &args)
        }
        None => Err(CallError::InvalidMethod),
    };
    let (value, status) = match result {
        Ok(value) => (value, sys::CallError::default()),
        Err(error) => (Variant::nil(), error.to_sys()),
    };
    unsafe {
        value.move_into(r_return);
        *r_error = status;
    }
}

pub(crate) unsafe extern "C" fn method_ptrcall(
    method_userdata: *mut c_void,
    instance: sys::ClassInstancePtr,
    args: *const sys::ConstTypePtr,
    r_ret: sys::TypePtr,
) {
    if let Some(method) = unsafe { method_userdata.cast::<MethodRecord>().as_ref() } {
        unsafe { method.ptrcall(instance, args, r_ret) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_messages() {
        assert_eq!(catch_host(|| 3), Ok(3));
        let caught = catch_host(|| -> i64 { panic!("host failure") });
        assert_eq!(caught, Err("host failure".to_owned()));
    }
}
