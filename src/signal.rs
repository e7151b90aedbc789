//! Signal bridge: host closures as engine callables, and connections.
//!
//! A custom callable boxes the closure and gives the engine two callbacks:
//! one to invoke it with variant arguments, one to release it. The engine
//! keeps the box alive for as long as any copy of the callable exists, which
//! includes the copy held by every connection, so a closure is dropped once
//! it has been disconnected everywhere and the host's own copies are gone.

use std::cell::RefCell;
use std::ffi::c_void;

use bitflags::bitflags;
use extbind_sys as sys;

use crate::class::Class;
use crate::classes::Object;
use crate::diagnostics::{report_error, report_warning};
use crate::dispatch::catch_host;
use crate::error::{BindError, BindResult, CallError};
use crate::frame::{self, CallFrame};
use crate::handle::{Borrowed, InstanceRef};
use crate::loader;
use crate::marshal::{HostReturn, ReturnValue};
use crate::signature::{HostCallable, Signature};
use crate::string_name::StringName;
use crate::variant::{Callable, Variant};

bitflags! {
    /// How a connection behaves, as understood by the engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnectFlags: u32 {
        /// Deliver at the end of the frame instead of during `emit`.
        const DEFERRED = 1;
        /// Saved with the scene.
        const PERSIST = 2;
        /// Disconnected after the first delivery.
        const ONE_SHOT = 4;
        /// Connecting twice counts twice; disconnect once per connect.
        const REFERENCE_COUNTED = 8;
    }
}

type DynCallable = dyn FnMut(&[&Variant]) -> Result<Variant, CallError>;

struct CallableState {
    label: String,
    f: RefCell<Box<DynCallable>>,
}

unsafe extern "C" fn call_custom(
    callable_userdata: *mut c_void,
    args: *const sys::ConstVariantPtr,
    argument_count: i64,
    r_return: sys::UninitVariantPtr,
    r_error: *mut sys::CallError,
) {
    let state = unsafe { &*callable_userdata.cast::<CallableState>() };
    let args: Vec<&Variant> = (0..argument_count.max(0) as usize)
        .map(|index| unsafe { Variant::borrow_sys(*args.add(index)) })
        .collect();
    let result = match state.f.try_borrow_mut() {
        Ok(mut f) => catch_host(|| f(&args)).unwrap_or_else(|message| {
            report_error(&format!("callable '{}' panicked: {message}", state.label));
            Err(CallError::InvalidMethod)
        }),
        Err(_) => {
            report_warning(&format!("callable '{}' called re-entrantly", state.label));
            Err(CallError::BorrowConflict)
        }
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

unsafe extern "C" fn free_custom(callable_userdata: *mut c_void) {
    let state = unsafe { Box::from_raw(callable_userdata.cast::<CallableState>()) };
    let label = state.label.clone();
    if let Err(message) = catch_host(move || drop(state)) {
        report_error(&format!("dropping callable '{label}' panicked: {message}"));
    }
}

/// Decodes the arguments for `f` and encodes what it returns.
fn typed<A, R, F>(label: &str, mut f: F) -> impl FnMut(&[&Variant]) -> Result<Variant, CallError> + 'static
where
    A: Signature,
    R: HostReturn + 'static,
    F: HostCallable<A, R>,
{
    let label = label.to_owned();
    move |args: &[&Variant]| {
        let args = A::from_variant_args(args)?;
        match f.invoke(args).into_result() {
            Ok(value) => Ok(ReturnValue::into_variant(value)),
            Err(message) => {
                report_error(&format!("callable '{label}': {message}"));
                Ok(Variant::nil())
            }
        }
    }
}

impl Callable {
    fn custom(label: &str, object_id: sys::InstanceId, f: Box<DynCallable>) -> Callable {
        let state = Box::new(CallableState {
            label: label.to_owned(),
            f: RefCell::new(f),
        });
        let info = sys::CallableCustomInfo {
            callable_userdata: Box::into_raw(state).cast(),
            token: loader::library(),
            object_id,
            call_func: Some(call_custom),
            free_func: Some(free_custom),
        };
        unsafe { Callable::from_custom(&info) }
    }

    /// Wraps a closure over variants; argument checking is up to `f`.
    pub fn from_variant_fn<F>(label: &str, f: F) -> Callable
    where
        F: FnMut(&[&Variant]) -> Result<Variant, CallError> + 'static,
    {
        Self::custom(label, 0, Box::new(f))
    }

    /// Wraps a typed closure. Arguments are checked for count and kind
    /// before `f` runs.
    ///
    /// ```ignore
    /// let on_changed = Callable::from_fn("on_changed", |name: String| log::info!("{name}"));
    /// resource.connect("changed", &on_changed)?;
    /// ```
    pub fn from_fn<A, R, F>(label: &str, f: F) -> Callable
    where
        A: Signature,
        R: HostReturn + 'static,
        F: HostCallable<A, R>,
    {
        Self::custom(label, 0, Box::new(typed(label, f)))
    }

    /// Like [`from_fn`](Callable::from_fn), tied to `object`: once the object
    /// is freed, invoking the callable fails instead of running `f`.
    pub fn from_fn_bound<T, A, R, F>(object: Borrowed<'_, T>, label: &str, f: F) -> Callable
    where
        T: Class,
        A: Signature,
        R: HostReturn + 'static,
        F: HostCallable<A, R>,
    {
        let target = InstanceRef::<T>::new(object.instance_id());
        let owner = format!("{label} on {}", T::NAME);
        let mut f = typed(label, f);
        let bound = move |args: &[&Variant]| {
            if !target.is_alive() {
                report_warning(&format!("callable '{owner}' outlived object #{}", target.id()));
                return Err(CallError::InstanceIsNull);
            }
            f(args)
        };
        Self::custom(label, target.id(), Box::new(bound))
    }
}

/// An established connection, as returned by [`Object::connect`].
///
/// Holds the source by instance id, so it never keeps the object alive.
#[derive(Debug)]
pub struct Connection {
    source: InstanceRef<Object>,
    signal: StringName,
    callable: Callable,
}

impl Connection {
    pub fn source(&self) -> InstanceRef<Object> {
        self.source
    }

    pub fn signal(&self) -> StringName {
        self.signal
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// False once disconnected elsewhere or once the source is gone.
    pub fn is_connected(&self) -> bool {
        match self.source.resolve() {
            Ok(source) => source
                .is_connected(self.signal, &self.callable)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Undoes the connection and gives up this connection's callable copy.
    pub fn disconnect(self) -> BindResult<()> {
        let source = self.source.resolve()?;
        source.disconnect(self.signal, &self.callable)
    }
}

impl Object {
    pub fn connect(&self, signal: impl Into<StringName>, callable: &Callable) -> BindResult<Connection> {
        self.connect_flags(signal, callable, ConnectFlags::empty())
    }

    /// Connects `callable` to `signal`. Fails with the engine's error code
    /// when the signal does not exist or the pair is already connected.
    pub fn connect_flags(
        &self,
        signal: impl Into<StringName>,
        callable: &Callable,
        flags: ConnectFlags,
    ) -> BindResult<Connection> {
        let signal = signal.into();
        let code: i64 = frame::ptrcall(
            crate::method_bind!("Object", "connect")?,
            self.raw(),
            (signal, callable.clone(), i64::from(flags.bits())),
        )?;
        BindError::from_code(code)?;
        log::trace!("connected {signal} on object #{}", self.instance_id());
        Ok(Connection {
            source: InstanceRef::new(self.instance_id()),
            signal,
            callable: callable.clone(),
        })
    }

    pub fn is_connected(&self, signal: impl Into<StringName>, callable: &Callable) -> BindResult<bool> {
        frame::ptrcall(
            crate::method_bind!("Object", "is_connected")?,
            self.raw(),
            (signal.into(), callable.clone()),
        )
    }

    pub fn disconnect(&self, signal: impl Into<StringName>, callable: &Callable) -> BindResult<()> {
        let signal = signal.into();
        if !self.is_connected(signal, callable)? {
            return Err(BindError::NotConnected(signal.to_string()));
        }
        frame::ptrcall(
            crate::method_bind!("Object", "disconnect")?,
            self.raw(),
            (signal, callable.clone()),
        )
    }

    /// Emits `signal`, delivering to every connected callable before returning.
    pub fn emit_signal(&self, signal: impl Into<StringName>, args: &[Variant]) -> BindResult<()> {
        let bind = crate::method_bind!("Object", "emit_signal")?;
        let signal: StringName = signal.into();
        let mut frame = CallFrame::varcall();
        frame.arg(signal);
        for arg in args {
            frame.arg_variant(arg.clone());
        }
        frame.invoke(bind, self.raw())?;
        let code: i64 = frame.take_return()?;
        BindError::from_code(code)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::classes::{Node, Resource};
    use crate::handle::{Owned, ValueHandle};

    #[test]
    fn callables_run_host_closures() {
        crate::loader::test_support::init();
        let sum = Callable::from_fn("sum", |a: i64, b: i64| a + b);
        let result = sum.call(&[Variant::from(&2i64), Variant::from(&40i64)]).unwrap();
        assert_eq!(result.to::<i64>(), Ok(42));
        assert_eq!(
            sum.call(&[Variant::from(&2i64)]).unwrap_err(),
            CallError::TooFewArguments { expected: 2 }
        );
        assert_eq!(
            sum.call(&[Variant::from(&2i64), Variant::from("x")]).unwrap_err(),
            CallError::InvalidArgument {
                argument: 1,
                expected: crate::variant::VariantKind::Int,
            }
        );
    }

    #[test]
    fn closure_is_freed_with_the_last_copy() {
        crate::loader::test_support::init();
        let token = Rc::new(());
        let callable = {
            let token = Rc::clone(&token);
            Callable::from_variant_fn("hold", move |_args: &[&Variant]| {
                let _ = &token;
                Ok(Variant::nil())
            })
        };
        let copy = callable.clone();
        assert_eq!(Rc::strong_count(&token), 2);
        drop(callable);
        assert_eq!(Rc::strong_count(&token), 2);
        drop(copy);
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn panics_do_not_cross_the_boundary() {
        crate::loader::test_support::init();
        let callable = Callable::from_fn("boom", || -> i64 { panic!("boom") });
        assert_eq!(callable.call(&[]).unwrap_err(), CallError::InvalidMethod);
        let _ = extbind_testengine::take_errors();
    }

    #[test]
    fn bound_callables_check_their_object() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let callable = Callable::from_fn_bound(node.as_borrowed(), "ping", || 1i64);
        assert_eq!(callable.call(&[]).unwrap().to::<i64>(), Ok(1));
        unsafe { node.destroy() };
        assert_eq!(callable.call(&[]).unwrap_err(), CallError::InstanceIsNull);
        let _ = extbind_testengine::take_warnings();
    }

    #[test]
    fn connect_errors_carry_engine_codes() {
        crate::loader::test_support::init();
        let resource = Owned::<Resource>::construct().unwrap();
        let callable = Callable::from_fn("noop", |_name: String| {});
        assert_eq!(
            resource.connect("missing", &callable).unwrap_err(),
            BindError::Engine(extbind_testengine::ERR_INVALID_PARAMETER)
        );
        let connection = resource.connect("changed", &callable).unwrap();
        assert!(connection.is_connected());
        assert!(resource.connect("changed", &callable).is_err());
        assert_eq!(
            resource.emit_signal("missing", &[]),
            Err(BindError::Engine(extbind_testengine::ERR_UNAVAILABLE))
        );
        connection.disconnect().unwrap();
        assert_eq!(
            resource.disconnect("changed", &callable),
            Err(BindError::NotConnected("changed".to_owned()))
        );
        let _ = extbind_testengine::take_errors();
    }
}
