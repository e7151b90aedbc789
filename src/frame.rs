//! Call frames: staging arguments and receiving returns across the ABI.
//!
//! A [`CallFrame`] owns a scratch arena holding the arguments of one call in
//! the layout the engine expects, plus the return slot. Each slot remembers
//! its kind and destructor, so whatever the frame still owns is released
//! when it goes out of scope, on success and failure alike. The method bind
//! never consumes arguments.
//!
//! ```ignore
//! let bind = method_bind!("ValueBuffer", "get")?;
//! let mut frame = CallFrame::new();
//! frame.arg(1i64);
//! frame.ret_slot(VariantKind::Float);
//! frame.invoke(bind, buffer.raw())?;
//! let value: f64 = frame.take_return()?;
//! ```
//!
//! Two conventions exist. Pointer calls pass native values and need the
//! argument kinds to match the bind exactly; variant calls pass variants and
//! leave the checking to the engine.

use std::ptr::{self, NonNull};

use bumpalo::Bump;
use extbind_sys as sys;

use crate::diagnostics::report_warning;
use crate::error::{BindResult, CallError, VariantError};
use crate::loader::{self, MethodBind};
use crate::marshal::{FfiType, Marshal, ReturnValue, kind_of};
use crate::signature::Signature;
use crate::variant::{FromVariant, Variant, VariantKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Native values, through `object_method_bind_ptrcall`.
    Ptr,
    /// Variants, through `object_method_bind_call`.
    Variant,
}

struct Slot {
    ptr: NonNull<u8>,
    /// `Nil` for a slot holding a variant.
    kind: VariantKind,
    drop: unsafe fn(*mut u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetState {
    Reserved,
    Written,
    Taken,
}

struct RetSlot {
    ptr: NonNull<u8>,
    kind: VariantKind,
    state: RetState,
}

unsafe fn drop_slot<T>(ptr: *mut u8) {
    unsafe { ptr::drop_in_place(ptr.cast::<T>()) };
}

/// Native values are at most this big, and never more aligned than a variant.
#[repr(C, align(8))]
struct RetStorage([u8; sys::MAX_PAYLOAD_SIZE]);

/// Fill byte of a native return slot the engine has not written to.
const UNWRITTEN: u8 = 0xA5;

/// Whether a native return of `kind` at `ptr` still holds the fill pattern.
///
/// # Safety
/// `ptr` must point at a whole `RetStorage`.
unsafe fn still_unwritten(ptr: NonNull<u8>, kind: VariantKind) -> bool {
    let len = kind.payload_size().clamp(1, sys::MAX_PAYLOAD_SIZE);
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) };
    bytes.iter().all(|byte| *byte == UNWRITTEN)
}

pub struct CallFrame {
    arena: Bump,
    convention: Convention,
    args: Vec<Slot>,
    ret: Option<RetSlot>,
}

impl CallFrame {
    /// A frame for the pointer convention.
    pub fn new() -> Self {
        Self::with_convention(Convention::Ptr)
    }

    /// A frame for the variant convention.
    pub fn varcall() -> Self {
        Self::with_convention(Convention::Variant)
    }

    pub fn with_convention(convention: Convention) -> Self {
        Self {
            arena: Bump::with_capacity(4 * sys::VARIANT_SIZE),
            convention,
            args: Vec::new(),
            ret: None,
        }
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    fn push_slot<T>(&mut self, value: T, kind: VariantKind) {
        let ptr = NonNull::from(self.arena.alloc(value)).cast::<u8>();
        self.args.push(Slot {
            ptr,
            kind,
            drop: drop_slot::<T>,
        });
    }

    /// Stages the next argument.
    pub fn arg<T: Marshal>(&mut self, value: T) -> &mut Self {
        match self.convention {
            Convention::Ptr => self.push_slot(value.into_ffi(), kind_of::<T>()),
            Convention::Variant => {
                let variant = value.to_variant();
                self.push_slot(variant, VariantKind::Nil);
            }
        }
        self
    }

    /// Stages a variant as the next argument.
    ///
    /// Under the pointer convention this is only valid for parameters that
    /// take any variant.
    pub fn arg_variant(&mut self, value: Variant) -> &mut Self {
        self.push_slot(value, VariantKind::Nil);
        self
    }

    /// Reserves the return slot for a value of `kind` and hands out its address.
    ///
    /// Under the variant convention the slot always holds a variant.
    pub fn ret_slot(&mut self, kind: VariantKind) -> sys::TypePtr {
        self.release_ret();
        let kind = match self.convention {
            Convention::Ptr => kind,
            Convention::Variant => VariantKind::Nil,
        };
        let storage = self.arena.alloc(RetStorage([UNWRITTEN; sys::MAX_PAYLOAD_SIZE]));
        let ptr = NonNull::from(storage).cast::<u8>();
        self.ret = Some(RetSlot {
            ptr,
            kind,
            state: RetState::Reserved,
        });
        ptr.as_ptr().cast()
    }

    fn check_args(&self, bind: &MethodBind) -> Result<(), CallError> {
        let expected = bind.params.len();
        match self.args.len() {
            count if count < expected => return Err(CallError::TooFewArguments { expected }),
            count if count > expected && !bind.vararg => {
                return Err(CallError::TooManyArguments { expected });
            }
            _ => {}
        }
        if self.convention == Convention::Ptr {
            if bind.vararg {
                report_warning(&format!(
                    "{}::{} takes variable arguments and cannot be pointer-called",
                    bind.class, bind.name
                ));
                return Err(CallError::InvalidMethod);
            }
            for (index, (slot, param)) in self.args.iter().zip(bind.params).enumerate() {
                if slot.kind != *param {
                    return Err(CallError::InvalidArgument {
                        argument: index,
                        expected: *param,
                    });
                }
            }
        }
        Ok(())
    }

    /// Calls `bind` on `receiver` with the staged arguments.
    ///
    /// Counts and, for pointer calls, kinds are checked before anything is
    /// handed to the engine; on failure nothing is consumed and no return is
    /// written.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn invoke(&mut self, bind: &MethodBind, receiver: sys::ObjectPtr) -> Result<(), CallError> {
        self.check_args(bind)?;
        if receiver.is_null() || unsafe { (loader::fns().object_get_instance_id)(receiver) } == 0 {
            return Err(CallError::InstanceIsNull);
        }
        self.rearm_ret();
        match self.convention {
            Convention::Ptr => self.invoke_ptr(bind, receiver),
            Convention::Variant => self.invoke_variant(bind, receiver),
        }
    }

    fn invoke_ptr(&mut self, bind: &MethodBind, receiver: sys::ObjectPtr) -> Result<(), CallError> {
        match (&self.ret, bind.ret) {
            (Some(ret), Some(kind)) if ret.kind == kind => {}
            (None, Some(kind)) => {
                self.ret_slot(kind);
            }
            (None, None) => {}
            (Some(ret), declared) => {
                report_warning(&format!(
                    "{}::{} returns {declared:?}, frame expects {:?}",
                    bind.class, bind.name, ret.kind
                ));
                return Err(CallError::InvalidMethod);
            }
        }
        if let Some(ret) = &self.ret {
            if ret.kind == VariantKind::Nil {
                // Variant returns are assigned into, so the slot must hold one.
                unsafe { Variant::nil().move_into(ret.ptr.as_ptr().cast()) };
            }
        }

        let args = bumpalo::collections::Vec::from_iter_in(
            self.args.iter().map(|slot| slot.ptr.as_ptr() as sys::ConstTypePtr),
            &self.arena,
        );
        let ret_ptr = self
            .ret
            .as_ref()
            .map_or(ptr::null_mut(), |ret| ret.ptr.as_ptr().cast());
        unsafe { (loader::fns().object_method_bind_ptrcall)(bind.sys(), receiver, args.as_ptr(), ret_ptr) };
        let Some(ret) = &mut self.ret else {
            return Ok(());
        };
        // Pointer calls carry no status; a failed call leaves the slot as it was.
        if ret.kind != VariantKind::Nil && unsafe { still_unwritten(ret.ptr, ret.kind) } {
            report_warning(&format!("{}::{} wrote no return value", bind.class, bind.name));
            return Err(CallError::NoReturn);
        }
        ret.state = RetState::Written;
        Ok(())
    }

    fn invoke_variant(&mut self, bind: &MethodBind, receiver: sys::ObjectPtr) -> Result<(), CallError> {
        if self.ret.is_none() {
            self.ret_slot(VariantKind::Nil);
        }
        let Some(ret) = &mut self.ret else {
            return Err(CallError::InvalidMethod);
        };
        let args = bumpalo::collections::Vec::from_iter_in(
            self.args.iter().map(|slot| slot.ptr.as_ptr() as sys::ConstVariantPtr),
            &self.arena,
        );
        let mut status = sys::CallError::default();
        unsafe {
            (loader::fns().object_method_bind_call)(
                bind.sys(),
                receiver,
                args.as_ptr(),
                args.len() as i64,
                ret.ptr.as_ptr().cast(),
                &mut status,
            )
        };
        if let Err(error) = CallError::check(&status) {
            unsafe { ptr::drop_in_place(ret.ptr.as_ptr().cast::<Variant>()) };
            return Err(error);
        }
        ret.state = RetState::Written;
        Ok(())
    }

    /// Gives a frame that already received a return a fresh slot of the same kind.
    fn rearm_ret(&mut self) {
        match &self.ret {
            Some(ret) if ret.state != RetState::Reserved => {
                let kind = ret.kind;
                self.ret_slot(kind);
            }
            _ => {}
        }
    }

    fn written_ret(&mut self, expected: VariantKind) -> Result<&mut RetSlot, VariantError> {
        let actual = match self.ret.as_ref().map(|ret| (ret.state, ret.kind)) {
            Some((RetState::Written, _)) => None,
            Some((RetState::Reserved, kind)) => Some(kind),
            Some((RetState::Taken, _)) | None => Some(VariantKind::Nil),
        };
        match (actual, self.ret.as_mut()) {
            (None, Some(ret)) => Ok(ret),
            (actual, _) => Err(VariantError::KindMismatch {
                expected,
                actual: actual.unwrap_or(VariantKind::Nil),
            }),
        }
    }

    /// Decodes the return value; it can be taken once.
    pub fn take_return<T: Marshal>(&mut self) -> Result<T, VariantError> {
        let expected = kind_of::<T>();
        let convention = self.convention;
        let ret = self.written_ret(expected)?;
        match convention {
            Convention::Ptr => {
                if ret.kind != expected {
                    return Err(VariantError::KindMismatch {
                        expected,
                        actual: ret.kind,
                    });
                }
                ret.state = RetState::Taken;
                let ffi = unsafe { <T::Ffi as FfiType>::take_ptr(ret.ptr.as_ptr().cast()) };
                T::from_ffi(ffi)
            }
            Convention::Variant => {
                ret.state = RetState::Taken;
                let variant = unsafe { ptr::read(ret.ptr.as_ptr().cast::<Variant>()) };
                T::try_from_variant(&variant)
            }
        }
    }

    /// The return value as a variant, for variant calls and variant-typed returns.
    pub fn take_variant(&mut self) -> Result<Variant, VariantError> {
        let ret = self.written_ret(VariantKind::Nil)?;
        if ret.kind != VariantKind::Nil {
            return Err(VariantError::KindMismatch {
                expected: VariantKind::Nil,
                actual: ret.kind,
            });
        }
        ret.state = RetState::Taken;
        Ok(unsafe { ptr::read(ret.ptr.as_ptr().cast::<Variant>()) })
    }

    fn release_ret(&mut self) {
        let Some(ret) = self.ret.take() else {
            return;
        };
        if ret.state != RetState::Written {
            return;
        }
        unsafe {
            if ret.kind == VariantKind::Nil {
                ptr::drop_in_place(ret.ptr.as_ptr().cast::<Variant>());
            } else {
                release_native(ret.kind, ret.ptr.as_ptr().cast());
            }
        }
    }

    /// Releases everything the frame still owns. Dropping the frame does the same.
    pub fn free(self) {}
}

impl Default for CallFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        self.release_ret();
        for slot in self.args.drain(..).rev() {
            unsafe { (slot.drop)(slot.ptr.as_ptr()) };
        }
    }
}

impl std::fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFrame")
            .field("convention", &self.convention)
            .field("args", &self.args.iter().map(|slot| slot.kind).collect::<Vec<_>>())
            .field("ret", &self.ret.as_ref().map(|ret| (ret.kind, ret.state)))
            .finish()
    }
}

/// Releases a native return nobody read.
unsafe fn release_native(kind: VariantKind, value: sys::TypePtr) {
    if kind == VariantKind::Object {
        let raw = unsafe { *value.cast::<sys::ObjectPtr>() };
        // Returned objects arrive with a reference for the caller.
        drop(unsafe { crate::handle::Owned::<crate::classes::Object>::from_raw_owned(raw) });
    } else if kind.is_heap() {
        unsafe { crate::variant::destroy_native(kind, value) };
    }
}

/// Pointer call with typed arguments and return.
pub fn ptrcall<A: Signature, R: ReturnValue>(
    bind: &MethodBind,
    receiver: sys::ObjectPtr,
    args: A,
) -> BindResult<R> {
    let mut frame = CallFrame::new();
    args.push_args(&mut frame);
    if let Some(kind) = R::KIND {
        frame.ret_slot(kind);
    }
    frame.invoke(bind, receiver)?;
    R::take_from(&mut frame)
}

/// Variant call; the engine checks the arguments.
pub fn varcall<R: FromVariant>(
    bind: &MethodBind,
    receiver: sys::ObjectPtr,
    args: &[Variant],
) -> BindResult<R> {
    let mut frame = CallFrame::varcall();
    for arg in args {
        frame.arg_variant(arg.clone());
    }
    frame.invoke(bind, receiver)?;
    Ok(frame.take_variant()?.to::<R>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::{Node, Node2D};
    use crate::handle::ValueHandle;
    use crate::string_name::StringName;
    use crate::variant::{ToVariant, Vector2};

    #[test]
    fn pointer_call_round_trip() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node2D>::construct().unwrap();
        let set = crate::method_bind!("Node2D", "set_position").unwrap();
        let get = crate::method_bind!("Node2D", "get_position").unwrap();

        let mut frame = CallFrame::new();
        frame.arg(Vector2::new(1.0, 2.0));
        frame.invoke(set, node.raw()).unwrap();
        frame.free();

        let mut frame = CallFrame::new();
        frame.ret_slot(VariantKind::Vector2);
        frame.invoke(get, node.raw()).unwrap();
        assert_eq!(frame.take_return::<Vector2>(), Ok(Vector2::new(1.0, 2.0)));
        assert!(frame.take_return::<Vector2>().is_err());
        unsafe { node.destroy() };
    }

    #[test]
    fn wrong_count_consumes_nothing() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let set_name = crate::method_bind!("Node", "set_name").unwrap();

        let mut frame = CallFrame::new();
        frame.arg("a".to_owned()).arg("b".to_owned());
        assert_eq!(
            frame.invoke(set_name, node.raw()),
            Err(CallError::TooManyArguments { expected: 1 })
        );
        let mut frame = CallFrame::new();
        assert_eq!(
            frame.invoke(set_name, node.raw()),
            Err(CallError::TooFewArguments { expected: 1 })
        );
        assert_eq!(node.get_name().unwrap(), "");
        unsafe { node.destroy() };
    }

    #[test]
    fn wrong_kind_is_refused_before_the_call() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node2D>::construct().unwrap();
        let set = crate::method_bind!("Node2D", "set_position").unwrap();
        let mut frame = CallFrame::new();
        frame.arg(3i64);
        assert_eq!(
            frame.invoke(set, node.raw()),
            Err(CallError::InvalidArgument {
                argument: 0,
                expected: VariantKind::Vector2,
            })
        );
        assert!(extbind_testengine::take_errors().is_empty());
        unsafe { node.destroy() };
    }

    #[test]
    fn variant_calls_report_engine_errors() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let call = crate::method_bind!("Object", "call").unwrap();
        let result: BindResult<Variant> =
            varcall(call, node.raw(), &[StringName::new("no_such_method").to_variant()]);
        assert_eq!(result.unwrap_err(), CallError::InvalidMethod.into());

        let result: BindResult<String> =
            varcall(call, node.raw(), &[StringName::new("get_class").to_variant()]);
        assert_eq!(result.as_deref(), Ok("Node"));
        unsafe { node.destroy() };
    }

    #[test]
    fn return_kind_mismatch_is_an_invalid_method() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let get_name = crate::method_bind!("Node", "get_name").unwrap();
        let result: BindResult<i64> = ptrcall(get_name, node.raw(), ());
        assert_eq!(result, Err(CallError::InvalidMethod.into()));
        let _ = extbind_testengine::take_warnings();
        unsafe { node.destroy() };
    }

    #[test]
    fn vararg_binds_need_the_variant_convention() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let call = crate::method_bind!("Object", "call").unwrap();
        let result: BindResult<Variant> = ptrcall(call, node.raw(), (StringName::new("get_class"),));
        assert_eq!(result.unwrap_err(), CallError::InvalidMethod.into());
        let _ = extbind_testengine::take_warnings();
        unsafe { node.destroy() };
    }

    #[test]
    fn failed_variant_call_writes_no_return() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let call = crate::method_bind!("Object", "call").unwrap();

        let mut frame = CallFrame::varcall();
        frame
            .arg(StringName::new("set_name"))
            .arg("a".to_owned())
            .arg("b".to_owned());
        assert_eq!(
            frame.invoke(call, node.raw()),
            Err(CallError::TooManyArguments { expected: 1 })
        );
        assert!(frame.take_variant().is_err());
        assert_eq!(node.get_name().unwrap(), "");
        unsafe { node.destroy() };
    }

    #[test]
    fn freed_receiver_is_refused() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node2D>::construct().unwrap();
        let raw = node.raw();
        let get = crate::method_bind!("Node2D", "get_position").unwrap();
        unsafe { node.destroy() };

        let mut frame = CallFrame::new();
        frame.ret_slot(VariantKind::Vector2);
        assert_eq!(frame.invoke(get, raw), Err(CallError::InstanceIsNull));
        assert!(frame.take_return::<Vector2>().is_err());
        assert!(extbind_testengine::take_errors().is_empty());
    }

    #[test]
    fn reinvoking_replaces_the_return() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let get_class = crate::method_bind!("Object", "get_class").unwrap();
        let set_name = crate::method_bind!("Node", "set_name").unwrap();
        let get_name = crate::method_bind!("Node", "get_name").unwrap();

        let mut frame = CallFrame::new();
        frame.invoke(get_class, node.raw()).unwrap();
        frame.invoke(get_class, node.raw()).unwrap();
        assert_eq!(frame.take_return::<String>().as_deref(), Ok("Node"));
        frame.invoke(get_class, node.raw()).unwrap();
        assert_eq!(frame.take_return::<String>().as_deref(), Ok("Node"));

        ptrcall::<_, ()>(set_name, node.raw(), ("first".to_owned(),)).unwrap();
        let mut frame = CallFrame::varcall();
        frame.invoke(get_name, node.raw()).unwrap();
        ptrcall::<_, ()>(set_name, node.raw(), ("second".to_owned(),)).unwrap();
        frame.invoke(get_name, node.raw()).unwrap();
        let name = frame.take_variant().unwrap().to::<StringName>().unwrap();
        assert_eq!(name, "second");
        unsafe { node.destroy() };
    }
}
