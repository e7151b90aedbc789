use std::fmt;
use std::mem::MaybeUninit;

use extbind_sys as sys;

use crate::class::Class;
use crate::error::CallError;
use crate::handle::Borrowed;
use crate::loader;
use crate::marshal::FfiType;
use crate::string_name::StringName;
use crate::variant::string::{copy_native, default_native, destroy_native};
use crate::variant::{ToVariant, Variant, VariantKind};

/// Something the engine can call: an object method or host code.
#[repr(C)]
pub struct Callable {
    opaque: [*mut std::ffi::c_void; 2],
}

impl Callable {
    /// Empty callable; calling it fails.
    pub fn invalid() -> Callable {
        let mut slot = MaybeUninit::<Callable>::uninit();
        unsafe {
            default_native(VariantKind::Callable, slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }

    /// Calls `method` on `object` when invoked.
    pub fn from_object_method<T: Class>(object: Borrowed<'_, T>, method: impl Into<StringName>) -> Callable {
        let raw = object.raw();
        let method = method.into().sys();
        let args: [sys::ConstTypePtr; 2] = [
            std::ptr::from_ref(&raw).cast(),
            std::ptr::from_ref(&method).cast(),
        ];
        let construct = loader::callable_from_method();
        let mut slot = MaybeUninit::<Callable>::uninit();
        unsafe {
            construct(slot.as_mut_ptr().cast(), args.as_ptr());
            slot.assume_init()
        }
    }

    /// Wraps host state described by `info`; the engine owns it from here on.
    ///
    /// # Safety
    /// `info` must satisfy the custom callable contract: `free_func` releases
    /// `callable_userdata` exactly once.
    pub(crate) unsafe fn from_custom(info: &sys::CallableCustomInfo) -> Callable {
        let create = loader::fns().callable_custom_create;
        let mut slot = MaybeUninit::<Callable>::uninit();
        unsafe {
            create(slot.as_mut_ptr().cast(), info);
            slot.assume_init()
        }
    }

    /// Calls through the variant convention.
    pub fn call(&self, args: &[Variant]) -> Result<Variant, CallError> {
        let arg_ptrs: Vec<sys::ConstVariantPtr> = args.iter().map(Variant::sys).collect();
        let mut status = sys::CallError::default();
        let ret = unsafe {
            Variant::new_with(|dst| {
                (loader::fns().callable_call)(
                    self.sys(),
                    arg_ptrs.as_ptr(),
                    arg_ptrs.len() as i64,
                    dst,
                    &mut status,
                )
            })
        };
        CallError::check(&status)?;
        Ok(ret)
    }
}

impl Clone for Callable {
    fn clone(&self) -> Self {
        let mut slot = MaybeUninit::<Callable>::uninit();
        unsafe {
            copy_native(VariantKind::Callable, self.sys(), slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }
}

impl Drop for Callable {
    fn drop(&mut self) {
        unsafe { destroy_native(VariantKind::Callable, std::ptr::from_mut(self).cast()) };
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.to_variant().stringify())
    }
}

/// A signal of one object, as a value.
#[repr(C)]
pub struct Signal {
    opaque: [*mut std::ffi::c_void; 2],
}

impl Signal {
    pub fn new<T: Class>(object: Borrowed<'_, T>, name: impl Into<StringName>) -> Signal {
        let raw = object.raw();
        let name = name.into().sys();
        let args: [sys::ConstTypePtr; 2] = [
            std::ptr::from_ref(&raw).cast(),
            std::ptr::from_ref(&name).cast(),
        ];
        let construct = loader::signal_from_member();
        let mut slot = MaybeUninit::<Signal>::uninit();
        unsafe {
            construct(slot.as_mut_ptr().cast(), args.as_ptr());
            slot.assume_init()
        }
    }
}

impl Clone for Signal {
    fn clone(&self) -> Self {
        let mut slot = MaybeUninit::<Signal>::uninit();
        unsafe {
            copy_native(VariantKind::Signal, self.sys(), slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        unsafe { destroy_native(VariantKind::Signal, std::ptr::from_mut(self).cast()) };
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({})", self.to_variant().stringify())
    }
}

unsafe impl FfiType for Callable {
    const KIND: VariantKind = VariantKind::Callable;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { (*ptr.cast::<Self>()).clone() }
    }

    fn default_value() -> Self {
        Callable::invalid()
    }
}

unsafe impl FfiType for Signal {
    const KIND: VariantKind = VariantKind::Signal;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { (*ptr.cast::<Self>()).clone() }
    }

    fn default_value() -> Self {
        let mut slot = MaybeUninit::<Signal>::uninit();
        unsafe {
            default_native(VariantKind::Signal, slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }
}

impl_native_codec!(Callable, Signal);
