//! Host types and their engine calling-convention representation.
//!
//! Every value that crosses the ABI has two encodings: the variant shell used
//! by variant calls, and the *native* layout used by pointer calls. The
//! native side is described by [`FfiType`], the pairing of a host type with
//! its native representation by [`Marshal`].
//!
//! | host type | native type |
//! |---|---|
//! | `bool`, `i64`, `f64`, math types | itself |
//! | `String` | [`GString`] |
//! | [`Owned<T>`] | `Option<Owned<T>>` |
//! | [`ValueHandle<T>`] | `Option<ValueHandle<T>>` |
//! | [`Variant`] | itself, passed by pointer |

use std::fmt::Display;
use std::ptr;

use extbind_sys as sys;

use crate::class::Class;
use crate::error::{BindError, VariantError};
use crate::frame::CallFrame;
use crate::handle::{Owned, ValueHandle};
use crate::string_name::StringName;
use crate::variant::{
    Aabb, Basis, Callable, Color, Dictionary, FromVariant, GString, NodePath, PackedArray,
    PackedElement, Plane, Projection, Quaternion, Rect2, Rect2i, Rid, Signal, ToVariant,
    Transform2D, Transform3D, Variant, VariantArray, VariantKind, Vector2, Vector2i, Vector3,
    Vector3i, Vector4, Vector4i,
};

/// A type whose memory layout is the engine's native layout for one kind.
///
/// # Safety
/// `Self` must have exactly the engine's native layout for `KIND`, and
/// dropping it must release whatever the native value owns.
pub unsafe trait FfiType: Sized + 'static {
    const KIND: VariantKind;

    /// Owned copy of the native value at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point at a live native value of `KIND`.
    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self;

    fn sys(&self) -> sys::ConstTypePtr {
        ptr::from_ref(self).cast()
    }

    /// What the default constructor of the kind produces.
    fn default_value() -> Self;

    /// Moves `self` into an engine-provided slot.
    ///
    /// # Safety
    /// `dst` must be writable for a native value of `KIND`; its previous
    /// contents are overwritten without being dropped.
    unsafe fn write_ptr(self, dst: sys::TypePtr) {
        unsafe { ptr::write_unaligned(dst.cast::<Self>(), self) };
    }

    /// Moves a value the engine wrote out of `src`.
    ///
    /// # Safety
    /// `src` must hold a live native value of `KIND`, which is not used
    /// afterwards.
    unsafe fn take_ptr(src: sys::TypePtr) -> Self {
        unsafe { ptr::read_unaligned(src.cast::<Self>()) }
    }
}

/// A host type that can travel through both calling conventions.
pub trait Marshal: ToVariant + FromVariant + Sized + 'static {
    type Ffi: FfiType;

    fn into_ffi(self) -> Self::Ffi;

    fn from_ffi(ffi: Self::Ffi) -> Result<Self, VariantError>;
}

/// Variant kind `T` travels as.
pub const fn kind_of<T: Marshal>() -> VariantKind {
    <T::Ffi as FfiType>::KIND
}

macro_rules! impl_marshal_identity {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Marshal for $ty {
                type Ffi = $ty;

                fn into_ffi(self) -> Self::Ffi {
                    self
                }

                fn from_ffi(ffi: Self::Ffi) -> Result<Self, VariantError> {
                    Ok(ffi)
                }
            }
        )*
    };
}

impl_marshal_identity!(
    bool,
    i64,
    f64,
    Vector2,
    Vector2i,
    Rect2,
    Rect2i,
    Vector3,
    Vector3i,
    Transform2D,
    Vector4,
    Vector4i,
    Plane,
    Quaternion,
    Aabb,
    Basis,
    Transform3D,
    Projection,
    Color,
    Rid,
    StringName,
    GString,
    NodePath,
    Callable,
    Signal,
    VariantArray,
    Dictionary,
    Variant,
);

impl<E: PackedElement> Marshal for PackedArray<E> {
    type Ffi = PackedArray<E>;

    fn into_ffi(self) -> Self::Ffi {
        self
    }

    fn from_ffi(ffi: Self::Ffi) -> Result<Self, VariantError> {
        Ok(ffi)
    }
}

impl Marshal for String {
    type Ffi = GString;

    fn into_ffi(self) -> GString {
        GString::from(self.as_str())
    }

    fn from_ffi(ffi: GString) -> Result<Self, VariantError> {
        ffi.try_to_string()
    }
}

impl<T: Class> Marshal for Option<Owned<T>> {
    type Ffi = Option<Owned<T>>;

    fn into_ffi(self) -> Self::Ffi {
        self
    }

    fn from_ffi(ffi: Self::Ffi) -> Result<Self, VariantError> {
        Ok(ffi)
    }
}

impl<T: Class> Marshal for Owned<T> {
    type Ffi = Option<Owned<T>>;

    fn into_ffi(self) -> Self::Ffi {
        Some(self)
    }

    fn from_ffi(ffi: Self::Ffi) -> Result<Self, VariantError> {
        ffi.ok_or(VariantError::NullObject)
    }
}

impl<T: Class> Marshal for Option<ValueHandle<T>> {
    type Ffi = Option<ValueHandle<T>>;

    fn into_ffi(self) -> Self::Ffi {
        self
    }

    fn from_ffi(ffi: Self::Ffi) -> Result<Self, VariantError> {
        Ok(ffi)
    }
}

impl<T: Class> Marshal for ValueHandle<T> {
    type Ffi = Option<ValueHandle<T>>;

    fn into_ffi(self) -> Self::Ffi {
        Some(self)
    }

    fn from_ffi(ffi: Self::Ffi) -> Result<Self, VariantError> {
        ffi.ok_or(VariantError::NullObject)
    }
}

/// What a call can hand back: nothing, or one marshallable value.
pub trait ReturnValue: Sized + 'static {
    /// `None` for methods without a return value.
    const KIND: Option<VariantKind>;

    /// # Safety
    /// See [`FfiType::write_ptr`].
    unsafe fn write_ptr(self, dst: sys::TypePtr);

    /// Writes the kind's default value, used when a host call fails.
    ///
    /// # Safety
    /// See [`FfiType::write_ptr`].
    unsafe fn write_default(dst: sys::TypePtr);

    fn into_variant(self) -> Variant;

    /// Reads the value an invoked frame received.
    fn take_from(frame: &mut CallFrame) -> Result<Self, BindError>;
}

impl ReturnValue for () {
    const KIND: Option<VariantKind> = None;

    unsafe fn write_ptr(self, _dst: sys::TypePtr) {}

    unsafe fn write_default(_dst: sys::TypePtr) {}

    fn into_variant(self) -> Variant {
        Variant::nil()
    }

    fn take_from(_frame: &mut CallFrame) -> Result<Self, BindError> {
        Ok(())
    }
}

impl<T: Marshal> ReturnValue for T {
    const KIND: Option<VariantKind> = Some(<T::Ffi as FfiType>::KIND);

    unsafe fn write_ptr(self, dst: sys::TypePtr) {
        unsafe { self.into_ffi().write_ptr(dst) };
    }

    unsafe fn write_default(dst: sys::TypePtr) {
        unsafe { <T::Ffi as FfiType>::default_value().write_ptr(dst) };
    }

    fn into_variant(self) -> Variant {
        self.to_variant()
    }

    fn take_from(frame: &mut CallFrame) -> Result<Self, BindError> {
        Ok(frame.take_return::<T>()?)
    }
}

/// Return type of host code called by the engine.
///
/// Host overrides and methods may return a plain value or a `Result`; an
/// `Err` is reported and the caller receives the kind's default value.
pub trait HostReturn {
    type Value: ReturnValue;

    fn into_result(self) -> Result<Self::Value, String>;
}

impl<R: ReturnValue> HostReturn for R {
    type Value = R;

    fn into_result(self) -> Result<R, String> {
        Ok(self)
    }
}

impl<R: ReturnValue, E: Display> HostReturn for Result<R, E> {
    type Value = R;

    fn into_result(self) -> Result<R, String> {
        self.map_err(|error| error.to_string())
    }
}
