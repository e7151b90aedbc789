//! Variants and the per-kind codec.
//!
//! A [`Variant`] is the engine's tagged union, stored inline in
//! [`sys::VARIANT_SIZE`] bytes and owned by whoever holds it. Every other type
//! in this module has the engine's *native* layout for one kind, which is what
//! pointer calls pass around:
//!
//! | kind | host type | storage |
//! |---|---|---|
//! | bool, int, float | `bool`, `i64`, `f64` | plain |
//! | vectors, rects, transforms, color | [`Vector2`] ... [`Color`] | plain `#[repr(C)]` |
//! | string-name | [`StringName`](crate::StringName) | interned pointer |
//! | string, node-path | [`GString`], [`NodePath`] | engine heap |
//! | array, dictionary | [`VariantArray`], [`Dictionary`] | engine heap, proxy view |
//! | packed arrays | [`PackedArray<E>`] | engine heap, proxy view |
//! | callable, signal | [`Callable`], [`Signal`] | engine heap |
//! | object | `Option<Owned<T>>`, `Option<ValueHandle<T>>` | object pointer |
//!
//! Heap kinds are built and released with the engine's own constructors and
//! destructors; host containers are never copied into them.

use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;

use extbind_sys as sys;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::VariantError;
use crate::loader;
use crate::marshal::FfiType;

/// Implements the variant codec for types whose native value owns itself.
///
/// Must stay above the `mod` declarations so the kind modules can expand it.
macro_rules! impl_native_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::variant::ToVariant for $ty {
                fn to_variant(&self) -> $crate::variant::Variant {
                    $crate::variant::native_to_variant(self)
                }
            }

            impl $crate::variant::FromVariant for $ty {
                fn try_from_variant(
                    variant: &$crate::variant::Variant,
                ) -> Result<Self, $crate::error::VariantError> {
                    $crate::variant::native_from_variant(variant)
                }
            }
        )*
    };
}

mod builtins;
mod callable;
mod collections;
mod packed;
mod string;

pub use builtins::*;
pub use callable::{Callable, Signal};
pub use collections::{Dictionary, VariantArray};
pub use packed::{
    PackedArray, PackedByteArray, PackedColorArray, PackedElement, PackedFloat32Array,
    PackedFloat64Array, PackedInt32Array, PackedInt64Array, PackedStringArray,
    PackedVector2Array, PackedVector3Array,
};
pub use string::{GString, NodePath};
pub(crate) use string::destroy_native;

/// Discriminator of a [`Variant`].
#[repr(u32)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive,
)]
pub enum VariantKind {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    Vector2 = 5,
    Vector2i = 6,
    Rect2 = 7,
    Rect2i = 8,
    Vector3 = 9,
    Vector3i = 10,
    Transform2D = 11,
    Vector4 = 12,
    Vector4i = 13,
    Plane = 14,
    Quaternion = 15,
    Aabb = 16,
    Basis = 17,
    Transform3D = 18,
    Projection = 19,
    Color = 20,
    StringName = 21,
    NodePath = 22,
    Rid = 23,
    Object = 24,
    Callable = 25,
    Signal = 26,
    Dictionary = 27,
    Array = 28,
    PackedByteArray = 29,
    PackedInt32Array = 30,
    PackedInt64Array = 31,
    PackedFloat32Array = 32,
    PackedFloat64Array = 33,
    PackedStringArray = 34,
    PackedVector2Array = 35,
    PackedVector3Array = 36,
    PackedColorArray = 37,
}

impl VariantKind {
    /// Every kind that has a native layout, in discriminator order.
    pub fn native_kinds() -> impl Iterator<Item = VariantKind> {
        (1..sys::VARIANT_TYPE_MAX).filter_map(|ty| VariantKind::try_from(ty).ok())
    }

    /// Unknown discriminators decode as `Nil`.
    pub fn from_sys(ty: sys::VariantType) -> VariantKind {
        VariantKind::try_from(ty).unwrap_or(VariantKind::Nil)
    }

    pub fn sys(self) -> sys::VariantType {
        self.into()
    }

    /// Bytes taken by the native layout; 0 for `Nil`.
    pub fn payload_size(self) -> usize {
        sys::payload_size(self.sys())
    }

    /// Whether native values of this kind must be destroyed.
    pub fn is_heap(self) -> bool {
        sys::is_heap_type(self.sys())
    }

    /// Element kind of a packed array kind.
    pub fn packed_element(self) -> Option<VariantKind> {
        sys::packed_element_type(self.sys()).map(VariantKind::from_sys)
    }
}

/// Converts a host value into a new variant.
pub trait ToVariant {
    fn to_variant(&self) -> Variant;
}

/// Decodes a host value from a variant, checking the discriminator first.
pub trait FromVariant: Sized {
    fn try_from_variant(variant: &Variant) -> Result<Self, VariantError>;
}

/// The engine's tagged union.
#[repr(C, align(8))]
pub struct Variant {
    opaque: [u8; sys::VARIANT_SIZE],
}

impl Variant {
    pub fn nil() -> Variant {
        let new_nil = loader::fns().variant_new_nil;
        unsafe { Variant::new_with(|dst| new_nil(dst)) }
    }

    /// Encodes `value`.
    pub fn from<T: ToVariant + ?Sized>(value: &T) -> Variant {
        value.to_variant()
    }

    /// Builds a variant by letting the engine initialize the slot.
    ///
    /// # Safety
    /// `init` must fully initialize the variant behind the pointer.
    pub(crate) unsafe fn new_with(init: impl FnOnce(sys::UninitVariantPtr)) -> Variant {
        let mut slot = MaybeUninit::<Variant>::uninit();
        init(slot.as_mut_ptr().cast());
        unsafe { slot.assume_init() }
    }

    /// Copies an engine-owned variant.
    ///
    /// # Safety
    /// `src` must point at a live variant.
    pub unsafe fn from_sys(src: sys::ConstVariantPtr) -> Variant {
        let new_copy = loader::fns().variant_new_copy;
        unsafe { Variant::new_with(|dst| new_copy(dst, src)) }
    }

    /// Views an engine-owned variant without copying it.
    ///
    /// # Safety
    /// `src` must point at a live variant that outlives `'a`.
    pub unsafe fn borrow_sys<'a>(src: sys::ConstVariantPtr) -> &'a Variant {
        unsafe { &*(src as *const Variant) }
    }

    /// Moves `self` into an uninitialized engine slot.
    ///
    /// # Safety
    /// `dst` must be writable for a variant; its previous contents are not dropped.
    pub unsafe fn move_into(self, dst: sys::UninitVariantPtr) {
        unsafe { ptr::write(dst as *mut Variant, self) };
    }

    pub fn sys(&self) -> sys::ConstVariantPtr {
        ptr::from_ref(self).cast()
    }

    /// Mutable pointer for ABI entries that take one without writing through it.
    pub(crate) fn sys_mut(&self) -> sys::VariantPtr {
        self.sys() as sys::VariantPtr
    }

    pub fn kind(&self) -> VariantKind {
        VariantKind::from_sys(unsafe { (loader::fns().variant_get_type)(self.sys()) })
    }

    pub fn is_nil(&self) -> bool {
        self.kind() == VariantKind::Nil
    }

    /// Decodes the held value.
    pub fn to<T: FromVariant>(&self) -> Result<T, VariantError> {
        T::try_from_variant(self)
    }

    /// Fails with the kind-mismatch error unless the discriminator is `kind`.
    pub fn expect_kind(&self, kind: VariantKind) -> Result<(), VariantError> {
        match self.kind() {
            actual if actual == kind => Ok(()),
            actual => Err(VariantError::KindMismatch {
                expected: kind,
                actual,
            }),
        }
    }

    /// Copy whose containers no longer share storage with `self`.
    pub fn duplicate(&self, deep: bool) -> Variant {
        let duplicate = loader::fns().variant_duplicate;
        unsafe { Variant::new_with(|dst| duplicate(self.sys(), dst, sys::from_bool(deep))) }
    }

    /// The engine's text form of the value.
    pub fn stringify(&self) -> String {
        let stringify = loader::fns().variant_stringify;
        let text = unsafe { GString::new_with(|dst| stringify(self.sys(), dst)) };
        text.to_string()
    }

    /// Native payload inside the variant, of the variant's current kind.
    ///
    /// # Safety
    /// The kind must have been checked; the pointer dies with `self`.
    pub(crate) unsafe fn internal_ptr(&self, kind: VariantKind) -> sys::TypePtr {
        unsafe { (loader::kind_fns(kind).internal)(self.sys_mut()) }
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        unsafe { Variant::from_sys(self.sys()) }
    }
}

impl Drop for Variant {
    fn drop(&mut self) {
        unsafe { (loader::fns().variant_destroy)(self.sys_mut()) };
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::nil()
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variant({:?}: {})", self.kind(), self.stringify())
    }
}

impl ToVariant for Variant {
    fn to_variant(&self) -> Variant {
        self.clone()
    }
}

impl FromVariant for Variant {
    fn try_from_variant(variant: &Variant) -> Result<Self, VariantError> {
        Ok(variant.clone())
    }
}

impl ToVariant for () {
    fn to_variant(&self) -> Variant {
        Variant::nil()
    }
}

impl<T: ToVariant> ToVariant for Option<T> {
    fn to_variant(&self) -> Variant {
        match self {
            Some(value) => value.to_variant(),
            None => Variant::nil(),
        }
    }
}

/// Nil and null objects decode as `None`.
impl<T: FromVariant> FromVariant for Option<T> {
    fn try_from_variant(variant: &Variant) -> Result<Self, VariantError> {
        if variant.is_nil() {
            return Ok(None);
        }
        match T::try_from_variant(variant) {
            Ok(value) => Ok(Some(value)),
            Err(VariantError::NullObject) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Variant-typed parameters and returns travel as the variant itself.
unsafe impl FfiType for Variant {
    const KIND: VariantKind = VariantKind::Nil;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { Variant::from_sys(ptr.cast()) }
    }

    fn default_value() -> Self {
        Variant::nil()
    }
}

/// Encodes a value of native layout through the engine's from-type constructor.
pub(crate) fn native_to_variant<T: FfiType>(value: &T) -> Variant {
    let from_native = loader::kind_fns(T::KIND).from_native;
    unsafe { Variant::new_with(|dst| from_native(dst, value.sys() as sys::TypePtr)) }
}

/// Decodes a value of native layout, refusing other discriminators before
/// touching the payload.
pub(crate) fn native_from_variant<T: FfiType>(variant: &Variant) -> Result<T, VariantError> {
    variant.expect_kind(T::KIND)?;
    let to_native = loader::kind_fns(T::KIND).to_native;
    let mut slot = MaybeUninit::<T>::uninit();
    unsafe {
        to_native(slot.as_mut_ptr().cast(), variant.sys_mut());
        Ok(slot.assume_init())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminators_match_the_abi() {
        assert_eq!(VariantKind::Object.sys(), sys::VARIANT_TYPE_OBJECT);
        assert_eq!(VariantKind::StringName.sys(), sys::VARIANT_TYPE_STRING_NAME);
        assert_eq!(
            VariantKind::PackedColorArray.sys(),
            sys::VARIANT_TYPE_PACKED_COLOR_ARRAY
        );
        assert_eq!(VariantKind::native_kinds().count(), 37);
        assert_eq!(VariantKind::from_sys(999), VariantKind::Nil);
    }

    #[test]
    fn heap_kinds() {
        assert!(VariantKind::String.is_heap());
        assert!(VariantKind::PackedVector3Array.is_heap());
        assert!(!VariantKind::StringName.is_heap());
        assert!(!VariantKind::Object.is_heap());
        assert_eq!(
            VariantKind::PackedFloat32Array.packed_element(),
            Some(VariantKind::Float)
        );
    }

    #[test]
    fn nil_round_trip() {
        crate::loader::test_support::init();
        let nil = Variant::nil();
        assert!(nil.is_nil());
        assert_eq!(
            nil.to::<i64>(),
            Err(VariantError::KindMismatch {
                expected: VariantKind::Int,
                actual: VariantKind::Nil,
            })
        );
        assert!(Variant::from(&None::<i64>).is_nil());
    }
}
