//! Packed arrays: contiguous engine storage of one element type.
//!
//! A [`PackedArray`] is a proxy over engine-owned storage; every operation
//! goes through the engine's packed array interface for its kind. Copies are
//! cheap and copy-on-write on the engine side.

use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;

use extbind_sys as sys;

use crate::error::VariantError;
use crate::loader;
use crate::marshal::FfiType;
use crate::variant::{
    Color, FromVariant, GString, ToVariant, Variant, VariantKind, Vector2, Vector3,
    native_from_variant, native_to_variant,
};

/// An element type with a packed array kind.
///
/// # Safety
/// The layout of `Self` must match the engine's element layout for
/// `ARRAY_KIND`.
pub unsafe trait PackedElement: Sized + 'static {
    const ARRAY_KIND: VariantKind;
}

unsafe impl PackedElement for u8 {
    const ARRAY_KIND: VariantKind = VariantKind::PackedByteArray;
}

unsafe impl PackedElement for i32 {
    const ARRAY_KIND: VariantKind = VariantKind::PackedInt32Array;
}

unsafe impl PackedElement for i64 {
    const ARRAY_KIND: VariantKind = VariantKind::PackedInt64Array;
}

unsafe impl PackedElement for f32 {
    const ARRAY_KIND: VariantKind = VariantKind::PackedFloat32Array;
}

unsafe impl PackedElement for f64 {
    const ARRAY_KIND: VariantKind = VariantKind::PackedFloat64Array;
}

unsafe impl PackedElement for GString {
    const ARRAY_KIND: VariantKind = VariantKind::PackedStringArray;
}

unsafe impl PackedElement for Vector2 {
    const ARRAY_KIND: VariantKind = VariantKind::PackedVector2Array;
}

unsafe impl PackedElement for Vector3 {
    const ARRAY_KIND: VariantKind = VariantKind::PackedVector3Array;
}

unsafe impl PackedElement for Color {
    const ARRAY_KIND: VariantKind = VariantKind::PackedColorArray;
}

pub type PackedByteArray = PackedArray<u8>;
pub type PackedInt32Array = PackedArray<i32>;
pub type PackedInt64Array = PackedArray<i64>;
pub type PackedFloat32Array = PackedArray<f32>;
pub type PackedFloat64Array = PackedArray<f64>;
pub type PackedStringArray = PackedArray<GString>;
pub type PackedVector2Array = PackedArray<Vector2>;
pub type PackedVector3Array = PackedArray<Vector3>;
pub type PackedColorArray = PackedArray<Color>;

#[repr(C)]
pub struct PackedArray<E: PackedElement> {
    opaque: [*mut std::ffi::c_void; 2],
    _element: PhantomData<E>,
}

impl<E: PackedElement> PackedArray<E> {
    fn fns() -> &'static sys::PackedArrayFunctions {
        loader::packed_fns(E::ARRAY_KIND)
    }

    fn sys_mut(&mut self) -> sys::TypePtr {
        std::ptr::from_mut(self).cast()
    }

    pub fn new() -> Self {
        let new = Self::fns().new;
        let mut slot = MaybeUninit::<Self>::uninit();
        unsafe {
            new(slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }

    pub fn len(&self) -> usize {
        unsafe { (Self::fns().size)(self.sys()) }.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, value: E) {
        let append = Self::fns().append;
        unsafe { append(self.sys_mut(), std::ptr::from_ref(&value).cast()) };
    }

    /// Owned copy of the element at `index`.
    pub fn get(&self, index: usize) -> Option<E> {
        let get = Self::fns().get;
        let mut slot = MaybeUninit::<E>::uninit();
        let found = unsafe { get(self.sys(), index as i64, slot.as_mut_ptr().cast()) };
        sys::to_bool(found).then(|| unsafe { slot.assume_init() })
    }

    /// Overwrites the element at `index`; false when out of bounds.
    pub fn set(&mut self, index: usize, value: E) -> bool {
        let set = Self::fns().set;
        let stored =
            unsafe { set(self.sys_mut(), index as i64, std::ptr::from_ref(&value).cast()) };
        sys::to_bool(stored)
    }

    /// Grows with default elements or truncates.
    pub fn resize(&mut self, len: usize) {
        let resize = Self::fns().resize;
        unsafe { resize(self.sys_mut(), len as i64) };
    }

    pub fn to_vec(&self) -> Vec<E> {
        (0..self.len()).filter_map(|index| self.get(index)).collect()
    }
}

impl<E: PackedElement> Default for PackedArray<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PackedElement> Clone for PackedArray<E> {
    fn clone(&self) -> Self {
        let copy = Self::fns().copy;
        let mut slot = MaybeUninit::<Self>::uninit();
        unsafe {
            copy(slot.as_mut_ptr().cast(), self.sys());
            slot.assume_init()
        }
    }
}

impl<E: PackedElement> Drop for PackedArray<E> {
    fn drop(&mut self) {
        if loader::try_binding().is_some() {
            let destroy = Self::fns().destroy;
            unsafe { destroy(self.sys_mut()) };
        }
    }
}

impl<E: PackedElement> FromIterator<E> for PackedArray<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut array = Self::new();
        for value in iter {
            array.push(value);
        }
        array
    }
}

impl<E: PackedElement + PartialEq> PartialEq for PackedArray<E> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.to_vec() == other.to_vec()
    }
}

impl<E: PackedElement + fmt::Debug> fmt::Debug for PackedArray<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

unsafe impl<E: PackedElement> FfiType for PackedArray<E> {
    const KIND: VariantKind = E::ARRAY_KIND;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { (*ptr.cast::<Self>()).clone() }
    }

    fn default_value() -> Self {
        Self::new()
    }
}

impl<E: PackedElement> ToVariant for PackedArray<E> {
    fn to_variant(&self) -> Variant {
        native_to_variant(self)
    }
}

impl<E: PackedElement> FromVariant for PackedArray<E> {
    fn try_from_variant(variant: &Variant) -> Result<Self, VariantError> {
        native_from_variant(variant)
    }
}

impl Variant {
    /// Views the packed array held by the variant without copying it.
    pub fn as_packed<E: PackedElement>(&self) -> Result<&PackedArray<E>, VariantError> {
        self.expect_kind(E::ARRAY_KIND)?;
        Ok(unsafe { &*self.internal_ptr(E::ARRAY_KIND).cast::<PackedArray<E>>() })
    }

    /// Mutable view; writes land in the variant's own array.
    pub fn as_packed_mut<E: PackedElement>(&mut self) -> Result<&mut PackedArray<E>, VariantError> {
        self.expect_kind(E::ARRAY_KIND)?;
        Ok(unsafe { &mut *self.internal_ptr(E::ARRAY_KIND).cast::<PackedArray<E>>() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_get_set() {
        crate::loader::test_support::init();
        let mut values = PackedFloat32Array::new();
        assert!(values.is_empty());
        values.push(1.5);
        values.push(2.5);
        assert_eq!(values.len(), 2);
        assert_eq!(values.get(1), Some(2.5));
        assert_eq!(values.get(2), None);
        assert!(values.set(0, -1.0));
        assert!(!values.set(5, 0.0));
        assert_eq!(values.to_vec(), vec![-1.0, 2.5]);

        values.resize(4);
        assert_eq!(values.to_vec(), vec![-1.0, 2.5, 0.0, 0.0]);
    }

    #[test]
    fn copies_do_not_alias() {
        crate::loader::test_support::init();
        let original: PackedInt64Array = [1, 2, 3].into_iter().collect();
        let mut copy = original.clone();
        copy.push(4);
        assert_eq!(original.len(), 3);
        assert_eq!(copy.len(), 4);
    }

    #[test]
    fn string_elements_own_their_text() {
        crate::loader::test_support::init();
        let names: PackedStringArray = ["a", "bc"].into_iter().map(GString::from).collect();
        assert_eq!(names.get(1).map(|s| s.to_string()).as_deref(), Some("bc"));
    }

    #[test]
    fn variant_view_writes_through() {
        crate::loader::test_support::init();
        let points: PackedVector2Array = [Vector2::new(1.0, 2.0)].into_iter().collect();
        let mut variant = points.to_variant();
        assert_eq!(variant.kind(), VariantKind::PackedVector2Array);
        variant
            .as_packed_mut::<Vector2>()
            .unwrap()
            .push(Vector2::new(3.0, 4.0));
        assert_eq!(variant.as_packed::<Vector2>().unwrap().len(), 2);
        assert_eq!(points.len(), 1);
        assert!(variant.as_packed::<Color>().is_err());
    }
}
