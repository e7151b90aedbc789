use std::fmt;
use std::mem::MaybeUninit;

use extbind_sys as sys;

use crate::error::VariantError;
use crate::loader;
use crate::marshal::FfiType;
use crate::variant::string::{copy_native, default_native, destroy_native};
use crate::variant::{ToVariant, Variant, VariantKind};

/// Engine array of variants.
///
/// Copies share storage with the original, as they do in the engine; use
/// [`duplicate`](VariantArray::duplicate) for an independent copy.
#[repr(transparent)]
pub struct VariantArray {
    opaque: *mut std::ffi::c_void,
}

impl VariantArray {
    pub fn new() -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        unsafe {
            default_native(VariantKind::Array, slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }

    fn sys_mut(&self) -> sys::TypePtr {
        self.sys() as sys::TypePtr
    }

    pub fn len(&self) -> usize {
        unsafe { (loader::fns().array_size)(self.sys()) }.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the element at `index`.
    ///
    /// Element storage is shared with every copy of the array and moves when
    /// any of them grows, so elements are never lent out in place.
    pub fn get(&self, index: usize) -> Option<Variant> {
        let element = unsafe { (loader::fns().array_operator_index)(self.sys_mut(), index as i64) };
        (!element.is_null()).then(|| unsafe { Variant::borrow_sys(element) }.clone())
    }

    /// Replaces the element at `index`; false when out of bounds.
    pub fn set(&mut self, index: usize, value: &Variant) -> bool {
        let element = unsafe { (loader::fns().array_operator_index)(self.sys_mut(), index as i64) };
        if element.is_null() {
            return false;
        }
        unsafe { *element.cast::<Variant>() = value.clone() };
        true
    }

    pub fn push(&mut self, value: &Variant) {
        unsafe { (loader::fns().array_push_back)(self.sys_mut(), value.sys()) };
    }

    pub fn iter(&self) -> impl Iterator<Item = Variant> + '_ {
        (0..self.len()).filter_map(|index| self.get(index))
    }

    pub fn duplicate(&self, deep: bool) -> VariantArray {
        self.to_variant().duplicate(deep).to().unwrap_or_default()
    }
}

impl Default for VariantArray {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for VariantArray {
    fn clone(&self) -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        unsafe {
            copy_native(VariantKind::Array, self.sys(), slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }
}

impl Drop for VariantArray {
    fn drop(&mut self) {
        unsafe { destroy_native(VariantKind::Array, self.sys_mut()) };
    }
}

impl FromIterator<Variant> for VariantArray {
    fn from_iter<I: IntoIterator<Item = Variant>>(iter: I) -> Self {
        let mut array = VariantArray::new();
        for value in iter {
            array.push(&value);
        }
        array
    }
}

impl fmt::Debug for VariantArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Engine dictionary, keyed by variants, in insertion order.
///
/// Copies share storage, like [`VariantArray`].
#[repr(transparent)]
pub struct Dictionary {
    opaque: *mut std::ffi::c_void,
}

impl Dictionary {
    pub fn new() -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        unsafe {
            default_native(VariantKind::Dictionary, slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }

    fn sys_mut(&self) -> sys::TypePtr {
        self.sys() as sys::TypePtr
    }

    pub fn len(&self) -> usize {
        unsafe { (loader::fns().dictionary_size)(self.sys()) }.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get<K: ToVariant + ?Sized>(&self, key: &K) -> Option<Variant> {
        let key = key.to_variant();
        let mut value = MaybeUninit::<Variant>::uninit();
        let found = unsafe {
            (loader::fns().dictionary_get)(self.sys(), key.sys(), value.as_mut_ptr().cast())
        };
        // The slot is written either way.
        let value = unsafe { value.assume_init() };
        sys::to_bool(found).then_some(value)
    }

    pub fn contains_key<K: ToVariant + ?Sized>(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert<K: ToVariant + ?Sized, V: ToVariant + ?Sized>(&mut self, key: &K, value: &V) {
        let key = key.to_variant();
        let slot = unsafe { (loader::fns().dictionary_operator_index)(self.sys_mut(), key.sys()) };
        if !slot.is_null() {
            unsafe { *slot.cast::<Variant>() = value.to_variant() };
        }
    }

    pub fn keys(&self) -> VariantArray {
        let mut keys = MaybeUninit::<VariantArray>::uninit();
        unsafe {
            (loader::fns().dictionary_keys)(self.sys(), keys.as_mut_ptr().cast());
            keys.assume_init()
        }
    }

    pub fn duplicate(&self, deep: bool) -> Dictionary {
        self.to_variant().duplicate(deep).to().unwrap_or_default()
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Dictionary {
    fn clone(&self) -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        unsafe {
            copy_native(VariantKind::Dictionary, self.sys(), slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        unsafe { destroy_native(VariantKind::Dictionary, self.sys_mut()) };
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for key in self.keys().iter() {
            let value = self.get(&key);
            map.entry(&key, &value);
        }
        map.finish()
    }
}

unsafe impl FfiType for VariantArray {
    const KIND: VariantKind = VariantKind::Array;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { (*ptr.cast::<Self>()).clone() }
    }

    fn default_value() -> Self {
        Self::new()
    }
}

unsafe impl FfiType for Dictionary {
    const KIND: VariantKind = VariantKind::Dictionary;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { (*ptr.cast::<Self>()).clone() }
    }

    fn default_value() -> Self {
        Self::new()
    }
}

impl_native_codec!(VariantArray, Dictionary);

impl Variant {
    /// Views the array held by the variant.
    pub fn as_array(&self) -> Result<&VariantArray, VariantError> {
        self.expect_kind(VariantKind::Array)?;
        Ok(unsafe { &*self.internal_ptr(VariantKind::Array).cast::<VariantArray>() })
    }

    pub fn as_array_mut(&mut self) -> Result<&mut VariantArray, VariantError> {
        self.expect_kind(VariantKind::Array)?;
        Ok(unsafe { &mut *self.internal_ptr(VariantKind::Array).cast::<VariantArray>() })
    }

    pub fn as_dictionary(&self) -> Result<&Dictionary, VariantError> {
        self.expect_kind(VariantKind::Dictionary)?;
        Ok(unsafe { &*self.internal_ptr(VariantKind::Dictionary).cast::<Dictionary>() })
    }

    pub fn as_dictionary_mut(&mut self) -> Result<&mut Dictionary, VariantError> {
        self.expect_kind(VariantKind::Dictionary)?;
        Ok(unsafe { &mut *self.internal_ptr(VariantKind::Dictionary).cast::<Dictionary>() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_elements() {
        crate::loader::test_support::init();
        let mut array: VariantArray = [Variant::from(&1i64), Variant::from("two")]
            .into_iter()
            .collect();
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(0).map(|v| v.to::<i64>()), Some(Ok(1)));
        assert_eq!(array.get(1).map(|v| v.kind()), Some(VariantKind::String));
        assert!(array.get(2).is_none());

        assert!(array.set(0, &Variant::from(&5.0f64)));
        assert!(!array.set(9, &Variant::nil()));
        assert_eq!(array.get(0).map(|v| v.to::<f64>()), Some(Ok(5.0)));
    }

    #[test]
    fn copies_share_and_duplicates_do_not() {
        crate::loader::test_support::init();
        let mut array = VariantArray::new();
        let shared = array.clone();
        let separate = array.duplicate(false);
        array.push(&Variant::from(&true));
        assert_eq!(shared.len(), 1);
        assert_eq!(separate.len(), 0);
    }

    #[test]
    fn elements_survive_growth_through_a_copy() {
        crate::loader::test_support::init();
        let mut array = VariantArray::new();
        array.push(&Variant::from("first"));
        let first = array.get(0).unwrap();

        let mut shared = array.clone();
        for i in 0..4096i64 {
            shared.push(&Variant::from(&i));
        }
        assert_eq!(array.len(), 4097);
        assert_eq!(first.kind(), VariantKind::String);
        assert_eq!(first.to::<String>().as_deref(), Ok("first"));
        assert_eq!(array.get(0).unwrap().to::<String>().as_deref(), Ok("first"));
    }

    #[test]
    fn dictionary_entries() {
        crate::loader::test_support::init();
        let mut dict = Dictionary::new();
        dict.insert("hp", &10i64);
        dict.insert("name", "Ann");
        dict.insert("hp", &12i64);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("hp").map(|v| v.to::<i64>()), Some(Ok(12)));
        assert!(dict.get("mana").is_none());
        assert!(dict.contains_key("name"));
        assert_eq!(dict.keys().len(), 2);
    }

    #[test]
    fn variant_views() {
        crate::loader::test_support::init();
        let mut variant = VariantArray::new().to_variant();
        variant.as_array_mut().unwrap().push(&Variant::from(&3i64));
        assert_eq!(variant.as_array().unwrap().len(), 1);
        assert!(variant.as_dictionary().is_err());

        let mut variant = Dictionary::new().to_variant();
        variant.as_dictionary_mut().unwrap().insert("k", "v");
        assert!(variant.as_dictionary().unwrap().contains_key("k"));
    }
}
