use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;

use extbind_sys as sys;

use crate::error::VariantError;
use crate::loader;
use crate::marshal::FfiType;
use crate::string_name::StringName;
use crate::variant::VariantKind;

/// Engine string. Owns its engine-side storage.
#[repr(transparent)]
pub struct GString {
    opaque: *mut std::ffi::c_void,
}

impl GString {
    pub fn new() -> GString {
        GString::default()
    }

    /// Builds a string by letting the engine initialize it.
    ///
    /// # Safety
    /// `init` must fully initialize the string behind the pointer.
    pub(crate) unsafe fn new_with(init: impl FnOnce(sys::UninitTypePtr)) -> GString {
        let mut slot = MaybeUninit::<GString>::uninit();
        init(slot.as_mut_ptr().cast());
        unsafe { slot.assume_init() }
    }

    /// Length in UTF-8 bytes.
    pub fn len(&self) -> usize {
        let to_utf8 = loader::fns().string_to_utf8_chars;
        unsafe { to_utf8(self.sys(), ptr::null_mut(), 0) }.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The payload exactly as the engine stores it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let to_utf8 = loader::fns().string_to_utf8_chars;
        let len = self.len();
        let mut bytes = vec![0u8; len];
        unsafe { to_utf8(self.sys(), bytes.as_mut_ptr().cast(), len as i64) };
        bytes
    }

    pub fn try_to_string(&self) -> Result<String, VariantError> {
        String::from_utf8(self.to_bytes()).map_err(|_| VariantError::InvalidUtf8)
    }
}

impl From<&str> for GString {
    fn from(text: &str) -> Self {
        let new = loader::fns().string_new_with_utf8_chars_and_len;
        unsafe { GString::new_with(|dst| new(dst, text.as_ptr().cast(), text.len() as i64)) }
    }
}

impl From<&String> for GString {
    fn from(text: &String) -> Self {
        GString::from(text.as_str())
    }
}

impl Default for GString {
    fn default() -> Self {
        let construct = loader::kind_fns(VariantKind::String).construct_default;
        unsafe { GString::new_with(|dst| construct(dst, ptr::null())) }
    }
}

impl Clone for GString {
    fn clone(&self) -> Self {
        unsafe { GString::new_with(|dst| copy_native(VariantKind::String, self.sys(), dst)) }
    }
}

impl Drop for GString {
    fn drop(&mut self) {
        unsafe { destroy_native(VariantKind::String, self.sys() as sys::TypePtr) };
    }
}

impl PartialEq for GString {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for GString {}

impl PartialEq<str> for GString {
    fn eq(&self, other: &str) -> bool {
        self.to_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for GString {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Display for GString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

impl fmt::Debug for GString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

/// Scene-tree path such as `"../Player/Sprite"`.
#[repr(transparent)]
pub struct NodePath {
    opaque: *mut std::ffi::c_void,
}

impl NodePath {
    pub fn to_bytes(&self) -> Vec<u8> {
        let to_utf8 = loader::fns().node_path_to_utf8_chars;
        let len = unsafe { to_utf8(self.sys(), ptr::null_mut(), 0) }.max(0) as usize;
        let mut bytes = vec![0u8; len];
        unsafe { to_utf8(self.sys(), bytes.as_mut_ptr().cast(), len as i64) };
        bytes
    }
}

impl From<&str> for NodePath {
    fn from(path: &str) -> Self {
        let new = loader::fns().node_path_new_with_utf8_chars_and_len;
        let mut slot = MaybeUninit::<NodePath>::uninit();
        unsafe {
            new(slot.as_mut_ptr().cast(), path.as_ptr().cast(), path.len() as i64);
            slot.assume_init()
        }
    }
}

impl Default for NodePath {
    fn default() -> Self {
        NodePath::from("")
    }
}

impl Clone for NodePath {
    fn clone(&self) -> Self {
        let mut slot = MaybeUninit::<NodePath>::uninit();
        unsafe {
            copy_native(VariantKind::NodePath, self.sys(), slot.as_mut_ptr().cast());
            slot.assume_init()
        }
    }
}

impl Drop for NodePath {
    fn drop(&mut self) {
        unsafe { destroy_native(VariantKind::NodePath, self.sys() as sys::TypePtr) };
    }
}

impl PartialEq for NodePath {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({:?})", self.to_string())
    }
}

/// Copy-constructs a native value of `kind` from `src` into `dst`.
///
/// # Safety
/// `src` must point at a live native value of `kind`; `dst` must be writable
/// for one.
pub(crate) unsafe fn copy_native(kind: VariantKind, src: sys::ConstTypePtr, dst: sys::UninitTypePtr) {
    let construct_copy = loader::kind_fns(kind).construct_copy;
    let args = [src];
    unsafe { construct_copy(dst, args.as_ptr()) };
}

/// Default-constructs a native value of `kind` into `dst`.
///
/// # Safety
/// `dst` must be writable for a native value of `kind`.
pub(crate) unsafe fn default_native(kind: VariantKind, dst: sys::UninitTypePtr) {
    let construct = loader::kind_fns(kind).construct_default;
    unsafe { construct(dst, ptr::null()) };
}

/// Runs the engine's destructor for a native value of `kind`, if it has one.
///
/// # Safety
/// `value` must point at a live native value of `kind`, not used afterwards.
pub(crate) unsafe fn destroy_native(kind: VariantKind, value: sys::TypePtr) {
    if let Some(destroy) = loader::try_binding().and_then(|_| loader::kind_fns(kind).destroy) {
        unsafe { destroy(value) };
    }
}

unsafe impl FfiType for GString {
    const KIND: VariantKind = VariantKind::String;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { GString::new_with(|dst| copy_native(VariantKind::String, ptr, dst)) }
    }

    fn default_value() -> Self {
        GString::default()
    }
}

unsafe impl FfiType for NodePath {
    const KIND: VariantKind = VariantKind::NodePath;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { (*ptr.cast::<NodePath>()).clone() }
    }

    fn default_value() -> Self {
        NodePath::default()
    }
}

unsafe impl FfiType for StringName {
    const KIND: VariantKind = VariantKind::StringName;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        unsafe { StringName::from_sys(*ptr.cast::<sys::StringNamePtr>()) }
    }

    fn default_value() -> Self {
        StringName::default()
    }
}

impl_native_codec!(GString, NodePath, StringName);

impl crate::variant::ToVariant for str {
    fn to_variant(&self) -> crate::variant::Variant {
        GString::from(self).to_variant()
    }
}

impl crate::variant::ToVariant for String {
    fn to_variant(&self) -> crate::variant::Variant {
        self.as_str().to_variant()
    }
}

impl crate::variant::FromVariant for String {
    fn try_from_variant(variant: &crate::variant::Variant) -> Result<Self, VariantError> {
        GString::try_from_variant(variant)?.try_to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{ToVariant, Variant};

    #[test]
    fn utf8_payload_is_kept_byte_for_byte() {
        crate::loader::test_support::init();
        let text = GString::from("αβγ");
        assert_eq!(text.len(), "αβγ".len());
        assert_eq!(text.to_bytes(), "αβγ".as_bytes());
        assert_eq!(text.clone(), text);
        assert_eq!(text, "αβγ");
    }

    #[test]
    fn strings_round_trip_through_variants() {
        crate::loader::test_support::init();
        let variant = "hello".to_variant();
        assert_eq!(variant.kind(), VariantKind::String);
        assert_eq!(variant.to::<String>().as_deref(), Ok("hello"));
        assert_eq!(variant.to::<GString>().map(|s| s.to_string()).as_deref(), Ok("hello"));
        assert!(variant.to::<StringName>().is_err());

        let name = StringName::new("ready");
        assert_eq!(Variant::from(&name).to::<StringName>(), Ok(name));

        let path = NodePath::from("../Player");
        assert_eq!(Variant::from(&path).to::<NodePath>(), Ok(path));
    }

    #[test]
    fn empty_string_is_default() {
        crate::loader::test_support::init();
        assert!(GString::new().is_empty());
        assert_eq!(GString::default(), GString::from(""));
    }
}
