use std::fmt;
use std::ptr;

use extbind_sys as sys;

use crate::loader;

/// An interned identifier: method, property, signal and class names.
///
/// Names are immortal and interned by the engine, so two names compare equal
/// exactly when their pointers do.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringName(sys::StringNamePtr);

// The engine never frees a name once interned.
unsafe impl Send for StringName {}
unsafe impl Sync for StringName {}

impl StringName {
    pub fn new(text: &str) -> StringName {
        let intern = loader::fns().string_name_new_with_utf8_chars_and_len;
        StringName(unsafe { intern(text.as_ptr().cast(), text.len() as i64) })
    }

    /// # Safety
    /// `ptr` must be a name interned by the engine.
    pub unsafe fn from_sys(ptr: sys::StringNamePtr) -> StringName {
        StringName(ptr)
    }

    pub fn sys(self) -> sys::StringNamePtr {
        self.0
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let to_utf8 = loader::fns().string_name_to_utf8_chars;
        let len = unsafe { to_utf8(self.0, ptr::null_mut(), 0) }.max(0) as usize;
        let mut bytes = vec![0u8; len];
        unsafe { to_utf8(self.0, bytes.as_mut_ptr().cast(), len as i64) };
        bytes
    }
}

impl Default for StringName {
    fn default() -> Self {
        StringName::new("")
    }
}

impl From<&str> for StringName {
    fn from(text: &str) -> Self {
        StringName::new(text)
    }
}

impl fmt::Display for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

impl fmt::Debug for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{:?}", self.to_string())
    }
}

impl PartialEq<str> for StringName {
    fn eq(&self, other: &str) -> bool {
        self.to_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for StringName {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_text_interns_to_one_name() {
        crate::loader::test_support::init();
        let a = StringName::new("position");
        let b = StringName::from(String::from("position").as_str());
        assert_eq!(a, b);
        assert_eq!(a.sys(), b.sys());
        assert_ne!(a, StringName::new("rotation"));
        assert_eq!(a.to_string(), "position");
        assert_eq!(a, "position");
    }
}
