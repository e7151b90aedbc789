//! Process-wide string name interner.
//!
//! Names are leaked on first use, so a [`StringNamePtr`] stays valid for the
//! rest of the process and two equal names always share one pointer, no
//! matter which thread interned them.

use std::sync::{Mutex, OnceLock, PoisonError};

use extbind_sys::StringNamePtr;
use rustc_hash::FxHashMap;

pub(crate) struct NameEntry {
    pub(crate) text: &'static str,
}

fn table() -> &'static Mutex<FxHashMap<&'static str, &'static NameEntry>> {
    static NAMES: OnceLock<Mutex<FxHashMap<&'static str, &'static NameEntry>>> = OnceLock::new();
    NAMES.get_or_init(|| Mutex::new(FxHashMap::default()))
}

/// Interns `text` and returns the shared entry.
pub fn intern(text: &str) -> StringNamePtr {
    let mut names = table().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(entry) = names.get(text) {
        return *entry as *const NameEntry as StringNamePtr;
    }
    let text: &'static str = Box::leak(text.to_owned().into_boxed_str());
    let entry: &'static NameEntry = Box::leak(Box::new(NameEntry { text }));
    names.insert(text, entry);
    entry as *const NameEntry as StringNamePtr
}

/// Text of an interned name; empty for null.
///
/// # Safety
/// `name` must be null or come from [`intern`].
pub unsafe fn text(name: StringNamePtr) -> &'static str {
    if name.is_null() {
        return "";
    }
    unsafe { (*(name as *const NameEntry)).text }
}

/// Interned text for `text`, for use as a map key.
pub(crate) fn static_str(text: &str) -> &'static str {
    unsafe { self::text(intern(text)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_names_share_a_pointer() {
        let a = intern("position");
        let b = intern(&String::from("position"));
        assert_eq!(a, b);
        assert_ne!(a, intern("rotation"));
        assert_eq!(unsafe { text(a) }, "position");
    }
}
