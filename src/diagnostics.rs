//! Host-side diagnostics.
//!
//! Everything goes through the `log` facade. Errors and warnings are also
//! forwarded to the engine's own diagnostics channel when the binding was
//! initialized with `forward_errors_to_engine`, so they show up in the
//! engine's output next to its own messages.

use std::ffi::CString;
use std::panic::Location;

use crate::loader;

/// Logs `message` as an error and forwards it to the engine.
#[track_caller]
pub fn report_error(message: &str) {
    log::error!("{message}");
    forward(Severity::Error, message, Location::caller());
}

/// Logs `message` as a warning and forwards it to the engine.
#[track_caller]
pub fn report_warning(message: &str) {
    log::warn!("{message}");
    forward(Severity::Warning, message, Location::caller());
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

enum Severity {
    Error,
    Warning,
}

fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', " ")).unwrap_or_default()
}

fn forward(severity: Severity, message: &str, location: &Location<'_>) {
    let Some(binding) = loader::try_binding() else {
        return;
    };
    if !binding.forward_errors {
        return;
    }
    let description = c_string(message);
    let function = c_string(module_path!());
    let file = c_string(location.file());
    let line = location.line() as i32;
    let print = match severity {
        Severity::Error => binding.fns.print_error,
        Severity::Warning => binding.fns.print_warning,
    };
    unsafe {
        print(
            description.as_ptr(),
            function.as_ptr(),
            file.as_ptr(),
            line,
            extbind_sys::FALSE,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_nuls_do_not_drop_the_message() {
        assert_eq!(c_string("a\0b").to_str(), Ok("a b"));
    }

    #[test]
    fn panic_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
