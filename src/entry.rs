//! Plugin entry point and initialization levels.
//!
//! The engine calls the plugin's entry symbol once, then walks the
//! initialization levels upward at startup and back down at shutdown. A
//! plugin describes itself with an [`ExtensionLibrary`] and exports the
//! symbol with [`extension_entry!`](crate::extension_entry):
//!
//! ```ignore
//! struct Plugin;
//!
//! impl ExtensionLibrary for Plugin {
//!     fn on_level_init(level: InitLevel) -> BindResult<()> {
//!         if level == InitLevel::Scene {
//!             register_class::<Mover>()?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! extbind::extension_entry!(plugin_init, Plugin);
//! ```
//!
//! Classes registered while a level initializes are unregistered
//! automatically when that level is torn down.

use std::cell::Cell;
use std::ffi::c_void;
use std::ptr;

use extbind_sys as sys;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::config::BindingConfig;
use crate::diagnostics::{report_error, report_warning};
use crate::dispatch::{self, catch_host};
use crate::error::{BindResult, InitError};
use crate::loader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum InitLevel {
    Core = sys::INITIALIZATION_CORE,
    Servers = sys::INITIALIZATION_SERVERS,
    Scene = sys::INITIALIZATION_SCENE,
    Editor = sys::INITIALIZATION_EDITOR,
}

thread_local! {
    static CURRENT_LEVEL: Cell<InitLevel> = const { Cell::new(InitLevel::Scene) };
}

/// Level being initialized or torn down; `Scene` outside of level callbacks.
pub fn current_level() -> InitLevel {
    CURRENT_LEVEL.get()
}

fn set_current_level(level: InitLevel) {
    CURRENT_LEVEL.set(level);
}

/// What a plugin tells the engine about itself.
pub trait ExtensionLibrary: 'static {
    fn config() -> BindingConfig {
        BindingConfig::default()
    }

    /// Lowest level the plugin wants to hear about.
    fn min_level() -> InitLevel {
        InitLevel::Scene
    }

    fn on_level_init(_level: InitLevel) -> BindResult<()> {
        Ok(())
    }

    /// Runs before the level's classes are unregistered.
    fn on_level_deinit(_level: InitLevel) {}
}

fn level_from_sys(level: sys::InitializationLevel) -> Option<InitLevel> {
    match InitLevel::try_from(level) {
        Ok(level) => Some(level),
        Err(_) => {
            report_warning(&format!("engine passed unknown initialization level {level}"));
            None
        }
    }
}

unsafe extern "C" fn initialize_level<L: ExtensionLibrary>(
    _userdata: *mut c_void,
    level: sys::InitializationLevel,
) {
    let Some(level) = level_from_sys(level) else {
        return;
    };
    set_current_level(level);
    log::debug!("initializing level {level:?}");
    match catch_host(|| L::on_level_init(level)) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => report_error(&format!("initializing {level:?} failed: {error}")),
        Err(message) => report_error(&format!("initializing {level:?} panicked: {message}")),
    }
}

unsafe extern "C" fn deinitialize_level<L: ExtensionLibrary>(
    _userdata: *mut c_void,
    level: sys::InitializationLevel,
) {
    let Some(level) = level_from_sys(level) else {
        return;
    };
    set_current_level(level);
    if let Err(message) = catch_host(|| L::on_level_deinit(level)) {
        report_error(&format!("deinitializing {level:?} panicked: {message}"));
    }
    let removed = dispatch::unregister_level(level);
    log::debug!("deinitialized level {level:?}, {removed} classes unregistered");
}

/// Entry point for the plugin described by `L`.
///
/// Loads the binding and fills `r_initialization` with the level callbacks.
/// Returns false, leaving the plugin unloaded, when the engine's interface
/// is unusable. A second call reuses the binding loaded by the first.
///
/// # Safety
/// Must be called by the engine per the initialization function contract:
/// `interface` outlives the process and `r_initialization` is writable.
pub unsafe extern "C" fn entry_point<L: ExtensionLibrary>(
    interface: *const sys::ExtensionInterface,
    library: sys::ClassLibraryPtr,
    r_initialization: *mut sys::Initialization,
) -> sys::Bool {
    if r_initialization.is_null() {
        log::error!("engine passed no initialization record");
        return sys::FALSE;
    }
    let config = L::config();
    let loaded = catch_host(|| unsafe { loader::initialize(interface, library, &config) });
    match loaded {
        Ok(Ok(())) | Ok(Err(InitError::AlreadyInitialized)) => {}
        Ok(Err(error)) => {
            log::error!("extension binding failed to load: {error}");
            return sys::FALSE;
        }
        Err(message) => {
            log::error!("extension binding panicked while loading: {message}");
            return sys::FALSE;
        }
    }
    let initialization = sys::Initialization {
        minimum_initialization_level: L::min_level().into(),
        userdata: ptr::null_mut(),
        initialize: Some(initialize_level::<L>),
        deinitialize: Some(deinitialize_level::<L>),
    };
    unsafe { r_initialization.write(initialization) };
    sys::TRUE
}

/// Exports the engine entry symbol `$symbol` for the library type `$library`.
#[macro_export]
macro_rules! extension_entry {
    ($symbol:ident, $library:ty) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $symbol(
            interface: *const $crate::sys::ExtensionInterface,
            library: $crate::sys::ClassLibraryPtr,
            r_initialization: *mut $crate::sys::Initialization,
        ) -> $crate::sys::Bool {
            unsafe { $crate::entry::entry_point::<$library>(interface, library, r_initialization) }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_engine_values() {
        assert_eq!(u32::from(InitLevel::Core), sys::INITIALIZATION_CORE);
        assert_eq!(InitLevel::try_from(sys::INITIALIZATION_EDITOR).ok(), Some(InitLevel::Editor));
        assert!(InitLevel::try_from(sys::MAX_INITIALIZATION_LEVEL).is_err());
        assert!(InitLevel::Servers < InitLevel::Scene);
    }

    #[test]
    fn current_level_defaults_to_scene() {
        assert_eq!(current_level(), InitLevel::Scene);
    }
}
