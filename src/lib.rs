//! Safe binding core over the engine's C extension ABI.
//!
//! The engine hands a plugin one [`sys::ExtensionInterface`] at load time.
//! [`initialize`] (or [`entry::entry_point`]) resolves it into a typed
//! function table, after which the rest of the crate works in Rust types:
//! engine objects behind [`handle`] types, values as [`Variant`]s, engine
//! methods through [`frame`], host classes through [`dispatch`] and signals
//! through [`signal`].

pub use extbind_sys as sys;

pub mod class;
pub mod classes;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod frame;
pub mod handle;
pub mod loader;
pub mod marshal;
pub mod signal;
pub mod signature;
pub mod string_name;
pub mod variant;

pub use config::{BindingConfig, ClassManifest, MethodManifest};
pub use error::{BindError, BindResult, CallError, InitError, VariantError};
pub use handle::{Borrowed, InstanceRef, Owned, ValueHandle};
pub use loader::{MethodBind, initialize};
pub use string_name::StringName;
pub use variant::{Variant, VariantKind};

pub mod prelude {
    pub use crate::class::{
        Class, DynamicMemory, EngineClass, HostBase, HostClass, Inherits, ManualMemory,
        RefCountedMemory,
    };
    pub use crate::classes::*;
    pub use crate::config::BindingConfig;
    pub use crate::dispatch::{ClassBuilder, register_class, unregister_class};
    pub use crate::entry::{ExtensionLibrary, InitLevel};
    pub use crate::error::{BindError, BindResult, CallError};
    pub use crate::handle::{Borrowed, InstanceRef, Owned, ValueHandle, singleton, singleton_by_name};
    pub use crate::signal::{ConnectFlags, Connection};
    pub use crate::string_name::StringName;
    pub use crate::variant::*;
}
