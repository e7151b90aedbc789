//! An in-process stand-in for the engine side of the extension ABI.
//!
//! The crate fills a complete [`ExtensionInterface`] with `extern "C"`
//! functions backed by a small class tree:
//!
//! ```text
//! Object ─┬─ RefCounted ─┬─ Resource        signal changed(String)
//!         │              └─ ValueBuffer     append/get/size/get_data/set_data
//!         ├─ Node ── Node2D ── Sprite2D     virtuals _ready/_process/_physics_process
//!         └─ Engine (singleton)
//! ```
//!
//! Object bookkeeping is per thread, so tests running in parallel never see
//! each other's objects. Names, method binds and instance ids are process
//! wide, matching a real engine closely enough for a plugin that caches them
//! once at load time.
//!
//! The free functions below are test hooks: they let a test play the engine's
//! part (construct an object, run a frame, emit a signal) and inspect what the
//! plugin did to it.

use std::mem::MaybeUninit;

use extbind_sys::*;

mod abi;
mod names;
mod object;
mod packed;
mod value;

pub use names::intern;
pub use object::{ERR_INVALID_PARAMETER, ERR_UNAVAILABLE};
pub use packed::PackedData;
pub use value::{CallableData, MockVariant, ObjRef, Pod, Value};

static INTERFACE: ExtensionInterface = ExtensionInterface {
    version: ABI_VERSION,
    functions: abi::FUNCTIONS,
};

static LIBRARY: u8 = 0;

/// The interface a plugin receives at load time.
pub fn interface() -> &'static ExtensionInterface {
    &INTERFACE
}

/// A copy of the full function table, for building altered interfaces.
pub fn functions() -> RawFunctionTable {
    abi::FUNCTIONS
}

/// Leaks an interface reporting `version` with the given table.
pub fn custom_interface(version: Version, functions: RawFunctionTable) -> &'static ExtensionInterface {
    Box::leak(Box::new(ExtensionInterface { version, functions }))
}

/// Opaque token identifying the plugin to the class database.
pub fn library() -> ClassLibraryPtr {
    &LIBRARY as *const u8 as ClassLibraryPtr
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

/// Constructs an instance of `class` the way the engine would.
///
/// Reference-counted objects come back holding one reference, owned by the
/// caller. Returns null for unknown, abstract or singleton classes.
pub fn construct(class: &str) -> ObjectPtr {
    object::construct(class)
}

/// Frees `object` regardless of its reference count.
///
/// # Safety
/// `object` must be a live object of this thread, or null.
pub unsafe fn destroy(object: ObjectPtr) {
    unsafe { object::destroy(object) }
}

/// Drops one engine-side reference to a reference-counted object.
///
/// # Safety
/// The caller must own the reference it gives up.
pub unsafe fn release(object: ObjectPtr) {
    unsafe { object::release(object) }
}

/// Runs the plugin's override of virtual `name`, if the object has one.
///
/// Returns `None` when the class does not override it.
///
/// # Safety
/// `object` must be a live object of this thread, or null.
pub unsafe fn call_virtual(object: ObjectPtr, name: &str, args: &[Value]) -> Option<Value> {
    unsafe { object::call_virtual(object, name, args) }
}

/// Dynamic call through the variant convention, as `Object.call` does it.
///
/// # Safety
/// `object` must be a live object of this thread, or null.
pub unsafe fn call(object: ObjectPtr, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
    unsafe { object::call_by_name(object, method, args) }
}

/// Calls `method` through the pointer convention.
///
/// # Safety
/// `object` must be a live object of this thread; `args` must match the
/// method's parameter types.
pub unsafe fn ptrcall(object: ObjectPtr, method: &str, args: &[Value]) -> Value {
    unsafe { object::ptrcall_by_name(object, method, args) }
}

/// Current reference count, 0 for dead or non-counted objects.
///
/// # Safety
/// `object` may be any pointer; only live objects are dereferenced.
pub unsafe fn refcount(object: ObjectPtr) -> i64 {
    unsafe { object::refcount(object) }
}

/// Instance id of a live object, 0 otherwise.
///
/// # Safety
/// `object` may be any pointer; only live objects are dereferenced.
pub unsafe fn instance_id(object: ObjectPtr) -> InstanceId {
    unsafe { object::live(object) }.map_or(0, |this| this.id)
}

/// Current class name of a live object.
///
/// # Safety
/// `object` may be any pointer; only live objects are dereferenced.
pub unsafe fn class_of(object: ObjectPtr) -> Option<&'static str> {
    unsafe { object::live(object) }.map(|this| this.class.get())
}

pub fn is_alive(id: InstanceId) -> bool {
    !object::object_from_id(id).is_null()
}

/// Number of objects alive on this thread.
pub fn live_objects() -> usize {
    object::live_objects()
}

/// Reads a property the way the inspector would.
///
/// # Safety
/// `object` must be a live object of this thread, or null.
pub unsafe fn get_property(object: ObjectPtr, name: &str) -> Option<Value> {
    unsafe { object::get_property(object, name) }
}

// ----------------------------------------------------------------------------
// Signals and frames
// ----------------------------------------------------------------------------

/// Emits `signal` from `object` and returns the engine error code.
///
/// # Safety
/// `object` must be a live object of this thread.
pub unsafe fn emit(object: ObjectPtr, signal: &str, args: &[Value]) -> i64 {
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(Value::name(signal));
    call_args.extend(args.iter().cloned());
    match unsafe { object::call_by_name(object, "emit_signal", call_args) } {
        Ok(Value::Int(code)) => code,
        Ok(_) | Err(_) => ERR_UNAVAILABLE,
    }
}

/// Number of callables connected to `signal` on `object`.
///
/// # Safety
/// `object` may be any pointer; only live objects are dereferenced.
pub unsafe fn connection_count(object: ObjectPtr, signal: &str) -> usize {
    unsafe { object::connection_count(object, signal) }
}

/// Advances the engine's frame counter.
pub fn advance_frames(count: i64) {
    object::advance_frames(count)
}

// ----------------------------------------------------------------------------
// Class database
// ----------------------------------------------------------------------------

pub fn is_class_registered(class: &str) -> bool {
    object::class_exists(class)
}

/// How many times the engine asked the plugin to resolve a virtual of `class`.
pub fn virtual_resolutions(class: &str) -> usize {
    object::virtual_resolutions(class)
}

// ----------------------------------------------------------------------------
// Diagnostics
// ----------------------------------------------------------------------------

/// Errors reported on this thread since the last call.
pub fn take_errors() -> Vec<String> {
    object::take_errors()
}

/// Warnings reported on this thread since the last call.
pub fn take_warnings() -> Vec<String> {
    object::take_warnings()
}

// ----------------------------------------------------------------------------
// Variants
// ----------------------------------------------------------------------------

/// Copies the value held by an engine variant.
///
/// # Safety
/// `variant` must point at a variant produced by this engine.
pub unsafe fn variant_value(variant: ConstVariantPtr) -> Value {
    unsafe { &*(variant as *const MockVariant) }.value()
}

/// UTF-8 bytes of a `String` variant, exactly as stored.
///
/// # Safety
/// `variant` must point at a variant produced by this engine.
pub unsafe fn variant_string_bytes(variant: ConstVariantPtr) -> Option<Vec<u8>> {
    match unsafe { variant_value(variant) } {
        Value::Str(text) => Some(text.as_bytes().to_vec()),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Plugin loading
// ----------------------------------------------------------------------------

/// A plugin whose entry point accepted the interface.
pub struct LoadedLibrary {
    init: Initialization,
}

impl LoadedLibrary {
    pub fn minimum_level(&self) -> InitializationLevel {
        self.init.minimum_initialization_level
    }

    pub fn initialize(&self, level: InitializationLevel) {
        if let Some(initialize) = self.init.initialize {
            unsafe { initialize(self.init.userdata, level) };
        }
    }

    pub fn deinitialize(&self, level: InitializationLevel) {
        if let Some(deinitialize) = self.init.deinitialize {
            unsafe { deinitialize(self.init.userdata, level) };
        }
    }

    /// Walks the levels upward from the plugin's minimum, as the engine does at startup.
    pub fn initialize_all(&self) {
        for level in self.minimum_level()..MAX_INITIALIZATION_LEVEL {
            self.initialize(level);
        }
    }

    /// Walks the levels back down, as the engine does at shutdown.
    pub fn deinitialize_all(&self) {
        for level in (self.minimum_level()..MAX_INITIALIZATION_LEVEL).rev() {
            self.deinitialize(level);
        }
    }
}

/// Calls a plugin entry point with `interface`.
///
/// Returns `None` when the entry point reports failure.
///
/// # Safety
/// `entry` must follow the initialization function contract.
pub unsafe fn run_entry(
    entry: InitializationFunction,
    interface: &'static ExtensionInterface,
) -> Option<LoadedLibrary> {
    let entry = entry?;
    let mut init = MaybeUninit::<Initialization>::zeroed();
    let accepted = unsafe { entry(interface, library(), init.as_mut_ptr()) };
    if !to_bool(accepted) {
        return None;
    }
    Some(LoadedLibrary {
        init: unsafe { init.assume_init() },
    })
}
