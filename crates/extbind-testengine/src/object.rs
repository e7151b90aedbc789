//! Objects, the class tree and method dispatch.
//!
//! Object state lives behind raw pointers handed out to the plugin, so the
//! per-thread [`EngineState`] only indexes them. Borrows of that state are
//! never held while control passes into plugin code.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use extbind_sys::*;
use rustc_hash::FxHashMap;

use crate::names;
use crate::packed::PackedData;
use crate::value::{CallableData, MockVariant, Pod, Value, read_native, take_native, write_native};

/// `Error` code returned for a bad parameter.
pub const ERR_INVALID_PARAMETER: i64 = 31;
/// `Error` code returned when a signal does not exist.
pub const ERR_UNAVAILABLE: i64 = 2;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// ----------------------------------------------------------------------------
// Class tree
// ----------------------------------------------------------------------------

pub(crate) struct VirtualSpec {
    pub(crate) name: &'static str,
    pub(crate) params: &'static [VariantType],
    pub(crate) ret: Option<VariantType>,
}

pub(crate) struct ClassSpec {
    pub(crate) name: &'static str,
    pub(crate) parent: Option<&'static str>,
    pub(crate) singleton: bool,
    pub(crate) signals: &'static [&'static str],
    pub(crate) virtuals: &'static [VirtualSpec],
}

static CLASSES: &[ClassSpec] = &[
    ClassSpec {
        name: "Object",
        parent: None,
        singleton: false,
        signals: &[],
        virtuals: &[VirtualSpec {
            name: "_to_string",
            params: &[],
            ret: Some(VARIANT_TYPE_STRING),
        }],
    },
    ClassSpec {
        name: "RefCounted",
        parent: Some("Object"),
        singleton: false,
        signals: &[],
        virtuals: &[],
    },
    ClassSpec {
        name: "Resource",
        parent: Some("RefCounted"),
        singleton: false,
        signals: &["changed"],
        virtuals: &[],
    },
    ClassSpec {
        name: "Node",
        parent: Some("Object"),
        singleton: false,
        signals: &["ready"],
        virtuals: &[
            VirtualSpec {
                name: "_ready",
                params: &[],
                ret: None,
            },
            VirtualSpec {
                name: "_process",
                params: &[VARIANT_TYPE_FLOAT],
                ret: None,
            },
            VirtualSpec {
                name: "_physics_process",
                params: &[VARIANT_TYPE_FLOAT],
                ret: None,
            },
        ],
    },
    ClassSpec {
        name: "Node2D",
        parent: Some("Node"),
        singleton: false,
        signals: &[],
        virtuals: &[],
    },
    ClassSpec {
        name: "Sprite2D",
        parent: Some("Node2D"),
        singleton: false,
        signals: &[],
        virtuals: &[],
    },
    ClassSpec {
        name: "Engine",
        parent: Some("Object"),
        singleton: true,
        signals: &[],
        virtuals: &[],
    },
    ClassSpec {
        name: "ValueBuffer",
        parent: Some("RefCounted"),
        singleton: false,
        signals: &[],
        virtuals: &[],
    },
];

fn builtin(name: &str) -> Option<&'static ClassSpec> {
    CLASSES.iter().find(|class| class.name == name)
}

/// A class registered by the plugin.
pub(crate) struct ExtClass {
    pub(crate) name: &'static str,
    pub(crate) parent: &'static str,
    pub(crate) info: ClassCreationInfo,
    methods: RefCell<FxHashMap<&'static str, Rc<ExtMethod>>>,
    signals: RefCell<Vec<(&'static str, Vec<VariantType>)>>,
    virtual_cache: RefCell<FxHashMap<&'static str, *mut c_void>>,
    pub(crate) resolutions: Cell<usize>,
}

impl ExtClass {
    /// Call data for virtual `name`, asking the plugin's resolver once.
    unsafe fn resolve(&self, name: &'static str) -> *mut c_void {
        if let Some(data) = self.virtual_cache.borrow().get(name) {
            return *data;
        }
        let data = match self.info.get_virtual_call_data_func {
            Some(resolver) => unsafe { resolver(self.info.class_userdata, names::intern(name)) },
            None => ptr::null_mut(),
        };
        self.resolutions.set(self.resolutions.get() + 1);
        self.virtual_cache.borrow_mut().insert(name, data);
        data
    }
}

pub(crate) struct ExtMethod {
    pub(crate) name: &'static str,
    pub(crate) info: ClassMethodInfo,
    pub(crate) params: Vec<VariantType>,
    pub(crate) ret: Option<VariantType>,
}

fn parent_of(class: &str) -> Option<&'static str> {
    if let Some(spec) = builtin(class) {
        return spec.parent;
    }
    ext_class(class).map(|ext| ext.parent)
}

/// Walks `class` and its ancestors, root last.
fn ancestry(class: &str) -> impl Iterator<Item = &'static str> {
    let first = if builtin(class).is_some() || ext_class(class).is_some() {
        Some(names::static_str(class))
    } else {
        None
    };
    std::iter::successors(first, |class| parent_of(class))
}

pub(crate) fn class_exists(class: &str) -> bool {
    builtin(class).is_some() || ext_class(class).is_some()
}

pub(crate) fn is_subclass(class: &str, ancestor: &str) -> bool {
    ancestry(class).any(|c| c == ancestor)
}

fn find_virtual(class: &str, name: &str) -> Option<&'static VirtualSpec> {
    ancestry(class)
        .filter_map(builtin)
        .flat_map(|spec| spec.virtuals.iter())
        .find(|v| v.name == name)
}

fn has_signal(class: &str, signal: &str) -> bool {
    ancestry(class).any(|c| {
        if let Some(spec) = builtin(c) {
            return spec.signals.iter().any(|name| *name == signal);
        }
        ext_class(c).is_some_and(|ext| {
            let declared = ext.signals.borrow().iter().any(|(name, _)| *name == signal);
            declared
        })
    })
}

// ----------------------------------------------------------------------------
// Per-thread engine state
// ----------------------------------------------------------------------------

#[derive(Default)]
struct EngineState {
    live: FxHashMap<usize, u64>,
    by_id: FxHashMap<u64, usize>,
    ext_classes: FxHashMap<&'static str, Rc<ExtClass>>,
    ext_binds: FxHashMap<usize, Rc<ExtMethod>>,
    singletons: FxHashMap<&'static str, usize>,
    errors: Vec<String>,
    warnings: Vec<String>,
    frames: i64,
}

thread_local! {
    static STATE: RefCell<EngineState> = RefCell::new(EngineState::default());
}

fn with_state<R>(f: impl FnOnce(&mut EngineState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

pub(crate) fn record_error(message: String) {
    log::debug!("engine error: {message}");
    with_state(|s| s.errors.push(message));
}

pub(crate) fn record_warning(message: String) {
    log::debug!("engine warning: {message}");
    with_state(|s| s.warnings.push(message));
}

pub(crate) fn take_errors() -> Vec<String> {
    with_state(|s| std::mem::take(&mut s.errors))
}

pub(crate) fn take_warnings() -> Vec<String> {
    with_state(|s| std::mem::take(&mut s.warnings))
}

pub(crate) fn advance_frames(count: i64) {
    with_state(|s| s.frames += count);
}

pub(crate) fn ext_class(name: &str) -> Option<Rc<ExtClass>> {
    with_state(|s| s.ext_classes.get(name).cloned())
}

fn ext_bind(bind: MethodBindPtr) -> Option<Rc<ExtMethod>> {
    with_state(|s| s.ext_binds.get(&(bind as usize)).cloned())
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct ObjectState {
    name: String,
    position: Pod,
    buffer: Vec<f64>,
    properties: Vec<(StringNamePtr, Value)>,
    connections: Vec<(StringNamePtr, Value)>,
}

pub(crate) struct MockObject {
    pub(crate) id: u64,
    pub(crate) class: Cell<&'static str>,
    refcounted: bool,
    refcount: Cell<i64>,
    pub(crate) instance: Cell<ClassInstancePtr>,
    state: RefCell<ObjectState>,
}

impl MockObject {
    fn ptr(&self) -> ObjectPtr {
        self as *const MockObject as ObjectPtr
    }
}

/// The object behind `object`, if it is still alive on this thread.
///
/// # Safety
/// The returned reference must not outlive the object.
pub(crate) unsafe fn live<'a>(object: ObjectPtr) -> Option<&'a MockObject> {
    if object.is_null() || !with_state(|s| s.live.contains_key(&(object as usize))) {
        return None;
    }
    Some(unsafe { &*(object as *const MockObject) })
}

pub(crate) fn object_from_id(id: u64) -> ObjectPtr {
    with_state(|s| s.by_id.get(&id).map_or(ptr::null_mut(), |p| *p as ObjectPtr))
}

pub(crate) fn live_objects() -> usize {
    with_state(|s| s.live.len())
}

fn allocate(class: &'static str) -> ObjectPtr {
    let refcounted = is_subclass(class, "RefCounted");
    let object = Box::new(MockObject {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        class: Cell::new(class),
        refcounted,
        refcount: Cell::new(if refcounted { 1 } else { 0 }),
        instance: Cell::new(ptr::null_mut()),
        state: RefCell::new(ObjectState::default()),
    });
    let id = object.id;
    let ptr = Box::into_raw(object) as ObjectPtr;
    with_state(|s| {
        s.live.insert(ptr as usize, id);
        s.by_id.insert(id, ptr as usize);
    });
    ptr
}

/// Creates an instance of `class`. Reference-counted objects start with one
/// reference owned by the caller.
pub(crate) fn construct(class: &str) -> ObjectPtr {
    if let Some(spec) = builtin(class) {
        if spec.singleton {
            record_error(format!("class '{class}' is a singleton and cannot be instantiated"));
            return ptr::null_mut();
        }
        return allocate(spec.name);
    }
    let Some(ext) = ext_class(class) else {
        record_error(format!("cannot construct unknown class '{class}'"));
        return ptr::null_mut();
    };
    if to_bool(ext.info.is_abstract) || to_bool(ext.info.is_virtual) {
        record_error(format!("class '{class}' is abstract"));
        return ptr::null_mut();
    }
    match ext.info.create_instance_func {
        Some(create) => unsafe { create(ext.info.class_userdata) },
        None => ptr::null_mut(),
    }
}

/// Frees `object`, running the plugin's instance destructor first.
///
/// # Safety
/// `object` must be null or an object pointer handed out by this engine.
pub(crate) unsafe fn destroy(object: ObjectPtr) {
    let Some(this) = (unsafe { live(object) }) else {
        record_error("object_destroy called on a dead object".to_owned());
        return;
    };
    let instance = this.instance.replace(ptr::null_mut());
    if !instance.is_null() {
        match ext_class(this.class.get()).and_then(|ext| ext.info.free_instance_func.map(|f| (ext, f))) {
            Some((ext, free)) => unsafe { free(ext.info.class_userdata, instance) },
            None => record_error(format!("no destructor for instance of '{}'", this.class.get())),
        }
    }
    let id = this.id;
    with_state(|s| {
        s.live.remove(&(object as usize));
        s.by_id.remove(&id);
        s.singletons.retain(|_, p| *p != object as usize);
    });
    drop(unsafe { Box::from_raw(object as *mut MockObject) });
}

pub(crate) unsafe fn add_ref(object: ObjectPtr) {
    if let Some(this) = unsafe { live(object) } {
        if this.refcounted {
            this.refcount.set(this.refcount.get() + 1);
        }
    }
}

pub(crate) unsafe fn release(object: ObjectPtr) {
    if let Some(this) = unsafe { live(object) } {
        if this.refcounted {
            let count = this.refcount.get() - 1;
            this.refcount.set(count);
            if count <= 0 {
                unsafe { destroy(object) };
            }
        }
    }
}

pub(crate) unsafe fn refcount(object: ObjectPtr) -> i64 {
    unsafe { live(object) }.map_or(0, |this| this.refcount.get())
}

pub(crate) unsafe fn describe(object: ObjectPtr) -> String {
    match unsafe { live(object) } {
        Some(this) => format!("<{}#{}>", this.class.get(), this.id),
        None if object.is_null() => "<null>".to_owned(),
        None => "<Freed Object>".to_owned(),
    }
}

pub(crate) fn singleton(name: &str) -> ObjectPtr {
    let Some(spec) = builtin(name).filter(|spec| spec.singleton) else {
        return ptr::null_mut();
    };
    if let Some(existing) = with_state(|s| s.singletons.get(spec.name).copied()) {
        return existing as ObjectPtr;
    }
    let object = allocate(spec.name);
    with_state(|s| s.singletons.insert(spec.name, object as usize));
    object
}

pub(crate) unsafe fn set_instance(object: ObjectPtr, class: &str, instance: ClassInstancePtr) {
    if let Some(this) = unsafe { live(object) } {
        this.class.set(names::static_str(class));
        this.instance.set(instance);
    }
}

pub(crate) unsafe fn get_property(object: ObjectPtr, name: &str) -> Option<Value> {
    let this = unsafe { live(object) }?;
    let class = this.class.get();
    let state = this.state.borrow();
    match name {
        "name" if is_subclass(class, "Node") => Some(Value::name(&state.name)),
        "position" if is_subclass(class, "Node2D") => {
            Some(Value::Pod(VARIANT_TYPE_VECTOR2, state.position))
        }
        _ => {
            let key = names::intern(name);
            state.properties.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
        }
    }
}

pub(crate) unsafe fn set_property(object: ObjectPtr, name: &str, value: Value) -> bool {
    let Some(this) = (unsafe { live(object) }) else {
        return false;
    };
    let class = this.class.get();
    let mut state = this.state.borrow_mut();
    match (name, value) {
        ("name", value) if is_subclass(class, "Node") => match value.as_str() {
            Some(text) => {
                state.name = text.to_owned();
                true
            }
            None => false,
        },
        ("position", Value::Pod(VARIANT_TYPE_VECTOR2, pod)) if is_subclass(class, "Node2D") => {
            state.position = pod;
            true
        }
        ("position", _) if is_subclass(class, "Node2D") => false,
        (name, value) => {
            let key = names::intern(name);
            match state.properties.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => state.properties.push((key, value)),
            }
            true
        }
    }
}

pub(crate) unsafe fn connection_count(object: ObjectPtr, signal: &str) -> usize {
    let key = names::intern(signal);
    unsafe { live(object) }.map_or(0, |this| {
        this.state.borrow().connections.iter().filter(|(s, _)| *s == key).count()
    })
}

// ----------------------------------------------------------------------------
// Extension classes
// ----------------------------------------------------------------------------

pub(crate) fn register_class(name: &str, parent: &str, info: ClassCreationInfo) -> bool {
    if class_exists(name) {
        record_error(format!("class '{name}' is already registered"));
        return false;
    }
    if !class_exists(parent) {
        record_error(format!("parent class '{parent}' of '{name}' does not exist"));
        return false;
    }
    let name = names::static_str(name);
    let class = Rc::new(ExtClass {
        name,
        parent: names::static_str(parent),
        info,
        methods: RefCell::new(FxHashMap::default()),
        signals: RefCell::new(Vec::new()),
        virtual_cache: RefCell::new(FxHashMap::default()),
        resolutions: Cell::new(0),
    });
    with_state(|s| s.ext_classes.insert(name, class));
    true
}

pub(crate) unsafe fn register_method(class: &str, info: &ClassMethodInfo) -> bool {
    let Some(ext) = ext_class(class) else {
        return false;
    };
    let name = unsafe { names::text(info.name) };
    let params = (0..info.argument_count as usize)
        .map(|i| unsafe { (*info.arguments_info.add(i)).type_ })
        .collect();
    let ret = to_bool(info.has_return_value).then_some(info.return_value_info.type_);
    let method = Rc::new(ExtMethod {
        name,
        info: *info,
        params,
        ret,
    });
    if ext.methods.borrow().contains_key(name) {
        record_error(format!("method '{}::{name}' is already registered", ext.name));
        return false;
    }
    let bind = Rc::as_ptr(&method) as usize;
    ext.methods.borrow_mut().insert(name, method.clone());
    with_state(|s| s.ext_binds.insert(bind, method));
    true
}

pub(crate) fn register_signal(class: &str, signal: &str, params: Vec<VariantType>) -> bool {
    let Some(ext) = ext_class(class) else {
        return false;
    };
    if has_signal(class, signal) {
        return false;
    }
    ext.signals.borrow_mut().push((names::static_str(signal), params));
    true
}

pub(crate) fn unregister_class(class: &str) -> bool {
    let Some(ext) = with_state(|s| s.ext_classes.remove(class)) else {
        return false;
    };
    let binds: Vec<usize> = ext
        .methods
        .borrow()
        .values()
        .map(|m| Rc::as_ptr(m) as usize)
        .collect();
    with_state(|s| {
        for bind in binds {
            s.ext_binds.remove(&bind);
        }
    });
    true
}

// ----------------------------------------------------------------------------
// Method table
// ----------------------------------------------------------------------------

type MethodFn = fn(&MockObject, &[Value]) -> Result<Value, CallError>;

pub(crate) struct MethodSpec {
    class: &'static str,
    name: &'static str,
    params: &'static [VariantType],
    /// `Some(NIL)` marks a method returning any variant.
    ret: Option<VariantType>,
    vararg: bool,
    func: MethodFn,
}

macro_rules! method {
    ($class:literal, $name:literal, [$($param:expr),*], $ret:expr, $func:expr) => {
        method!($class, $name, [$($param),*], $ret, $func, false)
    };
    ($class:literal, $name:literal, [$($param:expr),*], $ret:expr, $func:expr, $vararg:expr) => {
        MethodSpec {
            class: $class,
            name: $name,
            params: &[$($param),*],
            ret: $ret,
            vararg: $vararg,
            func: $func,
        }
    };
}

static METHODS: &[MethodSpec] = &[
    method!("Object", "get_class", [], Some(VARIANT_TYPE_STRING), object_get_class),
    method!("Object", "is_class", [VARIANT_TYPE_STRING], Some(VARIANT_TYPE_BOOL), object_is_class),
    method!("Object", "get_instance_id", [], Some(VARIANT_TYPE_INT), object_get_instance_id),
    method!("Object", "call", [VARIANT_TYPE_STRING_NAME], Some(VARIANT_TYPE_NIL), object_call, true),
    method!(
        "Object",
        "connect",
        [VARIANT_TYPE_STRING_NAME, VARIANT_TYPE_CALLABLE, VARIANT_TYPE_INT],
        Some(VARIANT_TYPE_INT),
        object_connect
    ),
    method!(
        "Object",
        "disconnect",
        [VARIANT_TYPE_STRING_NAME, VARIANT_TYPE_CALLABLE],
        None,
        object_disconnect
    ),
    method!(
        "Object",
        "is_connected",
        [VARIANT_TYPE_STRING_NAME, VARIANT_TYPE_CALLABLE],
        Some(VARIANT_TYPE_BOOL),
        object_is_connected
    ),
    method!("Object", "emit_signal", [VARIANT_TYPE_STRING_NAME], Some(VARIANT_TYPE_INT), object_emit_signal, true),
    method!("Object", "to_string", [], Some(VARIANT_TYPE_STRING), object_to_string),
    method!("RefCounted", "reference", [], Some(VARIANT_TYPE_BOOL), refcounted_reference),
    method!("RefCounted", "unreference", [], Some(VARIANT_TYPE_BOOL), refcounted_unreference),
    method!("RefCounted", "get_reference_count", [], Some(VARIANT_TYPE_INT), refcounted_get_reference_count),
    method!("Node", "set_name", [VARIANT_TYPE_STRING], None, node_set_name),
    method!("Node", "get_name", [], Some(VARIANT_TYPE_STRING_NAME), node_get_name),
    method!("Node2D", "set_position", [VARIANT_TYPE_VECTOR2], None, node2d_set_position),
    method!("Node2D", "get_position", [], Some(VARIANT_TYPE_VECTOR2), node2d_get_position),
    method!("Engine", "get_version_string", [], Some(VARIANT_TYPE_STRING), engine_get_version_string),
    method!("Engine", "get_frames_drawn", [], Some(VARIANT_TYPE_INT), engine_get_frames_drawn),
    method!("ValueBuffer", "append", [VARIANT_TYPE_FLOAT], None, value_buffer_append),
    method!("ValueBuffer", "get", [VARIANT_TYPE_INT], Some(VARIANT_TYPE_FLOAT), value_buffer_get),
    method!("ValueBuffer", "size", [], Some(VARIANT_TYPE_INT), value_buffer_size),
    method!(
        "ValueBuffer",
        "get_data",
        [],
        Some(VARIANT_TYPE_PACKED_FLOAT64_ARRAY),
        value_buffer_get_data
    ),
    method!(
        "ValueBuffer",
        "set_data",
        [VARIANT_TYPE_PACKED_FLOAT64_ARRAY],
        None,
        value_buffer_set_data
    ),
];

fn call_error(error: CallErrorType, argument: i32, expected: i32) -> CallError {
    CallError {
        error,
        argument,
        expected,
    }
}

fn find_builtin_method(class: &str, name: &str) -> Option<&'static MethodSpec> {
    ancestry(class).find_map(|c| METHODS.iter().find(|m| m.class == c && m.name == name))
}

fn find_ext_method(class: &str, name: &str) -> Option<Rc<ExtMethod>> {
    ancestry(class)
        .filter_map(ext_class)
        .find_map(|ext| {
            let method = ext.methods.borrow().get(name).cloned();
            method
        })
}

pub(crate) fn method_bind(class: &str, method: &str, hash: Option<i64>) -> MethodBindPtr {
    if let Some(ext) = find_ext_method(class, method) {
        let expected = method_hash(ext.name, &ext.params, ext.ret, false);
        if hash.is_some_and(|hash| hash != expected) {
            record_error(format!("hash mismatch for '{class}::{method}'"));
            return ptr::null();
        }
        return Rc::as_ptr(&ext) as MethodBindPtr;
    }
    match find_builtin_method(class, method) {
        Some(spec) => {
            let expected = method_hash(spec.name, spec.params, spec.ret, spec.vararg);
            if hash.is_some_and(|hash| hash != expected) {
                record_error(format!("hash mismatch for '{class}::{method}'"));
                return ptr::null();
            }
            spec as *const MethodSpec as MethodBindPtr
        }
        None => ptr::null(),
    }
}

/// Checks argument count and types, then runs a built-in method.
fn invoke_spec(spec: &MethodSpec, this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let expected = spec.params.len();
    if args.len() < expected {
        return Err(call_error(CALL_ERROR_TOO_FEW_ARGUMENTS, 0, expected as i32));
    }
    if args.len() > expected && !spec.vararg {
        return Err(call_error(CALL_ERROR_TOO_MANY_ARGUMENTS, 0, expected as i32));
    }
    for (i, (param, arg)) in spec.params.iter().zip(args).enumerate() {
        let actual = arg.variant_type();
        let accepted = *param == actual
            || *param == VARIANT_TYPE_NIL
            || *param == VARIANT_TYPE_OBJECT && actual == VARIANT_TYPE_NIL;
        if !accepted {
            return Err(call_error(CALL_ERROR_INVALID_ARGUMENT, i as i32, *param as i32));
        }
    }
    (spec.func)(this, args)
}

unsafe fn ext_varcall(method: &ExtMethod, this: &MockObject, args: Vec<Value>) -> Result<Value, CallError> {
    let Some(call) = method.info.call_func else {
        return Err(call_error(CALL_ERROR_INVALID_METHOD, 0, 0));
    };
    let variants: Vec<MockVariant> = args.into_iter().map(MockVariant::new).collect();
    let args: Vec<ConstVariantPtr> = variants
        .iter()
        .map(|v| v as *const MockVariant as ConstVariantPtr)
        .collect();
    let mut ret = MockVariant::nil();
    let mut error = CallError::default();
    unsafe {
        call(
            method.info.method_userdata,
            this.instance.get(),
            args.as_ptr(),
            args.len() as i64,
            &mut ret as *mut MockVariant as UninitVariantPtr,
            &mut error,
        )
    };
    if error.error != CALL_OK {
        return Err(error);
    }
    Ok(ret.value())
}

/// Native copies of argument values, released when dropped.
struct NativeArgs {
    types: Vec<VariantType>,
    slots: Vec<Pod>,
    ptrs: Vec<ConstTypePtr>,
}

impl NativeArgs {
    unsafe fn new(types: &[VariantType], values: &[Value]) -> NativeArgs {
        let mut slots = vec![Pod::ZERO; types.len()];
        for ((ty, value), slot) in types.iter().zip(values).zip(slots.iter_mut()) {
            unsafe { write_native(*ty, value.clone(), slot.0.as_mut_ptr().cast()) };
        }
        let ptrs = slots.iter().map(|slot| slot.0.as_ptr() as ConstTypePtr).collect();
        NativeArgs {
            types: types.to_vec(),
            slots,
            ptrs,
        }
    }
}

impl Drop for NativeArgs {
    fn drop(&mut self) {
        for (ty, slot) in self.types.iter().zip(self.slots.iter_mut()) {
            drop(unsafe { take_native(*ty, slot.0.as_mut_ptr().cast()) });
        }
    }
}

/// `object_method_bind_call`: variant arguments, status in `CallError`.
pub(crate) unsafe fn bind_call(bind: MethodBindPtr, object: ObjectPtr, args: Vec<Value>) -> Result<Value, CallError> {
    let Some(this) = (unsafe { live(object) }) else {
        return Err(call_error(CALL_ERROR_INSTANCE_IS_NULL, 0, 0));
    };
    if let Some(ext) = ext_bind(bind) {
        return unsafe { ext_varcall(&ext, this, args) };
    }
    let spec = unsafe { &*(bind as *const MethodSpec) };
    invoke_spec(spec, this, &args)
}

/// `object_method_bind_ptrcall`: native arguments, no status.
pub(crate) unsafe fn bind_ptrcall(bind: MethodBindPtr, object: ObjectPtr, args: *const ConstTypePtr, ret: TypePtr) {
    let Some(this) = (unsafe { live(object) }) else {
        record_error("ptrcall on a dead object".to_owned());
        return;
    };
    if let Some(ext) = ext_bind(bind) {
        match ext.info.ptrcall_func {
            Some(ptrcall) => unsafe { ptrcall(ext.info.method_userdata, this.instance.get(), args, ret) },
            None => record_error(format!("method '{}' has no ptrcall", ext.name)),
        }
        return;
    }
    let spec = unsafe { &*(bind as *const MethodSpec) };
    if spec.vararg {
        record_error(format!("vararg method '{}' cannot be ptrcalled", spec.name));
        return;
    }
    let values: Vec<Value> = spec
        .params
        .iter()
        .enumerate()
        .map(|(i, ty)| unsafe { read_native(*ty, *args.add(i)) })
        .collect();
    match (spec.func)(this, &values) {
        Ok(value) => {
            if let Some(ty) = spec.ret.filter(|ty| *ty != VARIANT_TYPE_NIL) {
                unsafe { write_native(ty, value, ret) };
            }
        }
        Err(error) => record_error(format!("ptrcall of '{}' failed: {error:?}", spec.name)),
    }
}

/// Test-side pointer call with native argument marshalling.
pub(crate) unsafe fn ptrcall_by_name(object: ObjectPtr, method: &str, args: &[Value]) -> Value {
    let Some(this) = (unsafe { live(object) }) else {
        return Value::Nil;
    };
    let class = this.class.get();
    let bind = method_bind(class, method, None);
    if bind.is_null() {
        record_error(format!("no method '{class}::{method}'"));
        return Value::Nil;
    }
    let (params, ret) = match ext_bind(bind) {
        Some(ext) => (ext.params.clone(), ext.ret),
        None => {
            let spec = unsafe { &*(bind as *const MethodSpec) };
            (spec.params.to_vec(), spec.ret)
        }
    };
    let native = unsafe { NativeArgs::new(&params, args) };
    let mut slot = Pod::ZERO;
    unsafe { bind_ptrcall(bind, object, native.ptrs.as_ptr(), slot.0.as_mut_ptr().cast()) };
    drop(native);
    match ret {
        Some(ty) if ty != VARIANT_TYPE_NIL => unsafe { take_native(ty, slot.0.as_mut_ptr().cast()) },
        _ => Value::Nil,
    }
}

/// Dynamic call by name, as done by `Object.call` and method callables.
pub(crate) unsafe fn call_by_name(object: ObjectPtr, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
    let Some(this) = (unsafe { live(object) }) else {
        return Err(call_error(CALL_ERROR_INSTANCE_IS_NULL, 0, 0));
    };
    let class = this.class.get();
    if let Some(ext) = find_ext_method(class, method) {
        return unsafe { ext_varcall(&ext, this, args) };
    }
    if let Some(spec) = find_builtin_method(class, method) {
        return invoke_spec(spec, this, &args);
    }
    if let Some(spec) = find_virtual(class, method) {
        if args.len() != spec.params.len() {
            let error = if args.len() < spec.params.len() {
                CALL_ERROR_TOO_FEW_ARGUMENTS
            } else {
                CALL_ERROR_TOO_MANY_ARGUMENTS
            };
            return Err(call_error(error, 0, spec.params.len() as i32));
        }
        return Ok(unsafe { call_virtual(object, method, &args) }.unwrap_or(Value::Nil));
    }
    Err(call_error(CALL_ERROR_INVALID_METHOD, 0, 0))
}

/// Invokes the plugin's override of virtual `name`, if there is one.
pub(crate) unsafe fn call_virtual(object: ObjectPtr, name: &str, args: &[Value]) -> Option<Value> {
    let this = unsafe { live(object) }?;
    let instance = this.instance.get();
    if instance.is_null() {
        return None;
    }
    let ext = ext_class(this.class.get())?;
    let spec = find_virtual(ext.parent, name)?;
    let data = unsafe { ext.resolve(spec.name) };
    if data.is_null() {
        return None;
    }
    let call = ext.info.call_virtual_with_data_func?;
    let native = unsafe { NativeArgs::new(spec.params, args) };
    let mut ret = Pod::ZERO;
    unsafe {
        call(
            instance,
            names::intern(spec.name),
            data,
            native.ptrs.as_ptr(),
            ret.0.as_mut_ptr().cast(),
        )
    };
    drop(native);
    Some(match spec.ret {
        Some(ty) => unsafe { take_native(ty, ret.0.as_mut_ptr().cast()) },
        None => Value::Nil,
    })
}

/// Invokes a callable value with variant arguments.
pub(crate) unsafe fn call_callable(callable: &Value, args: &[Value]) -> Result<Value, CallError> {
    let Value::Callable(data) = callable else {
        return Err(call_error(CALL_ERROR_INVALID_METHOD, 0, 0));
    };
    let data = data.clone();
    match &*data {
        CallableData::Null => Err(call_error(CALL_ERROR_INSTANCE_IS_NULL, 0, 0)),
        CallableData::Method { object, method } => unsafe {
            call_by_name(*object, names::text(*method), args.to_vec())
        },
        CallableData::Custom(info) => {
            let Some(call) = info.call_func else {
                return Err(call_error(CALL_ERROR_INVALID_METHOD, 0, 0));
            };
            let variants: Vec<MockVariant> = args.iter().cloned().map(MockVariant::new).collect();
            let ptrs: Vec<ConstVariantPtr> = variants
                .iter()
                .map(|v| v as *const MockVariant as ConstVariantPtr)
                .collect();
            let mut ret = MockVariant::nil();
            let mut error = CallError::default();
            unsafe {
                call(
                    info.callable_userdata,
                    ptrs.as_ptr(),
                    ptrs.len() as i64,
                    &mut ret as *mut MockVariant as UninitVariantPtr,
                    &mut error,
                )
            };
            if error.error != CALL_OK {
                return Err(error);
            }
            Ok(ret.value())
        }
    }
}

pub(crate) fn virtual_resolutions(class: &str) -> usize {
    ext_class(class).map_or(0, |ext| ext.resolutions.get())
}

// ----------------------------------------------------------------------------
// Built-in method bodies
// ----------------------------------------------------------------------------

fn name_arg(args: &[Value], index: usize) -> StringNamePtr {
    match args.get(index) {
        Some(Value::StringName(name)) => *name,
        _ => ptr::null(),
    }
}

fn object_get_class(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::string(this.class.get()))
}

fn object_is_class(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let ancestor = args[0].as_str().unwrap_or_default();
    Ok(Value::Bool(is_subclass(this.class.get(), ancestor)))
}

fn object_get_instance_id(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::Int(this.id as i64))
}

fn object_call(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let method = unsafe { names::text(name_arg(args, 0)) };
    unsafe { call_by_name(this.ptr(), method, args[1..].to_vec()) }
}

fn object_connect(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let signal = name_arg(args, 0);
    let signal_text = unsafe { names::text(signal) };
    if !has_signal(this.class.get(), signal_text) {
        record_error(format!("no signal '{signal_text}' on '{}'", this.class.get()));
        return Ok(Value::Int(ERR_INVALID_PARAMETER));
    }
    let mut state = this.state.borrow_mut();
    if state.connections.iter().any(|(s, c)| *s == signal && *c == args[1]) {
        record_error(format!("signal '{signal_text}' is already connected to this callable"));
        return Ok(Value::Int(ERR_INVALID_PARAMETER));
    }
    state.connections.push((signal, args[1].clone()));
    Ok(Value::Int(0))
}

fn object_disconnect(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let signal = name_arg(args, 0);
    let removed = {
        let mut state = this.state.borrow_mut();
        let position = state
            .connections
            .iter()
            .position(|(s, c)| *s == signal && *c == args[1]);
        position.map(|index| state.connections.remove(index))
    };
    if removed.is_none() {
        record_error(format!(
            "attempt to disconnect a nonexistent connection from '{}'",
            unsafe { names::text(signal) }
        ));
    }
    drop(removed);
    Ok(Value::Nil)
}

fn object_is_connected(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let signal = name_arg(args, 0);
    let state = this.state.borrow();
    Ok(Value::Bool(
        state.connections.iter().any(|(s, c)| *s == signal && *c == args[1]),
    ))
}

fn object_emit_signal(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let signal = name_arg(args, 0);
    let signal_text = unsafe { names::text(signal) };
    if !has_signal(this.class.get(), signal_text) {
        return Ok(Value::Int(ERR_UNAVAILABLE));
    }
    let targets: Vec<Value> = this
        .state
        .borrow()
        .connections
        .iter()
        .filter(|(s, _)| *s == signal)
        .map(|(_, c)| c.clone())
        .collect();
    for callable in targets {
        if let Err(error) = unsafe { call_callable(&callable, &args[1..]) } {
            record_error(format!("error calling handler of '{signal_text}': {error:?}"));
        }
    }
    Ok(Value::Int(0))
}

fn object_to_string(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    match unsafe { call_virtual(this.ptr(), "_to_string", &[]) } {
        Some(text) => Ok(text),
        None => Ok(Value::string(&unsafe { describe(this.ptr()) })),
    }
}

fn refcounted_reference(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    this.refcount.set(this.refcount.get() + 1);
    Ok(Value::Bool(true))
}

fn refcounted_unreference(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    let count = this.refcount.get() - 1;
    this.refcount.set(count);
    Ok(Value::Bool(count <= 0))
}

fn refcounted_get_reference_count(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::Int(this.refcount.get()))
}

fn node_set_name(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    this.state.borrow_mut().name = args[0].as_str().unwrap_or_default().to_owned();
    Ok(Value::Nil)
}

fn node_get_name(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::name(&this.state.borrow().name))
}

fn node2d_set_position(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    if let Value::Pod(_, pod) = &args[0] {
        this.state.borrow_mut().position = *pod;
    }
    Ok(Value::Nil)
}

fn node2d_get_position(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::Pod(VARIANT_TYPE_VECTOR2, this.state.borrow().position))
}

fn engine_get_version_string(_: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::string("4.2.0-testengine"))
}

fn engine_get_frames_drawn(_: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::Int(with_state(|s| s.frames)))
}

fn value_buffer_append(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    this.state.borrow_mut().buffer.push(args[0].as_float().unwrap_or_default());
    Ok(Value::Nil)
}

fn value_buffer_get(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    let index = args[0].as_int().unwrap_or(-1);
    let state = this.state.borrow();
    match usize::try_from(index).ok().and_then(|i| state.buffer.get(i)) {
        Some(value) => Ok(Value::Float(*value)),
        None => {
            record_error(format!("index {index} out of bounds"));
            Ok(Value::Float(0.0))
        }
    }
}

fn value_buffer_size(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    Ok(Value::Int(this.state.borrow().buffer.len() as i64))
}

fn value_buffer_get_data(this: &MockObject, _: &[Value]) -> Result<Value, CallError> {
    let data = PackedData::Float64(this.state.borrow().buffer.clone());
    Ok(Value::Packed(VARIANT_TYPE_PACKED_FLOAT64_ARRAY, Rc::new(data)))
}

fn value_buffer_set_data(this: &MockObject, args: &[Value]) -> Result<Value, CallError> {
    if let Value::Packed(_, data) = &args[0] {
        if let PackedData::Float64(values) = &**data {
            this.state.borrow_mut().buffer = values.clone();
        }
    }
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_tree_answers_ancestry() {
        assert!(is_subclass("Sprite2D", "Node"));
        assert!(is_subclass("Sprite2D", "Object"));
        assert!(!is_subclass("Sprite2D", "Resource"));
        assert!(!is_subclass("Nope", "Object"));
    }

    #[test]
    fn refcounted_objects_start_owned_and_die_at_zero() {
        let buffer = construct("ValueBuffer");
        let id = unsafe { live(buffer) }.map(|o| o.id).unwrap();
        assert_eq!(unsafe { refcount(buffer) }, 1);
        unsafe { release(buffer) };
        assert!(object_from_id(id).is_null());
    }

    #[test]
    fn varcall_checks_argument_count_and_type() {
        let node = construct("Node2D");
        let bind = method_bind("Node2D", "set_position", None);
        let err = unsafe { bind_call(bind, node, vec![]) }.unwrap_err();
        assert_eq!(err.error, CALL_ERROR_TOO_FEW_ARGUMENTS);
        let err = unsafe { bind_call(bind, node, vec![Value::Int(3)]) }.unwrap_err();
        assert_eq!((err.error, err.argument), (CALL_ERROR_INVALID_ARGUMENT, 0));
        unsafe { destroy(node) };
    }

    #[test]
    fn hash_mismatch_refuses_the_bind() {
        assert!(method_bind("Node", "set_name", Some(1)).is_null());
        let hash = method_hash("set_name", &[VARIANT_TYPE_STRING], None, false);
        assert!(!method_bind("Node", "set_name", Some(hash)).is_null());
        take_errors();
    }

    #[test]
    fn singletons_are_not_constructible() {
        assert!(construct("Engine").is_null());
        assert!(!singleton("Engine").is_null());
        assert_eq!(singleton("Engine"), singleton("Engine"));
        assert!(singleton("Node").is_null());
        take_errors();
    }
}
