//! One-time resolution of the engine's function table.
//!
//! [`initialize`] validates the table the engine passed to the plugin entry
//! point, fetches the per-kind variant constructors and packed array
//! interfaces, and resolves every class tag and method bind named by the
//! manifests. The result is stored in a process-wide [`OnceLock`] with a
//! single writer; everything after that only reads it, so no name or bind is
//! ever resolved on a hot path.
//!
//! Anything that cannot be resolved here is an [`InitError`] and aborts the
//! plugin load.

use std::sync::OnceLock;

use extbind_sys::{self as sys, FunctionTable, PackedArrayFunctions};
use rustc_hash::FxHashMap;

use crate::config::{BindingConfig, ClassManifest, MethodManifest};
use crate::error::{BindError, BindResult, InitError};
use crate::string_name::StringName;
use crate::variant::VariantKind;

pub(crate) type FromNative = unsafe extern "C" fn(sys::UninitVariantPtr, sys::TypePtr);
pub(crate) type ToNative = unsafe extern "C" fn(sys::UninitTypePtr, sys::VariantPtr);
pub(crate) type InternalGetter = unsafe extern "C" fn(sys::VariantPtr) -> sys::TypePtr;
pub(crate) type PtrConstructor = unsafe extern "C" fn(sys::UninitTypePtr, *const sys::ConstTypePtr);
pub(crate) type PtrDestructor = unsafe extern "C" fn(sys::TypePtr);

/// Native-layout entry points of one variant kind.
#[derive(Clone, Copy, Debug)]
pub(crate) struct KindFns {
    pub(crate) from_native: FromNative,
    pub(crate) to_native: ToNative,
    pub(crate) internal: InternalGetter,
    pub(crate) construct_default: PtrConstructor,
    pub(crate) construct_copy: PtrConstructor,
    /// Present exactly for heap kinds.
    pub(crate) destroy: Option<PtrDestructor>,
}

/// A resolved engine method, with the signature it was resolved against.
#[derive(Debug, Clone)]
pub struct MethodBind {
    pub(crate) ptr: sys::MethodBindPtr,
    pub class: &'static str,
    pub name: &'static str,
    pub params: &'static [VariantKind],
    pub ret: Option<VariantKind>,
    pub vararg: bool,
}

// Binds are immutable engine metadata.
unsafe impl Send for MethodBind {}
unsafe impl Sync for MethodBind {}

impl MethodBind {
    /// Looks up a bind outside of the startup manifest.
    ///
    /// Meant for methods that only exist once the plugin registered them,
    /// such as methods of host classes. Engine classes should be listed in
    /// the manifest instead.
    pub fn resolve(
        class: &'static str,
        method: &'static str,
        params: &'static [VariantKind],
        ret: Option<VariantKind>,
    ) -> BindResult<MethodBind> {
        let manifest = MethodManifest::new(method, params, ret);
        let bind = unsafe { resolve_method(fns(), class, StringName::new(class).sys(), &manifest) }?;
        Ok(bind)
    }

    pub fn sys(&self) -> sys::MethodBindPtr {
        self.ptr
    }
}

pub struct Binding {
    pub(crate) fns: FunctionTable,
    pub(crate) version: sys::Version,
    pub(crate) library: sys::ClassLibraryPtr,
    pub(crate) forward_errors: bool,
    kinds: Vec<KindFns>,
    callable_from_method: PtrConstructor,
    signal_from_member: PtrConstructor,
    packed: Vec<PackedArrayFunctions>,
    classes: FxHashMap<&'static str, sys::ClassTagPtr>,
    methods: FxHashMap<(&'static str, &'static str), MethodBind>,
}

// Written once before publication, read-only afterwards.
unsafe impl Send for Binding {}
unsafe impl Sync for Binding {}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("version", &self.version)
            .field("classes", &self.classes.len())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

impl Binding {
    pub fn version(&self) -> sys::Version {
        self.version
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn has_method(&self, class: &'static str, method: &'static str) -> bool {
        self.methods.contains_key(&(class, method))
    }
}

static BINDING: OnceLock<Binding> = OnceLock::new();

const METHOD_ANY: Option<VariantKind> = Some(VariantKind::Nil);

/// Classes and binds the core itself depends on.
static CORE_MANIFEST: &[ClassManifest] = &[
    ClassManifest::new(
        "Object",
        &[
            MethodManifest::new("get_class", &[], Some(VariantKind::String)),
            MethodManifest::new("is_class", &[VariantKind::String], Some(VariantKind::Bool)),
            MethodManifest::new("get_instance_id", &[], Some(VariantKind::Int)),
            MethodManifest::new("call", &[VariantKind::StringName], METHOD_ANY).vararg(),
            MethodManifest::new(
                "connect",
                &[VariantKind::StringName, VariantKind::Callable, VariantKind::Int],
                Some(VariantKind::Int),
            ),
            MethodManifest::new(
                "disconnect",
                &[VariantKind::StringName, VariantKind::Callable],
                None,
            ),
            MethodManifest::new(
                "is_connected",
                &[VariantKind::StringName, VariantKind::Callable],
                Some(VariantKind::Bool),
            ),
            MethodManifest::new(
                "emit_signal",
                &[VariantKind::StringName],
                Some(VariantKind::Int),
            )
            .vararg(),
            MethodManifest::new("to_string", &[], Some(VariantKind::String)),
        ],
    ),
    ClassManifest::new(
        "RefCounted",
        &[
            MethodManifest::new("reference", &[], Some(VariantKind::Bool)),
            MethodManifest::new("unreference", &[], Some(VariantKind::Bool)),
            MethodManifest::new("get_reference_count", &[], Some(VariantKind::Int)),
        ],
    ),
    ClassManifest::new("Resource", &[]),
    ClassManifest::new(
        "Node",
        &[
            MethodManifest::new("set_name", &[VariantKind::String], None),
            MethodManifest::new("get_name", &[], Some(VariantKind::StringName)),
        ],
    ),
    ClassManifest::new(
        "Node2D",
        &[
            MethodManifest::new("set_position", &[VariantKind::Vector2], None),
            MethodManifest::new("get_position", &[], Some(VariantKind::Vector2)),
        ],
    ),
    ClassManifest::new("Sprite2D", &[]),
    ClassManifest::new(
        "Engine",
        &[
            MethodManifest::new("get_version_string", &[], Some(VariantKind::String)),
            MethodManifest::new("get_frames_drawn", &[], Some(VariantKind::Int)),
        ],
    ),
];

const PACKED_KINDS: [VariantKind; 9] = [
    VariantKind::PackedByteArray,
    VariantKind::PackedInt32Array,
    VariantKind::PackedInt64Array,
    VariantKind::PackedFloat32Array,
    VariantKind::PackedFloat64Array,
    VariantKind::PackedStringArray,
    VariantKind::PackedVector2Array,
    VariantKind::PackedVector3Array,
    VariantKind::PackedColorArray,
];

fn check_version(found: sys::Version, required: sys::Version) -> Result<(), InitError> {
    if found.major != required.major || found < required {
        return Err(InitError::VersionMismatch { found, required });
    }
    Ok(())
}

unsafe fn intern(fns: &FunctionTable, text: &str) -> sys::StringNamePtr {
    unsafe { (fns.string_name_new_with_utf8_chars_and_len)(text.as_ptr().cast(), text.len() as i64) }
}

unsafe fn load_kind(fns: &FunctionTable, kind: VariantKind) -> Result<KindFns, InitError> {
    let ty = kind.sys();
    let missing = |constructor| InitError::MissingConstructor { kind, constructor };
    unsafe {
        let destroy = (fns.variant_get_ptr_destructor)(ty);
        if kind.is_heap() && destroy.is_none() {
            return Err(missing("destructor"));
        }
        Ok(KindFns {
            from_native: (fns.get_variant_from_type_constructor)(ty)
                .ok_or_else(|| missing("from-type constructor"))?,
            to_native: (fns.get_variant_to_type_constructor)(ty)
                .ok_or_else(|| missing("to-type constructor"))?,
            internal: (fns.variant_get_ptr_internal_getter)(ty)
                .ok_or_else(|| missing("internal getter"))?,
            construct_default: (fns.variant_get_ptr_constructor)(ty, sys::CONSTRUCTOR_DEFAULT)
                .ok_or_else(|| missing("default constructor"))?,
            construct_copy: (fns.variant_get_ptr_constructor)(ty, sys::CONSTRUCTOR_COPY)
                .ok_or_else(|| missing("copy constructor"))?,
            destroy,
        })
    }
}

unsafe fn load_member_constructor(
    fns: &FunctionTable,
    kind: VariantKind,
) -> Result<PtrConstructor, InitError> {
    unsafe { (fns.variant_get_ptr_constructor)(kind.sys(), sys::CONSTRUCTOR_OBJECT_MEMBER) }.ok_or(
        InitError::MissingConstructor {
            kind,
            constructor: "object-member constructor",
        },
    )
}

unsafe fn load_packed(fns: &FunctionTable, kind: VariantKind) -> Result<PackedArrayFunctions, InitError> {
    let raw = unsafe { (fns.packed_array_interface)(kind.sys()).as_ref() }
        .ok_or(InitError::UnknownPackedKind(kind))?;
    PackedArrayFunctions::validate(raw).map_err(InitError::MissingSymbol)
}

unsafe fn resolve_method(
    fns: &FunctionTable,
    class: &'static str,
    class_name: sys::StringNamePtr,
    method: &MethodManifest,
) -> Result<MethodBind, InitError> {
    let params: Vec<sys::VariantType> = method.params.iter().map(|kind| kind.sys()).collect();
    let hash = sys::method_hash(
        method.name,
        &params,
        method.ret.map(VariantKind::sys),
        method.vararg,
    );
    let ptr = unsafe {
        let method_name = intern(fns, method.name);
        (fns.classdb_get_method_bind)(class_name, method_name, hash)
    };
    if ptr.is_null() {
        return Err(InitError::UnresolvedMethod {
            class,
            method: method.name,
        });
    }
    Ok(MethodBind {
        ptr,
        class,
        name: method.name,
        params: method.params,
        ret: method.ret,
        vararg: method.vararg,
    })
}

/// Builds a binding from the engine's interface without publishing it.
///
/// # Safety
/// `interface` must be null or point at an interface that outlives the
/// process, as handed to the plugin entry point.
pub unsafe fn load(
    interface: *const sys::ExtensionInterface,
    library: sys::ClassLibraryPtr,
    config: &BindingConfig,
) -> Result<Binding, InitError> {
    let interface = unsafe { interface.as_ref() }.ok_or(InitError::NullInterface)?;
    check_version(interface.version, config.minimum_version)?;
    let fns = FunctionTable::validate(&interface.functions).map_err(InitError::MissingSymbol)?;

    let kinds = VariantKind::native_kinds()
        .map(|kind| unsafe { load_kind(&fns, kind) })
        .collect::<Result<Vec<_>, _>>()?;
    let packed = PACKED_KINDS
        .iter()
        .map(|kind| unsafe { load_packed(&fns, *kind) })
        .collect::<Result<Vec<_>, _>>()?;

    let mut binding = Binding {
        fns,
        version: interface.version,
        library,
        forward_errors: config.forward_errors_to_engine,
        kinds,
        callable_from_method: unsafe { load_member_constructor(&fns, VariantKind::Callable) }?,
        signal_from_member: unsafe { load_member_constructor(&fns, VariantKind::Signal) }?,
        packed,
        classes: FxHashMap::default(),
        methods: FxHashMap::default(),
    };

    for class in CORE_MANIFEST.iter().chain(config.manifest) {
        unsafe { binding.resolve_class(class) }?;
    }
    Ok(binding)
}

impl Binding {
    unsafe fn resolve_class(&mut self, class: &ClassManifest) -> Result<(), InitError> {
        let class_name = unsafe { intern(&self.fns, class.name) };
        let tag = unsafe { (self.fns.classdb_get_class_tag)(class_name) };
        if tag.is_null() {
            return Err(InitError::UnknownClass(class.name));
        }
        self.classes.insert(class.name, tag);

        for method in class.methods {
            if self.methods.contains_key(&(class.name, method.name)) {
                continue;
            }
            let bind = unsafe { resolve_method(&self.fns, class.name, class_name, method) }?;
            self.methods.insert((class.name, method.name), bind);
        }
        Ok(())
    }
}

/// Resolves the engine's function table and publishes it process-wide.
///
/// # Safety
/// `interface` must be null or point at an interface that outlives the
/// process; `library` must be the token the engine passed alongside it.
pub unsafe fn initialize(
    interface: *const sys::ExtensionInterface,
    library: sys::ClassLibraryPtr,
    config: &BindingConfig,
) -> Result<(), InitError> {
    if BINDING.get().is_some() {
        return Err(InitError::AlreadyInitialized);
    }
    let binding = unsafe { load(interface, library, config) }?;
    log::debug!(
        "extension ABI {} loaded: {} classes, {} method binds",
        binding.version,
        binding.classes.len(),
        binding.methods.len()
    );
    BINDING
        .set(binding)
        .map_err(|_| InitError::AlreadyInitialized)
}

pub fn is_initialized() -> bool {
    BINDING.get().is_some()
}

pub(crate) fn try_binding() -> Option<&'static Binding> {
    BINDING.get()
}

/// The published binding.
///
/// Panics when called before [`initialize`]: every engine-facing operation
/// needs the function table, and there is no meaningful fallback.
pub fn binding() -> &'static Binding {
    match BINDING.get() {
        Some(binding) => binding,
        None => panic!("extbind used before initialize()"),
    }
}

#[inline]
pub(crate) fn fns() -> &'static FunctionTable {
    &binding().fns
}

pub(crate) fn library() -> sys::ClassLibraryPtr {
    binding().library
}

#[inline]
pub(crate) fn kind_fns(kind: VariantKind) -> &'static KindFns {
    match (kind.sys() as usize).checked_sub(1) {
        Some(index) => &binding().kinds[index],
        None => panic!("nil has no native layout"),
    }
}

pub(crate) fn packed_fns(kind: VariantKind) -> &'static PackedArrayFunctions {
    match PACKED_KINDS.iter().position(|packed| *packed == kind) {
        Some(index) => &binding().packed[index],
        None => panic!("{kind:?} is not a packed array kind"),
    }
}

pub(crate) fn callable_from_method() -> PtrConstructor {
    binding().callable_from_method
}

pub(crate) fn signal_from_member() -> PtrConstructor {
    binding().signal_from_member
}

/// A method bind resolved at startup.
///
/// Prefer the [`method_bind!`](crate::method_bind) macro, which caches the
/// lookup at the call site.
pub fn method_bind(class: &'static str, method: &'static str) -> BindResult<&'static MethodBind> {
    binding()
        .methods
        .get(&(class, method))
        .ok_or(BindError::Init(InitError::UnresolvedMethod { class, method }))
}

/// Tag of `class` for the engine's runtime class checks.
///
/// Classes from the manifests are answered from the startup table; others,
/// such as host classes, are asked of the engine.
pub(crate) fn class_tag(class: &str) -> Option<sys::ClassTagPtr> {
    let binding = binding();
    if let Some(tag) = binding.classes.get(class) {
        return Some(*tag);
    }
    let tag = unsafe { (binding.fns.classdb_get_class_tag)(StringName::new(class).sys()) };
    (!tag.is_null()).then_some(tag)
}

/// Resolves a startup method bind once per call site.
///
/// ```ignore
/// let bind = method_bind!("Node", "set_name")?;
/// ```
#[macro_export]
macro_rules! method_bind {
    ($class:literal, $method:literal) => {{
        static BIND: ::std::sync::OnceLock<&'static $crate::MethodBind> =
            ::std::sync::OnceLock::new();
        match BIND.get() {
            Some(bind) => Ok(*bind),
            None => $crate::loader::method_bind($class, $method)
                .map(|bind| *BIND.get_or_init(|| bind)),
        }
    }};
}
