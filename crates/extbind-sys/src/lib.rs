//! Raw declarations of the engine extension ABI.
//!
//! The engine hands an extension a single [`ExtensionInterface`] when the
//! plugin is loaded: a version header followed by a flat table of C function
//! pointers. Everything in this crate mirrors that C layout one to one; the
//! safe layer lives in `extbind`.
//!
//! Every table is declared once through `ffi_table!`, which produces two
//! structs:
//!
//! - a `#[repr(C)]` *raw* table whose entries are `Option<fn>`, exactly what
//!   the engine writes, and
//! - a *validated* table with plain `fn` entries, obtained through
//!   `validate()`, which names the first missing entry on failure.
//!
//! Nothing outside of `validate()` ever has to look at an `Option` again.

#![allow(non_camel_case_types)]

use std::ffi::c_void;

mod table;

pub use table::{FunctionTable, PackedArrayFunctions, RawFunctionTable, RawPackedArrayInterface};

// ----------------------------------------------------------------------------
// Opaque pointers
// ----------------------------------------------------------------------------

pub type ObjectPtr = *mut c_void;
pub type ConstObjectPtr = *const c_void;

pub type VariantPtr = *mut c_void;
pub type ConstVariantPtr = *const c_void;
pub type UninitVariantPtr = *mut c_void;

pub type TypePtr = *mut c_void;
pub type ConstTypePtr = *const c_void;
pub type UninitTypePtr = *mut c_void;

/// Interned string name. Two equal names always have the same pointer.
pub type StringNamePtr = *const c_void;

pub type MethodBindPtr = *const c_void;
pub type ClassLibraryPtr = *mut c_void;
pub type ClassInstancePtr = *mut c_void;
pub type ClassTagPtr = *mut c_void;

pub type InstanceId = u64;

pub type Bool = u8;
pub const TRUE: Bool = 1;
pub const FALSE: Bool = 0;

/// Converts an ABI boolean.
#[inline]
pub const fn to_bool(value: Bool) -> bool {
    value != FALSE
}

/// Converts a Rust boolean into the ABI representation.
#[inline]
pub const fn from_bool(value: bool) -> Bool {
    if value { TRUE } else { FALSE }
}

// ----------------------------------------------------------------------------
// Versioning
// ----------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The ABI revision these declarations describe.
pub const ABI_VERSION: Version = Version::new(4, 2, 0);

/// What the engine passes to the plugin entry point.
#[repr(C)]
pub struct ExtensionInterface {
    pub version: Version,
    pub functions: RawFunctionTable,
}

// ----------------------------------------------------------------------------
// Variant types
// ----------------------------------------------------------------------------

pub type VariantType = u32;

pub const VARIANT_TYPE_NIL: VariantType = 0;
pub const VARIANT_TYPE_BOOL: VariantType = 1;
pub const VARIANT_TYPE_INT: VariantType = 2;
pub const VARIANT_TYPE_FLOAT: VariantType = 3;
pub const VARIANT_TYPE_STRING: VariantType = 4;
pub const VARIANT_TYPE_VECTOR2: VariantType = 5;
pub const VARIANT_TYPE_VECTOR2I: VariantType = 6;
pub const VARIANT_TYPE_RECT2: VariantType = 7;
pub const VARIANT_TYPE_RECT2I: VariantType = 8;
pub const VARIANT_TYPE_VECTOR3: VariantType = 9;
pub const VARIANT_TYPE_VECTOR3I: VariantType = 10;
pub const VARIANT_TYPE_TRANSFORM2D: VariantType = 11;
pub const VARIANT_TYPE_VECTOR4: VariantType = 12;
pub const VARIANT_TYPE_VECTOR4I: VariantType = 13;
pub const VARIANT_TYPE_PLANE: VariantType = 14;
pub const VARIANT_TYPE_QUATERNION: VariantType = 15;
pub const VARIANT_TYPE_AABB: VariantType = 16;
pub const VARIANT_TYPE_BASIS: VariantType = 17;
pub const VARIANT_TYPE_TRANSFORM3D: VariantType = 18;
pub const VARIANT_TYPE_PROJECTION: VariantType = 19;
pub const VARIANT_TYPE_COLOR: VariantType = 20;
pub const VARIANT_TYPE_STRING_NAME: VariantType = 21;
pub const VARIANT_TYPE_NODE_PATH: VariantType = 22;
pub const VARIANT_TYPE_RID: VariantType = 23;
pub const VARIANT_TYPE_OBJECT: VariantType = 24;
pub const VARIANT_TYPE_CALLABLE: VariantType = 25;
pub const VARIANT_TYPE_SIGNAL: VariantType = 26;
pub const VARIANT_TYPE_DICTIONARY: VariantType = 27;
pub const VARIANT_TYPE_ARRAY: VariantType = 28;
pub const VARIANT_TYPE_PACKED_BYTE_ARRAY: VariantType = 29;
pub const VARIANT_TYPE_PACKED_INT32_ARRAY: VariantType = 30;
pub const VARIANT_TYPE_PACKED_INT64_ARRAY: VariantType = 31;
pub const VARIANT_TYPE_PACKED_FLOAT32_ARRAY: VariantType = 32;
pub const VARIANT_TYPE_PACKED_FLOAT64_ARRAY: VariantType = 33;
pub const VARIANT_TYPE_PACKED_STRING_ARRAY: VariantType = 34;
pub const VARIANT_TYPE_PACKED_VECTOR2_ARRAY: VariantType = 35;
pub const VARIANT_TYPE_PACKED_VECTOR3_ARRAY: VariantType = 36;
pub const VARIANT_TYPE_PACKED_COLOR_ARRAY: VariantType = 37;
pub const VARIANT_TYPE_MAX: VariantType = 38;

/// Size in bytes of a variant slot.
pub const VARIANT_SIZE: usize = 24;

/// Largest payload of any variant type in its native (pointer-call) layout.
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Size in bytes of a value of type `ty` in its native layout.
///
/// This is the layout used by pointer calls and by the per-type
/// from/to-variant constructors. Returns 0 for `NIL` and unknown types.
pub const fn payload_size(ty: VariantType) -> usize {
    match ty {
        VARIANT_TYPE_BOOL => 1,
        VARIANT_TYPE_INT | VARIANT_TYPE_FLOAT => 8,
        VARIANT_TYPE_VECTOR2 | VARIANT_TYPE_VECTOR2I => 8,
        VARIANT_TYPE_RECT2 | VARIANT_TYPE_RECT2I => 16,
        VARIANT_TYPE_VECTOR3 | VARIANT_TYPE_VECTOR3I => 12,
        VARIANT_TYPE_TRANSFORM2D => 24,
        VARIANT_TYPE_VECTOR4 | VARIANT_TYPE_VECTOR4I => 16,
        VARIANT_TYPE_PLANE | VARIANT_TYPE_QUATERNION => 16,
        VARIANT_TYPE_AABB => 24,
        VARIANT_TYPE_BASIS => 36,
        VARIANT_TYPE_TRANSFORM3D => 48,
        VARIANT_TYPE_PROJECTION => 64,
        VARIANT_TYPE_COLOR => 16,
        VARIANT_TYPE_STRING | VARIANT_TYPE_STRING_NAME | VARIANT_TYPE_NODE_PATH => 8,
        VARIANT_TYPE_RID | VARIANT_TYPE_OBJECT => 8,
        VARIANT_TYPE_CALLABLE | VARIANT_TYPE_SIGNAL => 16,
        VARIANT_TYPE_DICTIONARY | VARIANT_TYPE_ARRAY => 8,
        VARIANT_TYPE_PACKED_BYTE_ARRAY..=VARIANT_TYPE_PACKED_COLOR_ARRAY => 16,
        _ => 0,
    }
}

/// Whether values of `ty` own engine-side heap storage and need destruction.
pub const fn is_heap_type(ty: VariantType) -> bool {
    matches!(
        ty,
        VARIANT_TYPE_STRING
            | VARIANT_TYPE_NODE_PATH
            | VARIANT_TYPE_CALLABLE
            | VARIANT_TYPE_SIGNAL
            | VARIANT_TYPE_DICTIONARY
            | VARIANT_TYPE_ARRAY
            | VARIANT_TYPE_PACKED_BYTE_ARRAY..=VARIANT_TYPE_PACKED_COLOR_ARRAY
    )
}

/// Element type stored by a packed array type, or `None` if `ty` is not one.
pub const fn packed_element_type(ty: VariantType) -> Option<VariantType> {
    match ty {
        VARIANT_TYPE_PACKED_BYTE_ARRAY => Some(VARIANT_TYPE_INT),
        VARIANT_TYPE_PACKED_INT32_ARRAY => Some(VARIANT_TYPE_INT),
        VARIANT_TYPE_PACKED_INT64_ARRAY => Some(VARIANT_TYPE_INT),
        VARIANT_TYPE_PACKED_FLOAT32_ARRAY => Some(VARIANT_TYPE_FLOAT),
        VARIANT_TYPE_PACKED_FLOAT64_ARRAY => Some(VARIANT_TYPE_FLOAT),
        VARIANT_TYPE_PACKED_STRING_ARRAY => Some(VARIANT_TYPE_STRING),
        VARIANT_TYPE_PACKED_VECTOR2_ARRAY => Some(VARIANT_TYPE_VECTOR2),
        VARIANT_TYPE_PACKED_VECTOR3_ARRAY => Some(VARIANT_TYPE_VECTOR3),
        VARIANT_TYPE_PACKED_COLOR_ARRAY => Some(VARIANT_TYPE_COLOR),
        _ => None,
    }
}

/// Width in bytes of one element of the packed array type `ty`.
pub const fn packed_element_size(ty: VariantType) -> usize {
    match ty {
        VARIANT_TYPE_PACKED_BYTE_ARRAY => 1,
        VARIANT_TYPE_PACKED_INT32_ARRAY | VARIANT_TYPE_PACKED_FLOAT32_ARRAY => 4,
        VARIANT_TYPE_PACKED_INT64_ARRAY | VARIANT_TYPE_PACKED_FLOAT64_ARRAY => 8,
        VARIANT_TYPE_PACKED_STRING_ARRAY => 8,
        VARIANT_TYPE_PACKED_VECTOR2_ARRAY => 8,
        VARIANT_TYPE_PACKED_VECTOR3_ARRAY => 12,
        VARIANT_TYPE_PACKED_COLOR_ARRAY => 16,
        _ => 0,
    }
}

// ----------------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------------

pub type CallErrorType = u32;

pub const CALL_OK: CallErrorType = 0;
pub const CALL_ERROR_INVALID_METHOD: CallErrorType = 1;
pub const CALL_ERROR_INVALID_ARGUMENT: CallErrorType = 2;
pub const CALL_ERROR_TOO_MANY_ARGUMENTS: CallErrorType = 3;
pub const CALL_ERROR_TOO_FEW_ARGUMENTS: CallErrorType = 4;
pub const CALL_ERROR_INSTANCE_IS_NULL: CallErrorType = 5;
pub const CALL_ERROR_METHOD_NOT_CONST: CallErrorType = 6;

/// Status written by the engine for variant calls.
///
/// For `INVALID_ARGUMENT`, `argument` is the offending index and `expected`
/// the variant type that was wanted. For the argument count errors,
/// `expected` is the count the method takes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallError {
    pub error: CallErrorType,
    pub argument: i32,
    pub expected: i32,
}

pub type VariantFromTypeConstructorFunc =
    Option<unsafe extern "C" fn(r_variant: UninitVariantPtr, value: TypePtr)>;
pub type TypeFromVariantConstructorFunc =
    Option<unsafe extern "C" fn(r_value: UninitTypePtr, variant: VariantPtr)>;
pub type VariantGetInternalPtrFunc = Option<unsafe extern "C" fn(variant: VariantPtr) -> TypePtr>;
pub type PtrConstructor = Option<unsafe extern "C" fn(r_base: UninitTypePtr, args: *const ConstTypePtr)>;
pub type PtrDestructor = Option<unsafe extern "C" fn(base: TypePtr)>;

/// Index of the default constructor in `variant_get_ptr_constructor`.
pub const CONSTRUCTOR_DEFAULT: i32 = 0;
/// Index of the copy constructor (one argument of the same type).
pub const CONSTRUCTOR_COPY: i32 = 1;
/// For `CALLABLE` and `SIGNAL`: constructor taking `(Object, StringName)`.
pub const CONSTRUCTOR_OBJECT_MEMBER: i32 = 2;

// ----------------------------------------------------------------------------
// Class registration
// ----------------------------------------------------------------------------

pub type ClassCreateInstance = Option<unsafe extern "C" fn(class_userdata: *mut c_void) -> ObjectPtr>;
pub type ClassFreeInstance =
    Option<unsafe extern "C" fn(class_userdata: *mut c_void, instance: ClassInstancePtr)>;
pub type ClassGetVirtualCallData =
    Option<unsafe extern "C" fn(class_userdata: *mut c_void, name: StringNamePtr) -> *mut c_void>;
pub type ClassCallVirtualWithData = Option<
    unsafe extern "C" fn(
        instance: ClassInstancePtr,
        name: StringNamePtr,
        call_data: *mut c_void,
        args: *const ConstTypePtr,
        r_ret: TypePtr,
    ),
>;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ClassCreationInfo {
    pub is_virtual: Bool,
    pub is_abstract: Bool,
    pub create_instance_func: ClassCreateInstance,
    pub free_instance_func: ClassFreeInstance,
    /// Resolver consulted once per virtual method name; null means "not overridden".
    pub get_virtual_call_data_func: ClassGetVirtualCallData,
    pub call_virtual_with_data_func: ClassCallVirtualWithData,
    pub class_userdata: *mut c_void,
}

pub type ClassMethodCall = Option<
    unsafe extern "C" fn(
        method_userdata: *mut c_void,
        instance: ClassInstancePtr,
        args: *const ConstVariantPtr,
        argument_count: i64,
        r_return: UninitVariantPtr,
        r_error: *mut CallError,
    ),
>;
pub type ClassMethodPtrCall = Option<
    unsafe extern "C" fn(
        method_userdata: *mut c_void,
        instance: ClassInstancePtr,
        args: *const ConstTypePtr,
        r_ret: TypePtr,
    ),
>;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PropertyInfo {
    pub type_: VariantType,
    pub name: StringNamePtr,
    pub class_name: StringNamePtr,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ClassMethodInfo {
    pub name: StringNamePtr,
    pub method_userdata: *mut c_void,
    pub call_func: ClassMethodCall,
    pub ptrcall_func: ClassMethodPtrCall,
    pub has_return_value: Bool,
    pub return_value_info: PropertyInfo,
    pub argument_count: u32,
    pub arguments_info: *const PropertyInfo,
}

// ----------------------------------------------------------------------------
// Callables
// ----------------------------------------------------------------------------

pub type CallableCustomCall = Option<
    unsafe extern "C" fn(
        callable_userdata: *mut c_void,
        args: *const ConstVariantPtr,
        argument_count: i64,
        r_return: UninitVariantPtr,
        r_error: *mut CallError,
    ),
>;
pub type CallableCustomFree = Option<unsafe extern "C" fn(callable_userdata: *mut c_void)>;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CallableCustomInfo {
    pub callable_userdata: *mut c_void,
    pub token: *mut c_void,
    pub object_id: InstanceId,
    pub call_func: CallableCustomCall,
    /// Called once, when the engine drops its last copy of the callable.
    pub free_func: CallableCustomFree,
}

// ----------------------------------------------------------------------------
// Initialization
// ----------------------------------------------------------------------------

pub type InitializationLevel = u32;

pub const INITIALIZATION_CORE: InitializationLevel = 0;
pub const INITIALIZATION_SERVERS: InitializationLevel = 1;
pub const INITIALIZATION_SCENE: InitializationLevel = 2;
pub const INITIALIZATION_EDITOR: InitializationLevel = 3;
pub const MAX_INITIALIZATION_LEVEL: InitializationLevel = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Initialization {
    pub minimum_initialization_level: InitializationLevel,
    pub userdata: *mut c_void,
    pub initialize: Option<unsafe extern "C" fn(userdata: *mut c_void, level: InitializationLevel)>,
    pub deinitialize: Option<unsafe extern "C" fn(userdata: *mut c_void, level: InitializationLevel)>,
}

/// Signature of the symbol the engine looks up in the plugin library.
pub type InitializationFunction = Option<
    unsafe extern "C" fn(
        interface: *const ExtensionInterface,
        library: ClassLibraryPtr,
        r_initialization: *mut Initialization,
    ) -> Bool,
>;

// ----------------------------------------------------------------------------
// Method hashes
// ----------------------------------------------------------------------------

/// Compatibility hash of a method signature.
///
/// The engine refuses to hand out a method bind when the hash passed to
/// `classdb_get_method_bind` does not match the one it computes itself, which
/// is how a plugin built against a different API revision is caught at load
/// time instead of at the first call.
pub fn method_hash(
    name: &str,
    params: &[VariantType],
    ret: Option<VariantType>,
    is_vararg: bool,
) -> i64 {
    let mut buf = Vec::with_capacity(name.len() + params.len() * 4 + 8);
    buf.extend_from_slice(name.as_bytes());
    buf.push(b'(');
    for param in params {
        buf.extend_from_slice(&param.to_le_bytes());
    }
    buf.push(b')');
    match ret {
        Some(ret) => buf.extend_from_slice(&ret.to_le_bytes()),
        None => buf.push(b'v'),
    }
    if is_vararg {
        buf.extend_from_slice(b"...");
    }
    xxhash_rust::xxh64::xxh64(&buf, 0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_sizes_fit_in_max() {
        for ty in 0..VARIANT_TYPE_MAX {
            assert!(payload_size(ty) <= MAX_PAYLOAD_SIZE, "type {ty}");
        }
        assert_eq!(payload_size(VARIANT_TYPE_NIL), 0);
        assert_eq!(payload_size(VARIANT_TYPE_PROJECTION), MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn only_packed_types_have_elements() {
        assert_eq!(
            packed_element_type(VARIANT_TYPE_PACKED_VECTOR2_ARRAY),
            Some(VARIANT_TYPE_VECTOR2)
        );
        assert_eq!(packed_element_type(VARIANT_TYPE_ARRAY), None);
        assert_eq!(packed_element_size(VARIANT_TYPE_PACKED_COLOR_ARRAY), 16);
    }

    #[test]
    fn method_hash_depends_on_signature() {
        let a = method_hash("append", &[VARIANT_TYPE_FLOAT], None, false);
        let b = method_hash("append", &[VARIANT_TYPE_INT], None, false);
        let c = method_hash("append", &[VARIANT_TYPE_FLOAT], Some(VARIANT_TYPE_INT), false);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, method_hash("append", &[VARIANT_TYPE_FLOAT], None, false));
    }

    #[test]
    fn string_name_is_heapless() {
        assert!(!is_heap_type(VARIANT_TYPE_STRING_NAME));
        assert!(is_heap_type(VARIANT_TYPE_STRING));
        assert!(!is_heap_type(VARIANT_TYPE_OBJECT));
    }
}
