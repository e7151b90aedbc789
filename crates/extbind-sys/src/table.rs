//! The engine's function pointer tables.

use std::ffi::c_char;

use crate::*;

/// Declares a raw `#[repr(C)]` table of optional C function pointers together
/// with a validated twin whose entries are guaranteed present.
macro_rules! ffi_table {
    (
        $(#[$raw_meta:meta])*
        raw $raw:ident;
        $(#[$meta:meta])*
        validated $table:ident;
        $(
            $(#[$fn_meta:meta])*
            fn $name:ident( $( $arg:ident : $ty:ty ),* $(,)? ) $( -> $ret:ty )?;
        )*
    ) => {
        $(#[$raw_meta])*
        #[repr(C)]
        #[derive(Clone, Copy, Debug)]
        pub struct $raw {
            $(
                $(#[$fn_meta])*
                pub $name: Option<unsafe extern "C" fn( $( $arg: $ty ),* ) $( -> $ret )?>,
            )*
        }

        impl $raw {
            /// A table without any entry filled in.
            pub const EMPTY: Self = Self {
                $( $name: None, )*
            };
        }

        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        pub struct $table {
            $(
                $(#[$fn_meta])*
                pub $name: unsafe extern "C" fn( $( $arg: $ty ),* ) $( -> $ret )?,
            )*
        }

        impl $table {
            /// Checks that every entry of `raw` is present.
            ///
            /// On failure, returns the name of the first missing entry.
            pub fn validate(raw: &$raw) -> Result<Self, &'static str> {
                Ok(Self {
                    $( $name: raw.$name.ok_or(stringify!($name))?, )*
                })
            }
        }
    };
}

ffi_table! {
    /// Function table as written by the engine.
    raw RawFunctionTable;
    /// Function table after load-time validation.
    validated FunctionTable;

    // --- diagnostics ---------------------------------------------------------

    fn print_error(description: *const c_char, function: *const c_char, file: *const c_char, line: i32, editor_notify: Bool);
    fn print_warning(description: *const c_char, function: *const c_char, file: *const c_char, line: i32, editor_notify: Bool);

    // --- variant -------------------------------------------------------------

    fn variant_new_copy(r_dest: UninitVariantPtr, src: ConstVariantPtr);
    fn variant_new_nil(r_dest: UninitVariantPtr);
    fn variant_destroy(variant: VariantPtr);
    fn variant_duplicate(variant: ConstVariantPtr, r_ret: UninitVariantPtr, deep: Bool);
    fn variant_get_type(variant: ConstVariantPtr) -> VariantType;
    /// Writes a new engine string into `r_string`.
    fn variant_stringify(variant: ConstVariantPtr, r_string: UninitTypePtr);
    fn get_variant_from_type_constructor(ty: VariantType) -> VariantFromTypeConstructorFunc;
    fn get_variant_to_type_constructor(ty: VariantType) -> TypeFromVariantConstructorFunc;
    fn variant_get_ptr_internal_getter(ty: VariantType) -> VariantGetInternalPtrFunc;
    fn variant_get_ptr_constructor(ty: VariantType, constructor: i32) -> PtrConstructor;
    fn variant_get_ptr_destructor(ty: VariantType) -> PtrDestructor;

    // --- strings -------------------------------------------------------------

    fn string_new_with_utf8_chars_and_len(r_dest: UninitTypePtr, contents: *const c_char, size: i64);
    /// Returns the full UTF-8 length; writes at most `max_write_length` bytes.
    fn string_to_utf8_chars(string: ConstTypePtr, r_text: *mut c_char, max_write_length: i64) -> i64;
    /// Returns the interned name; equal contents always yield the same pointer.
    fn string_name_new_with_utf8_chars_and_len(contents: *const c_char, size: i64) -> StringNamePtr;
    fn string_name_to_utf8_chars(name: StringNamePtr, r_text: *mut c_char, max_write_length: i64) -> i64;
    fn node_path_new_with_utf8_chars_and_len(r_dest: UninitTypePtr, contents: *const c_char, size: i64);
    fn node_path_to_utf8_chars(path: ConstTypePtr, r_text: *mut c_char, max_write_length: i64) -> i64;

    // --- arrays and dictionaries ---------------------------------------------

    fn array_size(array: ConstTypePtr) -> i64;
    /// Null when `index` is out of bounds.
    fn array_operator_index(array: TypePtr, index: i64) -> VariantPtr;
    fn array_push_back(array: TypePtr, value: ConstVariantPtr);
    fn dictionary_size(dictionary: ConstTypePtr) -> i64;
    /// Inserts a nil entry when `key` is absent.
    fn dictionary_operator_index(dictionary: TypePtr, key: ConstVariantPtr) -> VariantPtr;
    /// Copies the value for `key` into `r_value`; false when absent.
    fn dictionary_get(dictionary: ConstTypePtr, key: ConstVariantPtr, r_value: UninitVariantPtr) -> Bool;
    fn dictionary_keys(dictionary: ConstTypePtr, r_array: UninitTypePtr);

    // --- packed arrays -------------------------------------------------------

    /// Null when `ty` is not a packed array type.
    fn packed_array_interface(ty: VariantType) -> *const RawPackedArrayInterface;

    // --- callables -----------------------------------------------------------

    fn callable_custom_create(r_callable: UninitTypePtr, info: *const CallableCustomInfo);
    fn callable_call(callable: ConstTypePtr, args: *const ConstVariantPtr, argument_count: i64, r_return: UninitVariantPtr, r_error: *mut CallError);

    // --- objects -------------------------------------------------------------

    fn classdb_construct_object(class_name: StringNamePtr) -> ObjectPtr;
    fn object_destroy(object: ObjectPtr);
    fn object_method_bind_call(method: MethodBindPtr, object: ObjectPtr, args: *const ConstVariantPtr, argument_count: i64, r_return: UninitVariantPtr, r_error: *mut CallError);
    fn object_method_bind_ptrcall(method: MethodBindPtr, object: ObjectPtr, args: *const ConstTypePtr, r_ret: TypePtr);
    fn object_get_property(object: ConstObjectPtr, name: StringNamePtr, r_value: UninitVariantPtr) -> Bool;
    fn object_set_property(object: ObjectPtr, name: StringNamePtr, value: ConstVariantPtr) -> Bool;
    fn object_get_instance_id(object: ConstObjectPtr) -> InstanceId;
    /// Null when no live object has this id.
    fn object_get_instance_from_id(instance_id: InstanceId) -> ObjectPtr;
    fn object_get_class_name(object: ConstObjectPtr, library: ClassLibraryPtr) -> StringNamePtr;
    /// Null unless the object's class equals or descends from the tagged class.
    fn object_cast_to(object: ConstObjectPtr, class_tag: ClassTagPtr) -> ObjectPtr;
    fn object_set_instance(object: ObjectPtr, class_name: StringNamePtr, instance: ClassInstancePtr);
    /// Null for objects without an extension instance.
    fn object_get_instance(object: ConstObjectPtr) -> ClassInstancePtr;
    /// Null when there is no such singleton.
    fn global_get_singleton(name: StringNamePtr) -> ObjectPtr;

    // --- class database ------------------------------------------------------

    /// Null for unknown classes.
    fn classdb_get_class_tag(class_name: StringNamePtr) -> ClassTagPtr;
    /// Null for unknown methods or when `hash` does not match.
    fn classdb_get_method_bind(class_name: StringNamePtr, method_name: StringNamePtr, hash: i64) -> MethodBindPtr;
    fn classdb_register_extension_class(library: ClassLibraryPtr, class_name: StringNamePtr, parent_class_name: StringNamePtr, info: *const ClassCreationInfo) -> Bool;
    fn classdb_register_extension_class_method(library: ClassLibraryPtr, class_name: StringNamePtr, info: *const ClassMethodInfo) -> Bool;
    fn classdb_register_extension_class_signal(library: ClassLibraryPtr, class_name: StringNamePtr, signal_name: StringNamePtr, arguments: *const PropertyInfo, argument_count: i64) -> Bool;
    fn classdb_unregister_extension_class(library: ClassLibraryPtr, class_name: StringNamePtr) -> Bool;
}

ffi_table! {
    /// Per-element-type packed array operations, as written by the engine.
    raw RawPackedArrayInterface;
    /// Packed array operations after validation.
    validated PackedArrayFunctions;

    fn new(r_dest: UninitTypePtr);
    fn copy(r_dest: UninitTypePtr, src: ConstTypePtr);
    fn destroy(array: TypePtr);
    fn size(array: ConstTypePtr) -> i64;
    fn resize(array: TypePtr, size: i64) -> Bool;
    fn append(array: TypePtr, element: ConstTypePtr);
    /// Writes an owned copy of the element into `r_element`; false when out of bounds.
    fn get(array: ConstTypePtr, index: i64, r_element: UninitTypePtr) -> Bool;
    fn set(array: TypePtr, index: i64, element: ConstTypePtr) -> Bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn fake_new(_r_dest: UninitTypePtr) {}

    #[test]
    fn validate_names_first_missing_entry() {
        let mut raw = RawPackedArrayInterface::EMPTY;
        assert_eq!(PackedArrayFunctions::validate(&raw).unwrap_err(), "new");

        raw.new = Some(fake_new);
        assert_eq!(PackedArrayFunctions::validate(&raw).unwrap_err(), "copy");
    }
}
