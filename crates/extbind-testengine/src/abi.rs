//! The `extern "C"` side: every entry of the function table.

use std::ffi::{CStr, c_char};
use std::ptr;
use std::rc::Rc;

use extbind_sys::*;

use crate::names;
use crate::object::{self, record_error, record_warning};
use crate::packed::packed_array_interface;
use crate::value::{CallableData, MockVariant, Value, default_value, read_native, take_native, write_native};

unsafe fn c_text<'a>(text: *const c_char) -> &'a str {
    if text.is_null() {
        return "";
    }
    unsafe { CStr::from_ptr(text) }.to_str().unwrap_or("<invalid utf-8>")
}

unsafe fn utf8_arg(contents: *const c_char, size: i64) -> String {
    if contents.is_null() || size <= 0 {
        return String::new();
    }
    let bytes = unsafe { std::slice::from_raw_parts(contents as *const u8, size as usize) };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Copies up to `max` bytes of `text` to `buffer`; returns the full length.
unsafe fn copy_utf8(text: &str, buffer: *mut c_char, max: i64) -> i64 {
    if !buffer.is_null() && max > 0 {
        let count = text.len().min(max as usize);
        unsafe { ptr::copy_nonoverlapping(text.as_ptr(), buffer as *mut u8, count) };
    }
    text.len() as i64
}

unsafe fn variant<'a>(v: ConstVariantPtr) -> &'a MockVariant {
    unsafe { &*(v as *const MockVariant) }
}

unsafe fn variant_args(args: *const ConstVariantPtr, count: i64) -> Vec<Value> {
    (0..count.max(0) as usize)
        .map(|i| unsafe { variant(*args.add(i)) }.value())
        .collect()
}

/// The boxed value behind a native heap-type slot.
unsafe fn boxed<'a>(native: ConstTypePtr) -> Option<&'a mut Value> {
    unsafe { (*(native as *const *mut Value)).as_mut() }
}

// --- diagnostics -------------------------------------------------------------

unsafe extern "C" fn print_error(
    description: *const c_char,
    function: *const c_char,
    file: *const c_char,
    line: i32,
    _editor_notify: Bool,
) {
    let (description, function, file) = unsafe { (c_text(description), c_text(function), c_text(file)) };
    record_error(format!("{description} (at {function} {file}:{line})"));
}

unsafe extern "C" fn print_warning(
    description: *const c_char,
    function: *const c_char,
    file: *const c_char,
    line: i32,
    _editor_notify: Bool,
) {
    let (description, function, file) = unsafe { (c_text(description), c_text(function), c_text(file)) };
    record_warning(format!("{description} (at {function} {file}:{line})"));
}

// --- variant -----------------------------------------------------------------

unsafe extern "C" fn variant_new_copy(r_dest: UninitVariantPtr, src: ConstVariantPtr) {
    let copy = unsafe { variant(src) }.clone();
    unsafe { ptr::write(r_dest as *mut MockVariant, copy) };
}

unsafe extern "C" fn variant_new_nil(r_dest: UninitVariantPtr) {
    unsafe { ptr::write(r_dest as *mut MockVariant, MockVariant::nil()) };
}

unsafe extern "C" fn variant_destroy(v: VariantPtr) {
    unsafe { ptr::drop_in_place(v as *mut MockVariant) };
}

unsafe extern "C" fn variant_duplicate(v: ConstVariantPtr, r_ret: UninitVariantPtr, deep: Bool) {
    let copy = unsafe { variant(v) }.value().duplicate(to_bool(deep));
    unsafe { ptr::write(r_ret as *mut MockVariant, MockVariant::new(copy)) };
}

unsafe extern "C" fn variant_get_type(v: ConstVariantPtr) -> VariantType {
    unsafe { variant(v) }.tag()
}

unsafe extern "C" fn variant_stringify(v: ConstVariantPtr, r_string: UninitTypePtr) {
    let text = unsafe { variant(v) }.value().stringify();
    unsafe { write_native(VARIANT_TYPE_STRING, Value::string(&text), r_string) };
}

unsafe extern "C" fn from_type<const TY: VariantType>(r_variant: UninitVariantPtr, value: TypePtr) {
    let value = unsafe { read_native(TY, value) };
    unsafe { ptr::write(r_variant as *mut MockVariant, MockVariant::new(value)) };
}

unsafe extern "C" fn to_type<const TY: VariantType>(r_value: UninitTypePtr, v: VariantPtr) {
    let source = unsafe { variant(v) };
    if TY == VARIANT_TYPE_OBJECT {
        // Object handles leave a variant without a reference of their own.
        let object = match source.value_ref() {
            Some(Value::Object(object)) => object.ptr(),
            _ => ptr::null_mut(),
        };
        unsafe { ptr::write(r_value as *mut ObjectPtr, object) };
        return;
    }
    let value = source.value_ref().cloned().unwrap_or_else(|| default_value(TY));
    unsafe { write_native(TY, value, r_value) };
}

unsafe extern "C" fn internal_getter(v: VariantPtr) -> TypePtr {
    unsafe { (*(v as *mut MockVariant)).internal_ptr() }
}

unsafe extern "C" fn default_constructor<const TY: VariantType>(r_base: UninitTypePtr, _args: *const ConstTypePtr) {
    unsafe { write_native(TY, default_value(TY), r_base) };
}

unsafe extern "C" fn copy_constructor<const TY: VariantType>(r_base: UninitTypePtr, args: *const ConstTypePtr) {
    unsafe { write_native(TY, read_native(TY, *args), r_base) };
}

unsafe extern "C" fn object_member_constructor<const TY: VariantType>(
    r_base: UninitTypePtr,
    args: *const ConstTypePtr,
) {
    let (object, name) = unsafe {
        (
            *(*args as *const ObjectPtr),
            *(*args.add(1) as *const StringNamePtr),
        )
    };
    let value = if TY == VARIANT_TYPE_CALLABLE {
        Value::Callable(Rc::new(CallableData::Method { object, method: name }))
    } else {
        Value::Signal { object, name }
    };
    unsafe { write_native(TY, value, r_base) };
}

unsafe extern "C" fn destructor<const TY: VariantType>(base: TypePtr) {
    drop(unsafe { take_native(TY, base) });
}

/// Expands `$func::<TY>` for the runtime type `$ty`, or `None`.
macro_rules! per_type {
    ($ty:expr, $func:ident) => {
        match $ty {
            VARIANT_TYPE_BOOL => Some($func::<VARIANT_TYPE_BOOL> as _),
            VARIANT_TYPE_INT => Some($func::<VARIANT_TYPE_INT> as _),
            VARIANT_TYPE_FLOAT => Some($func::<VARIANT_TYPE_FLOAT> as _),
            VARIANT_TYPE_STRING => Some($func::<VARIANT_TYPE_STRING> as _),
            VARIANT_TYPE_VECTOR2 => Some($func::<VARIANT_TYPE_VECTOR2> as _),
            VARIANT_TYPE_VECTOR2I => Some($func::<VARIANT_TYPE_VECTOR2I> as _),
            VARIANT_TYPE_RECT2 => Some($func::<VARIANT_TYPE_RECT2> as _),
            VARIANT_TYPE_RECT2I => Some($func::<VARIANT_TYPE_RECT2I> as _),
            VARIANT_TYPE_VECTOR3 => Some($func::<VARIANT_TYPE_VECTOR3> as _),
            VARIANT_TYPE_VECTOR3I => Some($func::<VARIANT_TYPE_VECTOR3I> as _),
            VARIANT_TYPE_TRANSFORM2D => Some($func::<VARIANT_TYPE_TRANSFORM2D> as _),
            VARIANT_TYPE_VECTOR4 => Some($func::<VARIANT_TYPE_VECTOR4> as _),
            VARIANT_TYPE_VECTOR4I => Some($func::<VARIANT_TYPE_VECTOR4I> as _),
            VARIANT_TYPE_PLANE => Some($func::<VARIANT_TYPE_PLANE> as _),
            VARIANT_TYPE_QUATERNION => Some($func::<VARIANT_TYPE_QUATERNION> as _),
            VARIANT_TYPE_AABB => Some($func::<VARIANT_TYPE_AABB> as _),
            VARIANT_TYPE_BASIS => Some($func::<VARIANT_TYPE_BASIS> as _),
            VARIANT_TYPE_TRANSFORM3D => Some($func::<VARIANT_TYPE_TRANSFORM3D> as _),
            VARIANT_TYPE_PROJECTION => Some($func::<VARIANT_TYPE_PROJECTION> as _),
            VARIANT_TYPE_COLOR => Some($func::<VARIANT_TYPE_COLOR> as _),
            VARIANT_TYPE_STRING_NAME => Some($func::<VARIANT_TYPE_STRING_NAME> as _),
            VARIANT_TYPE_NODE_PATH => Some($func::<VARIANT_TYPE_NODE_PATH> as _),
            VARIANT_TYPE_RID => Some($func::<VARIANT_TYPE_RID> as _),
            VARIANT_TYPE_OBJECT => Some($func::<VARIANT_TYPE_OBJECT> as _),
            VARIANT_TYPE_CALLABLE => Some($func::<VARIANT_TYPE_CALLABLE> as _),
            VARIANT_TYPE_SIGNAL => Some($func::<VARIANT_TYPE_SIGNAL> as _),
            VARIANT_TYPE_DICTIONARY => Some($func::<VARIANT_TYPE_DICTIONARY> as _),
            VARIANT_TYPE_ARRAY => Some($func::<VARIANT_TYPE_ARRAY> as _),
            VARIANT_TYPE_PACKED_BYTE_ARRAY => Some($func::<VARIANT_TYPE_PACKED_BYTE_ARRAY> as _),
            VARIANT_TYPE_PACKED_INT32_ARRAY => Some($func::<VARIANT_TYPE_PACKED_INT32_ARRAY> as _),
            VARIANT_TYPE_PACKED_INT64_ARRAY => Some($func::<VARIANT_TYPE_PACKED_INT64_ARRAY> as _),
            VARIANT_TYPE_PACKED_FLOAT32_ARRAY => Some($func::<VARIANT_TYPE_PACKED_FLOAT32_ARRAY> as _),
            VARIANT_TYPE_PACKED_FLOAT64_ARRAY => Some($func::<VARIANT_TYPE_PACKED_FLOAT64_ARRAY> as _),
            VARIANT_TYPE_PACKED_STRING_ARRAY => Some($func::<VARIANT_TYPE_PACKED_STRING_ARRAY> as _),
            VARIANT_TYPE_PACKED_VECTOR2_ARRAY => Some($func::<VARIANT_TYPE_PACKED_VECTOR2_ARRAY> as _),
            VARIANT_TYPE_PACKED_VECTOR3_ARRAY => Some($func::<VARIANT_TYPE_PACKED_VECTOR3_ARRAY> as _),
            VARIANT_TYPE_PACKED_COLOR_ARRAY => Some($func::<VARIANT_TYPE_PACKED_COLOR_ARRAY> as _),
            _ => None,
        }
    };
}

unsafe extern "C" fn get_variant_from_type_constructor(ty: VariantType) -> VariantFromTypeConstructorFunc {
    per_type!(ty, from_type)
}

unsafe extern "C" fn get_variant_to_type_constructor(ty: VariantType) -> TypeFromVariantConstructorFunc {
    per_type!(ty, to_type)
}

unsafe extern "C" fn variant_get_ptr_internal_getter(ty: VariantType) -> VariantGetInternalPtrFunc {
    if ty == VARIANT_TYPE_NIL || ty >= VARIANT_TYPE_MAX {
        return None;
    }
    Some(internal_getter)
}

unsafe extern "C" fn variant_get_ptr_constructor(ty: VariantType, constructor: i32) -> PtrConstructor {
    match constructor {
        CONSTRUCTOR_DEFAULT => per_type!(ty, default_constructor),
        CONSTRUCTOR_COPY => per_type!(ty, copy_constructor),
        CONSTRUCTOR_OBJECT_MEMBER => match ty {
            VARIANT_TYPE_CALLABLE => Some(object_member_constructor::<VARIANT_TYPE_CALLABLE> as _),
            VARIANT_TYPE_SIGNAL => Some(object_member_constructor::<VARIANT_TYPE_SIGNAL> as _),
            _ => None,
        },
        _ => None,
    }
}

unsafe extern "C" fn variant_get_ptr_destructor(ty: VariantType) -> PtrDestructor {
    if !is_heap_type(ty) {
        return None;
    }
    per_type!(ty, destructor)
}

// --- strings -----------------------------------------------------------------

unsafe extern "C" fn string_new_with_utf8_chars_and_len(r_dest: UninitTypePtr, contents: *const c_char, size: i64) {
    let text = unsafe { utf8_arg(contents, size) };
    unsafe { write_native(VARIANT_TYPE_STRING, Value::string(&text), r_dest) };
}

unsafe extern "C" fn string_to_utf8_chars(string: ConstTypePtr, r_text: *mut c_char, max: i64) -> i64 {
    let text = unsafe { boxed(string) }.and_then(|v| v.as_str().map(str::to_owned));
    unsafe { copy_utf8(&text.unwrap_or_default(), r_text, max) }
}

unsafe extern "C" fn string_name_new_with_utf8_chars_and_len(contents: *const c_char, size: i64) -> StringNamePtr {
    names::intern(&unsafe { utf8_arg(contents, size) })
}

unsafe extern "C" fn string_name_to_utf8_chars(name: StringNamePtr, r_text: *mut c_char, max: i64) -> i64 {
    unsafe { copy_utf8(names::text(name), r_text, max) }
}

unsafe extern "C" fn node_path_new_with_utf8_chars_and_len(r_dest: UninitTypePtr, contents: *const c_char, size: i64) {
    let text = unsafe { utf8_arg(contents, size) };
    unsafe { write_native(VARIANT_TYPE_NODE_PATH, Value::NodePath(Rc::from(text)), r_dest) };
}

unsafe extern "C" fn node_path_to_utf8_chars(path: ConstTypePtr, r_text: *mut c_char, max: i64) -> i64 {
    unsafe { string_to_utf8_chars(path, r_text, max) }
}

// --- arrays and dictionaries -------------------------------------------------

unsafe extern "C" fn array_size(array: ConstTypePtr) -> i64 {
    match unsafe { boxed(array) } {
        Some(Value::Array(items)) => items.borrow().len() as i64,
        _ => 0,
    }
}

unsafe extern "C" fn array_operator_index(array: TypePtr, index: i64) -> VariantPtr {
    let Some(Value::Array(items)) = (unsafe { boxed(array) }) else {
        return ptr::null_mut();
    };
    let mut items = items.borrow_mut();
    match usize::try_from(index).ok().and_then(|i| items.get_mut(i)) {
        Some(item) => item as *mut MockVariant as VariantPtr,
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn array_push_back(array: TypePtr, value: ConstVariantPtr) {
    let element = unsafe { variant(value) }.clone();
    if let Some(Value::Array(items)) = unsafe { boxed(array) } {
        items.borrow_mut().push(element);
    }
}

unsafe extern "C" fn dictionary_size(dictionary: ConstTypePtr) -> i64 {
    match unsafe { boxed(dictionary) } {
        Some(Value::Dictionary(entries)) => entries.borrow().len() as i64,
        _ => 0,
    }
}

unsafe extern "C" fn dictionary_operator_index(dictionary: TypePtr, key: ConstVariantPtr) -> VariantPtr {
    let Some(Value::Dictionary(entries)) = (unsafe { boxed(dictionary) }) else {
        return ptr::null_mut();
    };
    let key = unsafe { variant(key) };
    let key_value = key.value();
    let mut entries = entries.borrow_mut();
    let index = match entries.iter().position(|(k, _)| k.value() == key_value) {
        Some(index) => index,
        None => {
            entries.push((key.clone(), MockVariant::nil()));
            entries.len() - 1
        }
    };
    &mut entries[index].1 as *mut MockVariant as VariantPtr
}

unsafe extern "C" fn dictionary_get(dictionary: ConstTypePtr, key: ConstVariantPtr, r_value: UninitVariantPtr) -> Bool {
    let found = match unsafe { boxed(dictionary) } {
        Some(Value::Dictionary(entries)) => {
            let key = unsafe { variant(key) }.value();
            let entries = entries.borrow();
            let value = entries.iter().find(|(k, _)| k.value() == key).map(|(_, v)| v.clone());
            value
        }
        _ => None,
    };
    let present = found.is_some();
    unsafe { ptr::write(r_value as *mut MockVariant, found.unwrap_or_else(MockVariant::nil)) };
    from_bool(present)
}

unsafe extern "C" fn dictionary_keys(dictionary: ConstTypePtr, r_array: UninitTypePtr) {
    let keys = match unsafe { boxed(dictionary) } {
        Some(Value::Dictionary(entries)) => entries.borrow().iter().map(|(k, _)| k.value()).collect(),
        _ => Vec::new(),
    };
    unsafe { write_native(VARIANT_TYPE_ARRAY, Value::array(keys), r_array) };
}

// --- callables ---------------------------------------------------------------

unsafe extern "C" fn callable_custom_create(r_callable: UninitTypePtr, info: *const CallableCustomInfo) {
    let data = CallableData::Custom(unsafe { *info });
    unsafe { write_native(VARIANT_TYPE_CALLABLE, Value::Callable(Rc::new(data)), r_callable) };
}

unsafe extern "C" fn callable_call(
    callable: ConstTypePtr,
    args: *const ConstVariantPtr,
    argument_count: i64,
    r_return: UninitVariantPtr,
    r_error: *mut CallError,
) {
    let callable = unsafe { read_native(VARIANT_TYPE_CALLABLE, callable) };
    let args = unsafe { variant_args(args, argument_count) };
    let (ret, error) = match unsafe { object::call_callable(&callable, &args) } {
        Ok(value) => (value, CallError::default()),
        Err(error) => (Value::Nil, error),
    };
    unsafe {
        ptr::write(r_return as *mut MockVariant, MockVariant::new(ret));
        *r_error = error;
    }
}

// --- objects -----------------------------------------------------------------

unsafe extern "C" fn classdb_construct_object(class_name: StringNamePtr) -> ObjectPtr {
    object::construct(unsafe { names::text(class_name) })
}

unsafe extern "C" fn object_destroy(object: ObjectPtr) {
    unsafe { object::destroy(object) }
}

unsafe extern "C" fn object_method_bind_call(
    method: MethodBindPtr,
    object: ObjectPtr,
    args: *const ConstVariantPtr,
    argument_count: i64,
    r_return: UninitVariantPtr,
    r_error: *mut CallError,
) {
    let args = unsafe { variant_args(args, argument_count) };
    let (ret, error) = match unsafe { object::bind_call(method, object, args) } {
        Ok(value) => (value, CallError::default()),
        Err(error) => (Value::Nil, error),
    };
    unsafe {
        ptr::write(r_return as *mut MockVariant, MockVariant::new(ret));
        *r_error = error;
    }
}

unsafe extern "C" fn object_method_bind_ptrcall(
    method: MethodBindPtr,
    object: ObjectPtr,
    args: *const ConstTypePtr,
    r_ret: TypePtr,
) {
    unsafe { object::bind_ptrcall(method, object, args, r_ret) }
}

unsafe extern "C" fn object_get_property(object: ConstObjectPtr, name: StringNamePtr, r_value: UninitVariantPtr) -> Bool {
    let value = unsafe { object::get_property(object as ObjectPtr, names::text(name)) };
    let present = value.is_some();
    unsafe { ptr::write(r_value as *mut MockVariant, MockVariant::new(value.unwrap_or(Value::Nil))) };
    from_bool(present)
}

unsafe extern "C" fn object_set_property(object: ObjectPtr, name: StringNamePtr, value: ConstVariantPtr) -> Bool {
    let value = unsafe { variant(value) }.value();
    from_bool(unsafe { object::set_property(object, names::text(name), value) })
}

unsafe extern "C" fn object_get_instance_id(object: ConstObjectPtr) -> InstanceId {
    unsafe { object::live(object as ObjectPtr) }.map_or(0, |o| o.id)
}

unsafe extern "C" fn object_get_instance_from_id(instance_id: InstanceId) -> ObjectPtr {
    object::object_from_id(instance_id)
}

unsafe extern "C" fn object_get_class_name(object: ConstObjectPtr, _library: ClassLibraryPtr) -> StringNamePtr {
    match unsafe { object::live(object as ObjectPtr) } {
        Some(this) => names::intern(this.class.get()),
        None => ptr::null(),
    }
}

unsafe extern "C" fn object_cast_to(object: ConstObjectPtr, class_tag: ClassTagPtr) -> ObjectPtr {
    let target = unsafe { names::text(class_tag as StringNamePtr) };
    match unsafe { object::live(object as ObjectPtr) } {
        Some(this) if object::is_subclass(this.class.get(), target) => object as ObjectPtr,
        _ => ptr::null_mut(),
    }
}

unsafe extern "C" fn object_set_instance(object: ObjectPtr, class_name: StringNamePtr, instance: ClassInstancePtr) {
    unsafe { object::set_instance(object, names::text(class_name), instance) }
}

unsafe extern "C" fn object_get_instance(object: ConstObjectPtr) -> ClassInstancePtr {
    unsafe { object::live(object as ObjectPtr) }.map_or(ptr::null_mut(), |o| o.instance.get())
}

unsafe extern "C" fn global_get_singleton(name: StringNamePtr) -> ObjectPtr {
    object::singleton(unsafe { names::text(name) })
}

// --- class database ----------------------------------------------------------

unsafe extern "C" fn classdb_get_class_tag(class_name: StringNamePtr) -> ClassTagPtr {
    let name = unsafe { names::text(class_name) };
    if object::class_exists(name) {
        names::intern(name) as ClassTagPtr
    } else {
        ptr::null_mut()
    }
}

unsafe extern "C" fn classdb_get_method_bind(class_name: StringNamePtr, method_name: StringNamePtr, hash: i64) -> MethodBindPtr {
    let (class, method) = unsafe { (names::text(class_name), names::text(method_name)) };
    object::method_bind(class, method, Some(hash))
}

unsafe extern "C" fn classdb_register_extension_class(
    _library: ClassLibraryPtr,
    class_name: StringNamePtr,
    parent_class_name: StringNamePtr,
    info: *const ClassCreationInfo,
) -> Bool {
    let (name, parent) = unsafe { (names::text(class_name), names::text(parent_class_name)) };
    from_bool(object::register_class(name, parent, unsafe { *info }))
}

unsafe extern "C" fn classdb_register_extension_class_method(
    _library: ClassLibraryPtr,
    class_name: StringNamePtr,
    info: *const ClassMethodInfo,
) -> Bool {
    from_bool(unsafe { object::register_method(names::text(class_name), &*info) })
}

unsafe extern "C" fn classdb_register_extension_class_signal(
    _library: ClassLibraryPtr,
    class_name: StringNamePtr,
    signal_name: StringNamePtr,
    arguments: *const PropertyInfo,
    argument_count: i64,
) -> Bool {
    let params = (0..argument_count.max(0) as usize)
        .map(|i| unsafe { (*arguments.add(i)).type_ })
        .collect();
    let (class, signal) = unsafe { (names::text(class_name), names::text(signal_name)) };
    from_bool(object::register_signal(class, signal, params))
}

unsafe extern "C" fn classdb_unregister_extension_class(_library: ClassLibraryPtr, class_name: StringNamePtr) -> Bool {
    from_bool(object::unregister_class(unsafe { names::text(class_name) }))
}

pub(crate) const FUNCTIONS: RawFunctionTable = RawFunctionTable {
    print_error: Some(print_error),
    print_warning: Some(print_warning),
    variant_new_copy: Some(variant_new_copy),
    variant_new_nil: Some(variant_new_nil),
    variant_destroy: Some(variant_destroy),
    variant_duplicate: Some(variant_duplicate),
    variant_get_type: Some(variant_get_type),
    variant_stringify: Some(variant_stringify),
    get_variant_from_type_constructor: Some(get_variant_from_type_constructor),
    get_variant_to_type_constructor: Some(get_variant_to_type_constructor),
    variant_get_ptr_internal_getter: Some(variant_get_ptr_internal_getter),
    variant_get_ptr_constructor: Some(variant_get_ptr_constructor),
    variant_get_ptr_destructor: Some(variant_get_ptr_destructor),
    string_new_with_utf8_chars_and_len: Some(string_new_with_utf8_chars_and_len),
    string_to_utf8_chars: Some(string_to_utf8_chars),
    string_name_new_with_utf8_chars_and_len: Some(string_name_new_with_utf8_chars_and_len),
    string_name_to_utf8_chars: Some(string_name_to_utf8_chars),
    node_path_new_with_utf8_chars_and_len: Some(node_path_new_with_utf8_chars_and_len),
    node_path_to_utf8_chars: Some(node_path_to_utf8_chars),
    array_size: Some(array_size),
    array_operator_index: Some(array_operator_index),
    array_push_back: Some(array_push_back),
    dictionary_size: Some(dictionary_size),
    dictionary_operator_index: Some(dictionary_operator_index),
    dictionary_get: Some(dictionary_get),
    dictionary_keys: Some(dictionary_keys),
    packed_array_interface: Some(packed_array_interface),
    callable_custom_create: Some(callable_custom_create),
    callable_call: Some(callable_call),
    classdb_construct_object: Some(classdb_construct_object),
    object_destroy: Some(object_destroy),
    object_method_bind_call: Some(object_method_bind_call),
    object_method_bind_ptrcall: Some(object_method_bind_ptrcall),
    object_get_property: Some(object_get_property),
    object_set_property: Some(object_set_property),
    object_get_instance_id: Some(object_get_instance_id),
    object_get_instance_from_id: Some(object_get_instance_from_id),
    object_get_class_name: Some(object_get_class_name),
    object_cast_to: Some(object_cast_to),
    object_set_instance: Some(object_set_instance),
    object_get_instance: Some(object_get_instance),
    global_get_singleton: Some(global_get_singleton),
    classdb_get_class_tag: Some(classdb_get_class_tag),
    classdb_get_method_bind: Some(classdb_get_method_bind),
    classdb_register_extension_class: Some(classdb_register_extension_class),
    classdb_register_extension_class_method: Some(classdb_register_extension_class_method),
    classdb_register_extension_class_signal: Some(classdb_register_extension_class_signal),
    classdb_unregister_extension_class: Some(classdb_unregister_extension_class),
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    #[test]
    fn string_variants_expose_their_native_string() {
        let text = "αβγ";
        let mut native = [0u64; 1];
        let mut v = MaybeUninit::<MockVariant>::uninit();
        unsafe {
            string_new_with_utf8_chars_and_len(native.as_mut_ptr().cast(), text.as_ptr().cast(), text.len() as i64);
            from_type::<VARIANT_TYPE_STRING>(v.as_mut_ptr().cast(), native.as_mut_ptr().cast());
            let inner = internal_getter(v.as_mut_ptr().cast());
            let mut buffer = [0 as c_char; 16];
            let len = string_to_utf8_chars(inner, buffer.as_mut_ptr(), 16);
            assert_eq!(len, text.len() as i64);
            assert_eq!(std::slice::from_raw_parts(buffer.as_ptr() as *const u8, len as usize), text.as_bytes());
            variant_destroy(v.as_mut_ptr().cast());
            destructor::<VARIANT_TYPE_STRING>(native.as_mut_ptr().cast());
        }
    }

    #[test]
    fn dictionary_index_inserts_missing_keys() {
        let mut native = [0u64; 1];
        unsafe {
            default_constructor::<VARIANT_TYPE_DICTIONARY>(native.as_mut_ptr().cast(), ptr::null());
            let key = MockVariant::new(Value::Int(4));
            let slot = dictionary_operator_index(native.as_mut_ptr().cast(), (&key as *const MockVariant).cast());
            assert!(!slot.is_null());
            assert_eq!(dictionary_size(native.as_ptr().cast()), 1);

            let mut out = MaybeUninit::<MockVariant>::uninit();
            let missing = MockVariant::new(Value::Int(5));
            assert_eq!(dictionary_get(native.as_ptr().cast(), (&missing as *const MockVariant).cast(), out.as_mut_ptr().cast()), FALSE);
            drop(out.assume_init());
            destructor::<VARIANT_TYPE_DICTIONARY>(native.as_mut_ptr().cast());
        }
    }
}
