//! Engine-side value model and the native layouts built on it.
//!
//! Every non-nil variant owns one boxed [`Value`]. Types whose native layout
//! is a single engine pointer (strings, node paths, containers, callables,
//! signals and packed arrays) use that box pointer as their native value, so
//! the internal getter of a variant can hand out the address of the pointer
//! it already stores.

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt::Write as _;
use std::ptr;
use std::rc::Rc;

use extbind_sys::*;

use crate::names;
use crate::object;
use crate::packed::PackedData;

/// Inline storage for plain-data payloads (vectors, transforms, colors).
#[repr(C, align(8))]
#[derive(Clone, Copy, PartialEq)]
pub struct Pod(pub [u8; MAX_PAYLOAD_SIZE]);

impl Pod {
    pub const ZERO: Pod = Pod([0; MAX_PAYLOAD_SIZE]);

    /// Builds a payload from little-endian `f32` components.
    pub fn from_f32s(values: &[f32]) -> Pod {
        let mut pod = Pod::ZERO;
        for (i, value) in values.iter().enumerate() {
            pod.0[i * 4..i * 4 + 4].copy_from_slice(&value.to_ne_bytes());
        }
        pod
    }

    pub fn f32_at(&self, index: usize) -> f32 {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.0[index * 4..index * 4 + 4]);
        f32::from_ne_bytes(bytes)
    }

    pub fn i32_at(&self, index: usize) -> i32 {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.0[index * 4..index * 4 + 4]);
        i32::from_ne_bytes(bytes)
    }
}

impl Default for Pod {
    fn default() -> Self {
        Pod::ZERO
    }
}

impl std::fmt::Debug for Pod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pod(..)")
    }
}

/// Counted reference to an engine object.
///
/// Holding one keeps a reference-counted object alive. Objects with manual
/// memory are not affected.
#[repr(transparent)]
#[derive(Debug)]
pub struct ObjRef(pub(crate) ObjectPtr);

impl ObjRef {
    pub const NULL: ObjRef = ObjRef(ptr::null_mut());

    /// Takes a new reference to `object`.
    ///
    /// # Safety
    /// `object` must be null or a live object pointer.
    pub unsafe fn shared(object: ObjectPtr) -> ObjRef {
        unsafe { object::add_ref(object) };
        ObjRef(object)
    }

    /// Adopts a reference that was already counted.
    pub(crate) fn adopt(object: ObjectPtr) -> ObjRef {
        ObjRef(object)
    }

    pub fn ptr(&self) -> ObjectPtr {
        self.0
    }

    pub(crate) fn into_raw(self) -> ObjectPtr {
        let object = self.0;
        std::mem::forget(self);
        object
    }
}

impl Clone for ObjRef {
    fn clone(&self) -> Self {
        unsafe { ObjRef::shared(self.0) }
    }
}

impl Drop for ObjRef {
    fn drop(&mut self) {
        unsafe { object::release(self.0) };
    }
}

/// Payload of a callable value.
pub enum CallableData {
    Null,
    Custom(CallableCustomInfo),
    Method {
        object: ObjectPtr,
        method: StringNamePtr,
    },
}

impl CallableData {
    pub(crate) fn same_target(&self, other: &CallableData) -> bool {
        match (self, other) {
            (CallableData::Null, CallableData::Null) => true,
            (CallableData::Custom(a), CallableData::Custom(b)) => {
                a.callable_userdata == b.callable_userdata
                    && a.call_func.map(|f| f as usize) == b.call_func.map(|f| f as usize)
            }
            (
                CallableData::Method { object, method },
                CallableData::Method {
                    object: other_object,
                    method: other_method,
                },
            ) => object == other_object && method == other_method,
            _ => false,
        }
    }
}

impl Drop for CallableData {
    fn drop(&mut self) {
        if let CallableData::Custom(info) = self {
            if let Some(free) = info.free_func {
                unsafe { free(info.callable_userdata) };
            }
        }
    }
}

/// Any value the engine can hold in a variant.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Plain-data kinds, stored as their native bytes.
    Pod(VariantType, Pod),
    Rid(u64),
    Str(Rc<str>),
    StringName(StringNamePtr),
    NodePath(Rc<str>),
    Object(ObjRef),
    Callable(Rc<CallableData>),
    Signal {
        object: ObjectPtr,
        name: StringNamePtr,
    },
    Dictionary(Rc<RefCell<Vec<(MockVariant, MockVariant)>>>),
    Array(Rc<RefCell<Vec<MockVariant>>>),
    Packed(VariantType, Rc<PackedData>),
}

impl Value {
    pub fn string(text: &str) -> Value {
        Value::Str(Rc::from(text))
    }

    pub fn name(text: &str) -> Value {
        Value::StringName(names::intern(text))
    }

    pub fn vector2(x: f32, y: f32) -> Value {
        Value::Pod(VARIANT_TYPE_VECTOR2, Pod::from_f32s(&[x, y]))
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(
            values.into_iter().map(MockVariant::new).collect(),
        )))
    }

    pub fn variant_type(&self) -> VariantType {
        match self {
            Value::Nil => VARIANT_TYPE_NIL,
            Value::Bool(_) => VARIANT_TYPE_BOOL,
            Value::Int(_) => VARIANT_TYPE_INT,
            Value::Float(_) => VARIANT_TYPE_FLOAT,
            Value::Pod(ty, _) => *ty,
            Value::Rid(_) => VARIANT_TYPE_RID,
            Value::Str(_) => VARIANT_TYPE_STRING,
            Value::StringName(_) => VARIANT_TYPE_STRING_NAME,
            Value::NodePath(_) => VARIANT_TYPE_NODE_PATH,
            Value::Object(_) => VARIANT_TYPE_OBJECT,
            Value::Callable(_) => VARIANT_TYPE_CALLABLE,
            Value::Signal { .. } => VARIANT_TYPE_SIGNAL,
            Value::Dictionary(_) => VARIANT_TYPE_DICTIONARY,
            Value::Array(_) => VARIANT_TYPE_ARRAY,
            Value::Packed(ty, _) => *ty,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) | Value::NodePath(text) => Some(text),
            Value::StringName(name) => Some(unsafe { names::text(*name) }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Copy whose containers no longer share storage with `self`.
    pub fn duplicate(&self, deep: bool) -> Value {
        let copy = |variant: &MockVariant| {
            if deep {
                MockVariant::new(variant.value().duplicate(true))
            } else {
                variant.clone()
            }
        };
        match self {
            Value::Array(items) => Value::Array(Rc::new(RefCell::new(
                items.borrow().iter().map(copy).collect(),
            ))),
            Value::Dictionary(entries) => Value::Dictionary(Rc::new(RefCell::new(
                entries
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), copy(value)))
                    .collect(),
            ))),
            Value::Packed(ty, data) => Value::Packed(*ty, Rc::new(PackedData::clone(data))),
            other => other.clone(),
        }
    }

    /// Text form used by `variant_stringify` and `Object.to_string`.
    pub fn stringify(&self) -> String {
        match self {
            Value::Nil => "<null>".to_owned(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Pod(ty, pod) => stringify_pod(*ty, pod),
            Value::Rid(value) => format!("RID({value})"),
            Value::Str(text) | Value::NodePath(text) => text.to_string(),
            Value::StringName(name) => unsafe { names::text(*name) }.to_owned(),
            Value::Object(object) => unsafe { object::describe(object.ptr()) },
            Value::Callable(_) => "Callable".to_owned(),
            Value::Signal { name, .. } => format!("Signal({})", unsafe { names::text(*name) }),
            Value::Array(items) => {
                let parts: Vec<String> =
                    items.borrow().iter().map(|v| v.value().stringify()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Dictionary(entries) => {
                let parts: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.value().stringify(), v.value().stringify()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Packed(_, data) => data.stringify(),
        }
    }
}

fn stringify_pod(ty: VariantType, pod: &Pod) -> String {
    let integer = matches!(
        ty,
        VARIANT_TYPE_VECTOR2I | VARIANT_TYPE_VECTOR3I | VARIANT_TYPE_VECTOR4I | VARIANT_TYPE_RECT2I
    );
    let count = payload_size(ty) / 4;
    let mut out = String::from("(");
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        if integer {
            let _ = write!(out, "{}", pod.i32_at(i));
        } else {
            let _ = write!(out, "{}", pod.f32_at(i));
        }
    }
    out.push(')');
    out
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Pod(ta, a), Value::Pod(tb, b)) => ta == tb && a == b,
            (Value::Rid(a), Value::Rid(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::StringName(a), Value::StringName(b)) => a == b,
            (Value::NodePath(a), Value::NodePath(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr() == b.ptr(),
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b) || a.same_target(b),
            (
                Value::Signal { object, name },
                Value::Signal {
                    object: other_object,
                    name: other_name,
                },
            ) => object == other_object && name == other_name,
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b)
                    || a.borrow().len() == b.borrow().len()
                        && a.borrow()
                            .iter()
                            .zip(b.borrow().iter())
                            .all(|(x, y)| x.value() == y.value())
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => Rc::ptr_eq(a, b),
            (Value::Packed(ta, a), Value::Packed(tb, b)) => ta == tb && a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value({}: {})", self.variant_type(), self.stringify())
    }
}

/// Default value of a type, as produced by its default constructor.
pub fn default_value(ty: VariantType) -> Value {
    match ty {
        VARIANT_TYPE_BOOL => Value::Bool(false),
        VARIANT_TYPE_INT => Value::Int(0),
        VARIANT_TYPE_FLOAT => Value::Float(0.0),
        VARIANT_TYPE_RID => Value::Rid(0),
        VARIANT_TYPE_STRING => Value::string(""),
        VARIANT_TYPE_STRING_NAME => Value::name(""),
        VARIANT_TYPE_NODE_PATH => Value::NodePath(Rc::from("")),
        VARIANT_TYPE_OBJECT => Value::Object(ObjRef::NULL),
        VARIANT_TYPE_CALLABLE => Value::Callable(Rc::new(CallableData::Null)),
        VARIANT_TYPE_SIGNAL => Value::Signal {
            object: ptr::null_mut(),
            name: names::intern(""),
        },
        VARIANT_TYPE_DICTIONARY => Value::Dictionary(Rc::new(RefCell::new(Vec::new()))),
        VARIANT_TYPE_ARRAY => Value::Array(Rc::new(RefCell::new(Vec::new()))),
        ty if packed_element_type(ty).is_some() => Value::Packed(ty, Rc::new(PackedData::empty(ty))),
        ty if payload_size(ty) > 0 => Value::Pod(ty, Pod::ZERO),
        _ => Value::Nil,
    }
}

/// Engine variant layout: a type tag followed by the box of its value.
#[repr(C)]
pub struct MockVariant {
    tag: VariantType,
    _pad: u32,
    data: *mut Value,
    _reserved: u64,
}

const _: () = assert!(std::mem::size_of::<MockVariant>() == VARIANT_SIZE);

impl MockVariant {
    pub fn nil() -> MockVariant {
        MockVariant {
            tag: VARIANT_TYPE_NIL,
            _pad: 0,
            data: ptr::null_mut(),
            _reserved: 0,
        }
    }

    pub fn new(value: Value) -> MockVariant {
        match value {
            Value::Nil => MockVariant::nil(),
            value => MockVariant {
                tag: value.variant_type(),
                _pad: 0,
                data: Box::into_raw(Box::new(value)),
                _reserved: 0,
            },
        }
    }

    pub fn tag(&self) -> VariantType {
        self.tag
    }

    pub fn value(&self) -> Value {
        self.value_ref().cloned().unwrap_or(Value::Nil)
    }

    pub fn value_ref(&self) -> Option<&Value> {
        unsafe { self.data.as_ref() }
    }

    /// Address of the native value inside this variant.
    pub(crate) fn internal_ptr(&mut self) -> TypePtr {
        if is_heap_type(self.tag) {
            return &mut self.data as *mut *mut Value as TypePtr;
        }
        let Some(value) = (unsafe { self.data.as_mut() }) else {
            return ptr::null_mut();
        };
        match value {
            Value::Bool(b) => b as *mut bool as TypePtr,
            Value::Int(i) => i as *mut i64 as TypePtr,
            Value::Float(f) => f as *mut f64 as TypePtr,
            Value::Pod(_, pod) => pod.0.as_mut_ptr() as TypePtr,
            Value::Rid(rid) => rid as *mut u64 as TypePtr,
            Value::StringName(name) => name as *mut StringNamePtr as TypePtr,
            Value::Object(object) => &mut object.0 as *mut ObjectPtr as TypePtr,
            _ => ptr::null_mut(),
        }
    }
}

impl Clone for MockVariant {
    fn clone(&self) -> Self {
        MockVariant::new(self.value())
    }
}

impl Drop for MockVariant {
    fn drop(&mut self) {
        if !self.data.is_null() {
            drop(unsafe { Box::from_raw(self.data) });
        }
    }
}

impl std::fmt::Debug for MockVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value().fmt(f)
    }
}

// ----------------------------------------------------------------------------
// Native layouts
// ----------------------------------------------------------------------------

fn is_boxed(ty: VariantType) -> bool {
    is_heap_type(ty)
}

/// Copies the native value at `src` without taking ownership of it.
///
/// # Safety
/// `src` must point at a valid native value of type `ty`.
pub unsafe fn read_native(ty: VariantType, src: *const c_void) -> Value {
    unsafe {
        if is_boxed(ty) {
            let boxed = *(src as *const *mut Value);
            return match boxed.as_ref() {
                Some(value) => value.clone(),
                None => default_value(ty),
            };
        }
        match ty {
            VARIANT_TYPE_BOOL => Value::Bool(*(src as *const u8) != 0),
            VARIANT_TYPE_INT => Value::Int(ptr::read_unaligned(src as *const i64)),
            VARIANT_TYPE_FLOAT => Value::Float(ptr::read_unaligned(src as *const f64)),
            VARIANT_TYPE_RID => Value::Rid(ptr::read_unaligned(src as *const u64)),
            VARIANT_TYPE_STRING_NAME => Value::StringName(*(src as *const StringNamePtr)),
            VARIANT_TYPE_OBJECT => Value::Object(ObjRef::shared(*(src as *const ObjectPtr))),
            ty if payload_size(ty) > 0 => {
                let mut pod = Pod::ZERO;
                ptr::copy_nonoverlapping(src as *const u8, pod.0.as_mut_ptr(), payload_size(ty));
                Value::Pod(ty, pod)
            }
            _ => Value::Nil,
        }
    }
}

/// Takes ownership of the native value at `src`, leaving the slot dead.
///
/// # Safety
/// `src` must point at a valid, owned native value of type `ty`.
pub unsafe fn take_native(ty: VariantType, src: *mut c_void) -> Value {
    unsafe {
        if is_boxed(ty) {
            let boxed = ptr::replace(src as *mut *mut Value, ptr::null_mut());
            return if boxed.is_null() {
                default_value(ty)
            } else {
                *Box::from_raw(boxed)
            };
        }
        if ty == VARIANT_TYPE_OBJECT {
            return Value::Object(ObjRef::adopt(*(src as *const ObjectPtr)));
        }
        read_native(ty, src)
    }
}

/// Moves `value` into the uninitialized native slot at `dst`.
///
/// A value of the wrong type is replaced by the default of `ty`.
///
/// # Safety
/// `dst` must be writable for the native size of `ty`.
pub unsafe fn write_native(ty: VariantType, value: Value, dst: *mut c_void) {
    let value = if value.variant_type() == ty {
        value
    } else {
        default_value(ty)
    };
    unsafe {
        if is_boxed(ty) {
            if payload_size(ty) == 16 {
                ptr::write((dst as *mut u64).add(1), 0);
            }
            ptr::write(dst as *mut *mut Value, Box::into_raw(Box::new(value)));
            return;
        }
        match value {
            Value::Bool(b) => ptr::write(dst as *mut u8, b as u8),
            Value::Int(i) => ptr::write_unaligned(dst as *mut i64, i),
            Value::Float(f) => ptr::write_unaligned(dst as *mut f64, f),
            Value::Rid(rid) => ptr::write_unaligned(dst as *mut u64, rid),
            Value::StringName(name) => ptr::write(dst as *mut StringNamePtr, name),
            Value::Object(object) => ptr::write(dst as *mut ObjectPtr, object.into_raw()),
            Value::Pod(ty, pod) => {
                ptr::copy_nonoverlapping(pod.0.as_ptr(), dst as *mut u8, payload_size(ty))
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip_through_native_slots() {
        let mut slot = [0u64; 2];
        unsafe {
            write_native(VARIANT_TYPE_STRING, Value::string("hello"), slot.as_mut_ptr().cast());
            assert_eq!(
                read_native(VARIANT_TYPE_STRING, slot.as_ptr().cast()),
                Value::string("hello")
            );
            assert_eq!(
                take_native(VARIANT_TYPE_STRING, slot.as_mut_ptr().cast()),
                Value::string("hello")
            );
        }
        assert_eq!(slot[0], 0);
    }

    #[test]
    fn mismatched_writes_fall_back_to_default() {
        let mut slot = 7i64;
        unsafe { write_native(VARIANT_TYPE_INT, Value::string("x"), (&mut slot as *mut i64).cast()) };
        assert_eq!(slot, 0);
    }

    #[test]
    fn shallow_duplicate_shares_elements_deep_does_not() {
        let inner = Value::array(vec![Value::Int(1)]);
        let outer = Value::array(vec![inner.clone()]);
        let shallow = outer.duplicate(false);
        let deep = outer.duplicate(true);
        let Value::Array(items) = &inner else { unreachable!() };
        items.borrow_mut().push(MockVariant::new(Value::Int(2)));

        let first = |v: &Value| match v {
            Value::Array(items) => items.borrow()[0].value(),
            _ => Value::Nil,
        };
        assert_eq!(first(&shallow), inner);
        assert_ne!(first(&deep), inner);
    }

    #[test]
    fn vectors_stringify_per_component() {
        assert_eq!(Value::vector2(1.5, -2.0).stringify(), "(1.5, -2)");
    }
}
