//! Packed arrays and their per-element-type interfaces.

use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

use extbind_sys::*;

use crate::value::{Value, default_value, read_native, take_native, write_native};

/// Storage of one packed array. Copies share it until one of them writes.
#[derive(Clone, Debug, PartialEq)]
pub enum PackedData {
    Bytes(Vec<u8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Strings(Vec<Rc<str>>),
    Vector2(Vec<[f32; 2]>),
    Vector3(Vec<[f32; 3]>),
    Color(Vec<[f32; 4]>),
}

macro_rules! for_each_packed {
    ($data:expr, $items:ident => $body:expr) => {
        match $data {
            PackedData::Bytes($items) => $body,
            PackedData::Int32($items) => $body,
            PackedData::Int64($items) => $body,
            PackedData::Float32($items) => $body,
            PackedData::Float64($items) => $body,
            PackedData::Strings($items) => $body,
            PackedData::Vector2($items) => $body,
            PackedData::Vector3($items) => $body,
            PackedData::Color($items) => $body,
        }
    };
}

impl PackedData {
    pub fn empty(ty: VariantType) -> PackedData {
        match ty {
            VARIANT_TYPE_PACKED_BYTE_ARRAY => PackedData::Bytes(Vec::new()),
            VARIANT_TYPE_PACKED_INT32_ARRAY => PackedData::Int32(Vec::new()),
            VARIANT_TYPE_PACKED_INT64_ARRAY => PackedData::Int64(Vec::new()),
            VARIANT_TYPE_PACKED_FLOAT32_ARRAY => PackedData::Float32(Vec::new()),
            VARIANT_TYPE_PACKED_STRING_ARRAY => PackedData::Strings(Vec::new()),
            VARIANT_TYPE_PACKED_VECTOR2_ARRAY => PackedData::Vector2(Vec::new()),
            VARIANT_TYPE_PACKED_VECTOR3_ARRAY => PackedData::Vector3(Vec::new()),
            VARIANT_TYPE_PACKED_COLOR_ARRAY => PackedData::Color(Vec::new()),
            _ => PackedData::Float64(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        for_each_packed!(self, items => items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resize(&mut self, len: usize) {
        match self {
            PackedData::Bytes(items) => items.resize(len, 0),
            PackedData::Int32(items) => items.resize(len, 0),
            PackedData::Int64(items) => items.resize(len, 0),
            PackedData::Float32(items) => items.resize(len, 0.0),
            PackedData::Float64(items) => items.resize(len, 0.0),
            PackedData::Strings(items) => items.resize(len, Rc::from("")),
            PackedData::Vector2(items) => items.resize(len, [0.0; 2]),
            PackedData::Vector3(items) => items.resize(len, [0.0; 3]),
            PackedData::Color(items) => items.resize(len, [0.0; 4]),
        }
    }

    /// Overwrites `index` (or appends when `index == len`) from a native element.
    unsafe fn store(&mut self, index: usize, element: *const c_void) {
        fn put<T>(items: &mut Vec<T>, index: usize, value: T) {
            if index == items.len() {
                items.push(value);
            } else {
                items[index] = value;
            }
        }
        unsafe {
            match self {
                PackedData::Bytes(items) => put(items, index, *(element as *const u8)),
                PackedData::Int32(items) => put(items, index, ptr::read_unaligned(element as *const i32)),
                PackedData::Int64(items) => put(items, index, ptr::read_unaligned(element as *const i64)),
                PackedData::Float32(items) => put(items, index, ptr::read_unaligned(element as *const f32)),
                PackedData::Float64(items) => put(items, index, ptr::read_unaligned(element as *const f64)),
                PackedData::Strings(items) => {
                    let text = match read_native(VARIANT_TYPE_STRING, element) {
                        Value::Str(text) => text,
                        _ => Rc::from(""),
                    };
                    put(items, index, text)
                }
                PackedData::Vector2(items) => put(items, index, ptr::read_unaligned(element as *const [f32; 2])),
                PackedData::Vector3(items) => put(items, index, ptr::read_unaligned(element as *const [f32; 3])),
                PackedData::Color(items) => put(items, index, ptr::read_unaligned(element as *const [f32; 4])),
            }
        }
    }

    /// Writes an owned copy of element `index` to `dst`.
    unsafe fn load(&self, index: usize, dst: *mut c_void) {
        unsafe {
            match self {
                PackedData::Bytes(items) => ptr::write(dst as *mut u8, items[index]),
                PackedData::Int32(items) => ptr::write_unaligned(dst as *mut i32, items[index]),
                PackedData::Int64(items) => ptr::write_unaligned(dst as *mut i64, items[index]),
                PackedData::Float32(items) => ptr::write_unaligned(dst as *mut f32, items[index]),
                PackedData::Float64(items) => ptr::write_unaligned(dst as *mut f64, items[index]),
                PackedData::Strings(items) => {
                    write_native(VARIANT_TYPE_STRING, Value::Str(items[index].clone()), dst)
                }
                PackedData::Vector2(items) => ptr::write_unaligned(dst as *mut [f32; 2], items[index]),
                PackedData::Vector3(items) => ptr::write_unaligned(dst as *mut [f32; 3], items[index]),
                PackedData::Color(items) => ptr::write_unaligned(dst as *mut [f32; 4], items[index]),
            }
        }
    }

    pub fn stringify(&self) -> String {
        let parts: Vec<String> = match self {
            PackedData::Bytes(items) => items.iter().map(|v| v.to_string()).collect(),
            PackedData::Int32(items) => items.iter().map(|v| v.to_string()).collect(),
            PackedData::Int64(items) => items.iter().map(|v| v.to_string()).collect(),
            PackedData::Float32(items) => items.iter().map(|v| v.to_string()).collect(),
            PackedData::Float64(items) => items.iter().map(|v| v.to_string()).collect(),
            PackedData::Strings(items) => items.iter().map(|v| v.to_string()).collect(),
            PackedData::Vector2(items) => items.iter().map(|v| format!("{v:?}")).collect(),
            PackedData::Vector3(items) => items.iter().map(|v| format!("{v:?}")).collect(),
            PackedData::Color(items) => items.iter().map(|v| format!("{v:?}")).collect(),
        };
        format!("[{}]", parts.join(", "))
    }
}

/// The packed storage behind a native packed array slot.
unsafe fn data<'a>(array: *const c_void) -> Option<&'a Rc<PackedData>> {
    let boxed = unsafe { *(array as *const *mut Value) };
    match unsafe { boxed.as_ref() } {
        Some(Value::Packed(_, data)) => Some(data),
        _ => None,
    }
}

unsafe fn data_mut<'a>(array: *mut c_void) -> Option<&'a mut PackedData> {
    let boxed = unsafe { *(array as *const *mut Value) };
    match unsafe { boxed.as_mut() } {
        Some(Value::Packed(_, data)) => Some(Rc::make_mut(data)),
        _ => None,
    }
}

unsafe extern "C" fn packed_new<const TY: VariantType>(r_dest: UninitTypePtr) {
    unsafe { write_native(TY, default_value(TY), r_dest) }
}

unsafe extern "C" fn packed_copy<const TY: VariantType>(r_dest: UninitTypePtr, src: ConstTypePtr) {
    unsafe { write_native(TY, read_native(TY, src), r_dest) }
}

unsafe extern "C" fn packed_destroy<const TY: VariantType>(array: TypePtr) {
    drop(unsafe { take_native(TY, array) });
}

unsafe extern "C" fn packed_size(array: ConstTypePtr) -> i64 {
    unsafe { data(array) }.map_or(0, |data| data.len() as i64)
}

unsafe extern "C" fn packed_resize(array: TypePtr, size: i64) -> Bool {
    match (unsafe { data_mut(array) }, usize::try_from(size)) {
        (Some(data), Ok(size)) => {
            data.resize(size);
            TRUE
        }
        _ => FALSE,
    }
}

unsafe extern "C" fn packed_append(array: TypePtr, element: ConstTypePtr) {
    if let Some(data) = unsafe { data_mut(array) } {
        let len = data.len();
        unsafe { data.store(len, element) };
    }
}

unsafe extern "C" fn packed_get(array: ConstTypePtr, index: i64, r_element: UninitTypePtr) -> Bool {
    let Some(data) = (unsafe { data(array) }) else {
        return FALSE;
    };
    match usize::try_from(index) {
        Ok(index) if index < data.len() => {
            unsafe { data.load(index, r_element) };
            TRUE
        }
        _ => FALSE,
    }
}

unsafe extern "C" fn packed_set(array: TypePtr, index: i64, element: ConstTypePtr) -> Bool {
    let Some(data) = (unsafe { data_mut(array) }) else {
        return FALSE;
    };
    match usize::try_from(index) {
        Ok(index) if index < data.len() => {
            unsafe { data.store(index, element) };
            TRUE
        }
        _ => FALSE,
    }
}

const fn interface<const TY: VariantType>() -> RawPackedArrayInterface {
    RawPackedArrayInterface {
        new: Some(packed_new::<TY>),
        copy: Some(packed_copy::<TY>),
        destroy: Some(packed_destroy::<TY>),
        size: Some(packed_size),
        resize: Some(packed_resize),
        append: Some(packed_append),
        get: Some(packed_get),
        set: Some(packed_set),
    }
}

static INTERFACES: [RawPackedArrayInterface; 9] = [
    interface::<VARIANT_TYPE_PACKED_BYTE_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_INT32_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_INT64_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_FLOAT32_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_FLOAT64_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_STRING_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_VECTOR2_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_VECTOR3_ARRAY>(),
    interface::<VARIANT_TYPE_PACKED_COLOR_ARRAY>(),
];

pub(crate) unsafe extern "C" fn packed_array_interface(ty: VariantType) -> *const RawPackedArrayInterface {
    match ty {
        VARIANT_TYPE_PACKED_BYTE_ARRAY..=VARIANT_TYPE_PACKED_COLOR_ARRAY => {
            &INTERFACES[(ty - VARIANT_TYPE_PACKED_BYTE_ARRAY) as usize]
        }
        _ => ptr::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_share_until_written() {
        let table = unsafe { &*packed_array_interface(VARIANT_TYPE_PACKED_INT32_ARRAY) };
        let mut a = [0u64; 2];
        let mut b = [0u64; 2];
        unsafe {
            (table.new.unwrap())(a.as_mut_ptr().cast());
            (table.append.unwrap())(a.as_mut_ptr().cast(), (&7i32 as *const i32).cast());
            (table.copy.unwrap())(b.as_mut_ptr().cast(), a.as_ptr().cast());
            (table.set.unwrap())(b.as_mut_ptr().cast(), 0, (&9i32 as *const i32).cast());

            let mut out = 0i32;
            (table.get.unwrap())(a.as_ptr().cast(), 0, (&mut out as *mut i32).cast());
            assert_eq!(out, 7);
            (table.get.unwrap())(b.as_ptr().cast(), 0, (&mut out as *mut i32).cast());
            assert_eq!(out, 9);
            assert_eq!((table.get.unwrap())(b.as_ptr().cast(), 1, (&mut out as *mut i32).cast()), FALSE);

            (table.destroy.unwrap())(a.as_mut_ptr().cast());
            (table.destroy.unwrap())(b.as_mut_ptr().cast());
        }
    }

    #[test]
    fn only_packed_types_have_an_interface() {
        assert!(unsafe { packed_array_interface(VARIANT_TYPE_ARRAY) }.is_null());
        assert!(!unsafe { packed_array_interface(VARIANT_TYPE_PACKED_COLOR_ARRAY) }.is_null());
    }
}
