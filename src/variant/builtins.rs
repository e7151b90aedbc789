//! Plain-data kinds: numbers and the math types.
//!
//! These have no engine-side storage; their native layout is their bytes.

use std::ptr;

use extbind_sys as sys;

use crate::marshal::FfiType;
use crate::variant::VariantKind;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2::new(0.0, 0.0);

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vector2i {
    pub x: i32,
    pub y: i32,
}

impl Vector2i {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect2 {
    pub position: Vector2,
    pub size: Vector2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2i {
    pub position: Vector2i,
    pub size: Vector2i,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vector3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// 2D affine transform: two basis columns and the origin.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    pub a: Vector2,
    pub b: Vector2,
    pub origin: Vector2,
}

impl Transform2D {
    pub const IDENTITY: Transform2D = Transform2D {
        a: Vector2::new(1.0, 0.0),
        b: Vector2::new(0.0, 1.0),
        origin: Vector2::ZERO,
    };
}

impl Default for Transform2D {
    fn default() -> Self {
        Transform2D::IDENTITY
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vector4i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub w: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    pub normal: Vector3,
    pub d: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub position: Vector3,
    pub size: Vector3,
}

/// 3x3 matrix, stored as rows.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub rows: [Vector3; 3],
}

impl Basis {
    pub const IDENTITY: Basis = Basis {
        rows: [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ],
    };
}

impl Default for Basis {
    fn default() -> Self {
        Basis::IDENTITY
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform3D {
    pub basis: Basis,
    pub origin: Vector3,
}

/// 4x4 matrix, stored as columns.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Projection {
    pub columns: [Vector4; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Opaque server-side resource id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rid(pub u64);

macro_rules! impl_pod_ffi {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            const _: () = assert!(
                std::mem::size_of::<$ty>() == sys::payload_size(VariantKind::$kind as u32)
            );

            unsafe impl FfiType for $ty {
                const KIND: VariantKind = VariantKind::$kind;

                unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
                    unsafe { ptr::read_unaligned(ptr.cast::<$ty>()) }
                }

                fn default_value() -> Self {
                    <$ty as Default>::default()
                }
            }
        )*

        impl_native_codec!($($ty),*);
    };
}

impl_pod_ffi!(
    i64 => Int,
    f64 => Float,
    Vector2 => Vector2,
    Vector2i => Vector2i,
    Rect2 => Rect2,
    Rect2i => Rect2i,
    Vector3 => Vector3,
    Vector3i => Vector3i,
    Transform2D => Transform2D,
    Vector4 => Vector4,
    Vector4i => Vector4i,
    Plane => Plane,
    Quaternion => Quaternion,
    Aabb => Aabb,
    Basis => Basis,
    Transform3D => Transform3D,
    Projection => Projection,
    Color => Color,
    Rid => Rid,
);

unsafe impl FfiType for bool {
    const KIND: VariantKind = VariantKind::Bool;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        sys::to_bool(unsafe { *ptr.cast::<sys::Bool>() })
    }

    fn default_value() -> Self {
        false
    }

    unsafe fn write_ptr(self, dst: sys::TypePtr) {
        unsafe { *dst.cast::<sys::Bool>() = sys::from_bool(self) };
    }

    unsafe fn take_ptr(src: sys::TypePtr) -> Self {
        sys::to_bool(unsafe { *src.cast::<sys::Bool>() })
    }
}

impl_native_codec!(bool);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;

    #[test]
    fn defaults_match_the_engine() {
        assert_eq!(Transform2D::default().a, Vector2::new(1.0, 0.0));
        assert_eq!(Quaternion::default().w, 1.0);
        assert_eq!(Basis::default().rows[2].z, 1.0);
        assert_eq!(std::mem::size_of::<Projection>(), sys::MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn plain_values_round_trip() {
        crate::loader::test_support::init();
        assert_eq!(Variant::from(&true).to::<bool>(), Ok(true));
        assert_eq!(Variant::from(&-9i64).to::<i64>(), Ok(-9));
        assert_eq!(Variant::from(&0.25f64).to::<f64>(), Ok(0.25));

        let position = Vector2::new(3.0, -4.5);
        let variant = Variant::from(&position);
        assert_eq!(variant.kind(), VariantKind::Vector2);
        assert_eq!(variant.to::<Vector2>(), Ok(position));

        let color = Color::rgba(0.1, 0.2, 0.3, 1.0);
        assert_eq!(Variant::from(&color).to::<Color>(), Ok(color));
        let normal = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(Variant::from(&normal).to::<Vector3>(), Ok(normal));
    }

    #[test]
    fn mismatched_kind_is_refused() {
        crate::loader::test_support::init();
        let variant = Variant::from(&Vector2::new(1.0, 2.0));
        assert_eq!(
            variant.to::<Vector3>(),
            Err(crate::error::VariantError::KindMismatch {
                expected: VariantKind::Vector3,
                actual: VariantKind::Vector2,
            })
        );
    }
}
