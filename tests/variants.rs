mod common;

use extbind::prelude::*;
use extbind::VariantError;
use extbind_testengine as engine;

#[test]
fn utf8_text_keeps_its_bytes() {
    common::init();
    let text = "αβγ";
    let variant = Variant::from(text);
    assert_eq!(variant.kind(), VariantKind::String);

    let stored = unsafe { engine::variant_string_bytes(variant.sys()) }.unwrap();
    assert_eq!(stored, text.as_bytes());
    assert_eq!(stored.len(), 6);

    let back: String = variant.to().unwrap();
    assert_eq!(back.as_bytes(), text.as_bytes());

    let engine_string = GString::from(text);
    assert_eq!(engine_string.len(), 6);
    assert_eq!(engine_string, "αβγ");
}

#[test]
fn names_are_interned() {
    common::init();
    let a = StringName::new("changed");
    let b = StringName::from("changed");
    assert_eq!(a, b);
    assert_eq!(a.sys(), b.sys());
    assert_ne!(a, StringName::new("changed2"));
    assert_eq!(a.to_bytes(), b"changed");
}

#[test]
fn scalars_round_trip() {
    common::init();
    assert_eq!(Variant::from(&true).to::<bool>(), Ok(true));
    assert_eq!(Variant::from(&-7i64).to::<i64>(), Ok(-7));
    assert_eq!(Variant::from(&0.125f64).to::<f64>(), Ok(0.125));
    assert_eq!(
        Variant::from(&Vector2::new(1.0, 2.0)).to::<Vector2>(),
        Ok(Vector2::new(1.0, 2.0))
    );
    assert!(Variant::nil().is_nil());
    assert_eq!(Variant::default().kind(), VariantKind::Nil);
}

#[test]
fn wrong_kind_is_a_mismatch() {
    common::init();
    assert_eq!(
        Variant::from("3").to::<i64>(),
        Err(VariantError::KindMismatch {
            expected: VariantKind::Int,
            actual: VariantKind::String,
        })
    );
    assert!(Variant::nil().to::<Owned<Resource>>().is_err());
}

#[test]
fn stringify_uses_the_engine_text() {
    common::init();
    assert_eq!(Variant::from(&42i64).stringify(), "42");
    assert_eq!(Variant::nil().stringify(), "<null>");
    let array: VariantArray = [Variant::from(&1i64), Variant::from("a")].into_iter().collect();
    assert_eq!(array.to_variant().stringify(), "[1, a]");
}

#[test]
fn duplicate_separates_containers() {
    common::init();
    let inner: VariantArray = [Variant::from(&1i64)].into_iter().collect();
    let outer: VariantArray = [inner.to_variant()].into_iter().collect();
    let outer = outer.to_variant();

    let shallow = outer.duplicate(false);
    let deep = outer.duplicate(true);

    let mut shared_inner = outer.as_array().unwrap().get(0).unwrap();
    shared_inner.as_array_mut().unwrap().push(&Variant::from(&2i64));

    let inner_len = |variant: &Variant| {
        variant.as_array().unwrap().get(0).unwrap().as_array().unwrap().len()
    };
    assert_eq!(inner_len(&shallow), 2);
    assert_eq!(inner_len(&deep), 1);
}

#[test]
fn dictionaries_hold_any_kind() {
    common::init();
    let mut dict = Dictionary::new();
    dict.insert("name", "Ann");
    dict.insert(&3i64, &Vector2::new(0.5, 0.5));
    assert_eq!(dict.get("name").unwrap().to::<String>().as_deref(), Ok("Ann"));
    assert_eq!(dict.get(&3i64).unwrap().to::<Vector2>(), Ok(Vector2::new(0.5, 0.5)));
    assert!(dict.get(&4i64).is_none());
}

#[test]
fn packed_views_write_through() {
    common::init();
    let mut variant = PackedInt32Array::from_iter([1, 2, 3]).to_variant();
    variant.as_packed_mut::<i32>().unwrap().set(1, 20);
    assert_eq!(variant.to::<PackedInt32Array>().unwrap().to_vec(), vec![1, 20, 3]);
    assert!(variant.as_packed::<f32>().is_err());
}

#[test]
fn objects_travel_in_variants() {
    common::init();
    let resource = Owned::<Resource>::construct().unwrap();
    let variant = resource.to_variant();
    assert_eq!(variant.kind(), VariantKind::Object);
    let back: Owned<Resource> = variant.to().unwrap();
    assert_eq!(back, resource);
    assert_eq!(
        variant.to::<Owned<common::ValueBuffer>>().unwrap_err(),
        VariantError::ClassMismatch {
            expected: "ValueBuffer"
        }
    );
}
