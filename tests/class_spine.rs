mod common;

use std::mem::size_of;

use common::ValueBuffer;
use extbind::prelude::*;

fn ancestor<T: Inherits<B>, B: Class>() {}

#[test]
fn sprite_round_trips_through_its_parent() {
    common::init();
    let sprite = ValueHandle::<Sprite2D>::construct().unwrap();
    let node2d: ValueHandle<Node2D> = sprite.upcast();
    assert_eq!(node2d.raw(), sprite.raw());

    let back = node2d.downcast::<Sprite2D>().unwrap();
    assert_eq!(back, sprite);

    let object: ValueHandle<Object> = sprite.upcast();
    assert_eq!(
        object.downcast::<Resource>().unwrap_err(),
        BindError::DowncastFailed("Resource")
    );
    unsafe { sprite.destroy() };
}

#[test]
fn upcasts_are_reinterpretations() {
    assert_eq!(size_of::<Owned<Sprite2D>>(), size_of::<usize>());
    assert_eq!(size_of::<Option<Owned<Resource>>>(), size_of::<usize>());
    assert_eq!(size_of::<ValueHandle<Node2D>>(), size_of::<usize>());
    assert_eq!(size_of::<Borrowed<'static, Object>>(), size_of::<usize>());
    ancestor::<Sprite2D, Node2D>();
    ancestor::<Sprite2D, Object>();
    ancestor::<ValueBuffer, RefCounted>();
}

#[test]
fn ancestor_methods_through_deref() {
    common::init();
    let sprite = ValueHandle::<Sprite2D>::construct().unwrap();
    sprite.set_name("Hero").unwrap();
    sprite.set_position(Vector2::new(3.0, 4.0)).unwrap();
    assert_eq!(sprite.get_name().unwrap(), "Hero");
    assert_eq!(sprite.get_class().unwrap(), "Sprite2D");
    assert!(sprite.is_class("Node2D").unwrap());
    unsafe { sprite.destroy() };
}

#[test]
fn borrowed_casts_do_not_count() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let object: Borrowed<'_, Object> = buffer.as_borrowed().upcast();
    let counted = object.try_cast::<RefCounted>().unwrap();
    assert_eq!(counted.get_reference_count().unwrap(), 1);
    assert!(object.try_cast::<Node>().is_err());

    let owned = object.try_cast::<ValueBuffer>().unwrap().to_owned();
    assert_eq!(owned.get_reference_count().unwrap(), 2);
}

#[test]
fn refcounted_downcast_keeps_one_reference() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let counted: Owned<RefCounted> = buffer.upcast();
    assert_eq!(counted.get_reference_count().unwrap(), 1);
    let counted = counted.try_downcast::<Resource>().unwrap_err();
    let buffer = counted.downcast::<ValueBuffer>().unwrap();
    assert_eq!(buffer.get_reference_count().unwrap(), 1);
}
