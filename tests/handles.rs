mod common;

use common::ValueBuffer;
use extbind::handle::{AnyObject, construct_by_name};
use extbind::prelude::*;
use extbind_testengine as engine;

#[test]
fn value_buffer_round_trip_and_release() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let raw = buffer.raw();
    let id = buffer.instance_id();

    for value in [1.5, 2.5, 3.5] {
        buffer.append(value).unwrap();
    }
    assert_eq!(buffer.get(1).unwrap(), 2.5);
    assert_eq!(buffer.size().unwrap(), 3);
    assert_eq!(buffer.get_data().unwrap().to_vec(), vec![1.5, 2.5, 3.5]);
    assert_eq!(unsafe { engine::refcount(raw) }, 1);

    drop(buffer);
    assert_eq!(unsafe { engine::refcount(raw) }, 0);
    assert!(!engine::is_alive(id));
    common::assert_no_engine_errors();
}

#[test]
fn packed_data_goes_both_ways() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let data: PackedFloat64Array = [0.25, 0.5].into_iter().collect();
    buffer.set_data(data).unwrap();
    assert_eq!(buffer.size().unwrap(), 2);
    assert_eq!(buffer.get(0).unwrap(), 0.25);
}

#[test]
fn out_of_range_index_is_the_engines_error() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    assert_eq!(buffer.get(7).unwrap(), 0.0);
    let errors = engine::take_errors();
    assert_eq!(errors, vec!["index 7 out of bounds".to_owned()]);
}

#[test]
fn clones_share_one_object() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let raw = buffer.raw();
    let copy = buffer.clone();
    assert_eq!(copy, buffer);
    assert_eq!(unsafe { engine::refcount(raw) }, 2);
    copy.append(9.0).unwrap();
    assert_eq!(buffer.size().unwrap(), 1);
    drop(copy);
    assert_eq!(unsafe { engine::refcount(raw) }, 1);
}

#[test]
fn instance_refs_do_not_keep_objects_alive() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let weak = buffer.downgrade();
    assert!(weak.is_alive());
    {
        let strong = weak.upgrade().unwrap();
        assert_eq!(strong.get_reference_count().unwrap(), 2);
    }
    drop(buffer);
    assert!(!weak.is_alive());
    assert_eq!(weak.resolve().unwrap_err(), BindError::DeadReference(weak.id()));
    assert!(weak.upgrade().is_err());
}

#[test]
fn manual_objects_live_until_destroyed() {
    common::init();
    let before = engine::live_objects();
    let node = ValueHandle::<Node>::construct().unwrap();
    let copy = node;
    assert_eq!(copy, node);
    assert_eq!(engine::live_objects(), before + 1);
    let weak = node.downgrade();
    unsafe { node.destroy() };
    assert!(!weak.is_alive());
    assert_eq!(engine::live_objects(), before);
}

#[test]
fn singleton_lookup() {
    common::init();
    let engine_object = singleton_by_name("Engine").expect("engine singleton");
    assert_eq!(engine_object.get_class().unwrap(), "Engine");
    assert!(singleton_by_name("DefinitelyNotASingleton").is_none());

    let typed = Engine::singleton().unwrap();
    assert_eq!(typed.raw(), engine_object.raw());
    engine::advance_frames(3);
    assert!(typed.get_frames_drawn().unwrap() >= 3);
    let _ = engine::take_errors();
}

#[test]
fn runtime_class_picks_the_handle() {
    common::init();
    match construct_by_name("ValueBuffer").unwrap() {
        AnyObject::Counted(object) => assert_eq!(object.get_class().unwrap(), "ValueBuffer"),
        AnyObject::Value(_) => panic!("ValueBuffer is reference counted"),
    }
    match construct_by_name("Node2D").unwrap() {
        AnyObject::Value(node) => unsafe { node.destroy() },
        AnyObject::Counted(_) => panic!("Node2D is manually managed"),
    }
    assert!(construct_by_name("NoSuchClass").is_err());
    let _ = engine::take_errors();
}
