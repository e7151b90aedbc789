mod common;

use common::ValueBuffer;
use extbind::frame::{self, CallFrame, Convention};
use extbind::prelude::*;

#[test]
fn explicit_frame_lifecycle() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let append = extbind::method_bind!("ValueBuffer", "append").unwrap();
    let get = extbind::method_bind!("ValueBuffer", "get").unwrap();

    for value in [1.5, 2.5, 3.5] {
        let mut frame = CallFrame::new();
        frame.arg(value);
        assert_eq!(frame.arg_count(), 1);
        frame.invoke(append, buffer.raw()).unwrap();
        frame.free();
    }

    let mut frame = CallFrame::new();
    frame.arg(1i64);
    assert!(!frame.ret_slot(VariantKind::Float).is_null());
    frame.invoke(get, buffer.raw()).unwrap();
    assert_eq!(frame.take_return::<f64>(), Ok(2.5));
    frame.free();
    common::assert_no_engine_errors();
}

#[test]
fn untaken_returns_are_released_with_the_frame() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    buffer.append(4.0).unwrap();
    let get_data = extbind::method_bind!("ValueBuffer", "get_data").unwrap();
    for _ in 0..3 {
        let mut frame = CallFrame::new();
        frame.invoke(get_data, buffer.raw()).unwrap();
    }
    let data: PackedFloat64Array = frame::ptrcall(get_data, buffer.raw(), ()).unwrap();
    assert_eq!(data.to_vec(), vec![4.0]);
}

#[test]
fn return_is_taken_once_and_with_its_kind() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let size = extbind::method_bind!("ValueBuffer", "size").unwrap();
    let mut frame = CallFrame::new();
    frame.invoke(size, buffer.raw()).unwrap();
    assert!(frame.take_return::<f64>().is_err());
    assert_eq!(frame.take_return::<i64>(), Ok(0));
    assert!(frame.take_return::<i64>().is_err());
}

#[test]
fn variant_frames_carry_any_kind() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let call = extbind::method_bind!("Object", "call").unwrap();

    let mut frame = CallFrame::varcall();
    assert_eq!(frame.convention(), Convention::Variant);
    frame.arg(StringName::new("append")).arg(0.75f64);
    frame.invoke(call, buffer.raw()).unwrap();
    assert!(frame.take_variant().unwrap().is_nil());

    assert_eq!(buffer.size().unwrap(), 1);
    let value = buffer.call("get", &[Variant::from(&0i64)]).unwrap();
    assert_eq!(value.to::<f64>(), Ok(0.75));
}

#[test]
fn engine_argument_errors_surface_as_call_errors() {
    common::init();
    let buffer = Owned::<ValueBuffer>::construct().unwrap();
    let error = buffer.call("append", &[Variant::from("not a float")]).unwrap_err();
    assert_eq!(
        error,
        BindError::Call(CallError::InvalidArgument {
            argument: 0,
            expected: VariantKind::Float,
        })
    );
    let error = buffer.call("append", &[]).unwrap_err();
    assert_eq!(error, BindError::Call(CallError::TooFewArguments { expected: 1 }));
    assert_eq!(buffer.size().unwrap(), 0);
}

#[test]
fn properties_by_name() {
    common::init();
    let node = ValueHandle::<Node>::construct().unwrap();
    node.set("name", "Player").unwrap();
    assert_eq!(node.get("name").unwrap().to::<StringName>().unwrap(), "Player");
    assert_eq!(
        node.get("no_such_property").unwrap_err(),
        BindError::UnknownProperty("no_such_property".to_owned())
    );
    unsafe { node.destroy() };
    let _ = extbind_testengine::take_errors();
}
