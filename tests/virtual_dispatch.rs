mod common;

use std::cell::Cell;

use extbind::dispatch::{is_registered, registered_classes, registered_methods};
use extbind::prelude::*;
use extbind_testengine::{self as engine, Value};

thread_local! {
    static DROPS: Cell<u32> = const { Cell::new(0) };
}

struct Mover {
    base: HostBase<Mover>,
    elapsed: f64,
    ticks: i64,
}

impl HostClass for Mover {
    const NAME: &'static str = "Mover";
    type Base = Node;

    fn init(base: HostBase<Self>) -> Self {
        Mover {
            base,
            elapsed: 0.0,
            ticks: 0,
        }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder
            .virtual_method("_process", |this: &mut Mover, delta: f64| {
                this.elapsed += delta;
                this.ticks += 1;
            })
            .virtual_method("_physics_process", |_this: &mut Mover, delta: f64| {
                if delta >= 0.0 {
                    panic!("physics exploded");
                }
            })
            .virtual_method("_to_string", |this: &mut Mover| format!("Mover after {} ticks", this.ticks))
            .method("ticks", |this: &mut Mover| this.ticks)
            .method("scaled", |this: &mut Mover, factor: f64| this.elapsed * factor)
            .method("checked_ratio", |_this: &mut Mover, a: i64, b: i64| {
                if b == 0 {
                    Err("division by zero")
                } else {
                    Ok(a / b)
                }
            })
            .method("rename", |this: &mut Mover, name: String| this.base.set_name(&name))
            .signal("arrived", &[("after", VariantKind::Float)]);
    }
}

impl Drop for Mover {
    fn drop(&mut self) {
        DROPS.set(DROPS.get() + 1);
    }
}

struct Tally {
    _base: HostBase<Tally>,
    count: i64,
}

impl HostClass for Tally {
    const NAME: &'static str = "Tally";
    type Base = RefCounted;

    fn init(base: HostBase<Self>) -> Self {
        Tally { _base: base, count: 0 }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.method("bump", |this: &mut Tally, by: i64| {
            this.count += by;
            this.count
        });
    }
}

impl Drop for Tally {
    fn drop(&mut self) {
        DROPS.set(DROPS.get() + 100);
    }
}

#[test]
fn engine_drives_process_override() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    assert_eq!(unsafe { engine::class_of(mover.raw()) }, Some("Mover"));

    for _ in 0..2 {
        let result = unsafe { engine::call_virtual(mover.raw(), "_process", &[Value::Float(0.016)]) };
        assert!(result.is_some());
    }
    {
        let state = mover.bind().unwrap();
        assert_eq!(state.ticks, 2);
        assert!((state.elapsed - 0.032).abs() < 1e-12);
    }
    assert_eq!(engine::virtual_resolutions("Mover"), 1);

    unsafe { mover.destroy() };
    assert_eq!(DROPS.get(), 1);
    unregister_class::<Mover>().unwrap();
    common::assert_no_engine_errors();
}

#[test]
fn missing_overrides_fall_back_to_the_engine() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    assert!(unsafe { engine::call_virtual(mover.raw(), "_ready", &[]) }.is_none());
    unsafe { mover.destroy() };
    unregister_class::<Mover>().unwrap();
}

#[test]
fn panicking_override_is_contained() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    let result = unsafe { engine::call_virtual(mover.raw(), "_physics_process", &[Value::Float(0.1)]) };
    assert!(result.is_some());
    let errors = engine::take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Mover::_physics_process: physics exploded"));

    // The instance stays usable.
    unsafe { engine::call_virtual(mover.raw(), "_process", &[Value::Float(1.0)]) };
    assert_eq!(mover.bind().unwrap().ticks, 1);
    unsafe { mover.destroy() };
    unregister_class::<Mover>().unwrap();
}

#[test]
fn host_methods_by_either_convention() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    unsafe { engine::call_virtual(mover.raw(), "_process", &[Value::Float(0.5)]) };

    let ticks = unsafe { engine::ptrcall(mover.raw(), "ticks", &[]) };
    assert_eq!(ticks.as_int(), Some(1));
    let scaled = unsafe { engine::call(mover.raw(), "scaled", vec![Value::Float(4.0)]) }.unwrap();
    assert_eq!(scaled.as_float(), Some(2.0));

    let through_binding = mover.base().call("ticks", &[]).unwrap();
    assert_eq!(through_binding.to::<i64>(), Ok(1));
    assert_eq!(
        mover.base().call("scaled", &[Variant::from("x")]).unwrap_err(),
        BindError::Call(CallError::InvalidArgument {
            argument: 0,
            expected: VariantKind::Float,
        })
    );

    mover.base().call("rename", &[Variant::from("Runner")]).unwrap();
    assert_eq!(mover.base().get_name().unwrap(), "Runner");
    unsafe { mover.destroy() };
    unregister_class::<Mover>().unwrap();
}

#[test]
fn host_errors_become_default_values() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    let ok = unsafe { engine::ptrcall(mover.raw(), "checked_ratio", &[Value::Int(9), Value::Int(3)]) };
    assert_eq!(ok.as_int(), Some(3));
    let failed = unsafe { engine::ptrcall(mover.raw(), "checked_ratio", &[Value::Int(9), Value::Int(0)]) };
    assert_eq!(failed.as_int(), Some(0));
    let errors = engine::take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("division by zero"));
    unsafe { mover.destroy() };
    unregister_class::<Mover>().unwrap();
}

#[test]
fn to_string_override_feeds_stringify() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    unsafe { engine::call_virtual(mover.raw(), "_process", &[Value::Float(0.1)]) };
    assert_eq!(mover.base().stringify().unwrap(), "Mover after 1 ticks");
    unsafe { mover.destroy() };
    unregister_class::<Mover>().unwrap();
}

#[test]
fn host_signals_are_declared() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    let heard = std::rc::Rc::new(Cell::new(0.0));
    let on_arrived = {
        let heard = heard.clone();
        Callable::from_fn("on_arrived", move |after: f64| heard.set(after))
    };
    mover.base().connect("arrived", &on_arrived).unwrap();
    mover.base().emit_signal("arrived", &[Variant::from(&2.5f64)]).unwrap();
    assert_eq!(heard.get(), 2.5);
    unsafe { mover.destroy() };
    unregister_class::<Mover>().unwrap();
}

#[test]
fn refcounted_host_class_dies_with_its_last_handle() {
    common::init();
    register_class::<Tally>().unwrap();
    let mut tally = Owned::<Tally>::construct().unwrap();
    assert_eq!(tally.base().call("bump", &[Variant::from(&2i64)]).unwrap().to::<i64>(), Ok(2));
    tally.bind_mut().unwrap().count += 5;
    assert_eq!(tally.bind().unwrap().count, 7);

    let id = tally.instance_id();
    let copy = tally.clone();
    drop(tally);
    assert_eq!(DROPS.get(), 0);
    drop(copy);
    assert_eq!(DROPS.get(), 100);
    assert!(!engine::is_alive(id));
    unregister_class::<Tally>().unwrap();
}

#[test]
fn held_borrow_refuses_engine_calls() {
    common::init();
    register_class::<Tally>().unwrap();
    let mut tally = Owned::<Tally>::construct().unwrap();
    let raw = tally.raw();
    let guard = tally.bind_mut().unwrap();
    let result = unsafe { engine::call(raw, "bump", vec![Value::Int(1)]) };
    assert!(result.is_err());
    drop(guard);
    assert_eq!(tally.bind().unwrap().count, 0);
    unregister_class::<Tally>().unwrap();
}

#[test]
fn registration_is_checked() {
    common::init();
    register_class::<Mover>().unwrap();
    assert!(is_registered("Mover"));
    assert!(engine::is_class_registered("Mover"));
    assert!(matches!(register_class::<Mover>(), Err(BindError::Registration(_))));
    assert_eq!(registered_classes(), vec!["Mover"]);
    let methods = registered_methods("Mover").unwrap();
    assert_eq!(methods, ["ticks", "scaled", "checked_ratio", "rename"]);

    unregister_class::<Mover>().unwrap();
    assert!(!is_registered("Mover"));
    assert!(registered_methods("Mover").is_none());
    assert!(!engine::is_class_registered("Mover"));
    assert!(unregister_class::<Mover>().is_err());
}

#[test]
fn host_classes_cast_like_engine_classes() {
    common::init();
    register_class::<Mover>().unwrap();
    let mover = ValueHandle::<Mover>::construct().unwrap();
    let node: ValueHandle<Node> = mover.upcast();
    assert!(node.downcast::<Mover>().is_ok());
    assert!(node.downcast::<Node2D>().is_err());
    unsafe { mover.destroy() };
    unregister_class::<Mover>().unwrap();
}
