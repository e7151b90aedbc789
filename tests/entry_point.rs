use std::cell::RefCell;

use extbind::entry::{self, current_level};
use extbind::prelude::*;
use extbind::sys;
use extbind_testengine as engine;

thread_local! {
    static LEVELS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(event: String) {
    LEVELS.with_borrow_mut(|levels| levels.push(event));
}

fn take_levels() -> Vec<String> {
    LEVELS.take()
}

struct Beacon {
    _base: HostBase<Beacon>,
}

impl HostClass for Beacon {
    const NAME: &'static str = "Beacon";
    type Base = Node;

    fn init(base: HostBase<Self>) -> Self {
        Beacon { _base: base }
    }

    fn register(builder: &mut ClassBuilder<Self>) {
        builder.method("strength", |_this: &mut Beacon| 7i64);
    }
}

struct BeaconLibrary;

impl ExtensionLibrary for BeaconLibrary {
    fn on_level_init(level: InitLevel) -> BindResult<()> {
        record(format!("init {level:?}"));
        if level == InitLevel::Scene {
            register_class::<Beacon>()?;
        }
        Ok(())
    }

    fn on_level_deinit(level: InitLevel) {
        record(format!("deinit {level:?}"));
    }
}

extbind::extension_entry!(beacon_library_init, BeaconLibrary);

struct StrictLibrary;

impl ExtensionLibrary for StrictLibrary {
    fn min_level() -> InitLevel {
        InitLevel::Core
    }

    fn on_level_init(level: InitLevel) -> BindResult<()> {
        record(format!("init {level:?}"));
        match level {
            InitLevel::Servers => Err(BindError::Registration("servers are not ready".to_owned())),
            InitLevel::Editor => panic!("no editor here"),
            _ => Ok(()),
        }
    }
}

fn load<L: ExtensionLibrary>() -> engine::LoadedLibrary {
    let _ = env_logger::builder().is_test(true).try_init();
    unsafe { engine::run_entry(Some(entry::entry_point::<L>), engine::interface()) }
        .expect("entry point accepts the engine")
}

#[test]
fn levels_register_and_unregister_classes() {
    let library = unsafe { engine::run_entry(Some(beacon_library_init), engine::interface()) }
        .expect("entry point accepts the engine");
    assert_eq!(library.minimum_level(), sys::INITIALIZATION_SCENE);

    library.initialize_all();
    assert_eq!(take_levels(), vec!["init Scene", "init Editor"]);
    assert_eq!(current_level(), InitLevel::Editor);
    assert!(engine::is_class_registered("Beacon"));

    let beacon = ValueHandle::<Beacon>::construct().unwrap();
    let strength = unsafe { engine::ptrcall(beacon.raw(), "strength", &[]) };
    assert_eq!(strength.as_int(), Some(7));
    unsafe { beacon.destroy() };

    library.deinitialize_all();
    assert_eq!(take_levels(), vec!["deinit Editor", "deinit Scene"]);
    assert!(!engine::is_class_registered("Beacon"));
    assert!(!extbind::dispatch::is_registered("Beacon"));
    assert!(engine::take_errors().is_empty());
}

#[test]
fn failing_levels_are_reported_and_skipped() {
    let library = load::<StrictLibrary>();
    assert_eq!(library.minimum_level(), sys::INITIALIZATION_CORE);

    library.initialize_all();
    assert_eq!(
        take_levels(),
        vec!["init Core", "init Servers", "init Scene", "init Editor"]
    );
    let errors = engine::take_errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("initializing Servers failed: registration failed: servers are not ready"));
    assert!(errors[1].starts_with("initializing Editor panicked: no editor here"));
    library.deinitialize_all();
}

#[test]
fn loading_twice_reuses_the_binding() {
    let first = load::<BeaconLibrary>();
    let second = load::<StrictLibrary>();
    assert_eq!(first.minimum_level(), sys::INITIALIZATION_SCENE);
    assert_eq!(second.minimum_level(), sys::INITIALIZATION_CORE);
    assert!(Owned::<Resource>::construct().is_ok());
}

#[test]
fn missing_initialization_record_is_refused() {
    let accepted = unsafe {
        entry::entry_point::<BeaconLibrary>(engine::interface(), engine::library(), std::ptr::null_mut())
    };
    assert_eq!(accepted, sys::FALSE);
}
