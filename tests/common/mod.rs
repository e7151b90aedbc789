//! Shared setup for the integration tests.
//!
//! Every test binary loads the binding once against the in-process engine,
//! with the `ValueBuffer` class declared on top of the core manifest.

#![allow(dead_code)]

use std::sync::Once;

use extbind::prelude::*;
use extbind::{ClassManifest, MethodManifest, frame};

extbind::engine_class! {
    /// Growable float buffer, exercised through pointer calls.
    pub struct ValueBuffer: RefCounted, Object;
    memory = RefCountedMemory
}

impl ValueBuffer {
    pub fn append(&self, value: f64) -> BindResult<()> {
        frame::ptrcall(extbind::method_bind!("ValueBuffer", "append")?, self.raw(), (value,))
    }

    pub fn get(&self, index: i64) -> BindResult<f64> {
        frame::ptrcall(extbind::method_bind!("ValueBuffer", "get")?, self.raw(), (index,))
    }

    pub fn size(&self) -> BindResult<i64> {
        frame::ptrcall(extbind::method_bind!("ValueBuffer", "size")?, self.raw(), ())
    }

    pub fn get_data(&self) -> BindResult<PackedFloat64Array> {
        frame::ptrcall(extbind::method_bind!("ValueBuffer", "get_data")?, self.raw(), ())
    }

    pub fn set_data(&self, data: PackedFloat64Array) -> BindResult<()> {
        frame::ptrcall(extbind::method_bind!("ValueBuffer", "set_data")?, self.raw(), (data,))
    }
}

pub static MANIFEST: &[ClassManifest] = &[ClassManifest::new(
    "ValueBuffer",
    &[
        MethodManifest::new("append", &[VariantKind::Float], None),
        MethodManifest::new("get", &[VariantKind::Int], Some(VariantKind::Float)),
        MethodManifest::new("size", &[], Some(VariantKind::Int)),
        MethodManifest::new("get_data", &[], Some(VariantKind::PackedFloat64Array)),
        MethodManifest::new("set_data", &[VariantKind::PackedFloat64Array], None),
    ],
)];

pub fn config() -> BindingConfig {
    BindingConfig {
        manifest: MANIFEST,
        ..BindingConfig::default()
    }
}

/// Loads the binding for this test binary.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        let result = unsafe {
            extbind::initialize(
                extbind_testengine::interface(),
                extbind_testengine::library(),
                &config(),
            )
        };
        result.expect("test engine interface loads");
    });
}

/// Fails the test if the engine saw errors this thread did not expect.
pub fn assert_no_engine_errors() {
    let errors = extbind_testengine::take_errors();
    assert!(errors.is_empty(), "unexpected engine errors: {errors:?}");
}
