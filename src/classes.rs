//! Wrappers for the engine classes the core itself relies on.
//!
//! Everything else is declared by whoever needs it, with
//! [`engine_class!`](crate::engine_class) and a manifest entry.

use std::mem::MaybeUninit;

use extbind_sys as sys;

use crate::class::{Class, DynamicMemory, EngineClass, Inherits, ManualMemory, RefCountedMemory};
use crate::error::{BindError, BindResult};
use crate::frame::{self, CallFrame};
use crate::handle::{Borrowed, singleton};
use crate::loader;
use crate::string_name::StringName;
use crate::variant::{ToVariant, Variant, Vector2};

/// Root of the class hierarchy.
///
/// Whether an `Object` is reference counted depends on its runtime class.
#[repr(transparent)]
pub struct Object {
    opaque: sys::ObjectPtr,
}

unsafe impl Class for Object {
    const NAME: &'static str = "Object";
    type Base = Object;
    type Memory = DynamicMemory;
}

unsafe impl EngineClass for Object {
    fn object_ptr(&self) -> sys::ObjectPtr {
        self.opaque
    }
}

unsafe impl Inherits<Object> for Object {}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object({:p})", self.opaque)
    }
}

impl Object {
    pub fn raw(&self) -> sys::ObjectPtr {
        self.opaque
    }

    pub fn instance_id(&self) -> sys::InstanceId {
        unsafe { (loader::fns().object_get_instance_id)(self.raw()) }
    }

    /// Name of the object's runtime class.
    pub fn get_class(&self) -> BindResult<String> {
        frame::ptrcall(crate::method_bind!("Object", "get_class")?, self.raw(), ())
    }

    pub fn is_class(&self, class: &str) -> BindResult<bool> {
        frame::ptrcall(
            crate::method_bind!("Object", "is_class")?,
            self.raw(),
            (class.to_owned(),),
        )
    }

    /// Calls a method by name through the variant convention.
    ///
    /// Reaches engine methods, host methods and script methods alike.
    pub fn call(&self, method: impl Into<StringName>, args: &[Variant]) -> BindResult<Variant> {
        let bind = crate::method_bind!("Object", "call")?;
        let method: StringName = method.into();
        let mut frame = CallFrame::varcall();
        frame.arg(method);
        for arg in args {
            frame.arg_variant(arg.clone());
        }
        frame.invoke(bind, self.raw())?;
        Ok(frame.take_variant()?)
    }

    /// Reads a property through the engine's property table.
    pub fn get(&self, property: impl Into<StringName>) -> BindResult<Variant> {
        let property = property.into();
        let mut value = MaybeUninit::<Variant>::uninit();
        let found = unsafe {
            (loader::fns().object_get_property)(
                self.raw(),
                property.sys(),
                value.as_mut_ptr().cast(),
            )
        };
        let value = unsafe { value.assume_init() };
        if !sys::to_bool(found) {
            return Err(BindError::UnknownProperty(property.to_string()));
        }
        Ok(value)
    }

    pub fn set<V: ToVariant + ?Sized>(
        &self,
        property: impl Into<StringName>,
        value: &V,
    ) -> BindResult<()> {
        let property = property.into();
        let value = value.to_variant();
        let stored = unsafe {
            (loader::fns().object_set_property)(self.raw(), property.sys(), value.sys())
        };
        if !sys::to_bool(stored) {
            return Err(BindError::UnknownProperty(property.to_string()));
        }
        Ok(())
    }

    /// The object's text form, which host classes may override with `_to_string`.
    pub fn stringify(&self) -> BindResult<String> {
        frame::ptrcall(crate::method_bind!("Object", "to_string")?, self.raw(), ())
    }
}

crate::engine_class! {
    /// Base of every reference-counted class.
    pub struct RefCounted: Object;
    memory = RefCountedMemory
}

impl RefCounted {
    pub fn get_reference_count(&self) -> BindResult<i64> {
        frame::ptrcall(
            crate::method_bind!("RefCounted", "get_reference_count")?,
            self.raw(),
            (),
        )
    }
}

crate::engine_class! {
    /// Serializable data container. Emits `changed` when edited.
    pub struct Resource: RefCounted, Object;
    memory = RefCountedMemory
}

crate::engine_class! {
    /// Element of the scene tree.
    pub struct Node: Object;
    memory = ManualMemory
}

impl Node {
    pub fn set_name(&self, name: &str) -> BindResult<()> {
        frame::ptrcall(
            crate::method_bind!("Node", "set_name")?,
            self.raw(),
            (name.to_owned(),),
        )
    }

    pub fn get_name(&self) -> BindResult<StringName> {
        frame::ptrcall(crate::method_bind!("Node", "get_name")?, self.raw(), ())
    }
}

crate::engine_class! {
    pub struct Node2D: Node, Object;
    memory = ManualMemory
}

impl Node2D {
    pub fn set_position(&self, position: Vector2) -> BindResult<()> {
        frame::ptrcall(
            crate::method_bind!("Node2D", "set_position")?,
            self.raw(),
            (position,),
        )
    }

    pub fn get_position(&self) -> BindResult<Vector2> {
        frame::ptrcall(crate::method_bind!("Node2D", "get_position")?, self.raw(), ())
    }
}

crate::engine_class! {
    pub struct Sprite2D: Node2D, Node, Object;
    memory = ManualMemory
}

crate::engine_class! {
    /// Engine-wide information; a singleton.
    pub struct Engine: Object;
    memory = ManualMemory
}

impl Engine {
    pub fn singleton() -> Option<Borrowed<'static, Engine>> {
        singleton::<Engine>()
    }

    pub fn get_version_string(&self) -> BindResult<String> {
        frame::ptrcall(
            crate::method_bind!("Engine", "get_version_string")?,
            self.raw(),
            (),
        )
    }

    pub fn get_frames_drawn(&self) -> BindResult<i64> {
        frame::ptrcall(crate::method_bind!("Engine", "get_frames_drawn")?, self.raw(), ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Owned, ValueHandle};

    #[test]
    fn typed_engine_calls() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node2D>::construct().unwrap();
        node.set_name("Player").unwrap();
        assert_eq!(node.get_name().unwrap(), "Player");
        node.set_position(Vector2::new(4.0, -2.0)).unwrap();
        assert_eq!(node.get_position().unwrap(), Vector2::new(4.0, -2.0));
        assert_eq!(node.get_class().unwrap(), "Node2D");
        assert!(node.is_class("Node").unwrap());
        assert!(!node.is_class("Resource").unwrap());
        unsafe { node.destroy() };
    }

    #[test]
    fn dynamic_calls_and_properties() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let class = node.call("get_class", &[]).unwrap();
        assert_eq!(class.to::<String>().as_deref(), Ok("Node"));

        node.set("name", "Root").unwrap();
        assert_eq!(node.get("name").unwrap().to::<StringName>().unwrap(), "Root");
        assert!(matches!(node.get("missing"), Err(BindError::UnknownProperty(_))));
        assert_eq!(
            node.set("name", &5i64),
            Err(BindError::UnknownProperty("name".to_owned()))
        );
        unsafe { node.destroy() };
    }

    #[test]
    fn reference_count_is_visible() {
        crate::loader::test_support::init();
        let resource = Owned::<Resource>::construct().unwrap();
        let copy = resource.clone();
        assert_eq!(resource.get_reference_count().unwrap(), 2);
        drop(copy);
        assert_eq!(resource.get_reference_count().unwrap(), 1);
    }

    #[test]
    fn engine_singleton() {
        crate::loader::test_support::init();
        let engine = Engine::singleton().unwrap();
        assert_eq!(engine.get_version_string().unwrap(), "4.2.0-testengine");
        assert!(engine.get_frames_drawn().unwrap() >= 0);
        assert!(engine.stringify().unwrap().starts_with("<Engine#"));
    }
}
