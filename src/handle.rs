//! Handles to engine objects.
//!
//! | handle | holds | lifetime |
//! |---|---|---|
//! | [`Owned<T>`] | a strong reference | reference counted; last drop frees |
//! | [`ValueHandle<T>`] | the pointer | manual; [`ValueHandle::destroy`] frees |
//! | [`Borrowed<'a, T>`] | the pointer | no effect; bounded by `'a` |
//! | [`InstanceRef<T>`] | the instance id | none; resolved on every use |
//!
//! Upcasts are free and checked at compile time through
//! [`Inherits`](crate::class::Inherits). Downcasts ask the engine and fail
//! with [`BindError::DowncastFailed`].

use std::cell::{Ref, RefMut};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use extbind_sys as sys;

use crate::class::{
    Class, DynamicMemory, EngineClass, HostClass, Inherits, ManualMemory, Memory, RefCountedMemory,
    is_instance_of,
};
use crate::classes::Object;
use crate::diagnostics::report_error;
use crate::dispatch::InstanceStorage;
use crate::error::{BindError, BindResult, VariantError};
use crate::loader::{self, MethodBind};
use crate::marshal::FfiType;
use crate::string_name::StringName;
use crate::variant::{FromVariant, ToVariant, Variant, VariantKind};

fn refcount_call(raw: sys::ObjectPtr, bind: BindResult<&'static MethodBind>) -> bool {
    match bind {
        Ok(bind) => {
            let mut ret = sys::FALSE;
            unsafe {
                (loader::fns().object_method_bind_ptrcall)(
                    bind.sys(),
                    raw,
                    ptr::null(),
                    ptr::from_mut(&mut ret).cast(),
                )
            };
            sys::to_bool(ret)
        }
        Err(error) => {
            report_error(&error.to_string());
            false
        }
    }
}

fn reference(raw: sys::ObjectPtr) {
    refcount_call(raw, crate::method_bind!("RefCounted", "reference"));
}

/// True when the count dropped to zero and the caller must free the object.
fn unreference(raw: sys::ObjectPtr) -> bool {
    refcount_call(raw, crate::method_bind!("RefCounted", "unreference"))
}

fn instance_id_of(raw: sys::ObjectPtr) -> sys::InstanceId {
    unsafe { (loader::fns().object_get_instance_id)(raw) }
}

unsafe fn deref_raw<T>(raw: &NonNull<c_void>) -> &T {
    unsafe { &*ptr::from_ref(raw).cast::<T>() }
}

unsafe fn host_storage<'a, T: HostClass>(raw: sys::ObjectPtr) -> BindResult<&'a InstanceStorage<T>> {
    let instance = unsafe { (loader::fns().object_get_instance)(raw) };
    unsafe { InstanceStorage::<T>::from_instance(instance) }
        .ok_or(BindError::DowncastFailed(<T as HostClass>::NAME))
}

/// Reads an object pointer out of a variant, refusing nil and null.
fn object_from_variant(variant: &Variant) -> Result<sys::ObjectPtr, VariantError> {
    if variant.is_nil() {
        return Err(VariantError::NullObject);
    }
    variant.expect_kind(VariantKind::Object)?;
    let to_native = loader::kind_fns(VariantKind::Object).to_native;
    let mut raw: sys::ObjectPtr = ptr::null_mut();
    unsafe { to_native(ptr::from_mut(&mut raw).cast(), variant.sys_mut()) };
    if raw.is_null() {
        return Err(VariantError::NullObject);
    }
    Ok(raw)
}

fn object_to_variant(raw: sys::ObjectPtr) -> Variant {
    let from_native = loader::kind_fns(VariantKind::Object).from_native;
    let mut raw = raw;
    unsafe { Variant::new_with(|dst| from_native(dst, ptr::from_mut(&mut raw).cast())) }
}

/// A strong reference to a reference-counted object.
///
/// Cloning adds a reference; dropping the last one frees the object.
#[repr(transparent)]
pub struct Owned<T: Class> {
    raw: NonNull<c_void>,
    _class: PhantomData<*const T>,
}

impl<T: Class> Owned<T> {
    /// Adopts a reference the caller already holds.
    ///
    /// # Safety
    /// `raw` must be null or a live object of class `T` whose reference is
    /// handed over.
    pub unsafe fn from_raw_owned(raw: sys::ObjectPtr) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            _class: PhantomData,
        })
    }

    /// Takes a new reference to an object someone else keeps alive.
    ///
    /// # Safety
    /// `raw` must be null or a live object of class `T`.
    pub unsafe fn from_raw_shared(raw: sys::ObjectPtr) -> Option<Self> {
        let owned = unsafe { Self::from_raw_owned(raw) }?;
        if T::Memory::is_refcounted(raw) {
            reference(raw);
        }
        Some(owned)
    }

    pub fn raw(&self) -> sys::ObjectPtr {
        self.raw.as_ptr()
    }

    /// Gives up the reference without releasing it.
    pub fn into_raw(self) -> sys::ObjectPtr {
        ManuallyDrop::new(self).raw()
    }

    pub fn instance_id(&self) -> sys::InstanceId {
        instance_id_of(self.raw())
    }

    pub fn as_borrowed(&self) -> Borrowed<'_, T> {
        Borrowed {
            raw: self.raw,
            _lifetime: PhantomData,
        }
    }

    pub fn downgrade(&self) -> InstanceRef<T> {
        InstanceRef::new(self.instance_id())
    }

    pub fn upcast<B: Class>(self) -> Owned<B>
    where
        T: Inherits<B>,
    {
        let raw = self.raw;
        std::mem::forget(self);
        Owned {
            raw,
            _class: PhantomData,
        }
    }

    /// Checked cast towards a derived class, handing `self` back on failure.
    pub fn try_downcast<U: Inherits<T>>(self) -> Result<Owned<U>, Self> {
        if is_instance_of::<U>(self.raw()) {
            let raw = self.raw;
            std::mem::forget(self);
            Ok(Owned {
                raw,
                _class: PhantomData,
            })
        } else {
            Err(self)
        }
    }

    pub fn downcast<U: Inherits<T>>(self) -> BindResult<Owned<U>> {
        self.try_downcast()
            .map_err(|_| BindError::DowncastFailed(U::NAME))
    }
}

impl<T: Class<Memory = RefCountedMemory>> Owned<T> {
    /// Constructs a new instance through the engine.
    pub fn construct() -> BindResult<Self> {
        let raw = unsafe { (loader::fns().classdb_construct_object)(StringName::new(T::NAME).sys()) };
        unsafe { Self::from_raw_owned(raw) }.ok_or_else(|| BindError::ConstructFailed(T::NAME.to_owned()))
    }
}

impl<T: HostClass> Owned<T> {
    /// The engine object underneath, for calling engine methods.
    pub fn base(&self) -> Borrowed<'_, <T as HostClass>::Base> {
        Borrowed {
            raw: self.raw,
            _lifetime: PhantomData,
        }
    }

    /// Shared access to the host instance.
    pub fn bind(&self) -> BindResult<Ref<'_, T>> {
        unsafe { host_storage::<T>(self.raw()) }?.borrow().map_err(BindError::from)
    }

    pub fn bind_mut(&mut self) -> BindResult<RefMut<'_, T>> {
        unsafe { host_storage::<T>(self.raw()) }?.borrow_mut().map_err(BindError::from)
    }
}

impl<T: Class> Clone for Owned<T> {
    fn clone(&self) -> Self {
        if T::Memory::is_refcounted(self.raw()) {
            reference(self.raw());
        }
        Self {
            raw: self.raw,
            _class: PhantomData,
        }
    }
}

impl<T: Class> Drop for Owned<T> {
    fn drop(&mut self) {
        if loader::try_binding().is_none() {
            return;
        }
        let raw = self.raw();
        if T::Memory::is_refcounted(raw) && unreference(raw) {
            log::trace!("last reference to {} dropped", T::NAME);
            unsafe { (loader::fns().object_destroy)(raw) };
        }
    }
}

impl<T: Class> PartialEq for Owned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: Class> Eq for Owned<T> {}

impl<T: Class> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owned<{}>(#{})", T::NAME, self.instance_id())
    }
}

impl<T: EngineClass> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { deref_raw(&self.raw) }
    }
}

/// A handle to a manually managed object.
///
/// Copies do not affect the object; freeing it is explicit.
#[repr(transparent)]
pub struct ValueHandle<T: Class> {
    raw: NonNull<c_void>,
    _class: PhantomData<*const T>,
}

impl<T: Class> ValueHandle<T> {
    /// # Safety
    /// `raw` must be null or a live object of class `T`.
    pub unsafe fn from_raw(raw: sys::ObjectPtr) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            _class: PhantomData,
        })
    }

    pub fn raw(&self) -> sys::ObjectPtr {
        self.raw.as_ptr()
    }

    pub fn instance_id(&self) -> sys::InstanceId {
        instance_id_of(self.raw())
    }

    pub fn as_borrowed(&self) -> Borrowed<'_, T> {
        Borrowed {
            raw: self.raw,
            _lifetime: PhantomData,
        }
    }

    pub fn downgrade(&self) -> InstanceRef<T> {
        InstanceRef::new(self.instance_id())
    }

    pub fn upcast<B: Class>(self) -> ValueHandle<B>
    where
        T: Inherits<B>,
    {
        ValueHandle {
            raw: self.raw,
            _class: PhantomData,
        }
    }

    pub fn downcast<U: Inherits<T>>(self) -> BindResult<ValueHandle<U>> {
        if is_instance_of::<U>(self.raw()) {
            Ok(ValueHandle {
                raw: self.raw,
                _class: PhantomData,
            })
        } else {
            Err(BindError::DowncastFailed(U::NAME))
        }
    }

    /// Frees the object.
    ///
    /// # Safety
    /// No copy of this handle may be used afterwards.
    pub unsafe fn destroy(self) {
        unsafe { (loader::fns().object_destroy)(self.raw()) };
    }
}

impl<T: Class<Memory = ManualMemory>> ValueHandle<T> {
    /// Constructs a new instance through the engine; the caller frees it.
    pub fn construct() -> BindResult<Self> {
        let raw = unsafe { (loader::fns().classdb_construct_object)(StringName::new(T::NAME).sys()) };
        unsafe { Self::from_raw(raw) }.ok_or_else(|| BindError::ConstructFailed(T::NAME.to_owned()))
    }
}

impl<T: HostClass> ValueHandle<T> {
    pub fn base(&self) -> Borrowed<'_, <T as HostClass>::Base> {
        Borrowed {
            raw: self.raw,
            _lifetime: PhantomData,
        }
    }

    pub fn bind(&self) -> BindResult<Ref<'_, T>> {
        unsafe { host_storage::<T>(self.raw()) }?.borrow().map_err(BindError::from)
    }

    pub fn bind_mut(&mut self) -> BindResult<RefMut<'_, T>> {
        unsafe { host_storage::<T>(self.raw()) }?.borrow_mut().map_err(BindError::from)
    }
}

impl<T: Class> Clone for ValueHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Class> Copy for ValueHandle<T> {}

impl<T: Class> PartialEq for ValueHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: Class> Eq for ValueHandle<T> {}

impl<T: Class> fmt::Debug for ValueHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueHandle<{}>({:p})", T::NAME, self.raw)
    }
}

impl<T: EngineClass> Deref for ValueHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { deref_raw(&self.raw) }
    }
}

/// A non-owning view of an object, valid for `'a`.
#[repr(transparent)]
pub struct Borrowed<'a, T: Class> {
    raw: NonNull<c_void>,
    _lifetime: PhantomData<&'a T>,
}

impl<'a, T: Class> Borrowed<'a, T> {
    /// # Safety
    /// `raw` must be null or a live object of class `T` that stays alive for `'a`.
    pub unsafe fn from_raw(raw: sys::ObjectPtr) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            _lifetime: PhantomData,
        })
    }

    pub fn raw(&self) -> sys::ObjectPtr {
        self.raw.as_ptr()
    }

    pub fn instance_id(&self) -> sys::InstanceId {
        instance_id_of(self.raw())
    }

    pub fn upcast<B: Class>(self) -> Borrowed<'a, B>
    where
        T: Inherits<B>,
    {
        Borrowed {
            raw: self.raw,
            _lifetime: PhantomData,
        }
    }

    /// Checked cast to any class.
    pub fn try_cast<U: Class>(self) -> BindResult<Borrowed<'a, U>> {
        if is_instance_of::<U>(self.raw()) {
            Ok(Borrowed {
                raw: self.raw,
                _lifetime: PhantomData,
            })
        } else {
            Err(BindError::DowncastFailed(U::NAME))
        }
    }

    /// A strong reference, for reference-counted objects.
    pub fn to_owned(self) -> Owned<T> {
        let raw = self.raw();
        match unsafe { Owned::from_raw_shared(raw) } {
            Some(owned) => owned,
            None => unreachable!("borrowed handles are never null"),
        }
    }
}

impl<T: Class> Clone for Borrowed<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Class> Copy for Borrowed<'_, T> {}

impl<T: Class> PartialEq for Borrowed<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: Class> fmt::Debug for Borrowed<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Borrowed<{}>({:p})", T::NAME, self.raw)
    }
}

impl<T: EngineClass> Deref for Borrowed<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { deref_raw(&self.raw) }
    }
}

/// A weak reference by instance id.
///
/// Never keeps the object alive; every use resolves the id again and fails
/// with [`BindError::DeadReference`] once the object is gone.
pub struct InstanceRef<T: Class> {
    id: sys::InstanceId,
    _class: PhantomData<*const T>,
}

impl<T: Class> InstanceRef<T> {
    pub fn new(id: sys::InstanceId) -> Self {
        Self {
            id,
            _class: PhantomData,
        }
    }

    pub fn id(&self) -> sys::InstanceId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        !unsafe { (loader::fns().object_get_instance_from_id)(self.id) }.is_null()
    }

    /// The live object, checked against `T`.
    ///
    /// The handle is not tied to this reference; resolve again after anything
    /// that may free the object.
    pub fn resolve(&self) -> BindResult<ValueHandle<T>> {
        let raw = unsafe { (loader::fns().object_get_instance_from_id)(self.id) };
        if raw.is_null() {
            return Err(BindError::DeadReference(self.id));
        }
        if !is_instance_of::<T>(raw) {
            return Err(BindError::DowncastFailed(T::NAME));
        }
        unsafe { ValueHandle::from_raw(raw) }.ok_or(BindError::DeadReference(self.id))
    }

    pub fn upgrade(&self) -> BindResult<Owned<T>> {
        Ok(self.resolve()?.as_borrowed().to_owned())
    }
}

impl<T: Class> Clone for InstanceRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Class> Copy for InstanceRef<T> {}

impl<T: Class> PartialEq for InstanceRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: Class> fmt::Debug for InstanceRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceRef<{}>(#{})", T::NAME, self.id)
    }
}

/// An engine-wide singleton by name; `None` when the engine has none.
pub fn singleton_by_name(name: &str) -> Option<Borrowed<'static, Object>> {
    let raw = unsafe { (loader::fns().global_get_singleton)(StringName::new(name).sys()) };
    unsafe { Borrowed::from_raw(raw) }
}

/// The singleton of class `T`.
pub fn singleton<T: Class>() -> Option<Borrowed<'static, T>> {
    singleton_by_name(T::NAME)?.try_cast().ok()
}

/// An object constructed by class name, with the handle its memory calls for.
#[derive(Debug)]
pub enum AnyObject {
    Counted(Owned<Object>),
    Value(ValueHandle<Object>),
}

impl AnyObject {
    pub fn raw(&self) -> sys::ObjectPtr {
        match self {
            AnyObject::Counted(owned) => owned.raw(),
            AnyObject::Value(handle) => handle.raw(),
        }
    }
}

/// Constructs an object of a class only known at runtime.
pub fn construct_by_name(class: &str) -> BindResult<AnyObject> {
    let raw = unsafe { (loader::fns().classdb_construct_object)(StringName::new(class).sys()) };
    if raw.is_null() {
        return Err(BindError::ConstructFailed(class.to_owned()));
    }
    let object = if DynamicMemory::is_refcounted(raw) {
        unsafe { Owned::from_raw_owned(raw) }.map(AnyObject::Counted)
    } else {
        unsafe { ValueHandle::from_raw(raw) }.map(AnyObject::Value)
    };
    object.ok_or_else(|| BindError::ConstructFailed(class.to_owned()))
}

unsafe impl<T: Class> FfiType for Option<Owned<T>> {
    const KIND: VariantKind = VariantKind::Object;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        let raw = unsafe { *ptr.cast::<sys::ObjectPtr>() };
        if !is_instance_of::<T>(raw) {
            return None;
        }
        unsafe { Owned::from_raw_shared(raw) }
    }

    fn default_value() -> Self {
        None
    }
}

unsafe impl<T: Class> FfiType for Option<ValueHandle<T>> {
    const KIND: VariantKind = VariantKind::Object;

    unsafe fn from_arg_ptr(ptr: sys::ConstTypePtr) -> Self {
        let raw = unsafe { *ptr.cast::<sys::ObjectPtr>() };
        if !is_instance_of::<T>(raw) {
            return None;
        }
        unsafe { ValueHandle::from_raw(raw) }
    }

    fn default_value() -> Self {
        None
    }
}

impl<T: Class> ToVariant for Owned<T> {
    fn to_variant(&self) -> Variant {
        object_to_variant(self.raw())
    }
}

impl<T: Class> FromVariant for Owned<T> {
    fn try_from_variant(variant: &Variant) -> Result<Self, VariantError> {
        let raw = object_from_variant(variant)?;
        if !is_instance_of::<T>(raw) {
            return Err(VariantError::ClassMismatch { expected: T::NAME });
        }
        unsafe { Owned::from_raw_shared(raw) }.ok_or(VariantError::NullObject)
    }
}

impl<T: Class> ToVariant for ValueHandle<T> {
    fn to_variant(&self) -> Variant {
        object_to_variant(self.raw())
    }
}

impl<T: Class> FromVariant for ValueHandle<T> {
    fn try_from_variant(variant: &Variant) -> Result<Self, VariantError> {
        let raw = object_from_variant(variant)?;
        if !is_instance_of::<T>(raw) {
            return Err(VariantError::ClassMismatch { expected: T::NAME });
        }
        unsafe { ValueHandle::from_raw(raw) }.ok_or(VariantError::NullObject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::{Node, Node2D, RefCounted, Resource, Sprite2D};

    fn refcount(owned: &Owned<impl Class>) -> i64 {
        unsafe { extbind_testengine::refcount(owned.raw()) }
    }

    #[test]
    fn clone_and_drop_balance_the_count() {
        crate::loader::test_support::init();
        let resource = Owned::<Resource>::construct().unwrap();
        assert_eq!(refcount(&resource), 1);
        let copy = resource.clone();
        assert_eq!(refcount(&resource), 2);
        assert_eq!(copy, resource);
        drop(copy);
        assert_eq!(refcount(&resource), 1);

        let id = resource.instance_id();
        drop(resource);
        assert!(!extbind_testengine::is_alive(id));
    }

    #[test]
    fn upcast_keeps_the_reference() {
        crate::loader::test_support::init();
        let resource = Owned::<Resource>::construct().unwrap();
        let counted: Owned<RefCounted> = resource.clone().upcast();
        assert_eq!(refcount(&counted), 2);
        let back = counted.downcast::<Resource>().unwrap();
        assert_eq!(back, resource);
        assert_eq!(refcount(&resource), 2);
    }

    #[test]
    fn failed_downcast_hands_the_handle_back() {
        crate::loader::test_support::init();
        let object: Owned<Object> = Owned::<RefCounted>::construct().unwrap().upcast();
        let object = object.try_downcast::<Resource>().unwrap_err();
        assert_eq!(refcount(&object), 1);
        assert_eq!(
            object.downcast::<Resource>().unwrap_err(),
            BindError::DowncastFailed("Resource")
        );
    }

    #[test]
    fn value_handles_cast_without_counting() {
        crate::loader::test_support::init();
        let sprite = ValueHandle::<Sprite2D>::construct().unwrap();
        let node: ValueHandle<Node> = sprite.upcast();
        assert_eq!(node.downcast::<Sprite2D>().unwrap(), sprite);
        assert!(node.downcast::<Node2D>().is_ok());
        assert_eq!(
            node.upcast::<Object>().downcast::<Resource>(),
            Err(BindError::DowncastFailed("Resource"))
        );
        unsafe { sprite.destroy() };
    }

    #[test]
    fn instance_refs_notice_frees() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let weak = node.downgrade();
        assert!(weak.is_alive());
        assert_eq!(weak.resolve().unwrap().raw(), node.raw());
        assert!(weak.upgrade().is_ok());
        unsafe { node.destroy() };
        assert!(!weak.is_alive());
        assert_eq!(
            weak.resolve().unwrap_err(),
            BindError::DeadReference(weak.id())
        );
    }

    #[test]
    fn resolved_handles_outlive_the_weak_reference() {
        crate::loader::test_support::init();
        let node = ValueHandle::<Node>::construct().unwrap();
        let resolved = InstanceRef::<Node>::new(node.instance_id()).resolve().unwrap();
        resolved.set_name("Kept").unwrap();
        assert_eq!(node.get_name().unwrap(), "Kept");
        assert_eq!(resolved, node);
        unsafe { node.destroy() };
    }

    #[test]
    fn objects_in_variants() {
        crate::loader::test_support::init();
        let resource = Owned::<Resource>::construct().unwrap();
        let variant = resource.to_variant();
        assert_eq!(variant.kind(), VariantKind::Object);
        assert_eq!(refcount(&resource), 2);

        let decoded: Owned<Resource> = variant.to().unwrap();
        assert_eq!(decoded, resource);
        assert_eq!(
            variant.to::<ValueHandle<Node>>(),
            Err(VariantError::ClassMismatch { expected: "Node" })
        );
        assert_eq!(Variant::nil().to::<Owned<Resource>>(), Err(VariantError::NullObject));
        assert_eq!(Variant::nil().to::<Option<Owned<Resource>>>(), Ok(None));
    }

    #[test]
    fn construct_by_name_picks_the_handle() {
        crate::loader::test_support::init();
        assert!(matches!(construct_by_name("Resource"), Ok(AnyObject::Counted(_))));
        match construct_by_name("Node") {
            Ok(AnyObject::Value(node)) => unsafe { node.destroy() },
            other => panic!("expected a value handle, got {other:?}"),
        }
        assert_eq!(
            construct_by_name("NoSuchClass").unwrap_err(),
            BindError::ConstructFailed("NoSuchClass".to_owned())
        );
        let _ = extbind_testengine::take_errors();
    }

    #[test]
    fn singletons() {
        crate::loader::test_support::init();
        assert!(singleton_by_name("Engine").is_some());
        assert!(singleton_by_name("DefinitelyNotASingleton").is_none());
        assert!(singleton::<crate::classes::Engine>().is_some());
    }
}
