//! The class spine: how engine classes and host classes are typed.
//!
//! Every engine class is a zero-sized-over-a-pointer type implementing
//! [`Class`], with single inheritance expressed by [`Inherits`]. Because the
//! ancestors of a class are listed at the type level, an upcast is a pointer
//! reinterpretation checked by the compiler; a downcast asks the engine.
//!
//! ```ignore
//! engine_class! {
//!     /// A packed float buffer.
//!     pub struct ValueBuffer: RefCounted, Object;
//!     memory = RefCountedMemory
//! }
//! ```
//!
//! Host classes implement [`HostClass`] instead and get [`Class`] and their
//! base's ancestors for free.

use std::marker::PhantomData;
use std::ops::Deref;

use extbind_sys as sys;

use crate::dispatch::ClassBuilder;
use crate::handle::Borrowed;
use crate::loader;

/// Lifetime policy of a class.
pub trait Memory: 'static {
    /// Whether `raw` participates in reference counting.
    fn is_refcounted(raw: sys::ObjectPtr) -> bool;
}

/// Classes deriving from `RefCounted`.
pub enum RefCountedMemory {}

/// Classes whose lifetime the engine or the host manages explicitly.
pub enum ManualMemory {}

/// Classes that may be either, such as `Object` itself; decided per object.
pub enum DynamicMemory {}

impl Memory for RefCountedMemory {
    fn is_refcounted(_raw: sys::ObjectPtr) -> bool {
        true
    }
}

impl Memory for ManualMemory {
    fn is_refcounted(_raw: sys::ObjectPtr) -> bool {
        false
    }
}

impl Memory for DynamicMemory {
    fn is_refcounted(raw: sys::ObjectPtr) -> bool {
        !raw.is_null() && loader::try_binding().is_some() && cast_to(raw, "RefCounted")
    }
}

/// An engine-visible class.
///
/// # Safety
/// `NAME` must be the engine's name of the class, `Base` its direct parent
/// (`Object` is its own base), and `Memory` must match the engine's lifetime
/// rules for it.
pub unsafe trait Class: 'static {
    const NAME: &'static str;
    type Base: Class;
    type Memory: Memory;
}

/// `Self` is `B` or derives from it.
///
/// # Safety
/// Must only be implemented along the engine's actual class hierarchy.
pub unsafe trait Inherits<B: Class>: Class {}

/// A class implemented by the engine, wrapped as an opaque object pointer.
///
/// # Safety
/// `Self` must be `#[repr(transparent)]` over a [`sys::ObjectPtr`].
pub unsafe trait EngineClass: Class {
    fn object_ptr(&self) -> sys::ObjectPtr {
        unsafe { *std::ptr::from_ref(self).cast::<sys::ObjectPtr>() }
    }
}

/// A class implemented in host code that the engine can instantiate.
///
/// ```ignore
/// struct Mover { base: HostBase<Mover>, speed: f64 }
///
/// impl HostClass for Mover {
///     const NAME: &'static str = "Mover";
///     type Base = Node;
///
///     fn init(base: HostBase<Self>) -> Self {
///         Mover { base, speed: 2.0 }
///     }
///
///     fn register(builder: &mut ClassBuilder<Self>) {
///         builder.virtual_method("_process", |this: &mut Mover, delta: f64| {
///             this.speed *= delta;
///         });
///     }
/// }
/// ```
pub trait HostClass: Sized + 'static {
    const NAME: &'static str;
    type Base: EngineClass;

    /// Builds the host state of a freshly constructed engine object.
    fn init(base: HostBase<Self>) -> Self;

    /// Declares overrides, methods and signals.
    fn register(builder: &mut ClassBuilder<Self>) {
        let _ = builder;
    }
}

unsafe impl<T: HostClass> Class for T {
    const NAME: &'static str = <T as HostClass>::NAME;
    type Base = <T as HostClass>::Base;
    type Memory = <<T as HostClass>::Base as Class>::Memory;
}

unsafe impl<T, B> Inherits<B> for T
where
    T: HostClass,
    B: Class,
    <T as HostClass>::Base: Inherits<B>,
{
}

/// The engine object underneath a host instance.
///
/// Does not own the object: the object owns the host instance.
pub struct HostBase<T: HostClass> {
    raw: sys::ObjectPtr,
    _class: PhantomData<fn() -> T>,
}

impl<T: HostClass> HostBase<T> {
    pub(crate) fn from_raw(raw: sys::ObjectPtr) -> Self {
        Self {
            raw,
            _class: PhantomData,
        }
    }

    pub fn raw(&self) -> sys::ObjectPtr {
        self.raw
    }

    pub fn as_borrowed(&self) -> Borrowed<'_, <T as HostClass>::Base> {
        match unsafe { Borrowed::from_raw(self.raw) } {
            Some(base) => base,
            None => unreachable!("host instance without an engine object"),
        }
    }

    pub fn instance_id(&self) -> sys::InstanceId {
        unsafe { (loader::fns().object_get_instance_id)(self.raw) }
    }
}

impl<T: HostClass> Deref for HostBase<T> {
    type Target = <T as HostClass>::Base;

    fn deref(&self) -> &Self::Target {
        unsafe { &*std::ptr::from_ref(&self.raw).cast::<Self::Target>() }
    }
}

impl<T: HostClass> std::fmt::Debug for HostBase<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostBase<{}>({:p})", <T as HostClass>::NAME, self.raw)
    }
}

fn cast_to(raw: sys::ObjectPtr, class: &str) -> bool {
    match loader::class_tag(class) {
        Some(tag) => !unsafe { (loader::fns().object_cast_to)(raw, tag) }.is_null(),
        None => false,
    }
}

/// Whether the live object `raw` is a `T` or derives from it.
pub fn is_instance_of<T: Class>(raw: sys::ObjectPtr) -> bool {
    !raw.is_null() && cast_to(raw, T::NAME)
}

/// Declares a wrapper for an engine class.
///
/// The first class after the colon is the direct parent; the others are the
/// remaining ancestors, up to `Object`.
#[macro_export]
macro_rules! engine_class {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $base:ty $(, $ancestor:ty)* ;
        memory = $memory:ty $(;)?
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        $vis struct $name {
            opaque: $crate::sys::ObjectPtr,
        }

        unsafe impl $crate::class::Class for $name {
            const NAME: &'static str = stringify!($name);
            type Base = $base;
            type Memory = $memory;
        }

        unsafe impl $crate::class::EngineClass for $name {
            fn object_ptr(&self) -> $crate::sys::ObjectPtr {
                self.opaque
            }
        }

        unsafe impl $crate::class::Inherits<$name> for $name {}
        unsafe impl $crate::class::Inherits<$base> for $name {}
        $(unsafe impl $crate::class::Inherits<$ancestor> for $name {})*

        impl ::std::ops::Deref for $name {
            type Target = $base;

            fn deref(&self) -> &$base {
                unsafe { &*::std::ptr::from_ref(self).cast::<$base>() }
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({:p})", stringify!($name), self.opaque)
            }
        }
    };
}
