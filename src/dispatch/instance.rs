use std::cell::{Ref, RefCell, RefMut};
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use extbind_sys as sys;

use crate::class::{Class, HostBase, HostClass};
use crate::diagnostics::{panic_message, report_error};
use crate::error::CallError;
use crate::loader;
use crate::string_name::StringName;

/// Host state of one engine object, stored in the object's instance slot.
pub(crate) struct InstanceStorage<T: HostClass> {
    cell: RefCell<T>,
}

impl<T: HostClass> InstanceStorage<T> {
    /// # Safety
    /// `instance` must be null or an instance pointer created for `T` by
    /// [`create_instance`], not yet freed.
    pub(crate) unsafe fn from_instance<'a>(instance: sys::ClassInstancePtr) -> Option<&'a Self> {
        unsafe { instance.cast::<Self>().as_ref() }
    }

    pub(crate) fn borrow(&self) -> Result<Ref<'_, T>, CallError> {
        self.cell.try_borrow().map_err(|_| CallError::BorrowConflict)
    }

    pub(crate) fn borrow_mut(&self) -> Result<RefMut<'_, T>, CallError> {
        self.cell.try_borrow_mut().map_err(|_| CallError::BorrowConflict)
    }
}

/// Construct callback: builds the base object, then the host state on top.
pub(crate) unsafe extern "C" fn create_instance<T: HostClass>(_class_userdata: *mut c_void) -> sys::ObjectPtr {
    let fns = loader::fns();
    let base_name = StringName::new(<<T as HostClass>::Base as Class>::NAME);
    let raw = unsafe { (fns.classdb_construct_object)(base_name.sys()) };
    if raw.is_null() {
        report_error(&format!(
            "could not construct base '{}' of '{}'",
            base_name,
            <T as HostClass>::NAME
        ));
        return ptr::null_mut();
    }

    let init = panic::catch_unwind(AssertUnwindSafe(|| T::init(HostBase::from_raw(raw))));
    match init {
        Ok(value) => {
            let storage = Box::new(InstanceStorage {
                cell: RefCell::new(value),
            });
            let class_name = StringName::new(<T as HostClass>::NAME);
            unsafe { (fns.object_set_instance)(raw, class_name.sys(), Box::into_raw(storage).cast()) };
            raw
        }
        Err(payload) => {
            report_error(&format!(
                "{}::init panicked: {}",
                <T as HostClass>::NAME,
                panic_message(payload.as_ref())
            ));
            unsafe { (fns.object_destroy)(raw) };
            ptr::null_mut()
        }
    }
}

/// Destruct callback: runs the host destructor and frees the storage.
pub(crate) unsafe extern "C" fn free_instance<T: HostClass>(
    _class_userdata: *mut c_void,
    instance: sys::ClassInstancePtr,
) {
    if instance.is_null() {
        return;
    }
    let storage = unsafe { Box::from_raw(instance.cast::<InstanceStorage<T>>()) };
    if storage.cell.try_borrow_mut().is_err() {
        // Still bound somewhere up the stack; freeing would leave that borrow dangling.
        report_error(&format!(
            "instance of '{}' freed while in use; leaking it",
            <T as HostClass>::NAME
        ));
        Box::leak(storage);
        return;
    }
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(storage))) {
        report_error(&format!(
            "destructor of '{}' panicked: {}",
            <T as HostClass>::NAME,
            panic_message(payload.as_ref())
        ));
    }
}
