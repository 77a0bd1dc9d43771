//! Wrapper payload - the native side of a host-visible instance
//!
//! A wrapper is a host object whose payload is an [`Instance`]: the address
//! of a native value, whether the wrapper owns it, and an optional parent
//! wrapper that backs a borrowed value. Dropping the payload is the single
//! destruction path for an owned native value.

use crate::host::ObjectId;
use std::any::Any;
use std::fmt;
use std::ptr::NonNull;

/// Frees a native value previously leaked from a `Box<T>`
pub type DropFn = unsafe fn(NonNull<()>);

/// Payload carried by every wrapper object
pub struct Instance {
    value: NonNull<()>,
    type_key: &'static str,
    owned: bool,
    parent: Option<ObjectId>,
    holder: Option<Box<dyn Any>>,
    drop_fn: DropFn,
}

impl Instance {
    pub fn new(value: NonNull<()>, type_key: &'static str, owned: bool, drop_fn: DropFn) -> Self {
        Self {
            value,
            type_key,
            owned,
            parent: None,
            holder: None,
            drop_fn,
        }
    }

    /// Native address this wrapper represents (the instance-cache key)
    #[inline]
    pub fn address(&self) -> usize {
        self.value.as_ptr() as usize
    }

    #[inline]
    pub fn value(&self) -> NonNull<()> {
        self.value
    }

    #[inline]
    pub fn type_key(&self) -> &'static str {
        self.type_key
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    #[inline]
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ObjectId>) {
        self.parent = parent;
    }

    /// Detach the parent link; the caller becomes responsible for its reference
    pub(crate) fn take_parent(&mut self) -> Option<ObjectId> {
        self.parent.take()
    }

    /// Smart handle that owns the value instead of the raw `drop_fn`
    pub fn holder(&self) -> Option<&dyn Any> {
        self.holder.as_deref()
    }

    /// Hand lifetime bookkeeping to a holder, repointing the wrapper at the
    /// address the holder manages
    pub(crate) fn install_holder(&mut self, value: NonNull<()>, holder: Box<dyn Any>) {
        self.value = value;
        self.holder = Some(holder);
        self.owned = true;
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        match self.holder.take() {
            Some(holder) => drop(holder),
            // SAFETY: an owned value without a holder came from Box::into_raw
            // of the type `drop_fn` was built for, and this is the only place
            // it is released.
            None => unsafe { (self.drop_fn)(self.value) },
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_key)
            .field("address", &self.value)
            .field("owned", &self.owned)
            .field("parent", &self.parent)
            .field("holder", &self.holder.is_some())
            .finish()
    }
}

/// A wrapper whose last host reference was dropped
#[derive(Debug)]
pub struct Reclaimed {
    pub object: ObjectId,
    pub instance: Instance,
}

/// `DropFn` for a value of type `T` leaked from a `Box<T>`
///
/// # Safety
/// `ptr` must come from `Box::<T>::into_raw` and not be freed elsewhere.
pub unsafe fn drop_boxed<T>(ptr: NonNull<()>) {
    drop(Box::from_raw(ptr.cast::<T>().as_ptr()));
}
