//! Type registry - native type identity to exposed host type
//!
//! Design: descriptors are built once with [`TypeBuilder`] and are immutable
//! after registration. Per-type capabilities (copying, smart holders) are
//! optional function pointers checked at conversion time.

mod instances;

pub use instances::InstanceCache;

use crate::config::DuplicatePolicy;
use crate::errors::{CastError, CastResult};
use crate::host::{ObjectId, TypeHandle};
use crate::interop::Interop;
use crate::logging::{debug, warn};
use crate::wrapper::{drop_boxed, DropFn, Instance};
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

/// Allocates an owned heap copy of the value behind the pointer
pub type CopyFn = unsafe fn(NonNull<()>) -> NonNull<()>;

/// Lets a smart holder take over lifetime bookkeeping of a fresh wrapper
pub type HolderInit = fn(&mut Instance);

/// Produces a temporary host object the type's loader can bind, or `None`
pub type ImplicitConversion = Rc<dyn Fn(&mut Interop, ObjectId) -> Option<ObjectId>>;

/// Process-lifetime description of one registered native type
pub struct TypeDescriptor {
    key: &'static str,
    name: String,
    handle: TypeHandle,
    copy: Option<CopyFn>,
    drop: DropFn,
    init_holder: Option<HolderInit>,
    implicit_conversions: Vec<ImplicitConversion>,
}

impl TypeDescriptor {
    /// Native type identity
    #[inline]
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Host-visible name
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn handle(&self) -> TypeHandle {
        self.handle
    }

    #[inline]
    pub fn copy_fn(&self) -> Option<CopyFn> {
        self.copy
    }

    #[inline]
    pub fn is_copyable(&self) -> bool {
        self.copy.is_some()
    }

    #[inline]
    pub fn drop_fn(&self) -> DropFn {
        self.drop
    }

    #[inline]
    pub fn holder_init(&self) -> Option<HolderInit> {
        self.init_holder
    }

    /// Implicit conversions in the order they are tried
    pub fn implicit_conversions(&self) -> &[ImplicitConversion] {
        &self.implicit_conversions
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("copyable", &self.copy.is_some())
            .field("holder", &self.init_holder.is_some())
            .field("implicit_conversions", &self.implicit_conversions.len())
            .finish()
    }
}

/// Builder for a [`TypeDescriptor`] of native type `T`
pub struct TypeBuilder<T: 'static> {
    name: Option<String>,
    handle: TypeHandle,
    copy: Option<CopyFn>,
    init_holder: Option<HolderInit>,
    implicit_conversions: Vec<ImplicitConversion>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> TypeBuilder<T> {
    pub fn new(handle: TypeHandle) -> Self {
        Self {
            name: None,
            handle,
            copy: None,
            init_holder: None,
            implicit_conversions: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Host-visible name (defaults to the Rust type name)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable the `copy` policy
    pub fn copyable(mut self) -> Self
    where
        T: Clone,
    {
        self.copy = Some(copy_boxed::<T>);
        self
    }

    /// Owned wrappers hold the value in an `Arc<T>` so it can be shared
    /// back to native code
    pub fn shared(mut self) -> Self {
        self.init_holder = Some(init_arc_holder::<T>);
        self
    }

    /// Append an implicit conversion
    pub fn implicit_conversion<F>(mut self, convert: F) -> Self
    where
        F: Fn(&mut Interop, ObjectId) -> Option<ObjectId> + 'static,
    {
        self.implicit_conversions.push(Rc::new(convert));
        self
    }

    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            key: type_name::<T>(),
            name: self.name.unwrap_or_else(|| type_name::<T>().to_string()),
            handle: self.handle,
            copy: self.copy,
            drop: drop_boxed::<T>,
            init_holder: self.init_holder,
            implicit_conversions: self.implicit_conversions,
        }
    }
}

/// # Safety
/// `src` must point at a live `T`.
unsafe fn copy_boxed<T: Clone>(src: NonNull<()>) -> NonNull<()> {
    let value = src.cast::<T>().as_ref().clone();
    NonNull::from(Box::leak(Box::new(value))).cast()
}

/// Move an owned, boxed value into an `Arc<T>` holder
fn init_arc_holder<T: 'static>(inst: &mut Instance) {
    if !inst.is_owned() || inst.holder().is_some() {
        return;
    }
    // SAFETY: an owned wrapper without a holder points at a value leaked
    // from Box<T>; the wrapper gives up the raw pointer here.
    let boxed = unsafe { Box::from_raw(inst.value().cast::<T>().as_ptr()) };
    let shared: Arc<T> = Arc::from(boxed);
    let addr = NonNull::from(&*shared).cast::<()>();
    inst.install_holder(addr, Box::new(shared));
}

/// Native type key -> descriptor
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<&'static str, TypeDescriptor>,
    on_duplicate: DuplicatePolicy,
}

impl TypeRegistry {
    pub fn new(on_duplicate: DuplicatePolicy) -> Self {
        Self {
            types: HashMap::new(),
            on_duplicate,
        }
    }

    /// Register a descriptor; `Ok(false)` when an earlier registration wins
    pub fn register(&mut self, desc: TypeDescriptor) -> CastResult<bool> {
        if self.types.contains_key(desc.key) {
            return match self.on_duplicate {
                DuplicatePolicy::KeepFirst => {
                    warn!(type_key = desc.key, "Type already registered, keeping first registration");
                    Ok(false)
                }
                DuplicatePolicy::Error => Err(CastError::DuplicateType {
                    type_name: desc.key.to_string(),
                }),
            };
        }

        debug!(
            type_key = desc.key,
            name = %desc.name,
            copyable = desc.is_copyable(),
            conversions = desc.implicit_conversions.len(),
            "Registered type"
        );
        self.types.insert(desc.key, desc);
        Ok(true)
    }

    #[inline]
    pub fn lookup(&self, key: &str) -> Option<&TypeDescriptor> {
        self.types.get(key)
    }

    pub fn lookup_type<T: 'static>(&self) -> Option<&TypeDescriptor> {
        self.lookup(type_name::<T>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }
}
