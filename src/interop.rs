//! Interop context - the state every conversion threads through
//!
//! Design: one explicit context instead of process-wide globals:
//! - `host` - the object model all converters talk to
//! - `types` - native type key -> descriptor
//! - `instances` - native address -> live wrapper
//! - `temporaries` - host objects produced by implicit conversions that a
//!   loaded value may still borrow from
//!
//! Not thread-safe; callers serialise access the way a host runtime's
//! execution lock would.

use crate::call::IntoArgs;
use crate::cast::Caster;
use crate::config::Config;
use crate::errors::CastResult;
use crate::host::{ObjectId, ObjectModel, TypeHandle};
use crate::logging::debug;
use crate::registry::{InstanceCache, TypeBuilder, TypeDescriptor, TypeRegistry};
use crate::wrapper::Reclaimed;

/// Context statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteropStats {
    pub registered_types: usize,
    pub cached_instances: usize,
    pub temporaries: usize,
    pub live_objects: usize,
}

pub struct Interop {
    host: Box<dyn ObjectModel>,
    types: TypeRegistry,
    instances: InstanceCache,
    temporaries: Vec<ObjectId>,
    config: Config,
}

impl Interop {
    pub fn new(host: impl ObjectModel + 'static) -> Self {
        Self::with_config(host, Config::default())
    }

    pub fn with_config(host: impl ObjectModel + 'static, config: Config) -> Self {
        Self {
            host: Box::new(host),
            types: TypeRegistry::new(config.registry.on_duplicate),
            instances: InstanceCache::new(),
            temporaries: Vec::new(),
            config,
        }
    }

    #[inline]
    pub fn host(&self) -> &dyn ObjectModel {
        &*self.host
    }

    #[inline]
    pub fn host_mut(&mut self) -> &mut dyn ObjectModel {
        &mut *self.host
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn instances(&self) -> &InstanceCache {
        &self.instances
    }

    pub(crate) fn instances_mut(&mut self) -> &mut InstanceCache {
        &mut self.instances
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn register(&mut self, desc: TypeDescriptor) -> CastResult<bool> {
        self.types.register(desc)
    }

    /// Create a host type named `name` and register `T` against it
    ///
    /// Returns the handle of whichever registration is in effect for `T`.
    pub fn register_type<T: 'static>(&mut self, name: &str) -> CastResult<TypeHandle> {
        if let Some(existing) = self.types.lookup_type::<T>() {
            let handle = existing.handle();
            self.register(TypeBuilder::<T>::new(handle).name(name).build())?;
            return Ok(handle);
        }
        let handle = self.host.new_type(name, None);
        self.register(TypeBuilder::<T>::new(handle).name(name).build())?;
        Ok(handle)
    }

    #[inline]
    pub fn incref(&mut self, obj: ObjectId) {
        self.host.incref(obj);
    }

    /// Drop a reference and reclaim any wrappers that died with it
    pub fn decref(&mut self, obj: ObjectId) {
        self.host.decref(obj);
        self.reclaim();
    }

    /// Finish destruction of wrappers the host released
    ///
    /// Evicts the cache entry, frees owned native values and drops parent
    /// links, repeating while parent releases free further wrappers.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        loop {
            let batch = self.host.drain_reclaimed();
            if batch.is_empty() {
                return reclaimed;
            }
            for Reclaimed { object, mut instance } in batch {
                self.instances.remove_if(instance.address(), object);
                let parent = instance.take_parent();
                debug!(
                    event = "wrapper_reclaimed",
                    type_key = instance.type_key(),
                    address = instance.address(),
                    owned = instance.is_owned(),
                    "Wrapper reclaimed"
                );
                drop(instance);
                if let Some(parent) = parent {
                    self.host.decref(parent);
                }
                reclaimed += 1;
            }
        }
    }

    /// Whether any wrapper on `parent`'s chain wraps `addr`
    pub(crate) fn parent_chain_wraps(&self, parent: Option<ObjectId>, addr: usize) -> bool {
        let mut current = parent;
        for _ in 0..self.config.instances.parent_chain_depth {
            let Some(obj) = current else {
                return false;
            };
            match self.host.instance(obj) {
                Some(inst) if inst.address() == addr => return true,
                Some(inst) => current = inst.parent(),
                None => return false,
            }
        }
        false
    }

    /// Take over one reference to `obj` until `release_temporaries`
    pub fn keep_alive(&mut self, obj: ObjectId) {
        self.temporaries.push(obj);
    }

    pub fn release_temporaries(&mut self) {
        self.release_temporaries_from(0);
    }

    /// Position to later release temporaries back to
    #[inline]
    pub fn temporaries_mark(&self) -> usize {
        self.temporaries.len()
    }

    /// Release the temporaries taken over since `mark`
    pub fn release_temporaries_from(&mut self, mark: usize) {
        if mark >= self.temporaries.len() {
            return;
        }
        for obj in self.temporaries.split_off(mark) {
            self.host.decref(obj);
        }
        self.reclaim();
    }

    /// Call a host callable with native arguments; see [`crate::call::call`]
    pub fn call<A: IntoArgs>(&mut self, callable: ObjectId, args: A) -> CastResult<ObjectId> {
        crate::call::call(self, callable, args)
    }

    /// Call and load the result as `R`
    ///
    /// The host result is released, unless `R` borrows from it; then it is
    /// kept alive until `release_temporaries`.
    pub fn call_as<R: Caster, A: IntoArgs>(&mut self, callable: ObjectId, args: A) -> CastResult<R> {
        let result = self.call(callable, args)?;
        let loaded = crate::cast::cast_from_host::<R>(self, result);
        if R::BORROWS && loaded.is_ok() {
            self.keep_alive(result);
        } else {
            self.decref(result);
        }
        loaded
    }

    /// Tear down registry, cache and temporaries
    pub fn clear(&mut self) {
        self.release_temporaries();
        self.types.clear();
        self.instances.clear();
        debug!("Interop context cleared");
    }

    pub fn stats(&self) -> InteropStats {
        InteropStats {
            registered_types: self.types.len(),
            cached_instances: self.instances.len(),
            temporaries: self.temporaries.len(),
            live_objects: self.host.live_objects(),
        }
    }
}

impl Drop for Interop {
    fn drop(&mut self) {
        self.release_temporaries();
    }
}
