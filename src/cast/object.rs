//! Class casters - registered native types behind wrapper objects
//!
//! Every native -> host path for a class type funnels into [`cast_raw`],
//! which owns the identity cache, the ownership policy and parent links.
//! Every host -> native path funnels into `bind`, which accepts a wrapper of
//! the registered type (or a subtype) and otherwise walks the type's
//! implicit conversions once.

use super::Caster;
use crate::errors::{CastError, CastResult};
use crate::host::{ObjectId, ObjectKind};
use crate::interop::Interop;
use crate::logging::{log_wrapper_created, trace};
use crate::policy::{self, ReturnValuePolicy};
use crate::registry::ImplicitConversion;
use crate::wrapper::Instance;
use std::any::type_name;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Possibly-null pointer to a registered native value
///
/// Casts with by-pointer semantics: `automatic` means `take_ownership`.
pub struct Ptr<T> {
    ptr: *const T,
}

impl<T> Ptr<T> {
    /// # Safety
    /// `ptr` must be null or point at a live `T` for as long as any wrapper
    /// cast from it borrows it. Casting under `take_ownership` (including
    /// `automatic`) additionally requires that `ptr` came from
    /// `Box::into_raw` and that nothing else frees it.
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        Self { ptr }
    }

    /// Leak a box into a pointer the host will own once cast
    pub fn from_box(value: Box<T>) -> Self {
        Self { ptr: Box::into_raw(value) }
    }

    pub const fn null() -> Self {
        Self { ptr: ptr::null() }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// # Safety
    /// The pointee must still be alive for `'a`.
    pub unsafe fn as_ref<'a>(&self) -> Option<&'a T> {
        self.ptr.as_ref()
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ptr<T> {}

impl<T> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.ptr, other.ptr)
    }
}

impl<T> Eq for Ptr<T> {}

impl<T> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ptr<{}>({:p})", type_name::<T>(), self.ptr)
    }
}

/// Convert a raw native pointer to a wrapper object
///
/// Null becomes None. A live wrapper for the same address is reused unless
/// the cast is `reference_internal` and the address already appears on the
/// parent chain, in which case a fresh uncached wrapper is built.
///
/// # Safety
/// As for [`Ptr::from_raw`]: `src` must be valid for the resolved policy.
pub unsafe fn cast_raw<T: 'static>(
    cx: &mut Interop,
    src: *const T,
    policy: ReturnValuePolicy,
    parent: Option<ObjectId>,
) -> CastResult<ObjectId> {
    let Some(src) = NonNull::new(src as *mut T) else {
        return Ok(cx.host_mut().none());
    };
    let src = src.cast::<()>();
    let addr = src.as_ptr() as usize;
    let policy = policy.resolve(true);

    let dont_cache = policy == ReturnValuePolicy::ReferenceInternal && cx.parent_chain_wraps(parent, addr);

    cx.reclaim();
    if !dont_cache {
        if let Some(existing) = cx.instances().get(addr) {
            trace!(event = "cache_hit", address = addr, object = ?existing);
            cx.incref(existing);
            return Ok(existing);
        }
    }

    let desc = cx
        .types()
        .lookup_type::<T>()
        .ok_or_else(|| CastError::unregistered(type_name::<T>()))?;
    let handle = desc.handle();
    let drop_fn = desc.drop_fn();
    let init_holder = desc.holder_init();
    let ownership = policy::apply(desc, src, policy, parent)?;

    let mut inst = Instance::new(ownership.value, type_name::<T>(), ownership.owned, drop_fn);
    inst.set_parent(ownership.parent);
    if let Some(init) = init_holder {
        init(&mut inst);
    }
    let key = inst.address();
    let owned = inst.is_owned();

    // A failed allocation drops `inst`, freeing an owned copy
    let obj = cx.host_mut().new_instance(handle, inst).map_err(|err| {
        cx.host_mut().clear_error();
        CastError::Host(err)
    })?;
    if let Some(parent) = ownership.parent {
        cx.incref(parent);
    }
    if !dont_cache {
        cx.instances_mut().insert(key, obj);
    }

    log_wrapper_created(type_name::<T>(), key, owned, !dont_cache);
    Ok(obj)
}

/// Convert a native value by reference, with by-value semantics
///
/// `automatic` means `copy`. `take_ownership` is rejected because the value
/// is only borrowed.
///
/// # Safety
/// Under `reference` or `reference_internal` the wrapper borrows `value`;
/// it must outlive the wrapper.
pub unsafe fn cast_value<T: 'static>(
    cx: &mut Interop,
    value: &T,
    policy: ReturnValuePolicy,
    parent: Option<ObjectId>,
) -> CastResult<ObjectId> {
    let policy = policy.resolve(false);
    if policy == ReturnValuePolicy::TakeOwnership {
        return Err(CastError::InvalidPolicy {
            policy,
            type_name: type_name::<T>().to_string(),
        });
    }
    cast_raw(cx, value as *const T, policy, parent)
}

/// Host object a load bound to
struct Bound {
    object: ObjectId,
    value: NonNull<()>,
    /// `object` came from an implicit conversion and the binder holds its
    /// only reference
    temporary: bool,
}

impl Bound {
    /// Keep a temporary alive for as long as the context's temporaries
    fn retain(self, cx: &mut Interop) -> NonNull<()> {
        if self.temporary {
            cx.keep_alive(self.object);
        }
        self.value
    }

    /// Drop a temporary once nothing points into it any more
    fn release(self, cx: &mut Interop) {
        if self.temporary {
            cx.decref(self.object);
        }
    }
}

/// Bind a host object to the native value of a registered type `T`
///
/// A wrapper of `T` (or a subtype) binds directly. Otherwise each implicit
/// conversion is tried once; the first temporary that binds directly is
/// handed to the caller.
fn bind<T: 'static>(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Bound> {
    let desc = cx.types().lookup_type::<T>()?;
    let handle = desc.handle();

    if let Some(ty) = cx.host().type_of(src) {
        if cx.host().is_subtype(ty, handle) {
            if let Some(inst) = cx.host().instance(src) {
                if inst.type_key() == desc.key() {
                    return Some(Bound {
                        object: src,
                        value: inst.value(),
                        temporary: false,
                    });
                }
            }
        }
    }

    if !convert {
        return None;
    }

    // Cloned out so conversions may use the context freely
    let conversions: Vec<ImplicitConversion> = desc.implicit_conversions().to_vec();
    for convert_fn in conversions {
        let Some(temp) = convert_fn(cx, src) else {
            cx.host_mut().clear_error();
            continue;
        };
        // One hop only: the temporary must bind directly
        match bind::<T>(cx, temp, false) {
            Some(bound) => return Some(Bound { temporary: true, ..bound }),
            None => cx.decref(temp),
        }
    }
    None
}

impl<T: 'static> Caster for Ptr<T> {
    const IS_POINTER: bool = true;
    const BORROWS: bool = true;

    fn name() -> String {
        type_name::<T>().to_string()
    }

    /// None loads as a null pointer when conversions are enabled
    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
        if convert && cx.host().kind(src) == Some(ObjectKind::None) {
            return Some(Self::null());
        }
        let value = bind::<T>(cx, src, convert)?.retain(cx);
        Some(Self {
            ptr: value.cast::<T>().as_ptr(),
        })
    }

    fn cast(self, cx: &mut Interop, policy: ReturnValuePolicy, parent: Option<ObjectId>) -> CastResult<ObjectId> {
        // SAFETY: upheld by the `Ptr::from_raw` / `Ptr::from_box` contract
        unsafe { cast_raw(cx, self.ptr, policy, parent) }
    }
}

/// Owned values: loading copies out of the wrapper, casting hands the box
/// to the host unless `copy` is requested
impl<T: 'static> Caster for Box<T> {
    const IS_POINTER: bool = true;

    fn name() -> String {
        type_name::<T>().to_string()
    }

    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
        let bound = bind::<T>(cx, src, convert)?;
        let copy = cx.types().lookup_type::<T>().and_then(|desc| desc.copy_fn());
        // SAFETY: `bound.value` points at a live T and `copy` returns a
        // value leaked from Box<T>
        let loaded = copy.map(|copy| unsafe { Box::from_raw(copy(bound.value).cast::<T>().as_ptr()) });
        bound.release(cx);
        loaded
    }

    fn cast(self, cx: &mut Interop, policy: ReturnValuePolicy, parent: Option<ObjectId>) -> CastResult<ObjectId> {
        if policy == ReturnValuePolicy::Copy {
            // SAFETY: the box outlives the copy made from it
            return unsafe { cast_raw(cx, &*self as *const T, policy, parent) };
        }
        if !cx.types().contains(type_name::<T>()) {
            return Err(CastError::unregistered(type_name::<T>()));
        }
        // SAFETY: the pointer comes from Box::into_raw and is handed over
        unsafe { cast_raw(cx, Box::into_raw(self) as *const T, ReturnValuePolicy::TakeOwnership, parent) }
    }
}

/// Shared values: the wrapper holds a clone of the `Arc`
impl<T: 'static> Caster for Arc<T> {
    fn name() -> String {
        type_name::<T>().to_string()
    }

    /// Only wrappers that hold an `Arc<T>` load; borrowed wrappers do not
    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
        let bound = bind::<T>(cx, src, convert)?;
        let shared = cx
            .host()
            .instance(bound.object)
            .and_then(|inst| inst.holder())
            .and_then(|holder| holder.downcast_ref::<Arc<T>>())
            .cloned();
        bound.release(cx);
        shared
    }

    fn cast(self, cx: &mut Interop, _policy: ReturnValuePolicy, _parent: Option<ObjectId>) -> CastResult<ObjectId> {
        let value = NonNull::from(&*self).cast::<()>();
        let addr = value.as_ptr() as usize;

        cx.reclaim();
        if let Some(existing) = cx.instances().get(addr) {
            cx.incref(existing);
            return Ok(existing);
        }

        let desc = cx
            .types()
            .lookup_type::<T>()
            .ok_or_else(|| CastError::unregistered(type_name::<T>()))?;
        let handle = desc.handle();
        let mut inst = Instance::new(value, type_name::<T>(), false, desc.drop_fn());
        inst.install_holder(value, Box::new(self));

        let obj = cx.host_mut().new_instance(handle, inst).map_err(|err| {
            cx.host_mut().clear_error();
            CastError::Host(err)
        })?;
        cx.instances_mut().insert(addr, obj);
        log_wrapper_created(type_name::<T>(), addr, true, true);
        Ok(obj)
    }
}
