//! Value casters - native <-> host conversion
//!
//! Design: one `Caster` impl per native type; trait resolution is the
//! type-keyed dispatch table:
//! - `scalar.rs` - numbers, bool, text, unit, raw handles
//! - `composite.rs` - `Vec`, maps, fixed-arity tuples
//! - `object.rs` - registered class types behind `Ptr`, `Box`, `Arc`
//!
//! `load` is a recoverable attempt and reports failure as `None` with the
//! host error indicator cleared. `cast` either returns a new reference or
//! an error after releasing everything it produced.

mod composite;
mod object;
mod scalar;

pub use composite::{call_with, Apply};
pub use object::{cast_raw, cast_value, Ptr};
pub use scalar::{Complex, Handle, WideString};

pub(crate) use composite::pack_tuple;

use crate::errors::{CastError, CastResult};
use crate::host::ObjectId;
use crate::interop::Interop;
use crate::logging::{log_cast, log_load_failure};
use crate::policy::ReturnValuePolicy;

/// Bidirectional conversion strategy for one native type
pub trait Caster: Sized {
    /// Whether `automatic` means `take_ownership` (pointer-like values)
    /// rather than `copy` for this type
    const IS_POINTER: bool = false;

    /// Whether a loaded value points into host objects, so the source and
    /// any conversion temporaries must outlive it
    const BORROWS: bool = false;

    /// Host-facing type name used in error messages
    fn name() -> String;

    /// Convert a borrowed host object; `convert` enables implicit conversions
    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self>;

    /// Convert to a new host reference
    fn cast(
        self,
        cx: &mut Interop,
        policy: ReturnValuePolicy,
        parent: Option<ObjectId>,
    ) -> CastResult<ObjectId>;
}

/// Convert a native value to a new host reference
pub fn cast_to_host<T: Caster>(
    cx: &mut Interop,
    value: T,
    policy: ReturnValuePolicy,
    parent: Option<ObjectId>,
) -> CastResult<ObjectId> {
    let policy = policy.resolve(T::IS_POINTER);
    log_cast(&T::name(), policy.as_str());
    value.cast(cx, policy, parent)
}

/// Convert a host object to a native value, with implicit conversions
///
/// Conversion temporaries are released before returning unless `T`
/// borrows from them.
pub fn cast_from_host<T: Caster>(cx: &mut Interop, src: ObjectId) -> CastResult<T> {
    let mark = cx.temporaries_mark();
    let loaded = load_from_host(cx, src, true);
    if !T::BORROWS {
        cx.release_temporaries_from(mark);
    }
    loaded.ok_or_else(|| CastError::load(T::name()))
}

/// `Caster::load` with failure tracing
pub fn load_from_host<T: Caster>(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<T> {
    let loaded = T::load(cx, src, convert);
    if loaded.is_none() {
        log_load_failure(&T::name(), convert);
    }
    loaded
}

#[cfg(test)]
mod tests;
