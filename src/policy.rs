//! Ownership policy engine
//!
//! Decides, per native -> host conversion of a class instance, whether the
//! new wrapper owns the native value, borrows it, or borrows it while keeping
//! a parent wrapper alive.
//!
//! | Policy               | Copyable type                 | Non-copyable type  |
//! |----------------------|-------------------------------|--------------------|
//! | `Copy`               | wrapper owns a new heap copy  | `NonCopyable` error|
//! | `Reference`          | wrapper borrows               | same               |
//! | `ReferenceInternal`  | borrows, links + increfs parent | same             |
//! | `TakeOwnership`      | wrapper owns, frees on drop   | same               |

use crate::errors::{CastError, CastResult};
use crate::host::ObjectId;
use crate::registry::TypeDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ptr::NonNull;

/// Rule for how a wrapper relates to the lifetime of its native value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnValuePolicy {
    /// `Copy` for by-value casts, `TakeOwnership` for by-pointer casts
    #[default]
    Automatic,
    /// `Copy` for by-value casts, `Reference` for by-pointer casts
    AutomaticReference,
    Copy,
    Reference,
    ReferenceInternal,
    TakeOwnership,
}

impl ReturnValuePolicy {
    /// Resolve the two automatic policies to a concrete one
    #[inline]
    pub const fn resolve(self, by_pointer: bool) -> Self {
        match self {
            Self::Automatic if by_pointer => Self::TakeOwnership,
            Self::AutomaticReference if by_pointer => Self::Reference,
            Self::Automatic | Self::AutomaticReference => Self::Copy,
            other => other,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::AutomaticReference => "automatic_reference",
            Self::Copy => "copy",
            Self::Reference => "reference",
            Self::ReferenceInternal => "reference_internal",
            Self::TakeOwnership => "take_ownership",
        }
    }
}

impl fmt::Display for ReturnValuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete outcome of applying a policy to one native value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    /// Address the wrapper will point at (differs from the source for copies)
    pub value: NonNull<()>,
    pub owned: bool,
    /// Parent wrapper that must be kept alive for the wrapper's lifetime
    pub parent: Option<ObjectId>,
}

/// Apply `policy` to `src` for a wrapper of the type described by `desc`
///
/// `Automatic` policies must already be resolved; a stray `Automatic` is
/// treated as `TakeOwnership` and `AutomaticReference` as `Reference`.
/// A `Copy` of a type without the copy capability fails before anything is
/// allocated, so the caller never sees a half-built wrapper.
pub fn apply(
    desc: &TypeDescriptor,
    src: NonNull<()>,
    policy: ReturnValuePolicy,
    parent: Option<ObjectId>,
) -> CastResult<Ownership> {
    match policy.resolve(true) {
        ReturnValuePolicy::Copy => {
            let copy = desc.copy_fn().ok_or_else(|| CastError::NonCopyable {
                type_name: desc.key().to_string(),
            })?;
            // SAFETY: `src` points at a live value of the descriptor's type
            let value = unsafe { copy(src) };
            Ok(Ownership { value, owned: true, parent: None })
        }
        ReturnValuePolicy::Reference => Ok(Ownership { value: src, owned: false, parent: None }),
        ReturnValuePolicy::ReferenceInternal => Ok(Ownership { value: src, owned: false, parent }),
        _ => Ok(Ownership { value: src, owned: true, parent: None }),
    }
}
