//! Typbind - value marshaling between native Rust types and a dynamically
//! typed host object model
//!
//! Converts scalars, registered class instances and nested composites in
//! both directions, enforcing ownership policies and preserving object
//! identity across calls.

pub mod call;
pub mod cast;
pub mod config;
pub mod errors;
pub mod host;
pub mod interop;
pub mod logging;
pub mod policy;
pub mod registry;
pub mod wrapper;

// Re-export commonly used items
pub use call::{call, IntoArgs};
pub use cast::{
    call_with, cast_from_host, cast_raw, cast_to_host, cast_value, load_from_host, Apply, Caster,
    Complex, Handle, Ptr, WideString,
};
pub use config::{Config, DuplicatePolicy};
pub use errors::{CastError, CastResult, ConfigError};
pub use host::{Heap, HostError, HostErrorKind, ObjectId, ObjectKind, ObjectModel, TypeHandle};
pub use interop::{Interop, InteropStats};
pub use policy::ReturnValuePolicy;
pub use registry::{TypeBuilder, TypeDescriptor, TypeRegistry};
