//! Object-model adapter - the converters' only view of the host runtime
//!
//! Design: a thin, C-API shaped trait so any dynamically typed runtime can sit
//! behind the converters:
//! - Handles are plain `ObjectId`s with explicit reference counting
//! - Constructors return NEW references, getters return BORROWED ones
//! - `list_set`/`tuple_set` steal the item reference (even when they fail),
//!   `dict_set` does not
//! - Fallible extraction returns `Err` and also sets the pending error
//!   indicator, as a C-API host would
//!
//! `heap.rs` is the in-process reference implementation.

mod heap;

pub use heap::Heap;

use crate::wrapper::{Instance, Reclaimed};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Handle to a host object (slot index + generation)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<object #{}.{}>", self.index, self.generation)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handle to a host type object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(ObjectId);

impl TypeHandle {
    #[inline]
    pub const fn from_object(obj: ObjectId) -> Self {
        Self(obj)
    }

    #[inline]
    pub const fn object(self) -> ObjectId {
        self.0
    }
}

/// Built-in shape of a host object, used for type checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    None,
    Bool,
    Int,
    Float,
    Complex,
    Str,
    List,
    Dict,
    Tuple,
    Type,
    Instance,
    Function,
}

impl ObjectKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Complex => "complex",
            Self::Str => "str",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Tuple => "tuple",
            Self::Type => "type",
            Self::Instance => "object",
            Self::Function => "function",
        }
    }
}

/// Host exception category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostErrorKind {
    Type,
    Overflow,
    Value,
    Unicode,
    Index,
    Runtime,
}

impl fmt::Display for HostErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Type => "TypeError",
            Self::Overflow => "OverflowError",
            Self::Value => "ValueError",
            Self::Unicode => "UnicodeError",
            Self::Index => "IndexError",
            Self::Runtime => "RuntimeError",
        })
    }
}

/// Error raised by the host runtime
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct HostError {
    pub kind: HostErrorKind,
    pub message: String,
}

impl HostError {
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Type, message)
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// Host-callable function; receives borrowed argument handles and returns
/// a new reference
pub type HostFunction = Rc<dyn Fn(&mut dyn ObjectModel, &[ObjectId]) -> HostResult<ObjectId>>;

/// Box a closure as a [`HostFunction`]
pub fn host_fn<F>(func: F) -> HostFunction
where
    F: Fn(&mut dyn ObjectModel, &[ObjectId]) -> HostResult<ObjectId> + 'static,
{
    Rc::new(func)
}

/// Operations the converters need from the host object model
pub trait ObjectModel {
    // Lifetime

    fn incref(&mut self, obj: ObjectId);

    /// Drop one reference; wrappers that die are queued for `drain_reclaimed`
    fn decref(&mut self, obj: ObjectId);

    /// Current reference count, 0 for dead handles
    fn refcount(&self, obj: ObjectId) -> usize;

    fn is_alive(&self, obj: ObjectId) -> bool {
        self.refcount(obj) > 0
    }

    fn live_objects(&self) -> usize;

    /// Take the payloads of wrappers released since the last drain
    fn drain_reclaimed(&mut self) -> Vec<Reclaimed>;

    // Error indicator

    fn error_occurred(&self) -> bool;
    fn set_error(&mut self, err: HostError);
    fn clear_error(&mut self) -> Option<HostError>;

    // Types

    fn kind(&self, obj: ObjectId) -> Option<ObjectKind>;

    /// Type object of an instance wrapper
    fn type_of(&self, obj: ObjectId) -> Option<TypeHandle>;
    fn is_subtype(&self, sub: TypeHandle, sup: TypeHandle) -> bool;
    fn new_type(&mut self, name: &str, base: Option<TypeHandle>) -> TypeHandle;
    fn type_name(&self, ty: TypeHandle) -> Option<String>;

    // Singletons and scalars

    fn none(&mut self) -> ObjectId;
    fn bool_new(&mut self, value: bool) -> ObjectId;

    /// Only the two canonical boolean singletons yield a value
    fn bool_value(&self, obj: ObjectId) -> Option<bool>;

    fn int_new(&mut self, value: i128) -> ObjectId;
    fn int_value(&mut self, obj: ObjectId) -> HostResult<i128>;
    fn float_new(&mut self, value: f64) -> ObjectId;
    fn float_value(&mut self, obj: ObjectId) -> HostResult<f64>;
    fn complex_new(&mut self, re: f64, im: f64) -> ObjectId;
    fn complex_value(&mut self, obj: ObjectId) -> HostResult<(f64, f64)>;

    // Text

    fn str_from_utf8(&mut self, value: &str) -> ObjectId;

    /// Fails for units that are not Unicode code points
    fn str_from_wide(&mut self, units: &[u32]) -> HostResult<ObjectId>;

    /// Fails rather than substituting when the string holds surrogates
    fn str_as_utf8(&mut self, obj: ObjectId) -> HostResult<String>;
    fn str_as_wide(&mut self, obj: ObjectId) -> HostResult<Vec<u32>>;

    // Containers

    /// New list of `len` None placeholders
    fn list_new(&mut self, len: usize) -> ObjectId;
    fn list_len(&self, list: ObjectId) -> Option<usize>;
    fn list_get(&self, list: ObjectId, index: usize) -> Option<ObjectId>;
    fn list_set(&mut self, list: ObjectId, index: usize, item: ObjectId) -> HostResult<()>;

    fn dict_new(&mut self) -> ObjectId;
    fn dict_len(&self, dict: ObjectId) -> Option<usize>;
    /// Entries in iteration order
    fn dict_items(&self, dict: ObjectId) -> Option<Vec<(ObjectId, ObjectId)>>;
    fn dict_set(&mut self, dict: ObjectId, key: ObjectId, value: ObjectId) -> HostResult<()>;

    /// New tuple of `len` None placeholders
    fn tuple_new(&mut self, len: usize) -> ObjectId;
    fn tuple_len(&self, tuple: ObjectId) -> Option<usize>;
    fn tuple_get(&self, tuple: ObjectId, index: usize) -> Option<ObjectId>;
    fn tuple_set(&mut self, tuple: ObjectId, index: usize, item: ObjectId) -> HostResult<()>;

    // Instances and callables

    fn new_instance(&mut self, ty: TypeHandle, payload: Instance) -> HostResult<ObjectId>;
    fn instance(&self, obj: ObjectId) -> Option<&Instance>;
    fn instance_mut(&mut self, obj: ObjectId) -> Option<&mut Instance>;

    fn function_new(&mut self, name: &str, func: HostFunction) -> ObjectId;

    /// Invoke `callable` with the items of the `args` tuple
    fn call_object(&mut self, callable: ObjectId, args: ObjectId) -> HostResult<ObjectId>;
}
