//! Reference host - a refcounted object heap implementing `ObjectModel`
//!
//! Design: slot heap with generation-checked handles:
//! - None/True/False are immortal singletons in the first three slots
//! - Type objects are immortal (process lifetime)
//! - Releasing a container cascades through its items with a worklist
//! - Dead wrappers are queued for the interop context to reclaim
//! - Strings are stored as code points, so lone surrogates are
//!   representable and fail UTF-8 extraction like a real host

use super::{
    HostError, HostErrorKind, HostFunction, HostResult, ObjectId, ObjectKind, ObjectModel,
    TypeHandle,
};
use crate::logging::trace;
use crate::wrapper::{Instance, Reclaimed};

const NONE_INDEX: u32 = 0;
const TRUE_INDEX: u32 = 1;
const FALSE_INDEX: u32 = 2;

/// Largest Unicode code point
const MAX_CODE_POINT: u32 = 0x10FFFF;

enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Complex(f64, f64),
    Str(Vec<u32>),
    List(Vec<ObjectId>),
    Dict(Vec<(ObjectId, ObjectId)>),
    Tuple(Vec<ObjectId>),
    Type { name: String, base: Option<TypeHandle> },
    Instance { ty: TypeHandle, payload: Instance },
    Function { name: String, func: HostFunction },
}

impl Value {
    fn kind(&self) -> ObjectKind {
        match self {
            Self::None => ObjectKind::None,
            Self::Bool(_) => ObjectKind::Bool,
            Self::Int(_) => ObjectKind::Int,
            Self::Float(_) => ObjectKind::Float,
            Self::Complex(..) => ObjectKind::Complex,
            Self::Str(_) => ObjectKind::Str,
            Self::List(_) => ObjectKind::List,
            Self::Dict(_) => ObjectKind::Dict,
            Self::Tuple(_) => ObjectKind::Tuple,
            Self::Type { .. } => ObjectKind::Type,
            Self::Instance { .. } => ObjectKind::Instance,
            Self::Function { .. } => ObjectKind::Function,
        }
    }

    fn type_name(&self) -> &str {
        match self {
            Self::Function { name, .. } => name,
            other => other.kind().name(),
        }
    }
}

struct Entry {
    refcount: usize,
    immortal: bool,
    value: Value,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Numeric view used for dict key equality
#[derive(Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
}

/// In-process host object heap
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    error: Option<HostError>,
    reclaimed: Vec<Reclaimed>,
}

impl Heap {
    pub fn new() -> Self {
        let mut heap = Self {
            slots: Vec::with_capacity(64),
            free: Vec::new(),
            live: 0,
            error: None,
            reclaimed: Vec::new(),
        };
        heap.insert(Value::None, true);
        heap.insert(Value::Bool(true), true);
        heap.insert(Value::Bool(false), true);
        heap
    }

    /// Number of object slots ever allocated
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn singleton(index: u32) -> ObjectId {
        ObjectId::new(index, 0)
    }

    fn insert(&mut self, value: Value, immortal: bool) -> ObjectId {
        let entry = Entry { refcount: 1, immortal, value };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            ObjectId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, entry: Some(entry) });
            ObjectId::new(index, 0)
        }
    }

    #[inline]
    fn alloc(&mut self, value: Value) -> ObjectId {
        self.insert(value, false)
    }

    fn entry(&self, obj: ObjectId) -> Option<&Entry> {
        self.slots
            .get(obj.index() as usize)
            .filter(|slot| slot.generation == obj.generation())
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, obj: ObjectId) -> Option<&mut Entry> {
        self.slots
            .get_mut(obj.index() as usize)
            .filter(|slot| slot.generation == obj.generation())
            .and_then(|slot| slot.entry.as_mut())
    }

    #[inline]
    fn value(&self, obj: ObjectId) -> Option<&Value> {
        self.entry(obj).map(|entry| &entry.value)
    }

    fn value_mut(&mut self, obj: ObjectId) -> Option<&mut Value> {
        self.entry_mut(obj).map(|entry| &mut entry.value)
    }

    /// Free a slot, bumping its generation so stale handles stop resolving
    fn release(&mut self, obj: ObjectId) -> Option<Value> {
        let slot = self.slots.get_mut(obj.index() as usize)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(obj.index());
        self.live -= 1;
        Some(entry.value)
    }

    /// Set the pending error indicator and return the error
    fn raise<T>(&mut self, err: HostError) -> HostResult<T> {
        self.error = Some(err.clone());
        Err(err)
    }

    fn describe(&self, obj: ObjectId) -> String {
        self.value(obj)
            .map(|value| value.type_name().to_string())
            .unwrap_or_else(|| "<dead object>".to_string())
    }

    fn number(&self, obj: ObjectId) -> Option<Number> {
        match self.value(obj)? {
            Value::Int(v) => Some(Number::Int(*v)),
            Value::Bool(b) => Some(Number::Int(*b as i128)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    fn is_hashable(&self, obj: ObjectId) -> bool {
        match self.value(obj) {
            Some(Value::List(_)) | Some(Value::Dict(_)) | None => false,
            Some(Value::Tuple(items)) => items.iter().all(|item| self.is_hashable(*item)),
            Some(_) => true,
        }
    }

    /// Key equality: value equality for numbers, strings and tuples,
    /// identity for everything else
    fn keys_equal(&self, a: ObjectId, b: ObjectId) -> bool {
        if a == b {
            return true;
        }
        if let (Some(x), Some(y)) = (self.number(a), self.number(b)) {
            return match (x, y) {
                (Number::Int(x), Number::Int(y)) => x == y,
                (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                    f.fract() == 0.0 && i as f64 == f
                }
                (Number::Float(x), Number::Float(y)) => x == y,
            };
        }
        match (self.value(a), self.value(b)) {
            (Some(Value::Str(x)), Some(Value::Str(y))) => x == y,
            (Some(Value::Tuple(x)), Some(Value::Tuple(y))) => {
                x.len() == y.len() && x.iter().zip(y).all(|(l, r)| self.keys_equal(*l, *r))
            }
            _ => false,
        }
    }

    fn items(&self, obj: ObjectId, kind: ObjectKind) -> Option<&Vec<ObjectId>> {
        match (self.value(obj)?, kind) {
            (Value::List(items), ObjectKind::List) | (Value::Tuple(items), ObjectKind::Tuple) => {
                Some(items)
            }
            _ => None,
        }
    }

    /// Store `item` at `index`, stealing its reference even on failure
    fn set_item(
        &mut self,
        container: ObjectId,
        kind: ObjectKind,
        index: usize,
        item: ObjectId,
    ) -> HostResult<()> {
        let replaced = match self.value_mut(container) {
            Some(Value::List(items)) if kind == ObjectKind::List => {
                items.get_mut(index).map(|slot| std::mem::replace(slot, item))
            }
            Some(Value::Tuple(items)) if kind == ObjectKind::Tuple => {
                items.get_mut(index).map(|slot| std::mem::replace(slot, item))
            }
            _ => {
                self.decref(item);
                return self.raise(HostError::type_error(format!(
                    "expected {}, got {}",
                    kind.name(),
                    self.describe(container)
                )));
            }
        };

        match replaced {
            Some(old) => {
                self.decref(old);
                Ok(())
            }
            None => {
                self.decref(item);
                self.raise(HostError::new(
                    HostErrorKind::Index,
                    format!("{} assignment index out of range", kind.name()),
                ))
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectModel for Heap {
    fn incref(&mut self, obj: ObjectId) {
        if let Some(entry) = self.entry_mut(obj) {
            entry.refcount += 1;
        }
    }

    fn decref(&mut self, obj: ObjectId) {
        let mut pending = vec![obj];

        while let Some(id) = pending.pop() {
            let Some(entry) = self.entry_mut(id) else {
                continue;
            };
            debug_assert!(entry.refcount > 0, "refcount underflow");

            if entry.immortal {
                entry.refcount = entry.refcount.saturating_sub(1).max(1);
                continue;
            }
            entry.refcount -= 1;
            if entry.refcount > 0 {
                continue;
            }

            let Some(value) = self.release(id) else {
                continue;
            };
            match value {
                Value::List(items) | Value::Tuple(items) => pending.extend(items),
                Value::Dict(entries) => {
                    for (key, value) in entries {
                        pending.push(key);
                        pending.push(value);
                    }
                }
                Value::Instance { payload, .. } => {
                    trace!(event = "wrapper_released", object = ?id, address = payload.address());
                    self.reclaimed.push(Reclaimed { object: id, instance: payload });
                }
                _ => {}
            }
        }
    }

    fn refcount(&self, obj: ObjectId) -> usize {
        self.entry(obj).map_or(0, |entry| entry.refcount)
    }

    fn live_objects(&self) -> usize {
        self.live
    }

    fn drain_reclaimed(&mut self) -> Vec<Reclaimed> {
        std::mem::take(&mut self.reclaimed)
    }

    fn error_occurred(&self) -> bool {
        self.error.is_some()
    }

    fn set_error(&mut self, err: HostError) {
        self.error = Some(err);
    }

    fn clear_error(&mut self) -> Option<HostError> {
        self.error.take()
    }

    fn kind(&self, obj: ObjectId) -> Option<ObjectKind> {
        self.value(obj).map(Value::kind)
    }

    fn type_of(&self, obj: ObjectId) -> Option<TypeHandle> {
        match self.value(obj)? {
            Value::Instance { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    fn is_subtype(&self, sub: TypeHandle, sup: TypeHandle) -> bool {
        let mut current = Some(sub);
        while let Some(ty) = current {
            if ty == sup {
                return true;
            }
            current = match self.value(ty.object()) {
                Some(Value::Type { base, .. }) => *base,
                _ => None,
            };
        }
        false
    }

    fn new_type(&mut self, name: &str, base: Option<TypeHandle>) -> TypeHandle {
        let obj = self.insert(Value::Type { name: name.to_string(), base }, true);
        TypeHandle::from_object(obj)
    }

    fn type_name(&self, ty: TypeHandle) -> Option<String> {
        match self.value(ty.object())? {
            Value::Type { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    fn none(&mut self) -> ObjectId {
        let none = Self::singleton(NONE_INDEX);
        self.incref(none);
        none
    }

    fn bool_new(&mut self, value: bool) -> ObjectId {
        let obj = Self::singleton(if value { TRUE_INDEX } else { FALSE_INDEX });
        self.incref(obj);
        obj
    }

    fn bool_value(&self, obj: ObjectId) -> Option<bool> {
        if obj == Self::singleton(TRUE_INDEX) {
            Some(true)
        } else if obj == Self::singleton(FALSE_INDEX) {
            Some(false)
        } else {
            None
        }
    }

    fn int_new(&mut self, value: i128) -> ObjectId {
        self.alloc(Value::Int(value))
    }

    fn int_value(&mut self, obj: ObjectId) -> HostResult<i128> {
        match self.number(obj) {
            Some(Number::Int(value)) => Ok(value),
            _ => {
                let got = self.describe(obj);
                self.raise(HostError::type_error(format!("an integer is required (got type {got})")))
            }
        }
    }

    fn float_new(&mut self, value: f64) -> ObjectId {
        self.alloc(Value::Float(value))
    }

    fn float_value(&mut self, obj: ObjectId) -> HostResult<f64> {
        match self.number(obj) {
            Some(Number::Float(value)) => Ok(value),
            Some(Number::Int(value)) => Ok(value as f64),
            None => {
                let got = self.describe(obj);
                self.raise(HostError::type_error(format!("must be real number, not {got}")))
            }
        }
    }

    fn complex_new(&mut self, re: f64, im: f64) -> ObjectId {
        self.alloc(Value::Complex(re, im))
    }

    fn complex_value(&mut self, obj: ObjectId) -> HostResult<(f64, f64)> {
        if let Some(Value::Complex(re, im)) = self.value(obj) {
            return Ok((*re, *im));
        }
        match self.number(obj) {
            Some(Number::Float(re)) => Ok((re, 0.0)),
            Some(Number::Int(re)) => Ok((re as f64, 0.0)),
            None => {
                let got = self.describe(obj);
                self.raise(HostError::type_error(format!("complex() argument must be a number, not {got}")))
            }
        }
    }

    fn str_from_utf8(&mut self, value: &str) -> ObjectId {
        self.alloc(Value::Str(value.chars().map(u32::from).collect()))
    }

    fn str_from_wide(&mut self, units: &[u32]) -> HostResult<ObjectId> {
        if let Some(bad) = units.iter().find(|unit| **unit > MAX_CODE_POINT) {
            return self.raise(HostError::new(
                HostErrorKind::Value,
                format!("character U+{bad:x} is not in range [U+0000; U+10ffff]"),
            ));
        }
        Ok(self.alloc(Value::Str(units.to_vec())))
    }

    fn str_as_utf8(&mut self, obj: ObjectId) -> HostResult<String> {
        let decoded = match self.value(obj) {
            Some(Value::Str(units)) => units.iter().map(|unit| char::from_u32(*unit)).collect::<Option<String>>(),
            _ => {
                let got = self.describe(obj);
                return self.raise(HostError::type_error(format!("expected str, got {got}")));
            }
        };
        match decoded {
            Some(text) => Ok(text),
            None => self.raise(HostError::new(
                HostErrorKind::Unicode,
                "'utf-8' codec can't encode character: surrogates not allowed",
            )),
        }
    }

    fn str_as_wide(&mut self, obj: ObjectId) -> HostResult<Vec<u32>> {
        match self.value(obj) {
            Some(Value::Str(units)) => Ok(units.clone()),
            _ => {
                let got = self.describe(obj);
                self.raise(HostError::type_error(format!("expected str, got {got}")))
            }
        }
    }

    fn list_new(&mut self, len: usize) -> ObjectId {
        let none = Self::singleton(NONE_INDEX);
        for _ in 0..len {
            self.incref(none);
        }
        self.alloc(Value::List(vec![none; len]))
    }

    fn list_len(&self, list: ObjectId) -> Option<usize> {
        self.items(list, ObjectKind::List).map(Vec::len)
    }

    fn list_get(&self, list: ObjectId, index: usize) -> Option<ObjectId> {
        self.items(list, ObjectKind::List)?.get(index).copied()
    }

    fn list_set(&mut self, list: ObjectId, index: usize, item: ObjectId) -> HostResult<()> {
        self.set_item(list, ObjectKind::List, index, item)
    }

    fn dict_new(&mut self) -> ObjectId {
        self.alloc(Value::Dict(Vec::new()))
    }

    fn dict_len(&self, dict: ObjectId) -> Option<usize> {
        match self.value(dict)? {
            Value::Dict(entries) => Some(entries.len()),
            _ => None,
        }
    }

    fn dict_items(&self, dict: ObjectId) -> Option<Vec<(ObjectId, ObjectId)>> {
        match self.value(dict)? {
            Value::Dict(entries) => Some(entries.clone()),
            _ => None,
        }
    }

    fn dict_set(&mut self, dict: ObjectId, key: ObjectId, value: ObjectId) -> HostResult<()> {
        let entries = match self.value(dict) {
            Some(Value::Dict(entries)) => entries,
            _ => {
                let got = self.describe(dict);
                return self.raise(HostError::type_error(format!("expected dict, got {got}")));
            }
        };
        if !self.is_hashable(key) {
            let got = self.describe(key);
            return self.raise(HostError::type_error(format!("unhashable type: '{got}'")));
        }

        let existing = entries.iter().position(|(k, _)| self.keys_equal(*k, key));
        self.incref(value);

        let replaced = match self.value_mut(dict) {
            Some(Value::Dict(entries)) => match existing {
                Some(pos) => Some(std::mem::replace(&mut entries[pos].1, value)),
                None => {
                    entries.push((key, value));
                    None
                }
            },
            _ => None,
        };

        match replaced {
            Some(old) => self.decref(old),
            None => self.incref(key),
        }
        Ok(())
    }

    fn tuple_new(&mut self, len: usize) -> ObjectId {
        let none = Self::singleton(NONE_INDEX);
        for _ in 0..len {
            self.incref(none);
        }
        self.alloc(Value::Tuple(vec![none; len]))
    }

    fn tuple_len(&self, tuple: ObjectId) -> Option<usize> {
        self.items(tuple, ObjectKind::Tuple).map(Vec::len)
    }

    fn tuple_get(&self, tuple: ObjectId, index: usize) -> Option<ObjectId> {
        self.items(tuple, ObjectKind::Tuple)?.get(index).copied()
    }

    fn tuple_set(&mut self, tuple: ObjectId, index: usize, item: ObjectId) -> HostResult<()> {
        self.set_item(tuple, ObjectKind::Tuple, index, item)
    }

    fn new_instance(&mut self, ty: TypeHandle, payload: Instance) -> HostResult<ObjectId> {
        if !matches!(self.value(ty.object()), Some(Value::Type { .. })) {
            let got = self.describe(ty.object());
            return self.raise(HostError::type_error(format!("{got} is not a type object")));
        }
        Ok(self.alloc(Value::Instance { ty, payload }))
    }

    fn instance(&self, obj: ObjectId) -> Option<&Instance> {
        match self.value(obj)? {
            Value::Instance { payload, .. } => Some(payload),
            _ => None,
        }
    }

    fn instance_mut(&mut self, obj: ObjectId) -> Option<&mut Instance> {
        match self.value_mut(obj)? {
            Value::Instance { payload, .. } => Some(payload),
            _ => None,
        }
    }

    fn function_new(&mut self, name: &str, func: HostFunction) -> ObjectId {
        self.alloc(Value::Function { name: name.to_string(), func })
    }

    fn call_object(&mut self, callable: ObjectId, args: ObjectId) -> HostResult<ObjectId> {
        let func = match self.value(callable) {
            Some(Value::Function { func, .. }) => func.clone(),
            _ => {
                let got = self.describe(callable);
                return self.raise(HostError::type_error(format!("'{got}' object is not callable")));
            }
        };
        let Some(items) = self.items(args, ObjectKind::Tuple).cloned() else {
            return self.raise(HostError::type_error("argument list must be a tuple"));
        };

        match func(self, &items) {
            Ok(result) => Ok(result),
            Err(err) => self.raise(err),
        }
    }
}
