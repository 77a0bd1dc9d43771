//! Composite casters - `Vec`, maps and fixed-arity tuples
//!
//! Elements are converted independently with their own casters. A load
//! fails as a whole on the first element that does not load; a cast
//! releases every host object it already produced before returning the
//! element's error, so no partial container escapes.

use super::Caster;
use crate::errors::{CastError, CastResult};
use crate::host::ObjectId;
use crate::interop::Interop;
use crate::policy::ReturnValuePolicy;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

impl<T: Caster> Caster for Vec<T> {
    const IS_POINTER: bool = T::IS_POINTER;
    const BORROWS: bool = T::BORROWS;

    fn name() -> String {
        format!("list<{}>", T::name())
    }

    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
        let len = cx.host().list_len(src)?;
        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            let item = cx.host().list_get(src, index)?;
            out.push(T::load(cx, item, convert)?);
        }
        Some(out)
    }

    fn cast(self, cx: &mut Interop, policy: ReturnValuePolicy, parent: Option<ObjectId>) -> CastResult<ObjectId> {
        let list = cx.host_mut().list_new(self.len());

        for (index, item) in self.into_iter().enumerate() {
            let obj = match item.cast(cx, policy, parent) {
                Ok(obj) => obj,
                Err(err) => {
                    cx.decref(list);
                    return Err(err);
                }
            };
            // list_set steals `obj` whether or not it succeeds
            if let Err(err) = cx.host_mut().list_set(list, index, obj) {
                cx.host_mut().clear_error();
                cx.decref(list);
                return Err(err.into());
            }
        }
        Ok(list)
    }
}

fn load_map<K, V, M>(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<M>
where
    K: Caster,
    V: Caster,
    M: Default + Extend<(K, V)>,
{
    let entries = cx.host().dict_items(src)?;
    let mut out = M::default();
    for (key, value) in entries {
        let key = K::load(cx, key, convert)?;
        let value = V::load(cx, value, convert)?;
        out.extend(std::iter::once((key, value)));
    }
    Some(out)
}

fn cast_map<K, V, I>(
    cx: &mut Interop,
    entries: I,
    policy: ReturnValuePolicy,
    parent: Option<ObjectId>,
) -> CastResult<ObjectId>
where
    K: Caster,
    V: Caster,
    I: IntoIterator<Item = (K, V)>,
{
    let dict = cx.host_mut().dict_new();

    for (key, value) in entries {
        let key = match key.cast(cx, policy, parent) {
            Ok(obj) => obj,
            Err(err) => {
                cx.decref(dict);
                return Err(err);
            }
        };
        let value = match value.cast(cx, policy, parent) {
            Ok(obj) => obj,
            Err(err) => {
                cx.decref(key);
                cx.decref(dict);
                return Err(err);
            }
        };

        let stored = cx.host_mut().dict_set(dict, key, value);
        cx.decref(key);
        cx.decref(value);
        if let Err(err) = stored {
            cx.host_mut().clear_error();
            cx.decref(dict);
            return Err(err.into());
        }
    }
    Ok(dict)
}

impl<K: Caster + Ord, V: Caster> Caster for BTreeMap<K, V> {
    const IS_POINTER: bool = K::IS_POINTER || V::IS_POINTER;
    const BORROWS: bool = K::BORROWS || V::BORROWS;

    fn name() -> String {
        format!("dict<{}, {}>", K::name(), V::name())
    }

    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
        load_map(cx, src, convert)
    }

    fn cast(self, cx: &mut Interop, policy: ReturnValuePolicy, parent: Option<ObjectId>) -> CastResult<ObjectId> {
        cast_map(cx, self, policy, parent)
    }
}

impl<K, V, S> Caster for HashMap<K, V, S>
where
    K: Caster + Eq + Hash,
    V: Caster,
    S: BuildHasher + Default,
{
    const IS_POINTER: bool = K::IS_POINTER || V::IS_POINTER;
    const BORROWS: bool = K::BORROWS || V::BORROWS;

    fn name() -> String {
        format!("dict<{}, {}>", K::name(), V::name())
    }

    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
        load_map(cx, src, convert)
    }

    fn cast(self, cx: &mut Interop, policy: ReturnValuePolicy, parent: Option<ObjectId>) -> CastResult<ObjectId> {
        cast_map(cx, self, policy, parent)
    }
}

/// Pack already-converted objects into a new host tuple, taking over their
/// references
pub(crate) fn pack_tuple(cx: &mut Interop, items: SmallVec<[ObjectId; 8]>) -> CastResult<ObjectId> {
    let tuple = cx.host_mut().tuple_new(items.len());
    let mut items = items.into_iter().enumerate();

    while let Some((index, obj)) = items.next() {
        if let Err(err) = cx.host_mut().tuple_set(tuple, index, obj) {
            cx.host_mut().clear_error();
            for (_, rest) in items.by_ref() {
                cx.decref(rest);
            }
            cx.decref(tuple);
            return Err(err.into());
        }
    }
    Ok(tuple)
}

/// Invoke a native callable with the elements of a tuple as arguments
pub trait Apply<F, R> {
    fn apply(self, f: F) -> R;
}

impl<F: FnOnce() -> R, R> Apply<F, R> for () {
    fn apply(self, f: F) -> R {
        f()
    }
}

macro_rules! impl_tuple_caster {
    ($len:expr => $($idx:tt $T:ident),+) => {
        impl<$($T: Caster),+> Caster for ($($T,)+) {
            const IS_POINTER: bool = false $(|| $T::IS_POINTER)+;
            const BORROWS: bool = false $(|| $T::BORROWS)+;

            fn name() -> String {
                let names: [String; $len] = [$($T::name()),+];
                format!("({})", names.join(", "))
            }

            fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
                // Arity is checked before any element is converted
                if cx.host().tuple_len(src)? != $len {
                    return None;
                }
                Some(($({
                    let item = cx.host().tuple_get(src, $idx)?;
                    $T::load(cx, item, convert)?
                },)+))
            }

            fn cast(
                self,
                cx: &mut Interop,
                policy: ReturnValuePolicy,
                parent: Option<ObjectId>,
            ) -> CastResult<ObjectId> {
                let mut produced: SmallVec<[ObjectId; 8]> = SmallVec::new();
                $(
                    match self.$idx.cast(cx, policy, parent) {
                        Ok(obj) => produced.push(obj),
                        Err(err) => {
                            for obj in produced {
                                cx.decref(obj);
                            }
                            return Err(err);
                        }
                    }
                )+
                pack_tuple(cx, produced)
            }
        }

        impl<Func, Ret, $($T),+> Apply<Func, Ret> for ($($T,)+)
        where
            Func: FnOnce($($T),+) -> Ret,
        {
            fn apply(self, f: Func) -> Ret {
                f($(self.$idx),+)
            }
        }
    };
}

impl_tuple_caster!(1 => 0 A);
impl_tuple_caster!(2 => 0 A, 1 B);
impl_tuple_caster!(3 => 0 A, 1 B, 2 C);
impl_tuple_caster!(4 => 0 A, 1 B, 2 C, 3 D);
impl_tuple_caster!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_tuple_caster!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_tuple_caster!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_tuple_caster!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);

/// Load a host argument tuple as `Args` and invoke `f` over its elements
///
/// This is the native half of a bound call: a tuple that does not load
/// (wrong arity or an element mismatch) is reported as a load error naming
/// the expected argument types. Conversion temporaries live for the
/// duration of `f` only, so borrowed arguments must not escape it.
pub fn call_with<Args, F, R>(cx: &mut Interop, args: ObjectId, f: F) -> CastResult<R>
where
    Args: Caster + Apply<F, R>,
{
    let mark = cx.temporaries_mark();
    let result = match Args::load(cx, args, true) {
        Some(loaded) => Ok(loaded.apply(f)),
        None => Err(CastError::load(Args::name())),
    };
    cx.release_temporaries_from(mark);
    result
}
