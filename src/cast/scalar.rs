//! Scalar casters
//!
//! Loads go through the host's own extraction primitives; any error they
//! raise is cleared here and reported as a failed load.

use super::Caster;
use crate::errors::{CastError, CastResult};
use crate::host::{ObjectId, ObjectKind};
use crate::interop::Interop;
use crate::policy::ReturnValuePolicy;
use num_traits::NumCast;

/// Text in the host's wide (code point) representation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WideString(pub Vec<u32>);

impl WideString {
    pub fn as_units(&self) -> &[u32] {
        &self.0
    }
}

impl From<&str> for WideString {
    fn from(value: &str) -> Self {
        Self(value.chars().map(|c| c as u32).collect())
    }
}

/// Complex number with real and imaginary parts of type `T`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub const fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// Untyped host object, passed through without conversion
///
/// Loading yields a borrowed handle; casting adds a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub ObjectId);

macro_rules! impl_int_caster {
    ($($ty:ty),* $(,)?) => {$(
        impl Caster for $ty {
            fn name() -> String {
                stringify!($ty).to_string()
            }

            fn load(cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
                let host = cx.host_mut();
                match host.int_value(src) {
                    // Out of range for the native width
                    Ok(value) => <$ty as NumCast>::from(value),
                    Err(_) => {
                        host.clear_error();
                        None
                    }
                }
            }

            fn cast(
                self,
                cx: &mut Interop,
                _policy: ReturnValuePolicy,
                _parent: Option<ObjectId>,
            ) -> CastResult<ObjectId> {
                Ok(cx.host_mut().int_new(self as i128))
            }
        }
    )*};
}

impl_int_caster!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Narrow a host double, failing when a finite value overflows the target
fn narrow_float<T: num_traits::Float>(value: f64) -> Option<T> {
    let narrowed = T::from(value)?;
    if value.is_finite() && !narrowed.is_finite() {
        return None;
    }
    Some(narrowed)
}

macro_rules! impl_float_caster {
    ($($ty:ty),* $(,)?) => {$(
        impl Caster for $ty {
            fn name() -> String {
                stringify!($ty).to_string()
            }

            fn load(cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
                let host = cx.host_mut();
                match host.float_value(src) {
                    Ok(value) => narrow_float(value),
                    Err(_) => {
                        host.clear_error();
                        None
                    }
                }
            }

            fn cast(
                self,
                cx: &mut Interop,
                _policy: ReturnValuePolicy,
                _parent: Option<ObjectId>,
            ) -> CastResult<ObjectId> {
                Ok(cx.host_mut().float_new(self as f64))
            }
        }

        impl Caster for Complex<$ty> {
            fn name() -> String {
                "complex".to_string()
            }

            fn load(cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
                let host = cx.host_mut();
                match host.complex_value(src) {
                    Ok((re, im)) => Some(Complex::new(narrow_float(re)?, narrow_float(im)?)),
                    Err(_) => {
                        host.clear_error();
                        None
                    }
                }
            }

            fn cast(
                self,
                cx: &mut Interop,
                _policy: ReturnValuePolicy,
                _parent: Option<ObjectId>,
            ) -> CastResult<ObjectId> {
                Ok(cx.host_mut().complex_new(self.re as f64, self.im as f64))
            }
        }
    )*};
}

impl_float_caster!(f32, f64);

impl Caster for bool {
    fn name() -> String {
        "bool".to_string()
    }

    fn load(cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
        cx.host().bool_value(src)
    }

    fn cast(self, cx: &mut Interop, _policy: ReturnValuePolicy, _parent: Option<ObjectId>) -> CastResult<ObjectId> {
        Ok(cx.host_mut().bool_new(self))
    }
}

impl Caster for String {
    fn name() -> String {
        "str".to_string()
    }

    fn load(cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
        let host = cx.host_mut();
        match host.str_as_utf8(src) {
            Ok(text) => Some(text),
            Err(_) => {
                host.clear_error();
                None
            }
        }
    }

    fn cast(self, cx: &mut Interop, _policy: ReturnValuePolicy, _parent: Option<ObjectId>) -> CastResult<ObjectId> {
        Ok(cx.host_mut().str_from_utf8(&self))
    }
}

impl Caster for WideString {
    fn name() -> String {
        "wstr".to_string()
    }

    fn load(cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
        let host = cx.host_mut();
        match host.str_as_wide(src) {
            Ok(units) => Some(WideString(units)),
            Err(_) => {
                host.clear_error();
                None
            }
        }
    }

    fn cast(self, cx: &mut Interop, _policy: ReturnValuePolicy, _parent: Option<ObjectId>) -> CastResult<ObjectId> {
        let host = cx.host_mut();
        host.str_from_wide(&self.0).map_err(|err| {
            host.clear_error();
            CastError::Host(err)
        })
    }
}

/// A `char` is a string of exactly one code point
impl Caster for char {
    fn name() -> String {
        "str".to_string()
    }

    fn load(cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
        let units = WideString::load(cx, src, false)?.0;
        match units.as_slice() {
            [unit] => char::from_u32(*unit),
            _ => None,
        }
    }

    fn cast(self, cx: &mut Interop, _policy: ReturnValuePolicy, _parent: Option<ObjectId>) -> CastResult<ObjectId> {
        let mut buf = [0u8; 4];
        Ok(cx.host_mut().str_from_utf8(self.encode_utf8(&mut buf)))
    }
}

/// Void: loads from anything, casts to None
impl Caster for () {
    fn name() -> String {
        "None".to_string()
    }

    fn load(_cx: &mut Interop, _src: ObjectId, _convert: bool) -> Option<Self> {
        Some(())
    }

    fn cast(self, cx: &mut Interop, _policy: ReturnValuePolicy, _parent: Option<ObjectId>) -> CastResult<ObjectId> {
        Ok(cx.host_mut().none())
    }
}

impl Caster for Handle {
    fn name() -> String {
        "handle".to_string()
    }

    fn load(_cx: &mut Interop, src: ObjectId, _convert: bool) -> Option<Self> {
        Some(Handle(src))
    }

    fn cast(self, cx: &mut Interop, _policy: ReturnValuePolicy, _parent: Option<ObjectId>) -> CastResult<ObjectId> {
        cx.incref(self.0);
        Ok(self.0)
    }
}

impl<T: Caster> Caster for Option<T> {
    const IS_POINTER: bool = T::IS_POINTER;
    const BORROWS: bool = T::BORROWS;

    fn name() -> String {
        format!("Optional[{}]", T::name())
    }

    fn load(cx: &mut Interop, src: ObjectId, convert: bool) -> Option<Self> {
        if cx.host().kind(src) == Some(ObjectKind::None) {
            return Some(None);
        }
        T::load(cx, src, convert).map(Some)
    }

    fn cast(self, cx: &mut Interop, policy: ReturnValuePolicy, parent: Option<ObjectId>) -> CastResult<ObjectId> {
        match self {
            Some(value) => value.cast(cx, policy, parent),
            None => Ok(cx.host_mut().none()),
        }
    }
}
