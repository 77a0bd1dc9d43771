//! Call adapter - invoke a host callable with native arguments
//!
//! Arguments are converted left to right under `automatic` policy with no
//! parent. If any argument fails, the already-converted ones are released
//! and the callable is never invoked.

use crate::cast::{cast_to_host, pack_tuple, Caster};
use crate::errors::{CastError, CastResult};
use crate::host::ObjectId;
use crate::interop::Interop;
use crate::logging::log_call;
use crate::policy::ReturnValuePolicy;
use smallvec::SmallVec;

/// Native argument list convertible to host arguments
pub trait IntoArgs {
    const LEN: usize;

    /// Convert every argument, returning new references in order
    fn into_host_args(self, cx: &mut Interop) -> CastResult<SmallVec<[ObjectId; 8]>>;
}

impl IntoArgs for () {
    const LEN: usize = 0;

    fn into_host_args(self, _cx: &mut Interop) -> CastResult<SmallVec<[ObjectId; 8]>> {
        Ok(SmallVec::new())
    }
}

macro_rules! impl_into_args {
    ($len:expr => $($idx:tt $T:ident),+) => {
        impl<$($T: Caster),+> IntoArgs for ($($T,)+) {
            const LEN: usize = $len;

            fn into_host_args(self, cx: &mut Interop) -> CastResult<SmallVec<[ObjectId; 8]>> {
                let mut args: SmallVec<[ObjectId; 8]> = SmallVec::new();
                $(
                    match cast_to_host(cx, self.$idx, ReturnValuePolicy::Automatic, None) {
                        Ok(obj) => args.push(obj),
                        Err(err) => {
                            for obj in args {
                                cx.decref(obj);
                            }
                            return Err(CastError::Argument {
                                index: $idx,
                                source: Box::new(err),
                            });
                        }
                    }
                )+
                Ok(args)
            }
        }
    };
}

impl_into_args!(1 => 0 A);
impl_into_args!(2 => 0 A, 1 B);
impl_into_args!(3 => 0 A, 1 B, 2 C);
impl_into_args!(4 => 0 A, 1 B, 2 C, 3 D);
impl_into_args!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_into_args!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_into_args!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_into_args!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);

/// Call `callable` with `args`, returning the host result as a new reference
///
/// The argument tuple is released whether or not the call succeeds.
pub fn call<A: IntoArgs>(cx: &mut Interop, callable: ObjectId, args: A) -> CastResult<ObjectId> {
    let converted = args.into_host_args(cx)?;
    let tuple = pack_tuple(cx, converted)?;

    let result = cx.host_mut().call_object(callable, tuple);
    cx.decref(tuple);
    log_call(A::LEN, result.is_ok());

    result.map_err(|err| {
        cx.host_mut().clear_error();
        CastError::Host(err)
    })
}
