//! Tests for the value casters

use super::*;
use crate::host::{Heap, ObjectKind, ObjectModel};
use crate::registry::TypeBuilder;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn context() -> Interop {
    Interop::new(Heap::new())
}

fn round_trip<T: Caster>(cx: &mut Interop, value: T) -> Option<T> {
    let obj = cast_to_host(cx, value, ReturnValuePolicy::Automatic, None).ok()?;
    let loaded = T::load(cx, obj, false);
    cx.decref(obj);
    loaded
}

#[derive(Clone, Debug, PartialEq)]
struct Celsius(f64);

struct Connection {
    port: u16,
}

#[cfg(test)]
mod scalar_tests {
    use super::*;

    #[test]
    fn test_integer_bounds_round_trip() {
        let mut cx = context();
        assert_eq!(round_trip(&mut cx, i8::MIN), Some(i8::MIN));
        assert_eq!(round_trip(&mut cx, u64::MAX), Some(u64::MAX));
        assert_eq!(round_trip(&mut cx, i64::MIN), Some(i64::MIN));
        assert_eq!(round_trip(&mut cx, usize::MAX), Some(usize::MAX));
    }

    #[test]
    fn test_integer_overflow_fails_load() {
        let mut cx = context();
        let big = cx.host_mut().int_new(300);
        assert_eq!(u8::load(&mut cx, big, true), None);
        assert_eq!(u16::load(&mut cx, big, true), Some(300));

        let negative = cx.host_mut().int_new(-1);
        assert_eq!(u32::load(&mut cx, negative, true), None);
    }

    #[test]
    fn test_type_mismatch_clears_host_error() {
        let mut cx = context();
        let text = cx.host_mut().str_from_utf8("12");

        assert_eq!(i32::load(&mut cx, text, true), None);
        assert!(!cx.host().error_occurred());
        assert_eq!(f64::load(&mut cx, text, true), None);
        assert!(!cx.host().error_occurred());
    }

    #[test]
    fn test_floats_accept_ints() {
        let mut cx = context();
        let two = cx.host_mut().int_new(2);
        assert_eq!(f64::load(&mut cx, two, false), Some(2.0));
        assert_eq!(round_trip(&mut cx, 1.5f32), Some(1.5f32));
        assert_eq!(round_trip(&mut cx, f64::MAX), Some(f64::MAX));
    }

    #[test]
    fn test_f32_rejects_finite_overflow() {
        let mut cx = context();
        let huge = cx.host_mut().float_new(1e300);
        assert_eq!(f32::load(&mut cx, huge, true), None);
        assert_eq!(f64::load(&mut cx, huge, true), Some(1e300));

        let inf = cx.host_mut().float_new(f64::INFINITY);
        assert_eq!(f32::load(&mut cx, inf, true), Some(f32::INFINITY));

        let z = cx.host_mut().complex_new(1.0, -1e300);
        assert_eq!(Complex::<f32>::load(&mut cx, z, true), None);
        assert_eq!(Complex::<f64>::load(&mut cx, z, true), Some(Complex::new(1.0, -1e300)));
    }

    #[test]
    fn test_bool_matches_only_singletons() {
        let mut cx = context();
        assert_eq!(round_trip(&mut cx, true), Some(true));
        assert_eq!(round_trip(&mut cx, false), Some(false));

        let one = cx.host_mut().int_new(1);
        assert_eq!(bool::load(&mut cx, one, true), None);
    }

    #[test]
    fn test_text_round_trip_is_exact() {
        let mut cx = context();
        let text = String::from("grüße, 世界 🦀");
        assert_eq!(round_trip(&mut cx, text.clone()), Some(text));

        let wide = WideString::from("wide ✓");
        assert_eq!(round_trip(&mut cx, wide.clone()), Some(wide));
        assert_eq!(round_trip(&mut cx, 'λ'), Some('λ'));
    }

    #[test]
    fn test_wide_string_from_str_keeps_code_points() {
        let wide = WideString::from("aλ🦀");
        assert_eq!(wide.as_units(), &[0x61, 0x3BB, 0x1F980]);
    }

    #[test]
    fn test_surrogate_fails_utf8_but_loads_wide() {
        let mut cx = context();
        let units = vec![0x41, 0xDC00];
        let obj = cast_to_host(&mut cx, WideString(units.clone()), ReturnValuePolicy::Automatic, None).unwrap();

        assert_eq!(String::load(&mut cx, obj, true), None);
        assert!(!cx.host().error_occurred());
        assert_eq!(WideString::load(&mut cx, obj, true), Some(WideString(units)));
    }

    #[test]
    fn test_invalid_wide_string_raises() {
        let mut cx = context();
        let err = cast_to_host(&mut cx, WideString(vec![0x110000]), ReturnValuePolicy::Automatic, None).unwrap_err();
        assert!(matches!(err, CastError::Host(_)));
        assert!(!cx.host().error_occurred());
    }

    #[test]
    fn test_char_requires_single_code_point() {
        let mut cx = context();
        let word = cx.host_mut().str_from_utf8("ab");
        assert_eq!(char::load(&mut cx, word, true), None);
    }

    #[test]
    fn test_complex_round_trip() {
        let mut cx = context();
        let z = Complex::new(1.5, -2.0);
        assert_eq!(round_trip(&mut cx, z), Some(z));

        let real = cx.host_mut().float_new(3.0);
        assert_eq!(Complex::<f32>::load(&mut cx, real, true), Some(Complex::new(3.0, 0.0)));
    }

    #[test]
    fn test_unit_and_option() {
        let mut cx = context();
        let obj = cast_to_host(&mut cx, (), ReturnValuePolicy::Automatic, None).unwrap();
        assert_eq!(cx.host().kind(obj), Some(ObjectKind::None));
        assert_eq!(<()>::load(&mut cx, obj, false), Some(()));

        assert_eq!(round_trip(&mut cx, Some(5i32)), Some(Some(5)));
        assert_eq!(round_trip(&mut cx, None::<i32>), Some(None));
    }

    #[test]
    fn test_handle_cast_adds_reference() {
        let mut cx = context();
        let obj = cx.host_mut().int_new(7);

        let handle = Handle::load(&mut cx, obj, false).unwrap();
        assert_eq!(cx.host().refcount(obj), 1);

        let out = cast_to_host(&mut cx, handle, ReturnValuePolicy::Automatic, None).unwrap();
        assert_eq!(out, obj);
        assert_eq!(cx.host().refcount(obj), 2);
    }

    #[test]
    fn test_cast_from_host_names_type() {
        let mut cx = context();
        let text = cx.host_mut().str_from_utf8("x");
        let err = cast_from_host::<i32>(&mut cx, text).unwrap_err();
        assert_eq!(err, CastError::load("i32"));
    }
}

#[cfg(test)]
mod composite_tests {
    use super::*;

    #[test]
    fn test_vec_round_trip_preserves_order() {
        let mut cx = context();
        let values = vec![3i32, 1, 2];
        assert_eq!(round_trip(&mut cx, values.clone()), Some(values));
        assert_eq!(round_trip(&mut cx, Vec::<String>::new()), Some(vec![]));
    }

    #[test]
    fn test_vec_requires_list() {
        let mut cx = context();
        let tuple = cast_to_host(&mut cx, (1i32, 2i32), ReturnValuePolicy::Automatic, None).unwrap();
        assert_eq!(Vec::<i32>::load(&mut cx, tuple, true), None);
    }

    #[test]
    fn test_vec_load_fails_on_any_element() {
        let mut cx = context();
        let list = cx.host_mut().list_new(2);
        let one = cx.host_mut().int_new(1);
        let two = cx.host_mut().str_from_utf8("two");
        cx.host_mut().list_set(list, 0, one).unwrap();
        cx.host_mut().list_set(list, 1, two).unwrap();

        assert_eq!(Vec::<i32>::load(&mut cx, list, true), None);
        assert!(!cx.host().error_occurred());
    }

    #[test]
    fn test_nested_composites() {
        let mut cx = context();
        let mut value: BTreeMap<String, Vec<(i32, bool)>> = BTreeMap::new();
        value.insert("a".into(), vec![(1, true), (2, false)]);
        value.insert("b".into(), vec![]);
        assert_eq!(round_trip(&mut cx, value.clone()), Some(value));
    }

    #[test]
    fn test_hash_map_round_trip() {
        let mut cx = context();
        let value: HashMap<i64, String> = [(1, "one".to_string()), (2, "two".to_string())].into_iter().collect();
        assert_eq!(round_trip(&mut cx, value.clone()), Some(value));
    }

    #[test]
    fn test_tuple_arity_mismatch() {
        let mut cx = context();
        let triple = cast_to_host(&mut cx, (1i32, 2i32, 3i32), ReturnValuePolicy::Automatic, None).unwrap();
        assert_eq!(<(i32, i32)>::load(&mut cx, triple, true), None);
        assert_eq!(<(i32, i32, i32)>::load(&mut cx, triple, true), Some((1, 2, 3)));
    }

    #[test]
    fn test_composite_names() {
        assert_eq!(<Vec<i32>>::name(), "list<i32>");
        assert_eq!(<BTreeMap<String, f64>>::name(), "dict<str, f64>");
        assert_eq!(<(i32, String)>::name(), "(i32, str)");
    }

    #[test]
    fn test_call_with_applies_loaded_tuple() {
        let mut cx = context();
        let args = cast_to_host(&mut cx, (6i32, String::from("x")), ReturnValuePolicy::Automatic, None).unwrap();

        let out = call_with::<(i32, String), _, _>(&mut cx, args, |n: i32, s: String| s.repeat(n as usize)).unwrap();
        assert_eq!(out, "xxxxxx");

        let err = call_with::<(i32, i32), _, _>(&mut cx, args, |a: i32, b: i32| a + b).unwrap_err();
        assert_eq!(err, CastError::load("(i32, i32)"));
    }
}

#[cfg(test)]
mod object_tests {
    use super::*;

    fn register_celsius(cx: &mut Interop) {
        let ty = cx.host_mut().new_type("Celsius", None);
        cx.register(TypeBuilder::<Celsius>::new(ty).copyable().build()).unwrap();
    }

    #[test]
    fn test_unregistered_type_is_named() {
        let mut cx = context();
        let value = Celsius(1.0);
        let err = unsafe { cast_value(&mut cx, &value, ReturnValuePolicy::Copy, None) }.unwrap_err();
        assert!(matches!(err, CastError::UnregisteredType { .. }));
        assert!(err.to_string().contains("Celsius"));
    }

    #[test]
    fn test_box_load_copies_and_cast_transfers() {
        let mut cx = context();
        register_celsius(&mut cx);

        let obj = cast_to_host(&mut cx, Box::new(Celsius(20.0)), ReturnValuePolicy::Automatic, None).unwrap();
        assert!(cx.host().instance(obj).unwrap().is_owned());

        let copy = Box::<Celsius>::load(&mut cx, obj, false).unwrap();
        assert_eq!(*copy, Celsius(20.0));
        assert_ne!(&*copy as *const Celsius as usize, cx.host().instance(obj).unwrap().address());
    }

    #[test]
    fn test_ptr_load_binds_without_copy() {
        let mut cx = context();
        register_celsius(&mut cx);

        let value = Celsius(5.0);
        let obj = unsafe { cast_value(&mut cx, &value, ReturnValuePolicy::Reference, None) }.unwrap();
        let ptr = Ptr::<Celsius>::load(&mut cx, obj, false).unwrap();
        assert_eq!(ptr.as_ptr(), &value as *const Celsius);
    }

    #[test]
    fn test_take_ownership_of_borrowed_value_rejected() {
        let mut cx = context();
        register_celsius(&mut cx);

        let value = Celsius(5.0);
        let err = unsafe { cast_value(&mut cx, &value, ReturnValuePolicy::TakeOwnership, None) }.unwrap_err();
        assert!(matches!(err, CastError::InvalidPolicy { .. }));
    }

    #[test]
    fn test_none_loads_as_null_ptr_only_with_conversion() {
        let mut cx = context();
        register_celsius(&mut cx);
        let none = cx.host_mut().none();

        assert!(Ptr::<Celsius>::load(&mut cx, none, true).unwrap().is_null());
        assert!(Ptr::<Celsius>::load(&mut cx, none, false).is_none());
    }

    #[test]
    fn test_implicit_conversion_from_float() {
        let mut cx = context();
        let ty = cx.host_mut().new_type("Celsius", None);
        let desc = TypeBuilder::<Celsius>::new(ty)
            .copyable()
            .implicit_conversion(|cx, src| {
                let degrees = f64::load(cx, src, false)?;
                cast_to_host(cx, Box::new(Celsius(degrees)), ReturnValuePolicy::Automatic, None).ok()
            })
            .build();
        cx.register(desc).unwrap();

        let raw = cx.host_mut().float_new(36.6);
        assert!(Ptr::<Celsius>::load(&mut cx, raw, false).is_none());

        let ptr = Ptr::<Celsius>::load(&mut cx, raw, true).unwrap();
        assert_eq!(unsafe { ptr.as_ref() }, Some(&Celsius(36.6)));
        assert_eq!(cx.stats().temporaries, 1);

        cx.release_temporaries();
        assert_eq!(cx.stats().temporaries, 0);
        assert!(cx.instances().is_empty());
    }

    #[test]
    fn test_failed_conversion_releases_temporary() {
        let mut cx = context();
        let ty = cx.host_mut().new_type("Celsius", None);
        let desc = TypeBuilder::<Celsius>::new(ty)
            .implicit_conversion(|cx, _| Some(cx.host_mut().int_new(0)))
            .build();
        cx.register(desc).unwrap();

        let baseline = cx.host().live_objects();
        let src = cx.host_mut().float_new(1.0);
        assert!(Ptr::<Celsius>::load(&mut cx, src, true).is_none());
        assert_eq!(cx.host().live_objects(), baseline + 1);
        assert_eq!(cx.stats().temporaries, 0);
    }

    fn register_converting_celsius(cx: &mut Interop) {
        let ty = cx.host_mut().new_type("Celsius", None);
        let desc = TypeBuilder::<Celsius>::new(ty)
            .copyable()
            .implicit_conversion(|cx, src| {
                let degrees = f64::load(cx, src, false)?;
                cast_to_host(cx, Box::new(Celsius(degrees)), ReturnValuePolicy::Automatic, None).ok()
            })
            .build();
        cx.register(desc).unwrap();
    }

    #[test]
    fn test_box_conversion_releases_temporary() {
        let mut cx = context();
        register_converting_celsius(&mut cx);
        let raw = cx.host_mut().float_new(12.5);
        let baseline = cx.host().live_objects();

        for _ in 0..10 {
            let copy = Box::<Celsius>::load(&mut cx, raw, true).unwrap();
            assert_eq!(*copy, Celsius(12.5));
        }
        assert_eq!(cx.stats().temporaries, 0);
        assert_eq!(cx.host().live_objects(), baseline);
        assert!(cx.instances().is_empty());
    }

    #[test]
    fn test_cast_from_host_scopes_temporaries() {
        let mut cx = context();
        register_converting_celsius(&mut cx);
        let raw = cx.host_mut().float_new(3.0);

        let items = cx.host_mut().list_new(1);
        cx.host_mut().incref(raw);
        cx.host_mut().list_set(items, 0, raw).unwrap();
        let copies: Vec<Box<Celsius>> = cast_from_host(&mut cx, items).unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(cx.stats().temporaries, 0);

        let ptr: Ptr<Celsius> = cast_from_host(&mut cx, raw).unwrap();
        assert_eq!(unsafe { ptr.as_ref() }, Some(&Celsius(3.0)));
        assert_eq!(cx.stats().temporaries, 1);

        cx.release_temporaries();
        assert!(cx.instances().is_empty());
    }

    #[test]
    fn test_borrowing_propagates_through_composites() {
        assert!(!<Box<Celsius>>::BORROWS);
        assert!(!<Vec<i32>>::BORROWS);
        assert!(<Ptr<Celsius>>::BORROWS);
        assert!(<Option<Ptr<Celsius>>>::BORROWS);
        assert!(<Vec<Ptr<Celsius>>>::BORROWS);
        assert!(<(i32, String, Ptr<Celsius>)>::BORROWS);
        assert!(!<(i32, String, Box<Celsius>)>::BORROWS);
    }

    #[test]
    fn test_arc_shares_holder() {
        let mut cx = context();
        let ty = cx.host_mut().new_type("Connection", None);
        cx.register(TypeBuilder::<Connection>::new(ty).shared().build()).unwrap();

        let conn = Arc::new(Connection { port: 8080 });
        let obj = cast_to_host(&mut cx, conn.clone(), ReturnValuePolicy::Automatic, None).unwrap();
        assert_eq!(Arc::strong_count(&conn), 2);

        let again = cast_to_host(&mut cx, conn.clone(), ReturnValuePolicy::Automatic, None).unwrap();
        assert_eq!(again, obj);
        assert_eq!(Arc::strong_count(&conn), 2);

        let loaded = Arc::<Connection>::load(&mut cx, obj, false).unwrap();
        assert!(Arc::ptr_eq(&loaded, &conn));
        assert_eq!(loaded.port, 8080);
        drop(loaded);

        cx.decref(again);
        cx.decref(obj);
        assert_eq!(Arc::strong_count(&conn), 1);
    }

    #[test]
    fn test_shared_type_takes_box_into_holder() {
        let mut cx = context();
        let ty = cx.host_mut().new_type("Connection", None);
        cx.register(TypeBuilder::<Connection>::new(ty).shared().build()).unwrap();

        let obj = cast_to_host(&mut cx, Box::new(Connection { port: 1 }), ReturnValuePolicy::Automatic, None).unwrap();
        let shared = Arc::<Connection>::load(&mut cx, obj, false).unwrap();
        assert_eq!(shared.port, 1);

        cx.decref(obj);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn test_arc_does_not_load_from_borrowed_wrapper() {
        let mut cx = context();
        let ty = cx.host_mut().new_type("Connection", None);
        cx.register(TypeBuilder::<Connection>::new(ty).shared().build()).unwrap();

        let conn = Connection { port: 2 };
        let obj = unsafe { cast_raw(&mut cx, &conn as *const Connection, ReturnValuePolicy::Reference, None) }.unwrap();
        assert!(Arc::<Connection>::load(&mut cx, obj, false).is_none());
        cx.decref(obj);
    }
}
