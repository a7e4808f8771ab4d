//! Unit tests for the Value enum

use core_types::{Magic, ObjectId, Symbol, Value};
use num_bigint::BigInt;

mod truthiness {
    use super::*;

    #[test]
    fn test_falsy_values() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Int32(0).is_truthy());
        assert!(!Value::Double(-0.0).is_truthy());
        assert!(!Value::Double(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::bigint(BigInt::from(0)).is_truthy());
    }

    #[test]
    fn test_truthy_values() {
        assert!(Value::Int32(-1).is_truthy());
        assert!(Value::Double(f64::INFINITY).is_truthy());
        assert!(Value::from("false").is_truthy());
        assert!(Value::Symbol(Symbol::new(None)).is_truthy());
        assert!(Value::Object(ObjectId::new(0, 0)).is_truthy());
        assert!(Value::bigint(BigInt::from(-3)).is_truthy());
    }
}

mod type_of {
    use super::*;

    #[test]
    fn test_primitive_type_names() {
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Boolean(true).type_of(), "boolean");
        assert_eq!(Value::Int32(1).type_of(), "number");
        assert_eq!(Value::Double(1.5).type_of(), "number");
        assert_eq!(Value::from("s").type_of(), "string");
        assert_eq!(Value::Symbol(Symbol::new(Some("s"))).type_of(), "symbol");
        assert_eq!(Value::bigint(BigInt::from(1)).type_of(), "bigint");
    }
}

mod conversions {
    use super::*;

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(5), Value::Int32(5));
        assert_eq!(Value::from(5.0), Value::Int32(5));
        assert_eq!(Value::from(String::from("a")), Value::from("a"));
        assert_eq!(Value::from(ObjectId::new(3, 1)).as_object(), Some(ObjectId::new(3, 1)));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int32(4).as_number(), Some(4.0));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::Null.as_number(), None);
        assert!(Value::Undefined.is_nullish());
        assert!(Value::Null.is_nullish());
        assert!(!Value::Int32(0).is_nullish());
    }
}

mod identity {
    use super::*;

    #[test]
    fn test_symbols_compare_by_identity() {
        let a = Symbol::new(Some("iterator"));
        let b = Symbol::new(Some("iterator"));
        assert!(Value::Symbol(a.clone()).strict_equals(&Value::Symbol(a)));
        assert!(!Value::Symbol(b).strict_equals(&Value::Symbol(Symbol::new(Some("iterator")))));
    }

    #[test]
    fn test_objects_compare_by_handle() {
        let a = Value::Object(ObjectId::new(1, 0));
        let stale = Value::Object(ObjectId::new(1, 1));
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&stale));
    }

    #[test]
    fn test_magic_values() {
        let closing = Value::Magic(Magic::GeneratorClosing);
        assert!(closing.is_magic(Magic::GeneratorClosing));
        assert!(!closing.is_truthy());
    }
}
