//! Unit tests for numeric conversions

use core_types::number::{
    bigint_to_f64, f64_to_bigint, number_to_string, string_to_number, to_int32, to_uint32,
};
use num_bigint::BigInt;

#[test]
fn test_number_to_string_integers_and_fractions() {
    assert_eq!(number_to_string(0.0), "0");
    assert_eq!(number_to_string(-42.0), "-42");
    assert_eq!(number_to_string(3.25), "3.25");
    assert_eq!(number_to_string(f64::NAN), "NaN");
    assert_eq!(number_to_string(f64::INFINITY), "Infinity");
}

#[test]
fn test_number_to_string_exponent_boundaries() {
    assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
    assert_eq!(number_to_string(1.2345678901234568e21), "1.2345678901234568e+21");
    assert_eq!(number_to_string(0.0000012), "0.0000012");
    assert_eq!(number_to_string(0.00000012), "1.2e-7");
}

#[test]
fn test_string_to_number_whitespace_and_signs() {
    assert_eq!(string_to_number(" -3 "), -3.0);
    assert_eq!(string_to_number("+4.5"), 4.5);
    assert_eq!(string_to_number("0b101"), 5.0);
    assert_eq!(string_to_number("0o17"), 15.0);
    assert!(string_to_number("1_000").is_nan());
}

#[test]
fn test_int32_conversions() {
    assert_eq!(to_int32(-2147483649.0), 2147483647);
    assert_eq!(to_uint32(-2.0), 4294967294);
    assert_eq!(to_int32(f64::INFINITY), 0);
}

#[test]
fn test_bigint_number_bridges() {
    assert_eq!(bigint_to_f64(&BigInt::from(1u64 << 53)), 9007199254740992.0);
    assert_eq!(f64_to_bigint(12.0), Some(BigInt::from(12)));
    assert_eq!(f64_to_bigint(12.5), None);
    assert_eq!(f64_to_bigint(f64::NAN), None);
}
