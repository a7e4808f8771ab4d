//! Number and string conversions with exact language semantics.
//!
//! Number-to-string uses the shortest round-tripping digits (via `ryu`) laid
//! out by the `Number::toString` rules; string-to-number accepts the
//! `StringNumericLiteral` grammar and nothing else.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Num, ToPrimitive, Zero};

/// Whitespace and line terminators stripped by `ToNumber` and `StringToBigInt`.
pub fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'
            | '\u{000A}'
            | '\u{000B}'
            | '\u{000C}'
            | '\u{000D}'
            | '\u{0020}'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

/// Split a ryu rendering into significant digits and the decimal point
/// position `n`, so that the value is `0.d1d2...dk * 10^n`.
fn decimal_digits(rendered: &str) -> (Vec<u8>, i32) {
    let (mantissa, exponent) = match rendered.find(['e', 'E']) {
        Some(i) => (&rendered[..i], rendered[i + 1..].parse::<i32>().unwrap_or(0)),
        None => (rendered, 0),
    };
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(i) => (&mantissa[..i], &mantissa[i + 1..]),
        None => (mantissa, ""),
    };

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes())
        .map(|b| b - b'0')
        .collect();
    let mut point = int_part.len() as i32 + exponent;

    let leading = digits.iter().take_while(|&&d| d == 0).count();
    digits.drain(..leading);
    point -= leading as i32;
    while digits.last() == Some(&0) {
        digits.pop();
    }
    (digits, point)
}

/// `Number::toString(n)` in radix 10.
///
/// # Examples
///
/// ```
/// use core_types::number::number_to_string;
///
/// assert_eq!(number_to_string(42.0), "42");
/// assert_eq!(number_to_string(-0.0), "0");
/// assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
/// assert_eq!(number_to_string(1e21), "1e+21");
/// assert_eq!(number_to_string(1.5e-7), "1.5e-7");
/// assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
/// ```
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let mut buffer = ryu::Buffer::new();
    let (digits, n_point) = decimal_digits(buffer.format_finite(n.abs()));
    let ds: String = digits.iter().map(|d| (b'0' + d) as char).collect();
    let k = digits.len() as i32;

    let mut out = String::with_capacity(ds.len() + 8);
    if n < 0.0 {
        out.push('-');
    }

    if k <= n_point && n_point <= 21 {
        out.push_str(&ds);
        out.extend(std::iter::repeat('0').take((n_point - k) as usize));
    } else if 0 < n_point && n_point <= 21 {
        let split = n_point as usize;
        out.push_str(&ds[..split]);
        out.push('.');
        out.push_str(&ds[split..]);
    } else if -6 < n_point && n_point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n_point) as usize));
        out.push_str(&ds);
    } else {
        let e = n_point - 1;
        out.push_str(&ds[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&ds[1..]);
        }
        out.push('e');
        out.push(if e >= 0 { '+' } else { '-' });
        out.push_str(&e.abs().to_string());
    }
    out
}

fn is_decimal_literal(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digit_count = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        digit_count += i - frac_start;
    }
    if digit_count == 0 {
        return false;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

fn radix_prefix(s: &str) -> Option<(u32, &str)> {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'0' {
        return None;
    }
    let radix = match bytes[1] {
        b'x' | b'X' => 16,
        b'o' | b'O' => 8,
        b'b' | b'B' => 2,
        _ => return None,
    };
    Some((radix, &s[2..]))
}

/// `StringToNumber`: NaN for anything outside the numeric literal grammar.
///
/// # Examples
///
/// ```
/// use core_types::number::string_to_number;
///
/// assert_eq!(string_to_number("  12  "), 12.0);
/// assert_eq!(string_to_number(""), 0.0);
/// assert_eq!(string_to_number("0x1F"), 31.0);
/// assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
/// assert!(string_to_number("12px").is_nan());
/// assert!(string_to_number("inf").is_nan());
/// ```
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(is_js_whitespace);
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some((radix, digits)) = radix_prefix(t) {
        if digits.is_empty() {
            return f64::NAN;
        }
        let mut value = 0.0f64;
        for c in digits.chars() {
            match c.to_digit(radix) {
                Some(d) => value = value * radix as f64 + d as f64,
                None => return f64::NAN,
            }
        }
        return value;
    }
    if !is_decimal_literal(t) {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// `StringToBigInt`: `None` when the string is not a valid integer literal.
pub fn string_to_bigint(s: &str) -> Option<BigInt> {
    let t = s.trim_matches(is_js_whitespace);
    if t.is_empty() {
        return Some(BigInt::zero());
    }
    if let Some((radix, digits)) = radix_prefix(t) {
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return None;
        }
        return BigInt::from_str_radix(digits, radix).ok();
    }
    let unsigned = t.strip_prefix(['+', '-']).unwrap_or(t);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigInt::from_str_radix(t, 10).ok()
}

/// BigInt to Number, rounding to the nearest double.
pub fn bigint_to_f64(n: &BigInt) -> f64 {
    n.to_f64().unwrap_or(f64::NAN)
}

/// Number to BigInt for integral finite numbers.
pub fn f64_to_bigint(n: f64) -> Option<BigInt> {
    if !n.is_finite() || n.fract() != 0.0 {
        return None;
    }
    BigInt::from_f64(n)
}

/// `ToInt32` on an already-numeric value.
///
/// # Examples
///
/// ```
/// use core_types::number::to_int32;
///
/// assert_eq!(to_int32(4294967297.0), 1);
/// assert_eq!(to_int32(2147483648.0), -2147483648);
/// assert_eq!(to_int32(-1.9), -1);
/// assert_eq!(to_int32(f64::NAN), 0);
/// ```
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// `ToUint32` on an already-numeric value.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let two32 = 4294967296.0f64;
    let mut m = n.trunc() % two32;
    if m < 0.0 {
        m += two32;
    }
    m as u32
}

/// `Number::remainder`: truncating remainder with the sign of the dividend.
pub fn number_remainder(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() || a.is_infinite() || b == 0.0 {
        return f64::NAN;
    }
    if b.is_infinite() || a == 0.0 {
        return a;
    }
    a % b
}

/// `Number::exponentiate`, which differs from `powf` for `(±1) ** ±Infinity`
/// and `1 ** NaN`.
pub fn number_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() {
        return f64::NAN;
    }
    if exponent == 0.0 {
        return 1.0;
    }
    if (base == 1.0 || base == -1.0) && exponent.is_infinite() {
        return f64::NAN;
    }
    base.powf(exponent)
}
