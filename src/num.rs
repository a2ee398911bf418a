use std::fmt;

use crate::error::{Error, Result};

/// A JSON number, kept in the widest lossless representation available.
///
/// Integers within `u64`/`i64` range stay integers; everything else is an
/// `f64`. Non-finite floats are unrepresentable: constructors refuse them
/// and parsing an over-range literal fails with `NumberFormat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    PosInt(u64),
    NegInt(i64),
    Float(f64),
}

impl Number {
    pub fn from_f64(f: f64) -> Option<Self> {
        if f.is_finite() {
            Some(Number::Float(f))
        } else {
            None
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Number::PosInt(_) | Number::NegInt(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::PosInt(u) => i64::try_from(*u).ok(),
            Number::NegInt(i) => Some(*i),
            Number::Float(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Number::PosInt(u) => Some(*u),
            Number::NegInt(_) => None,
            Number::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::PosInt(u) => *u as f64,
            Number::NegInt(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    /// Canonical text form, appended to `out`.
    ///
    /// Integers go through itoa; floats through ryu's shortest round-trip
    /// form, so `write(parse(s))` re-parses to the same value.
    pub(crate) fn write_into(&self, out: &mut Vec<u8>) {
        match self {
            Number::PosInt(u) => {
                let mut buf = itoa::Buffer::new();
                out.extend_from_slice(buf.format(*u).as_bytes());
            }
            Number::NegInt(i) => {
                let mut buf = itoa::Buffer::new();
                out.extend_from_slice(buf.format(*i).as_bytes());
            }
            Number::Float(f) => {
                let mut buf = ryu::Buffer::new();
                out.extend_from_slice(buf.format_finite(*f).as_bytes());
            }
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.write_into(&mut out);
        f.write_str(std::str::from_utf8(&out).expect("number text is ascii"))
    }
}

impl From<u64> for Number {
    fn from(u: u64) -> Self {
        Number::PosInt(u)
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        if i >= 0 {
            Number::PosInt(i as u64)
        } else {
            Number::NegInt(i)
        }
    }
}

impl From<u32> for Number {
    fn from(u: u32) -> Self {
        Number::PosInt(u64::from(u))
    }
}

impl From<i32> for Number {
    fn from(i: i32) -> Self {
        Number::from(i64::from(i))
    }
}

fn raw_str(raw: &[u8]) -> Result<&str> {
    // Number spans out of the reader are ASCII; anything else is a scan bug
    // upstream, surfaced as a format error rather than a panic.
    std::str::from_utf8(raw).map_err(|_| Error::number_format(String::from_utf8_lossy(raw)))
}

fn is_integer_text(raw: &[u8]) -> bool {
    let digits = match raw.first() {
        Some(b'-') => &raw[1..],
        _ => raw,
    };
    !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
}

/// Parse a grammar-valid number span into the widest lossless [`Number`].
pub(crate) fn parse_number(raw: &[u8]) -> Result<Number> {
    let text = raw_str(raw)?;
    if is_integer_text(raw) {
        if raw[0] == b'-' {
            match text.parse::<i64>() {
                // A literal "-0" stays a float so the sign survives.
                Ok(0) => {}
                Ok(i) => return Ok(Number::from(i)),
                Err(_) => {}
            }
        } else if let Ok(u) = text.parse::<u64>() {
            return Ok(Number::PosInt(u));
        }
        // Over-range integer literal: keep the value approximately.
    }
    let f = text
        .parse::<f64>()
        .map_err(|_| Error::number_format(text))?;
    Number::from_f64(f).ok_or_else(|| Error::number_format(text))
}

/// Strict integer parse: rejects fractions and exponents outright.
pub(crate) fn parse_i64(raw: &[u8]) -> Result<i64> {
    let text = raw_str(raw)?;
    if !is_integer_text(raw) {
        return Err(Error::number_format(text));
    }
    text.parse::<i64>().map_err(|_| Error::number_format(text))
}

pub(crate) fn parse_u64(raw: &[u8]) -> Result<u64> {
    let text = raw_str(raw)?;
    if !is_integer_text(raw) || raw[0] == b'-' {
        return Err(Error::number_format(text));
    }
    text.parse::<u64>().map_err(|_| Error::number_format(text))
}

pub(crate) fn parse_f64(raw: &[u8]) -> Result<f64> {
    let text = raw_str(raw)?;
    let f = text
        .parse::<f64>()
        .map_err(|_| Error::number_format(text))?;
    if f.is_finite() {
        Ok(f)
    } else {
        Err(Error::number_format(text))
    }
}

/// Per-contract or per-member override for how numbers cross the text
/// boundary. Absence of an override inherits the enclosing level's setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumberHandling {
    /// Accept `"42"` where `42` is expected.
    pub allow_reading_from_string: bool,
    /// Emit `"42"` instead of `42`.
    pub write_as_string: bool,
}

impl NumberHandling {
    pub const fn strict() -> Self {
        Self {
            allow_reading_from_string: false,
            write_as_string: false,
        }
    }

    pub const fn quoted() -> Self {
        Self {
            allow_reading_from_string: true,
            write_as_string: true,
        }
    }

    pub const fn lenient_reading() -> Self {
        Self {
            allow_reading_from_string: true,
            write_as_string: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(n: &Number) -> String {
        n.to_string()
    }

    #[rstest::rstest]
    #[case(b"0", Number::PosInt(0))]
    #[case(b"42", Number::PosInt(42))]
    #[case(b"-7", Number::NegInt(-7))]
    #[case(b"18446744073709551615", Number::PosInt(u64::MAX))]
    #[case(b"1.5", Number::Float(1.5))]
    #[case(b"-0.0", Number::Float(-0.0))]
    #[case(b"1e3", Number::Float(1000.0))]
    #[case(b"2E-2", Number::Float(0.02))]
    fn test_parse_number(#[case] raw: &[u8], #[case] expected: Number) {
        assert_eq!(parse_number(raw).expect("parse"), expected);
    }

    #[rstest::rstest]
    fn test_overflowing_integer_degrades_to_float() {
        let n = parse_number(b"18446744073709551616").expect("parse");
        assert!(matches!(n, Number::Float(_)));
    }

    #[rstest::rstest]
    fn test_negative_zero_keeps_its_sign() {
        let n = parse_number(b"-0").expect("parse");
        assert!(matches!(n, Number::Float(f) if f.is_sign_negative()));
        assert_eq!(render(&n), "-0.0");
    }

    #[rstest::rstest]
    fn test_over_range_exponent_is_rejected() {
        assert!(parse_number(b"1e999").is_err());
    }

    #[rstest::rstest]
    fn test_strict_integer_parse() {
        assert_eq!(parse_i64(b"-12").expect("parse"), -12);
        assert!(parse_i64(b"1.0").is_err());
        assert!(parse_i64(b"1e2").is_err());
        assert!(parse_u64(b"-1").is_err());
        assert_eq!(parse_u64(b"12").expect("parse"), 12);
    }

    #[rstest::rstest]
    #[case(Number::PosInt(42), "42")]
    #[case(Number::NegInt(-7), "-7")]
    #[case(Number::Float(1.5), "1.5")]
    #[case(Number::Float(1.0), "1.0")]
    fn test_canonical_text(#[case] n: Number, #[case] expected: &str) {
        assert_eq!(render(&n), expected);
    }

    #[rstest::rstest]
    fn test_float_round_trips_through_text() {
        for f in [0.1, 1.0 / 3.0, f64::MAX, 5e-324] {
            let text = render(&Number::Float(f));
            let back = parse_number(text.as_bytes()).expect("reparse");
            assert_eq!(back, Number::Float(f));
        }
    }

    #[rstest::rstest]
    fn test_accessor_windows() {
        assert_eq!(Number::PosInt(7).as_i64(), Some(7));
        assert_eq!(Number::PosInt(u64::MAX).as_i64(), None);
        assert_eq!(Number::NegInt(-1).as_u64(), None);
        assert_eq!(Number::Float(1.5).as_i64(), None);
        assert_eq!(Number::from(-3i64), Number::NegInt(-3));
        assert_eq!(Number::from(3i64), Number::PosInt(3));
        assert!(Number::from_f64(f64::NAN).is_none());
    }
}
