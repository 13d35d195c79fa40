//! Exact resource quantities with SI and binary suffixes
//!
//! Values are held as an integer count of nano-units so that parsing,
//! comparison and summation never go through floating point.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use thiserror::Error;

/// CPU usage in cores
pub const RESOURCE_CPU: &str = "cpu";
/// Memory working set in bytes
pub const RESOURCE_MEMORY: &str = "memory";

/// Mapping from resource kind to its measured quantity, sorted by kind
pub type ResourceList = BTreeMap<String, Quantity>;

const NANOS_EXP: i32 = 9;

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
    ("", 0),
    ("m", -3),
    ("u", -6),
    ("n", -9),
];

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ei", 60),
    ("Pi", 50),
    ("Ti", 40),
    ("Gi", 30),
    ("Mi", 20),
    ("Ki", 10),
];

/// Errors produced while parsing a quantity string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,
    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),
    #[error("unknown suffix {suffix:?} in quantity {input:?}")]
    UnknownSuffix { input: String, suffix: String },
    #[error("quantity {0:?} has precision finer than one nano-unit")]
    TooPrecise(String),
    #[error("quantity {0:?} is out of range")]
    Overflow(String),
}

/// How a quantity prefers to be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Decimal SI suffixes (`m`, `k`, `M`, ...)
    #[default]
    DecimalSI,
    /// Power-of-two suffixes (`Ki`, `Mi`, ...)
    BinarySI,
    /// Scientific notation (`1e3`)
    DecimalExponent,
}

/// A fixed-point resource amount
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    nanos: i128,
    format: Format,
}

impl Quantity {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build from thousandths of a unit, e.g. millicores
    pub fn from_milli(milli: i64) -> Self {
        Self {
            nanos: milli as i128 * 1_000_000,
            format: Format::DecimalSI,
        }
    }

    /// Build from nano-units, e.g. nanocores
    pub fn from_nano(nanos: i64) -> Self {
        Self {
            nanos: nanos as i128,
            format: Format::DecimalSI,
        }
    }

    /// Build a byte count rendered with binary suffixes
    pub fn from_bytes(bytes: i64) -> Self {
        Self {
            nanos: bytes as i128 * 1_000_000_000,
            format: Format::BinarySI,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn nano_value(&self) -> i128 {
        self.nanos
    }

    /// Value in thousandths, rounded up
    pub fn milli_value(&self) -> i128 {
        ceil_div(self.nanos, 1_000_000)
    }

    /// Value in whole units, rounded up
    pub fn value(&self) -> i128 {
        ceil_div(self.nanos, 1_000_000_000)
    }

    /// Approximate value, for display and ratios only
    pub fn as_f64(&self) -> f64 {
        self.nanos as f64 / 1e9
    }
}

fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d != 0 && n > 0 {
        q + 1
    } else {
        q
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let digits = format!("{}{}", whole, frac);
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::Overflow(input.to_string()))?;
        let frac_digits = frac.len() as i32;

        let overflow = || QuantityError::Overflow(input.to_string());

        let (nanos, format) = if let Some(&(_, shift)) =
            BINARY_SUFFIXES.iter().find(|(name, _)| *name == suffix)
        {
            let scaled = mantissa.checked_mul(1i128 << shift).ok_or_else(overflow)?;
            (
                rescale(scaled, NANOS_EXP - frac_digits, input)?,
                Format::BinarySI,
            )
        } else if let Some(&(_, exp)) = DECIMAL_SUFFIXES.iter().find(|(name, _)| *name == suffix) {
            (
                rescale(mantissa, exp + NANOS_EXP - frac_digits, input)?,
                Format::DecimalSI,
            )
        } else if let Some(exp) = parse_exponent(suffix) {
            let shift = exp.saturating_add(NANOS_EXP).saturating_sub(frac_digits);
            (
                rescale(mantissa, shift, input)?,
                Format::DecimalExponent,
            )
        } else {
            return Err(QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: suffix.to_string(),
            });
        };

        Ok(Self {
            nanos: if negative { -nanos } else { nanos },
            format,
        })
    }
}

fn parse_exponent(suffix: &str) -> Option<i32> {
    let rest = suffix.strip_prefix(['e', 'E'])?;
    if rest.is_empty() {
        return None;
    }
    rest.parse().ok()
}

/// Multiply or divide by a power of ten, refusing any lossy division
fn rescale(value: i128, exp: i32, input: &str) -> Result<i128, QuantityError> {
    if exp >= 0 {
        pow10(exp as u32)
            .and_then(|p| value.checked_mul(p))
            .ok_or_else(|| QuantityError::Overflow(input.to_string()))
    } else {
        let divisor = match pow10(exp.unsigned_abs()) {
            Some(d) => d,
            None if value == 0 => return Ok(0),
            None => return Err(QuantityError::TooPrecise(input.to_string())),
        };
        if value % divisor != 0 {
            return Err(QuantityError::TooPrecise(input.to_string()));
        }
        Ok(value / divisor)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0");
        }

        if self.format == Format::BinarySI && self.nanos % 1_000_000_000 == 0 {
            let units = self.nanos / 1_000_000_000;
            for (suffix, shift) in BINARY_SUFFIXES {
                let base = 1i128 << shift;
                if units % base == 0 {
                    return write!(f, "{}{}", units / base, suffix);
                }
            }
        }

        for (suffix, exp) in DECIMAL_SUFFIXES {
            let divisor = 10i128.pow((exp + NANOS_EXP) as u32);
            if self.nanos % divisor == 0 {
                let mantissa = self.nanos / divisor;
                return match self.format {
                    Format::DecimalExponent if *exp != 0 => write!(f, "{}e{}", mantissa, exp),
                    Format::DecimalExponent => write!(f, "{}", mantissa),
                    _ => write!(f, "{}{}", mantissa, suffix),
                };
            }
        }

        // Every nano count is divisible by 10^0, so the loop always returns.
        write!(f, "{}n", self.nanos)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanos.hash(state);
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        let format = if self.is_zero() { rhs.format } else { self.format };
        Quantity {
            nanos: self.nanos.saturating_add(rhs.nanos),
            format,
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), Add::add)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl<'de> Visitor<'de> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a quantity string such as \"250m\" or \"128Mi\", or a number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity {
                    nanos: v as i128 * 1_000_000_000,
                    format: Format::DecimalSI,
                })
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
                Ok(Quantity {
                    nanos: v as i128 * 1_000_000_000,
                    format: Format::DecimalSI,
                })
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
                v.to_string().parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// Sum every resource kind across several lists
pub fn sum_resources<'a>(lists: impl IntoIterator<Item = &'a ResourceList>) -> ResourceList {
    let mut total = ResourceList::new();
    for list in lists {
        for (kind, quantity) in list {
            *total.entry(kind.clone()).or_default() += *quantity;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_format_canonical() {
        let cases = [
            ("10m", "10m"),
            ("5Mi", "5Mi"),
            ("1", "1"),
            ("0", "0"),
            ("0.5", "500m"),
            ("1500k", "1500k"),
            ("1000", "1k"),
            ("2048Ki", "2Mi"),
            ("1536", "1536"),
            ("250n", "250n"),
            ("1.5Gi", "1536Mi"),
            ("-100m", "-100m"),
            ("1e3", "1e3"),
            ("12E", "12E"),
        ];

        for (input, expected) in cases {
            assert_eq!(q(input).to_string(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_binary_falls_back_to_decimal() {
        // 1.5Ki is 1536 bytes which has no exact binary suffix above Ki
        assert_eq!(q("1.5Ki").to_string(), "1536");
        assert_eq!(Quantity::from_bytes(1000).to_string(), "1k");
        assert_eq!(Quantity::from_bytes(3 * 1024 * 1024).to_string(), "3Mi");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Quantity>(), Err(QuantityError::Empty));
        assert!(matches!(
            "abc".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            "10x".parse::<Quantity>(),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            "0.1n".parse::<Quantity>(),
            Err(QuantityError::TooPrecise(_))
        ));
        assert!(matches!(
            "1.2.3".parse::<Quantity>(),
            Err(QuantityError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_exact_comparison() {
        assert_eq!(q("1000m"), q("1"));
        assert_eq!(q("1Ki"), q("1024"));
        assert!(q("999m") < q("1"));
        assert!(q("1Mi") > q("1M"));
        // 0.1 + 0.2 is exactly 0.3 here
        assert_eq!(q("0.1") + q("0.2"), q("0.3"));
    }

    #[test]
    fn test_sum_keeps_first_non_zero_format() {
        let total: Quantity = [Quantity::zero(), q("1Mi"), q("1Mi")].into_iter().sum();
        assert_eq!(total.format(), Format::BinarySI);
        assert_eq!(total.to_string(), "2Mi");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(q("1500m").value(), 2);
        assert_eq!(q("1500m").milli_value(), 1500);
        assert_eq!(q("1n").milli_value(), 1);
        assert_eq!(q("250m").nano_value(), 250_000_000);
    }

    #[test]
    fn test_serde() {
        let list: ResourceList = serde_json::from_str(r#"{"cpu":"250m","memory":1024}"#).unwrap();
        assert_eq!(list[RESOURCE_CPU], Quantity::from_milli(250));
        assert_eq!(list[RESOURCE_MEMORY], q("1Ki"));

        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"{"cpu":"250m","memory":"1024"}"#);
    }

    #[test]
    fn test_sum_resources() {
        let a: ResourceList = [(RESOURCE_CPU.to_string(), q("100m"))].into();
        let b: ResourceList = [
            (RESOURCE_CPU.to_string(), q("50m")),
            (RESOURCE_MEMORY.to_string(), q("1Mi")),
        ]
        .into();

        let total = sum_resources([&a, &b]);
        assert_eq!(total[RESOURCE_CPU].to_string(), "150m");
        assert_eq!(total[RESOURCE_MEMORY].to_string(), "1Mi");
    }

    proptest! {
        #[test]
        fn prop_decimal_round_trip(milli in -1_000_000_000_000i64..1_000_000_000_000i64) {
            let original = Quantity::from_milli(milli);
            let reparsed: Quantity = original.to_string().parse().unwrap();
            prop_assert_eq!(reparsed, original);
        }

        #[test]
        fn prop_binary_round_trip(bytes in 0i64..(1i64 << 50)) {
            let original = Quantity::from_bytes(bytes);
            let reparsed: Quantity = original.to_string().parse().unwrap();
            prop_assert_eq!(reparsed, original);
        }
    }
}
