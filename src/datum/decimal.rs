//! Arbitrary-precision decimal backing the `numeric` type.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// Exact decimal `digits * 10^-scale`. Equality and ordering ignore trailing
/// zeros; display keeps the scale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decimal {
    digits: BigInt,
    scale: u32,
}

fn pow10(n: u32) -> BigInt { BigInt::from(10u32).pow(n) }

/// `num / den` rounded half away from zero.
fn round_div(num: &BigInt, den: &BigInt) -> BigInt {
    let q = num / den;
    let r = num % den;
    if (r.abs() * 2u32) < den.abs() {
        return q;
    }
    if num.is_negative() != den.is_negative() { q - 1u32 } else { q + 1u32 }
}

impl Decimal {
    pub fn new(digits: BigInt, scale: u32) -> Self { Self { digits, scale } }

    pub fn zero() -> Self { Self::default() }

    pub fn scale(&self) -> u32 { self.scale }

    pub fn is_zero(&self) -> bool { self.digits.is_zero() }

    pub fn is_negative(&self) -> bool { self.digits.is_negative() }

    fn rescaled(&self, scale: u32) -> BigInt {
        if scale <= self.scale { self.digits.clone() } else { &self.digits * pow10(scale - self.scale) }
    }

    pub fn add(&self, other: &Decimal) -> Decimal {
        let scale = self.scale.max(other.scale);
        Decimal::new(self.rescaled(scale) + other.rescaled(scale), scale)
    }

    pub fn sub(&self, other: &Decimal) -> Decimal {
        let scale = self.scale.max(other.scale);
        Decimal::new(self.rescaled(scale) - other.rescaled(scale), scale)
    }

    pub fn mul(&self, other: &Decimal) -> Decimal { Decimal::new(&self.digits * &other.digits, self.scale + other.scale) }

    /// Quotient rounded to `scale` fractional digits; `None` for a zero divisor.
    pub fn div(&self, other: &Decimal, scale: u32) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        let num = &self.digits * pow10(scale + other.scale);
        let den = &other.digits * pow10(self.scale);
        Some(Decimal::new(round_div(&num, &den), scale))
    }

    /// Square root rounded to `scale` fractional digits; `None` when negative.
    pub fn sqrt(&self, scale: u32) -> Option<Decimal> {
        if self.is_negative() {
            return None;
        }
        // one guard digit, then round it away
        let want = 2 * (scale + 1);
        let radicand = if want >= self.scale {
            &self.digits * pow10(want - self.scale)
        } else {
            &self.digits / pow10(self.scale - want)
        };
        Some(Decimal::new(round_div(&radicand.sqrt(), &BigInt::from(10u32)), scale))
    }

    /// Exact integer value, `None` when there is a fractional part or it does
    /// not fit.
    pub fn to_i128(&self) -> Option<i128> {
        if self.scale == 0 {
            return self.digits.to_i128();
        }
        let unit = pow10(self.scale);
        if (&self.digits % &unit).is_zero() { (&self.digits / unit).to_i128() } else { None }
    }

    pub fn to_f64(&self) -> f64 { self.to_string().parse().unwrap_or(f64::NAN) }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self { Decimal::new(BigInt::from(v), 0) }
}

impl From<i128> for Decimal {
    fn from(v: i128) -> Self { Decimal::new(BigInt::from(v), 0) }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        self.rescaled(scale).cmp(&other.rescaled(scale))
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut text = self.digits.abs().to_string();
        let scale = self.scale as usize;
        if scale > 0 {
            if text.len() <= scale {
                text = format!("{}{}", "0".repeat(scale + 1 - text.len()), text);
            }
            text.insert(text.len() - scale, '.');
        }
        if self.digits.is_negative() {
            write!(f, "-")?;
        }
        write!(f, "{}", text)
    }
}

impl FromStr for Decimal {
    type Err = String;

    /// Accepts `[+-]digits[.digits][e[+-]digits]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("invalid input syntax for type numeric: \"{}\"", s);
        let t = s.trim();
        let (mantissa, exp) = match t.find(['e', 'E']) {
            Some(i) => (&t[..i], t[i + 1..].parse::<i32>().map_err(|_| bad())?),
            None => (t, 0),
        };
        let (negative, unsigned) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
        };
        let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let mut digits: BigInt = format!("{}{}", int_part, frac_part).parse().map_err(|_| bad())?;
        if negative {
            digits = -digits;
        }
        let scale = frac_part.len() as i64 - exp as i64;
        if scale >= 0 {
            let scale = u32::try_from(scale).map_err(|_| bad())?;
            Ok(Decimal::new(digits, scale))
        } else {
            let shift = u32::try_from(-scale).map_err(|_| bad())?;
            Ok(Decimal::new(digits * pow10(shift), 0))
        }
    }
}
