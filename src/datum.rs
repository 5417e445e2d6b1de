//!
//! Datum model
//! -----------
//! Typed SQL values flowing through the aggregate engine: aggregate arguments,
//! transition states and final results. Transition states of type `internal`
//! are carried as `Datum::Internal` and never leave the process except through
//! an aggregate's declared serialize function.
//!
//! Initial values in the catalog are PostgreSQL text literals (`0`, `{0,0}`,
//! `{0,0,0}`); `parse_literal` turns them into datums of the transition type.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

mod decimal;

pub use decimal::Decimal;

/// Catalog object identifier (pg_proc, pg_type, pg_operator rows).
pub type Oid = u32;

/// Built-in type OIDs understood by the engine.
pub mod type_oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const INT2_ARRAY: Oid = 1005;
    pub const INT4_ARRAY: Oid = 1007;
    pub const TEXT_ARRAY: Oid = 1009;
    pub const INT8_ARRAY: Oid = 1016;
    pub const FLOAT8_ARRAY: Oid = 1022;
    pub const BIT: Oid = 1560;
    pub const NUMERIC: Oid = 1700;
    pub const ANY: Oid = 2276;
    pub const ANYARRAY: Oid = 2277;
    pub const INTERNAL: Oid = 2281;
    pub const ANYELEMENT: Oid = 2283;

    pub fn name(oid: Oid) -> &'static str {
        match oid {
            BOOL => "boolean",
            BYTEA => "bytea",
            INT8 => "bigint",
            INT2 => "smallint",
            INT4 => "integer",
            TEXT => "text",
            OID => "oid",
            JSON => "json",
            FLOAT4 => "real",
            FLOAT8 => "double precision",
            INT2_ARRAY => "smallint[]",
            INT4_ARRAY => "integer[]",
            TEXT_ARRAY => "text[]",
            INT8_ARRAY => "bigint[]",
            FLOAT8_ARRAY => "double precision[]",
            BIT => "bit",
            NUMERIC => "numeric",
            ANY => "\"any\"",
            ANYARRAY => "anyarray",
            INTERNAL => "internal",
            ANYELEMENT => "anyelement",
            _ => "unknown",
        }
    }

    /// Element type of a built-in array type.
    pub fn element_of(oid: Oid) -> Option<Oid> {
        match oid {
            INT2_ARRAY => Some(INT2),
            INT4_ARRAY => Some(INT4),
            TEXT_ARRAY => Some(TEXT),
            INT8_ARRAY => Some(INT8),
            FLOAT8_ARRAY => Some(FLOAT8),
            _ => None,
        }
    }

    /// Array type holding elements of `elem`.
    pub fn array_of(elem: Oid) -> Oid {
        match elem {
            INT2 => INT2_ARRAY,
            INT4 => INT4_ARRAY,
            TEXT => TEXT_ARRAY,
            INT8 => INT8_ARRAY,
            FLOAT8 => FLOAT8_ARRAY,
            _ => ANYARRAY,
        }
    }

    /// Polymorphic pseudo-types accept any argument type.
    pub fn is_polymorphic(oid: Oid) -> bool { matches!(oid, ANY | ANYELEMENT | ANYARRAY) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    ObjectId(Oid),
    Text(String),
    Bytea(Vec<u8>),
    Bit(BitString),
    /// Already-rendered JSON text.
    Json(String),
    Array(ArrayValue),
    Internal(Box<InternalState>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub elem_type: Oid,
    pub items: Vec<Datum>,
}

impl ArrayValue {
    pub fn new(elem_type: Oid, items: Vec<Datum>) -> Self { Self { elem_type, items } }
}

/// Fixed-length bit string, most significant bit first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitString {
    len: usize,
    bytes: Vec<u8>,
}

impl BitString {
    pub fn len(&self) -> usize { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn bit(&self, i: usize) -> bool { self.bytes[i / 8] & (0x80 >> (i % 8)) != 0 }

    /// Bytewise combination of two strings of equal length.
    pub fn zip_with(&self, other: &BitString, f: impl Fn(u8, u8) -> u8) -> Option<BitString> {
        if self.len != other.len {
            return None;
        }
        Some(BitString { len: self.len, bytes: self.bytes.iter().zip(&other.bytes).map(|(a, b)| f(*a, *b)).collect() })
    }
}

impl std::str::FromStr for BitString {
    type Err = String;

    /// `0101` or `B0101`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let t = t.strip_prefix(['B', 'b']).unwrap_or(t);
        let mut bytes = vec![0u8; t.len().div_ceil(8)];
        for (i, c) in t.chars().enumerate() {
            match c {
                '0' => {}
                '1' => bytes[i / 8] |= 0x80 >> (i % 8),
                _ => return Err(format!("\"{}\" is not a valid binary digit", c)),
            }
        }
        Ok(BitString { len: t.len(), bytes })
    }
}

/// Integer avg/sum/variance accumulation: 128-bit count and sum, unbounded
/// sum of squares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyAccum {
    pub n: i64,
    pub sum: i128,
    pub sumsq: BigInt,
    pub calc_sumsq: bool,
}

impl PolyAccum {
    pub fn new(calc_sumsq: bool) -> Self { Self { calc_sumsq, ..Self::default() } }

    /// Add (`sign = 1`) or remove (`sign = -1`) one input; `None` on overflow.
    pub fn apply(&self, x: i64, sign: i64) -> Option<PolyAccum> {
        let x = x as i128;
        let n = self.n.checked_add(sign)?;
        let sum = self.sum.checked_add(x.checked_mul(sign as i128)?)?;
        // |x*x| < 2^126
        let sumsq = if self.calc_sumsq { &self.sumsq + BigInt::from(x * x * sign as i128) } else { BigInt::default() };
        Some(PolyAccum { n, sum, sumsq, calc_sumsq: self.calc_sumsq })
    }

    pub fn combine(&self, other: &PolyAccum) -> Option<PolyAccum> {
        Some(PolyAccum {
            n: self.n.checked_add(other.n)?,
            sum: self.sum.checked_add(other.sum)?,
            sumsq: &self.sumsq + &other.sumsq,
            calc_sumsq: self.calc_sumsq || other.calc_sumsq,
        })
    }
}

/// Exact accumulation over `numeric` inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericAccum {
    pub n: i64,
    pub sum: Decimal,
    pub sumsq: Decimal,
    pub calc_sumsq: bool,
}

impl NumericAccum {
    pub fn new(calc_sumsq: bool) -> Self { Self { calc_sumsq, ..Self::default() } }

    /// Add (`sign = 1`) or remove (`sign = -1`) one input; `None` when the
    /// count overflows.
    pub fn apply(&self, x: &Decimal, sign: i64) -> Option<NumericAccum> {
        let n = self.n.checked_add(sign)?;
        let (sum, sumsq) = if sign > 0 {
            (self.sum.add(x), if self.calc_sumsq { self.sumsq.add(&x.mul(x)) } else { Decimal::zero() })
        } else {
            (self.sum.sub(x), if self.calc_sumsq { self.sumsq.sub(&x.mul(x)) } else { Decimal::zero() })
        };
        Some(NumericAccum { n, sum, sumsq, calc_sumsq: self.calc_sumsq })
    }

    pub fn combine(&self, other: &NumericAccum) -> Option<NumericAccum> {
        Some(NumericAccum {
            n: self.n.checked_add(other.n)?,
            sum: self.sum.add(&other.sum),
            sumsq: self.sumsq.add(&other.sumsq),
            calc_sumsq: self.calc_sumsq || other.calc_sumsq,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolAccum {
    pub count: i64,
    pub true_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayAccum {
    pub items: Vec<Datum>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringAccum {
    pub buf: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonAccum {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonObjectAccum {
    pub entries: Vec<(String, String)>,
}

/// Transition states of type `internal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InternalState {
    Poly(PolyAccum),
    Numeric(NumericAccum),
    Bool(BoolAccum),
    Array(ArrayAccum),
    Str(StringAccum),
    Json(JsonAccum),
    JsonObject(JsonObjectAccum),
}

impl InternalState {
    pub fn kind_name(&self) -> &'static str {
        match self {
            InternalState::Poly(_) => "poly accumulator",
            InternalState::Numeric(_) => "numeric accumulator",
            InternalState::Bool(_) => "bool accumulator",
            InternalState::Array(_) => "array accumulator",
            InternalState::Str(_) => "string accumulator",
            InternalState::Json(_) => "json accumulator",
            InternalState::JsonObject(_) => "json object accumulator",
        }
    }
}

/// Per-column ordering used by ordered-set sorting and hypothetical comparisons.
/// The default is `ASC NULLS LAST`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub const fn asc() -> Self { Self { descending: false, nulls_first: false } }
    /// `DESC` defaults to `NULLS FIRST`, as in SQL.
    pub const fn desc() -> Self { Self { descending: true, nulls_first: true } }

    pub fn compare(&self, a: &Datum, b: &Datum) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => if self.nulls_first { Ordering::Less } else { Ordering::Greater },
            (false, true) => if self.nulls_first { Ordering::Greater } else { Ordering::Less },
            (false, false) => {
                let ord = a.cmp_value(b);
                if self.descending { ord.reverse() } else { ord }
            }
        }
    }
}

/// Lexicographic row comparison; columns without an explicit key sort ascending.
pub fn compare_rows(a: &[Datum], b: &[Datum], keys: &[SortKey]) -> Ordering {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let key = keys.get(i).copied().unwrap_or_default();
        match key.compare(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

impl Datum {
    pub fn is_null(&self) -> bool { matches!(self, Datum::Null) }

    /// Type of a non-null value; `None` for NULL.
    pub fn type_oid(&self) -> Option<Oid> {
        Some(match self {
            Datum::Null => return None,
            Datum::Bool(_) => type_oid::BOOL,
            Datum::Int2(_) => type_oid::INT2,
            Datum::Int4(_) => type_oid::INT4,
            Datum::Int8(_) => type_oid::INT8,
            Datum::Float4(_) => type_oid::FLOAT4,
            Datum::Float8(_) => type_oid::FLOAT8,
            Datum::Numeric(_) => type_oid::NUMERIC,
            Datum::ObjectId(_) => type_oid::OID,
            Datum::Text(_) => type_oid::TEXT,
            Datum::Bytea(_) => type_oid::BYTEA,
            Datum::Bit(_) => type_oid::BIT,
            Datum::Json(_) => type_oid::JSON,
            Datum::Array(a) => type_oid::array_of(a.elem_type),
            Datum::Internal(_) => type_oid::INTERNAL,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Internal(s) => s.kind_name(),
            other => other.type_oid().map(type_oid::name).unwrap_or("unknown"),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int2(v) => Some(*v as i64),
            Datum::Int4(v) => Some(*v as i64),
            Datum::Int8(v) => Some(*v),
            Datum::Numeric(v) => v.to_i128().and_then(|v| i64::try_from(v).ok()),
            Datum::ObjectId(v) => Some(*v as i64),
            _ => None,
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Datum::Numeric(v) => v.to_i128(),
            other => other.as_i64().map(|v| v as i128),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Float4(v) => Some(*v as f64),
            Datum::Float8(v) => Some(*v),
            Datum::Numeric(v) => Some(v.to_f64()),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self { Datum::Bool(b) => Some(*b), _ => None }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Datum::Text(s) => Some(s.as_str()), _ => None }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self { Datum::Array(a) => Some(a), _ => None }
    }

    pub fn as_numeric(&self) -> Option<Decimal> {
        match self {
            Datum::Numeric(v) => Some(v.clone()),
            other => other.as_i64().map(Decimal::from),
        }
    }

    pub fn as_internal(&self) -> Option<&InternalState> {
        match self { Datum::Internal(s) => Some(s.as_ref()), _ => None }
    }

    /// Total order over non-null values of comparable types. Integers and
    /// numerics compare exactly, mixed integer/float comparisons go through f64 and NaN sorts
    /// above every other number. NULL sorts last; `SortKey` decides placement.
    pub fn cmp_value(&self, other: &Datum) -> Ordering {
        use Datum::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Text(a), Text(b)) | (Json(a), Json(b)) => a.cmp(b),
            (Bytea(a), Bytea(b)) => a.cmp(b),
            (Numeric(a), Numeric(b)) => a.cmp(b),
            (Bit(a), Bit(b)) => a.bytes.cmp(&b.bytes).then(a.len.cmp(&b.len)),
            (Array(a), Array(b)) => {
                for (x, y) in a.items.iter().zip(b.items.iter()) {
                    match x.cmp_value(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.items.len().cmp(&b.items.len())
            }
            (Numeric(_), _) | (_, Numeric(_)) if self.as_numeric().is_some() && other.as_numeric().is_some() => {
                self.as_numeric().cmp(&other.as_numeric())
            }
            _ => {
                if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
                    return a.cmp(&b);
                }
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => if a == b { Ordering::Equal } else { a.total_cmp(&b) },
                    _ => self.family_rank().cmp(&other.family_rank()),
                }
            }
        }
    }

    fn family_rank(&self) -> u8 {
        match self {
            Datum::Bool(_) => 0,
            Datum::Int2(_) | Datum::Int4(_) | Datum::Int8(_) | Datum::Numeric(_) | Datum::Float4(_) | Datum::Float8(_) => 1,
            Datum::ObjectId(_) => 2,
            Datum::Text(_) => 3,
            Datum::Bytea(_) => 4,
            Datum::Bit(_) => 5,
            Datum::Json(_) => 6,
            Datum::Array(_) => 7,
            Datum::Internal(_) => 8,
            Datum::Null => 9,
        }
    }

    /// JSON rendering used by the json aggregates.
    pub fn to_json_text(&self) -> String {
        match self {
            Datum::Null => "null".to_string(),
            Datum::Bool(b) => b.to_string(),
            Datum::Int2(_) | Datum::Int4(_) | Datum::Int8(_) | Datum::Numeric(_) | Datum::ObjectId(_) => self.to_string(),
            Datum::Float4(_) | Datum::Float8(_) => {
                let v = self.as_f64().unwrap_or(f64::NAN);
                if v.is_finite() { self.to_string() } else { quote_json(&self.to_string()) }
            }
            Datum::Text(s) => quote_json(s),
            Datum::Json(s) => s.clone(),
            Datum::Bytea(_) | Datum::Bit(_) | Datum::Internal(_) => quote_json(&self.to_string()),
            Datum::Array(a) => {
                let items: Vec<String> = a.items.iter().map(Datum::to_json_text).collect();
                format!("[{}]", items.join(","))
            }
        }
    }
}

pub(crate) fn quote_json(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(b) => write!(f, "{}", if *b { "t" } else { "f" }),
            Datum::Int2(v) => write!(f, "{}", v),
            Datum::Int4(v) => write!(f, "{}", v),
            Datum::Int8(v) => write!(f, "{}", v),
            Datum::Float4(v) => write_float(f, *v as f64),
            Datum::Float8(v) => write_float(f, *v),
            Datum::Numeric(v) => write!(f, "{}", v),
            Datum::ObjectId(v) => write!(f, "{}", v),
            Datum::Bit(b) => {
                for i in 0..b.len() { write!(f, "{}", if b.bit(i) { '1' } else { '0' })?; }
                Ok(())
            }
            Datum::Text(s) | Datum::Json(s) => write!(f, "{}", s),
            Datum::Bytea(b) => {
                write!(f, "\\x")?;
                for byte in b { write!(f, "{:02x}", byte)?; }
                Ok(())
            }
            Datum::Array(a) => {
                write!(f, "{{")?;
                for (i, item) in a.items.iter().enumerate() {
                    if i > 0 { write!(f, ",")?; }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            Datum::Internal(s) => write!(f, "<{}>", s.kind_name()),
        }
    }
}

fn write_float(f: &mut Formatter<'_>, v: f64) -> std::fmt::Result {
    if v.is_nan() { write!(f, "NaN") }
    else if v.is_infinite() { write!(f, "{}", if v > 0.0 { "Infinity" } else { "-Infinity" }) }
    else { write!(f, "{}", v) }
}

impl From<bool> for Datum { fn from(v: bool) -> Self { Datum::Bool(v) } }
impl From<i16> for Datum { fn from(v: i16) -> Self { Datum::Int2(v) } }
impl From<i32> for Datum { fn from(v: i32) -> Self { Datum::Int4(v) } }
impl From<i64> for Datum { fn from(v: i64) -> Self { Datum::Int8(v) } }
impl From<f32> for Datum { fn from(v: f32) -> Self { Datum::Float4(v) } }
impl From<f64> for Datum { fn from(v: f64) -> Self { Datum::Float8(v) } }
impl From<Decimal> for Datum { fn from(v: Decimal) -> Self { Datum::Numeric(v) } }
impl From<&str> for Datum { fn from(v: &str) -> Self { Datum::Text(v.to_string()) } }
impl From<String> for Datum { fn from(v: String) -> Self { Datum::Text(v) } }
impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Datum::Null) }
}

/// Parse a catalog text literal as a value of type `typ`.
pub fn parse_literal(text: &str, typ: Oid) -> Result<Datum, String> {
    let t = text.trim();
    if let Some(elem) = type_oid::element_of(typ) {
        let inner = t
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| format!("malformed array literal: \"{}\"", text))?;
        let mut items = Vec::new();
        if !inner.trim().is_empty() {
            for part in inner.split(',') {
                items.push(parse_literal(part, elem)?);
            }
        }
        return Ok(Datum::Array(ArrayValue::new(elem, items)));
    }
    if t.eq_ignore_ascii_case("null") && typ != type_oid::TEXT { return Ok(Datum::Null); }
    let bad = || format!("invalid input syntax for type {}: \"{}\"", type_oid::name(typ), text);
    match typ {
        type_oid::BOOL => match t.to_ascii_lowercase().as_str() {
            "t" | "true" | "yes" | "on" | "1" => Ok(Datum::Bool(true)),
            "f" | "false" | "no" | "off" | "0" => Ok(Datum::Bool(false)),
            _ => Err(format!("invalid input syntax for type boolean: \"{}\"", text)),
        },
        type_oid::INT2 => t.parse::<i16>().map(Datum::Int2).map_err(|_| bad()),
        type_oid::INT4 => t.parse::<i32>().map(Datum::Int4).map_err(|_| bad()),
        type_oid::OID => t.parse::<u32>().map(Datum::ObjectId).map_err(|_| bad()),
        type_oid::INT8 => t.parse::<i64>().map(Datum::Int8).map_err(|_| bad()),
        type_oid::NUMERIC => t.parse::<Decimal>().map(Datum::Numeric).map_err(|_| bad()),
        type_oid::BIT => t.parse::<BitString>().map(Datum::Bit),
        type_oid::FLOAT4 => t.parse::<f32>().map(Datum::Float4).map_err(|_| format!("invalid input syntax for type real: \"{}\"", text)),
        type_oid::FLOAT8 => t.parse::<f64>().map(Datum::Float8).map_err(|_| format!("invalid input syntax for type double precision: \"{}\"", text)),
        type_oid::TEXT => Ok(Datum::Text(text.to_string())),
        type_oid::JSON => serde_json::from_str::<serde_json::Value>(t)
            .map(|_| Datum::Json(t.to_string()))
            .map_err(|e| format!("invalid input syntax for type json: {}", e)),
        type_oid::INTERNAL => Err("type internal has no literal form".to_string()),
        other => Err(format!("no literal input for type {}", other)),
    }
}

#[cfg(test)]
#[path = "datum_tests.rs"]
mod datum_tests;
