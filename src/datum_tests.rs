use super::*;
use std::cmp::Ordering;

#[test]
fn parses_scalar_literals() {
    assert_eq!(parse_literal("0", type_oid::INT8).unwrap(), Datum::Int8(0));
    assert_eq!(parse_literal(" -12 ", type_oid::INT4).unwrap(), Datum::Int4(-12));
    assert_eq!(parse_literal("t", type_oid::BOOL).unwrap(), Datum::Bool(true));
    assert_eq!(parse_literal("1.5", type_oid::FLOAT8).unwrap(), Datum::Float8(1.5));
    assert_eq!(parse_literal("hello", type_oid::TEXT).unwrap(), Datum::Text("hello".into()));
    assert!(parse_literal("abc", type_oid::INT4).is_err());
    assert!(parse_literal("0", type_oid::INTERNAL).is_err());
    assert_eq!(parse_literal("4000000000", type_oid::OID).unwrap(), Datum::ObjectId(4_000_000_000));
    assert_eq!(parse_literal("-1.25", type_oid::NUMERIC).unwrap().to_string(), "-1.25");
    assert_eq!(parse_literal("B1010", type_oid::BIT).unwrap().to_string(), "1010");
    assert!(parse_literal("102", type_oid::BIT).is_err());
}

#[test]
fn parses_array_literals() {
    let d = parse_literal("{0,0}", type_oid::INT8_ARRAY).unwrap();
    assert_eq!(d, Datum::Array(ArrayValue::new(type_oid::INT8, vec![Datum::Int8(0), Datum::Int8(0)])));
    let d = parse_literal("{0,0,0}", type_oid::FLOAT8_ARRAY).unwrap();
    assert_eq!(d.as_array().map(|a| a.items.len()), Some(3));
    let d = parse_literal("{}", type_oid::INT4_ARRAY).unwrap();
    assert_eq!(d.type_oid(), Some(type_oid::INT4_ARRAY));
    let d = parse_literal("{a,b}", type_oid::TEXT_ARRAY).unwrap();
    assert_eq!(d.type_oid(), Some(type_oid::TEXT_ARRAY));
    assert!(parse_literal("0,0", type_oid::INT8_ARRAY).is_err());
    assert!(parse_literal("{0,x}", type_oid::INT8_ARRAY).is_err());
}

#[test]
fn integer_and_float_ordering() {
    assert_eq!(Datum::Int4(3).cmp_value(&Datum::Int8(3)), Ordering::Equal);
    assert_eq!(Datum::Int2(-1).cmp_value(&Datum::Numeric(Decimal::from(5i64))), Ordering::Less);
    let half: Decimal = "0.5".parse().unwrap();
    assert_eq!(Datum::Numeric(half.clone()).cmp_value(&Datum::Int4(1)), Ordering::Less);
    assert_eq!(Datum::Numeric(half).cmp_value(&Datum::Numeric("0.50".parse().unwrap())), Ordering::Equal);
    assert_eq!(Datum::ObjectId(u32::MAX).cmp_value(&Datum::ObjectId(1)), Ordering::Greater);
    assert_eq!(Datum::Float8(2.5).cmp_value(&Datum::Int4(2)), Ordering::Greater);
    assert_eq!(Datum::Float8(f64::NAN).cmp_value(&Datum::Float8(f64::INFINITY)), Ordering::Greater);
    assert_eq!(Datum::Float8(-0.0).cmp_value(&Datum::Float8(0.0)), Ordering::Equal);
}

#[test]
fn sort_key_null_placement() {
    let asc = SortKey::asc();
    let desc = SortKey::desc();
    assert_eq!(asc.compare(&Datum::Null, &Datum::Int4(1)), Ordering::Greater);
    assert_eq!(desc.compare(&Datum::Null, &Datum::Int4(1)), Ordering::Less);
    assert_eq!(desc.compare(&Datum::Int4(2), &Datum::Int4(1)), Ordering::Less);

    let mut rows = vec![vec![Datum::Int4(2)], vec![Datum::Null], vec![Datum::Int4(1)]];
    rows.sort_by(|a, b| compare_rows(a, b, &[asc]));
    assert_eq!(rows, vec![vec![Datum::Int4(1)], vec![Datum::Int4(2)], vec![Datum::Null]]);
}

#[test]
fn display_and_json_rendering() {
    assert_eq!(Datum::Float8(4.0).to_string(), "4");
    assert_eq!(Datum::Bool(false).to_string(), "f");
    assert_eq!(Datum::Bytea(vec![0xde, 0xad]).to_string(), "\\xdead");
    let arr = Datum::Array(ArrayValue::new(type_oid::INT4, vec![Datum::Int4(1), Datum::Null]));
    assert_eq!(arr.to_string(), "{1,NULL}");
    assert_eq!(arr.to_json_text(), "[1,null]");
    assert_eq!(Datum::Text("a\"b".into()).to_json_text(), "\"a\\\"b\"");
    assert_eq!(Datum::Float8(f64::NAN).to_json_text(), "\"NaN\"");
    let bits: BitString = "0110".parse().unwrap();
    assert_eq!(Datum::Bit(bits).to_json_text(), "\"0110\"");
}

#[test]
fn bit_strings_combine_only_at_equal_length() {
    let a: BitString = "1100".parse().unwrap();
    let b: BitString = "1010".parse().unwrap();
    assert_eq!(Datum::Bit(a.zip_with(&b, |x, y| x & y).unwrap()).to_string(), "1000");
    assert_eq!(Datum::Bit(a.zip_with(&b, |x, y| x | y).unwrap()).to_string(), "1110");
    let long: BitString = "110000001".parse().unwrap();
    assert_eq!(long.len(), 9);
    assert!(a.zip_with(&long, |x, y| x & y).is_none());
}

#[test]
fn poly_accum_checks_overflow() {
    let p = PolyAccum::new(true);
    let p = p.apply(3, 1).unwrap().apply(4, 1).unwrap();
    assert_eq!((p.n, p.sum, p.sumsq.clone()), (2, 7, BigInt::from(25)));
    let back = p.apply(4, -1).unwrap();
    assert_eq!((back.n, back.sum, back.sumsq), (1, 3, BigInt::from(9)));
    let huge = PolyAccum { n: 1, sum: i128::MAX, sumsq: BigInt::default(), calc_sumsq: false };
    assert!(huge.apply(1, 1).is_none());
}

#[test]
fn poly_sum_of_squares_is_unbounded() {
    let mut p = PolyAccum::new(true);
    for _ in 0..7 {
        p = p.apply(5_000_000_000_000_000_000, 1).unwrap();
    }
    assert_eq!(p.sumsq, BigInt::from(25_000_000_000_000_000_000_000_000_000_000_000_000i128) * 7);
    let q = p.combine(&p).unwrap();
    assert_eq!(q.n, 14);
    assert_eq!(q.sumsq, &p.sumsq * 2);
}

#[test]
fn numeric_accum_adds_and_removes_exactly() {
    let a = NumericAccum::new(true);
    let x: Decimal = "0.1".parse().unwrap();
    let y: Decimal = "0.2".parse().unwrap();
    let s = a.apply(&x, 1).unwrap().apply(&y, 1).unwrap();
    assert_eq!(s.sum, "0.3".parse().unwrap());
    assert_eq!(s.sumsq, "0.05".parse().unwrap());
    let back = s.apply(&x, -1).unwrap();
    assert_eq!((back.n, back.sum, back.sumsq), (1, y.clone(), "0.04".parse().unwrap()));
}

#[test]
fn option_into_datum() {
    let d: Datum = Option::<i32>::None.into();
    assert!(d.is_null());
    let d: Datum = Some(5i64).into();
    assert_eq!(d, Datum::Int8(5));
}
