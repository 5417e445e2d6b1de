//! Elementwise array sums: `array_sum(int4[])`, `sum(anyarray)` over integer
//! and float vectors, and `pivot_sum(labels, key, value)`.
//!
//! Arrays are one-dimensional. Elements must be non-null and both operands of
//! an elementwise add must have the same length.

use super::{arg, wrong_state, ProcHandle, TransValue};
use crate::datum::{type_oid, ArrayValue, Datum, Oid};
use crate::error::{AggError, AggResult};

pub fn procs() -> Vec<ProcHandle> {
    vec![
        ProcHandle::binary("array_add", array_add),
        ProcHandle::transition("int2_matrix_accum", false, int2_matrix_accum),
        ProcHandle::transition("int4_matrix_accum", false, int4_matrix_accum),
        ProcHandle::binary("int8_matrix_accum", int8_matrix_accum),
        ProcHandle::binary("float8_matrix_accum", float8_matrix_accum),
        ProcHandle::transition("int4_pivot_accum", false, int4_pivot_accum),
        ProcHandle::transition("int8_pivot_accum", false, int8_pivot_accum),
        ProcHandle::transition("float8_pivot_accum", false, float8_pivot_accum),
    ]
}

fn array<'a>(proc_name: &str, d: &'a Datum) -> AggResult<&'a ArrayValue> {
    d.as_array().ok_or_else(|| AggError::bad_state(proc_name, format!("expected an array, got {}", d.kind_name())))
}

fn int_rank(elem: Oid) -> Option<u8> {
    match elem {
        type_oid::INT2 => Some(0),
        type_oid::INT4 => Some(1),
        type_oid::INT8 => Some(2),
        _ => None,
    }
}

/// `a + b` as a value of `elem`.
fn add_elem(proc_name: &str, a: &Datum, b: &Datum, elem: Oid) -> AggResult<Datum> {
    if a.is_null() || b.is_null() {
        return Err(AggError::invalid_input(proc_name, "array must not contain nulls"));
    }
    if elem == type_oid::FLOAT8 {
        return match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) if (x + y).is_infinite() && x.is_finite() && y.is_finite() => Err(AggError::overflow(proc_name, "value")),
            (Some(x), Some(y)) => Ok(Datum::Float8(x + y)),
            _ => Err(AggError::bad_state(proc_name, format!("cannot add {} and {}", a.kind_name(), b.kind_name()))),
        };
    }
    let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) else {
        return Err(AggError::bad_state(proc_name, format!("cannot add {} and {}", a.kind_name(), b.kind_name())));
    };
    let sum = x.checked_add(y);
    match elem {
        type_oid::INT2 => sum.and_then(|v| i16::try_from(v).ok()).map(Datum::Int2).ok_or_else(|| AggError::overflow(proc_name, "smallint")),
        type_oid::INT4 => sum.and_then(|v| i32::try_from(v).ok()).map(Datum::Int4).ok_or_else(|| AggError::overflow(proc_name, "integer")),
        type_oid::INT8 => sum.map(Datum::Int8).ok_or_else(|| AggError::overflow(proc_name, "bigint")),
        other => Err(AggError::bad_state(proc_name, format!("cannot sum elements of type {}", type_oid::name(other)))),
    }
}

fn elementwise(proc_name: &str, a: &ArrayValue, b: &ArrayValue, elem: Oid) -> AggResult<ArrayValue> {
    if a.items.len() != b.items.len() {
        return Err(AggError::invalid_input(
            proc_name,
            format!("array lengths do not match: {} and {}", a.items.len(), b.items.len()),
        ));
    }
    let items = a.items.iter().zip(&b.items).map(|(x, y)| add_elem(proc_name, x, y, elem)).collect::<AggResult<Vec<_>>>()?;
    Ok(ArrayValue::new(elem, items))
}

/// Copy of `a` with every element converted to `elem`.
fn convert(proc_name: &str, a: &ArrayValue, elem: Oid) -> AggResult<ArrayValue> {
    let zeros = ArrayValue::new(elem, vec![zero(elem); a.items.len()]);
    elementwise(proc_name, &zeros, a, elem)
}

fn zero(elem: Oid) -> Datum {
    match elem {
        type_oid::INT2 => Datum::Int2(0),
        type_oid::INT4 => Datum::Int4(0),
        type_oid::FLOAT8 => Datum::Float8(0.0),
        _ => Datum::Int8(0),
    }
}

/// Integer vector add; an empty operand is the identity.
fn array_add(a: &Datum, b: &Datum) -> AggResult<Datum> {
    const NAME: &str = "array_add";
    let (x, y) = (array(NAME, a)?, array(NAME, b)?);
    if x.items.is_empty() {
        return convert(NAME, y, type_oid::INT4).map(Datum::Array);
    }
    if y.items.is_empty() {
        return Ok(a.clone());
    }
    elementwise(NAME, x, y, type_oid::INT4).map(Datum::Array)
}

/// Integer vector add keeping the wider element type of the two operands.
fn int8_matrix_accum(a: &Datum, b: &Datum) -> AggResult<Datum> {
    const NAME: &str = "int8_matrix_accum";
    let (x, y) = (array(NAME, a)?, array(NAME, b)?);
    let elem = match (int_rank(x.elem_type), int_rank(y.elem_type)) {
        (Some(rx), Some(ry)) => if rx >= ry { x.elem_type } else { y.elem_type },
        _ => return Err(AggError::bad_state(NAME, format!("expected integer arrays, got {} and {}", a.kind_name(), b.kind_name()))),
    };
    elementwise(NAME, x, y, elem).map(Datum::Array)
}

fn float8_matrix_accum(a: &Datum, b: &Datum) -> AggResult<Datum> {
    const NAME: &str = "float8_matrix_accum";
    elementwise(NAME, array(NAME, a)?, array(NAME, b)?, type_oid::FLOAT8).map(Datum::Array)
}

/// Narrow integer vectors accumulate into a bigint vector.
fn widening_matrix_accum(proc_name: &str, state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    let input = match arg(proc_name, args, 0)? {
        Datum::Null => return Ok(()),
        d => array(proc_name, d)?,
    };
    let next = match state {
        None | Some(Datum::Null) => convert(proc_name, input, type_oid::INT8)?,
        Some(d) => elementwise(proc_name, array(proc_name, d)?, input, type_oid::INT8)?,
    };
    *state = Some(Datum::Array(next));
    Ok(())
}

fn int2_matrix_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { widening_matrix_accum("int2_matrix_accum", state, args) }
fn int4_matrix_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { widening_matrix_accum("int4_matrix_accum", state, args) }

/// Adds `value` into the slot whose label equals `key`. The state is a
/// zero vector as wide as `labels`; NULL keys or values and keys not among
/// the labels leave it unchanged.
fn pivot_step(proc_name: &str, state: &mut TransValue, args: &[Datum], elem: Oid) -> AggResult<()> {
    let labels = match arg(proc_name, args, 0)? {
        Datum::Null => return Err(AggError::invalid_input(proc_name, "pivot labels must not be null")),
        d => array(proc_name, d)?,
    };
    let mut current = match state {
        None | Some(Datum::Null) => ArrayValue::new(elem, vec![zero(elem); labels.items.len()]),
        Some(Datum::Array(a)) => a.clone(),
        Some(d) => return Err(wrong_state(proc_name, d)),
    };
    if current.items.len() != labels.items.len() {
        return Err(AggError::invalid_input(
            proc_name,
            format!("pivot has {} labels but the running state has {} slots", labels.items.len(), current.items.len()),
        ));
    }
    let (key, value) = (arg(proc_name, args, 1)?, arg(proc_name, args, 2)?);
    if !key.is_null() && !value.is_null() {
        if let Some(slot) = labels.items.iter().position(|l| l.as_str().is_some() && l.as_str() == key.as_str()) {
            current.items[slot] = add_elem(proc_name, &current.items[slot], value, elem)?;
        }
    }
    *state = Some(Datum::Array(current));
    Ok(())
}

fn int4_pivot_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { pivot_step("int4_pivot_accum", state, args, type_oid::INT4) }
fn int8_pivot_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { pivot_step("int8_pivot_accum", state, args, type_oid::INT8) }
fn float8_pivot_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { pivot_step("float8_pivot_accum", state, args, type_oid::FLOAT8) }

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(elem: Oid, vals: &[i64]) -> Datum {
        let items = vals
            .iter()
            .map(|v| match elem {
                type_oid::INT2 => Datum::Int2(*v as i16),
                type_oid::INT4 => Datum::Int4(*v as i32),
                _ => Datum::Int8(*v),
            })
            .collect();
        Datum::Array(ArrayValue::new(elem, items))
    }

    fn labels(names: &[&str]) -> Datum {
        Datum::Array(ArrayValue::new(type_oid::TEXT, names.iter().map(|n| Datum::from(*n)).collect()))
    }

    #[test]
    fn array_add_treats_empty_as_identity() {
        let empty = ints(type_oid::INT4, &[]);
        assert_eq!(array_add(&empty, &ints(type_oid::INT4, &[1, 2])).unwrap(), ints(type_oid::INT4, &[1, 2]));
        assert_eq!(array_add(&ints(type_oid::INT4, &[1, 2]), &ints(type_oid::INT4, &[10, 20])).unwrap(), ints(type_oid::INT4, &[11, 22]));
        assert!(array_add(&ints(type_oid::INT4, &[1]), &ints(type_oid::INT4, &[1, 2])).is_err());
        let overflow = array_add(&ints(type_oid::INT4, &[i32::MAX as i64]), &ints(type_oid::INT4, &[1])).unwrap_err();
        assert!(matches!(overflow, AggError::TransitionFailed { sqlstate: "22003", .. }));
    }

    #[test]
    fn narrow_matrices_widen_to_bigint() {
        let mut state = None;
        int2_matrix_accum(&mut state, &[ints(type_oid::INT2, &[i16::MAX as i64, 1])]).unwrap();
        int2_matrix_accum(&mut state, &[Datum::Null]).unwrap();
        int2_matrix_accum(&mut state, &[ints(type_oid::INT2, &[i16::MAX as i64, 2])]).unwrap();
        assert_eq!(state, Some(ints(type_oid::INT8, &[2 * i16::MAX as i64, 3])));
        assert_eq!(int8_matrix_accum(&ints(type_oid::INT4, &[1]), &ints(type_oid::INT8, &[2])).unwrap(), ints(type_oid::INT8, &[3]));
        let with_null = Datum::Array(ArrayValue::new(type_oid::INT4, vec![Datum::Null]));
        assert!(int4_matrix_accum(&mut state, &[with_null]).is_err());
    }

    #[test]
    fn float_matrix_sums_elementwise() {
        let a = Datum::Array(ArrayValue::new(type_oid::FLOAT8, vec![Datum::Float8(0.5), Datum::Float8(1.0)]));
        let b = Datum::Array(ArrayValue::new(type_oid::FLOAT8, vec![Datum::Float8(0.25), Datum::Float8(-1.0)]));
        let want = Datum::Array(ArrayValue::new(type_oid::FLOAT8, vec![Datum::Float8(0.75), Datum::Float8(0.0)]));
        assert_eq!(float8_matrix_accum(&a, &b).unwrap(), want);
    }

    #[test]
    fn pivot_adds_into_the_matching_label() {
        let names = labels(&["north", "south"]);
        let mut state = None;
        int4_pivot_accum(&mut state, &[names.clone(), Datum::from("south"), Datum::Int4(5)]).unwrap();
        int4_pivot_accum(&mut state, &[names.clone(), Datum::from("west"), Datum::Int4(7)]).unwrap();
        int4_pivot_accum(&mut state, &[names.clone(), Datum::Null, Datum::Int4(7)]).unwrap();
        int4_pivot_accum(&mut state, &[names.clone(), Datum::from("south"), Datum::Int4(1)]).unwrap();
        assert_eq!(state, Some(ints(type_oid::INT4, &[0, 6])));
        let err = int4_pivot_accum(&mut state, &[labels(&["x"]), Datum::from("x"), Datum::Int4(1)]);
        assert!(err.is_err());
        assert!(float8_pivot_accum(&mut None, &[Datum::Null, Datum::from("x"), Datum::Float8(1.0)]).is_err());
    }
}
