//! Comparison and logical folds: min/max per type, bool_and/bool_or (plain
//! and moving) and the bitwise and/or aggregates over integers and bit strings.

use std::cmp::Ordering;

use super::{arg, wrong_state, FinalCall, Inverse, ProcHandle, TransValue};
use crate::datum::{BoolAccum, Datum, InternalState};
use crate::error::{AggError, AggResult};

pub fn procs() -> Vec<ProcHandle> {
    let mut out = Vec::new();
    for name in ["int2larger", "int4larger", "int8larger", "float4larger", "float8larger", "numeric_larger", "oidlarger", "text_larger"] {
        out.push(ProcHandle::binary(name, larger));
    }
    for name in ["int2smaller", "int4smaller", "int8smaller", "float4smaller", "float8smaller", "numeric_smaller", "oidsmaller", "text_smaller"] {
        out.push(ProcHandle::binary(name, smaller));
    }
    out.extend([
        ProcHandle::binary("booland_statefunc", booland_statefunc),
        ProcHandle::binary("boolor_statefunc", boolor_statefunc),
        ProcHandle::transition("bool_accum", false, bool_accum),
        ProcHandle::inverse("bool_accum_inv", false, bool_accum_inv),
        ProcHandle::final_fn("bool_alltrue", true, bool_alltrue),
        ProcHandle::final_fn("bool_anytrue", true, bool_anytrue),
        ProcHandle::binary("int2and", int2and),
        ProcHandle::binary("int2or", int2or),
        ProcHandle::binary("int4and", int4and),
        ProcHandle::binary("int4or", int4or),
        ProcHandle::binary("int8and", int8and),
        ProcHandle::binary("int8or", int8or),
        ProcHandle::binary("bitand", bitand),
        ProcHandle::binary("bitor", bitor),
    ]);
    out
}

fn same_family(a: &Datum, b: &Datum) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn pick(proc_name: &str, a: &Datum, b: &Datum, keep: Ordering) -> AggResult<Datum> {
    if !same_family(a, b) {
        return Err(AggError::bad_state(proc_name, format!("cannot compare {} with {}", a.kind_name(), b.kind_name())));
    }
    // ties keep the running value
    Ok(if b.cmp_value(a) == keep { b.clone() } else { a.clone() })
}

fn larger(a: &Datum, b: &Datum) -> AggResult<Datum> { pick("larger", a, b, Ordering::Greater) }
fn smaller(a: &Datum, b: &Datum) -> AggResult<Datum> { pick("smaller", a, b, Ordering::Less) }

fn bools(proc_name: &str, a: &Datum, b: &Datum) -> AggResult<(bool, bool)> {
    match (a.as_bool(), b.as_bool()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(AggError::bad_state(proc_name, format!("expected booleans, got {} and {}", a.kind_name(), b.kind_name()))),
    }
}

fn booland_statefunc(a: &Datum, b: &Datum) -> AggResult<Datum> {
    let (x, y) = bools("booland_statefunc", a, b)?;
    Ok(Datum::Bool(x && y))
}

fn boolor_statefunc(a: &Datum, b: &Datum) -> AggResult<Datum> {
    let (x, y) = bools("boolor_statefunc", a, b)?;
    Ok(Datum::Bool(x || y))
}

fn bool_state<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<Option<&'a BoolAccum>> {
    match state {
        None | Some(Datum::Null) => Ok(None),
        Some(d) => match d.as_internal() {
            Some(InternalState::Bool(b)) => Ok(Some(b)),
            _ => Err(wrong_state(proc_name, d)),
        },
    }
}

fn bool_step(proc_name: &str, state: &mut TransValue, args: &[Datum], sign: i64) -> AggResult<()> {
    let value = match arg(proc_name, args, 0)? {
        Datum::Null => return Ok(()),
        d => d.as_bool().ok_or_else(|| AggError::bad_state(proc_name, format!("expected boolean argument, got {}", d.kind_name())))?,
    };
    let current = match bool_state(proc_name, state)? {
        Some(b) => b.clone(),
        None if sign > 0 => BoolAccum::default(),
        None => return Err(AggError::bad_state(proc_name, "called with no transition state")),
    };
    let next = BoolAccum { count: current.count + sign, true_count: current.true_count + if value { sign } else { 0 } };
    *state = Some(Datum::Internal(Box::new(InternalState::Bool(next))));
    Ok(())
}

fn bool_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { bool_step("bool_accum", state, args, 1) }

fn bool_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    bool_step("bool_accum_inv", state, args, -1).map(|_| Inverse::Applied)
}

fn bool_alltrue(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    Ok(match bool_state("bool_alltrue", state)? {
        Some(b) if b.count > 0 => Datum::Bool(b.true_count == b.count),
        _ => Datum::Null,
    })
}

fn bool_anytrue(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    Ok(match bool_state("bool_anytrue", state)? {
        Some(b) if b.count > 0 => Datum::Bool(b.true_count > 0),
        _ => Datum::Null,
    })
}

macro_rules! bitwise {
    ($name:ident, $variant:ident, $op:tt) => {
        fn $name(a: &Datum, b: &Datum) -> AggResult<Datum> {
            match (a, b) {
                (Datum::$variant(x), Datum::$variant(y)) => Ok(Datum::$variant(x $op y)),
                _ => Err(AggError::bad_state(stringify!($name), format!("unexpected operands {} and {}", a.kind_name(), b.kind_name()))),
            }
        }
    };
}

bitwise!(int2and, Int2, &);
bitwise!(int2or, Int2, |);
bitwise!(int4and, Int4, &);
bitwise!(int4or, Int4, |);
bitwise!(int8and, Int8, &);
bitwise!(int8or, Int8, |);

fn bit_op(proc_name: &str, verb: &str, a: &Datum, b: &Datum, f: fn(u8, u8) -> u8) -> AggResult<Datum> {
    match (a, b) {
        (Datum::Bit(x), Datum::Bit(y)) => x.zip_with(y, f).map(Datum::Bit).ok_or_else(|| AggError::TransitionFailed {
            proc_name: proc_name.to_string(),
            sqlstate: "22026",
            message: format!("cannot {} bit strings of different sizes", verb),
        }),
        _ => Err(AggError::bad_state(proc_name, format!("unexpected operands {} and {}", a.kind_name(), b.kind_name()))),
    }
}

fn bitand(a: &Datum, b: &Datum) -> AggResult<Datum> { bit_op("bitand", "AND", a, b, |x, y| x & y) }
fn bitor(a: &Datum, b: &Datum) -> AggResult<Datum> { bit_op("bitor", "OR", a, b, |x, y| x | y) }
