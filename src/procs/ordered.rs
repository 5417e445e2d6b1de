//! Ordered-set finals. Rows arrive already sorted by the buffer's sort keys;
//! each row holds the aggregated arguments of one input.

use std::cmp::Ordering;

use super::{FinalCall, ProcHandle};
use crate::datum::{compare_rows, type_oid, ArrayValue, Datum};
use crate::error::{AggError, AggResult};

pub fn procs() -> Vec<ProcHandle> {
    vec![
        ProcHandle::ordered_marker("ordered_set_transition"),
        ProcHandle::ordered_marker("ordered_set_transition_multi"),
        ProcHandle::ordered_final("percentile_disc_final", percentile_disc_final),
        ProcHandle::ordered_final("percentile_cont_float8_final", percentile_cont_float8_final),
        ProcHandle::ordered_final("percentile_disc_multi_final", percentile_disc_multi_final),
        ProcHandle::ordered_final("percentile_cont_float8_multi_final", percentile_cont_float8_multi_final),
        ProcHandle::ordered_final("rank_final", rank_final),
        ProcHandle::ordered_final("percent_rank_final", percent_rank_final),
        ProcHandle::ordered_final("cume_dist_final", cume_dist_final),
        ProcHandle::ordered_final("dense_rank_final", dense_rank_final),
    ]
}

fn fraction(proc_name: &str, d: &Datum) -> AggResult<Option<f64>> {
    match d {
        Datum::Null => Ok(None),
        other => {
            let p = other
                .as_f64()
                .ok_or_else(|| AggError::bad_state(proc_name, format!("percentile must be numeric, got {}", other.kind_name())))?;
            if !(0.0..=1.0).contains(&p) {
                return Err(AggError::invalid_input(proc_name, format!("percentile value {} is not between 0 and 1", p)));
            }
            Ok(Some(p))
        }
    }
}

fn first_direct<'a>(proc_name: &str, call: &'a FinalCall<'_>) -> AggResult<&'a Datum> {
    call.direct_args.first().ok_or_else(|| AggError::bad_state(proc_name, "missing direct argument"))
}

/// A group that never saw a row has no direct arguments either.
fn no_input(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> bool { rows.is_empty() && call.direct_args.is_empty() }

fn disc_at(rows: &[Vec<Datum>], p: f64) -> Datum {
    let n = rows.len();
    let rownum = ((p * n as f64).ceil() as usize).clamp(1, n);
    rows[rownum - 1].first().cloned().unwrap_or(Datum::Null)
}

fn cont_at(proc_name: &str, values: &[f64], p: f64) -> AggResult<Datum> {
    let n = values.len();
    if n == 0 {
        return Err(AggError::bad_state(proc_name, "no rows to interpolate"));
    }
    let pos = p * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let (a, b) = (values[lo], values[hi]);
    Ok(Datum::Float8(if lo == hi { a } else { a + (pos - lo as f64) * (b - a) }))
}

fn float_column(proc_name: &str, rows: &[Vec<Datum>]) -> AggResult<Vec<f64>> {
    rows.iter()
        .map(|r| {
            let d = r.first().unwrap_or(&Datum::Null);
            d.as_f64().ok_or_else(|| AggError::bad_state(proc_name, format!("cannot interpolate {}", d.kind_name())))
        })
        .collect()
}

fn percentile_disc_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "percentile_disc_final";
    if no_input(rows, call) {
        return Ok(Datum::Null);
    }
    let Some(p) = fraction(NAME, first_direct(NAME, call)?)? else { return Ok(Datum::Null) };
    if rows.is_empty() {
        return Ok(Datum::Null);
    }
    Ok(disc_at(rows, p))
}

fn percentile_cont_float8_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "percentile_cont_float8_final";
    if no_input(rows, call) {
        return Ok(Datum::Null);
    }
    let Some(p) = fraction(NAME, first_direct(NAME, call)?)? else { return Ok(Datum::Null) };
    if rows.is_empty() {
        return Ok(Datum::Null);
    }
    cont_at(NAME, &float_column(NAME, rows)?, p)
}

fn fractions<'a>(proc_name: &str, call: &'a FinalCall<'_>) -> AggResult<Option<&'a [Datum]>> {
    match first_direct(proc_name, call)? {
        Datum::Null => Ok(None),
        Datum::Array(a) => Ok(Some(a.items.as_slice())),
        other => Err(AggError::bad_state(proc_name, format!("expected an array of fractions, got {}", other.kind_name()))),
    }
}

fn percentile_disc_multi_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "percentile_disc_multi_final";
    if no_input(rows, call) {
        return Ok(Datum::Null);
    }
    let Some(ps) = fractions(NAME, call)? else { return Ok(Datum::Null) };
    if rows.is_empty() {
        return Ok(Datum::Null);
    }
    let elem_type = rows.iter().find_map(|r| r.first().and_then(Datum::type_oid)).unwrap_or(type_oid::ANYELEMENT);
    let mut items = Vec::with_capacity(ps.len());
    for p in ps {
        items.push(match fraction(NAME, p)? {
            Some(p) => disc_at(rows, p),
            None => Datum::Null,
        });
    }
    Ok(Datum::Array(ArrayValue::new(elem_type, items)))
}

fn percentile_cont_float8_multi_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "percentile_cont_float8_multi_final";
    if no_input(rows, call) {
        return Ok(Datum::Null);
    }
    let Some(ps) = fractions(NAME, call)? else { return Ok(Datum::Null) };
    if rows.is_empty() {
        return Ok(Datum::Null);
    }
    let values = float_column(NAME, rows)?;
    let mut items = Vec::with_capacity(ps.len());
    for p in ps {
        items.push(match fraction(NAME, p)? {
            Some(p) => cont_at(NAME, &values, p)?,
            None => Datum::Null,
        });
    }
    Ok(Datum::Array(ArrayValue::new(type_oid::FLOAT8, items)))
}

/// The hypothetical row, checked against the arity of the buffered rows.
fn hypothetical_row<'a>(proc_name: &str, rows: &[Vec<Datum>], call: &'a FinalCall<'_>) -> AggResult<&'a [Datum]> {
    let hyp = call.direct_args;
    if let Some(first) = rows.first() {
        if first.len() != hyp.len() {
            return Err(AggError::invalid_input(
                proc_name,
                format!("hypothetical row has {} columns, aggregated rows have {}", hyp.len(), first.len()),
            ));
        }
    }
    Ok(hyp)
}

/// Rows strictly before the hypothetical row, and rows not after it.
fn position(proc_name: &str, rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<(usize, usize)> {
    let hyp = hypothetical_row(proc_name, rows, call)?;
    let before = rows.iter().filter(|r| compare_rows(r, hyp, call.sort_keys) == Ordering::Less).count();
    let not_after = rows.iter().filter(|r| compare_rows(r, hyp, call.sort_keys) != Ordering::Greater).count();
    Ok((before, not_after))
}

fn rank_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    let (before, _) = position("rank_final", rows, call)?;
    Ok(Datum::Int8(before as i64 + 1))
}

fn percent_rank_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    let (before, _) = position("percent_rank_final", rows, call)?;
    if rows.is_empty() {
        return Ok(Datum::Float8(0.0));
    }
    Ok(Datum::Float8(before as f64 / rows.len() as f64))
}

fn cume_dist_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    let (_, not_after) = position("cume_dist_final", rows, call)?;
    Ok(Datum::Float8((not_after + 1) as f64 / (rows.len() + 1) as f64))
}

fn dense_rank_final(rows: &[Vec<Datum>], call: &FinalCall<'_>) -> AggResult<Datum> {
    let hyp = hypothetical_row("dense_rank_final", rows, call)?;
    let mut distinct = 0i64;
    let mut prev: Option<&Vec<Datum>> = None;
    for r in rows.iter().filter(|r| compare_rows(r, hyp, call.sort_keys) == Ordering::Less) {
        if prev.map_or(true, |p| compare_rows(p, r, call.sort_keys) != Ordering::Equal) {
            distinct += 1;
        }
        prev = Some(r);
    }
    Ok(Datum::Int8(distinct + 1))
}
