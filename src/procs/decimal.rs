//! `numeric` aggregates: exact avg/sum and variance over decimal inputs.
//!
//! The `numeric_combine`, `numeric_serialize`, `numeric_deserialize` and
//! variance finals are shared with the int8 variance aggregates, whose state
//! is a polynomial accumulator; those bodies dispatch on the state kind.

use super::numeric::{poly_combine, poly_moment};
use super::{arg_numeric, wrong_state, FinalCall, Inverse, ProcHandle, TransValue};
use crate::datum::{Datum, Decimal, InternalState, NumericAccum};
use crate::error::{AggError, AggResult};

/// Fractional digits of avg, variance and standard deviation results, raised
/// to the input scale when that is larger.
const MIN_RESULT_SCALE: u32 = 16;

pub fn procs() -> Vec<ProcHandle> {
    vec![
        ProcHandle::transition("numeric_avg_accum", false, numeric_avg_accum),
        ProcHandle::transition("numeric_accum", false, numeric_accum),
        ProcHandle::inverse("numeric_accum_inv", false, numeric_accum_inv),
        ProcHandle::combine("numeric_avg_combine", false, numeric_avg_combine),
        ProcHandle::serialize("numeric_avg_serialize", numeric_avg_serialize),
        ProcHandle::deserialize("numeric_avg_deserialize", numeric_avg_deserialize),
        ProcHandle::final_fn("numeric_avg", false, numeric_avg),
        ProcHandle::final_fn("numeric_sum", false, numeric_sum),
        ProcHandle::combine("numeric_combine", false, numeric_combine),
        ProcHandle::serialize("numeric_serialize", numeric_serialize),
        ProcHandle::deserialize("numeric_deserialize", numeric_deserialize),
        ProcHandle::final_fn("numeric_var_pop", false, numeric_var_pop),
        ProcHandle::final_fn("numeric_var_samp", false, numeric_var_samp),
        ProcHandle::final_fn("numeric_stddev_pop", false, numeric_stddev_pop),
        ProcHandle::final_fn("numeric_stddev_samp", false, numeric_stddev_samp),
    ]
}

fn is_poly(state: &TransValue) -> bool {
    matches!(state.as_ref().and_then(Datum::as_internal), Some(InternalState::Poly(_)))
}

fn numeric_of<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<Option<&'a NumericAccum>> {
    match state {
        None | Some(Datum::Null) => Ok(None),
        Some(d) => match d.as_internal() {
            Some(InternalState::Numeric(acc)) => Ok(Some(acc)),
            _ => Err(wrong_state(proc_name, d)),
        },
    }
}

fn numeric_datum(acc: NumericAccum) -> Datum { Datum::Internal(Box::new(InternalState::Numeric(acc))) }

fn numeric_step(proc_name: &str, state: &mut TransValue, args: &[Datum], calc_sumsq: bool, sign: i64) -> AggResult<()> {
    let Some(x) = arg_numeric(proc_name, args, 0)? else { return Ok(()) };
    let next = match numeric_of(proc_name, state)? {
        Some(acc) => acc.apply(&x, sign),
        None if sign > 0 => NumericAccum::new(calc_sumsq).apply(&x, 1),
        None => return Err(AggError::bad_state(proc_name, "called with no transition state")),
    }
    .ok_or_else(|| AggError::overflow(proc_name, "count"))?;
    *state = Some(numeric_datum(next));
    Ok(())
}

fn numeric_avg_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { numeric_step("numeric_avg_accum", state, args, false, 1) }
fn numeric_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { numeric_step("numeric_accum", state, args, true, 1) }

/// Decimal arithmetic is exact, so removal always succeeds.
fn numeric_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    let calc_sumsq = numeric_of("numeric_accum_inv", state)?.map(|acc| acc.calc_sumsq).unwrap_or(false);
    numeric_step("numeric_accum_inv", state, args, calc_sumsq, -1).map(|_| Inverse::Applied)
}

fn combine_exact(proc_name: &str, state: &mut TransValue, other: &TransValue) -> AggResult<()> {
    let Some(b) = numeric_of(proc_name, other)? else { return Ok(()) };
    let next = match numeric_of(proc_name, state)? {
        None => b.clone(),
        Some(a) => a.combine(b).ok_or_else(|| AggError::overflow(proc_name, "count"))?,
    };
    *state = Some(numeric_datum(next));
    Ok(())
}

fn numeric_avg_combine(state: &mut TransValue, other: &TransValue) -> AggResult<()> { combine_exact("numeric_avg_combine", state, other) }

fn numeric_combine(state: &mut TransValue, other: &TransValue) -> AggResult<()> {
    if is_poly(state) || is_poly(other) {
        return poly_combine(state, other);
    }
    combine_exact("numeric_combine", state, other)
}

fn numeric_avg_serialize(state: &Datum) -> AggResult<Vec<u8>> {
    match state.as_internal() {
        Some(InternalState::Numeric(acc)) => bincode::serialize(acc).map_err(|e| AggError::bad_state("numeric_avg_serialize", e.to_string())),
        _ => Err(wrong_state("numeric_avg_serialize", state)),
    }
}

fn numeric_avg_deserialize(bytes: &[u8]) -> AggResult<Datum> {
    bincode::deserialize::<NumericAccum>(bytes)
        .map(numeric_datum)
        .map_err(|e| AggError::bad_state("numeric_avg_deserialize", format!("corrupt state: {}", e)))
}

/// Tagged with the accumulator kind so one deserializer serves both.
fn numeric_serialize(state: &Datum) -> AggResult<Vec<u8>> {
    match state.as_internal() {
        Some(s @ (InternalState::Poly(_) | InternalState::Numeric(_))) => {
            bincode::serialize(s).map_err(|e| AggError::bad_state("numeric_serialize", e.to_string()))
        }
        _ => Err(wrong_state("numeric_serialize", state)),
    }
}

fn numeric_deserialize(bytes: &[u8]) -> AggResult<Datum> {
    match bincode::deserialize::<InternalState>(bytes) {
        Ok(s @ (InternalState::Poly(_) | InternalState::Numeric(_))) => Ok(Datum::Internal(Box::new(s))),
        Ok(other) => Err(AggError::bad_state("numeric_deserialize", format!("unexpected {}", other.kind_name()))),
        Err(e) => Err(AggError::bad_state("numeric_deserialize", format!("corrupt state: {}", e))),
    }
}

fn nonempty<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<Option<&'a NumericAccum>> {
    Ok(numeric_of(proc_name, state)?.filter(|acc| acc.n > 0))
}

fn numeric_sum(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    Ok(nonempty("numeric_sum", state)?.map(|acc| Datum::Numeric(acc.sum.clone())).unwrap_or(Datum::Null))
}

fn numeric_avg(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    let Some(acc) = nonempty("numeric_avg", state)? else { return Ok(Datum::Null) };
    let scale = acc.sum.scale().max(MIN_RESULT_SCALE);
    Ok(acc.sum.div(&Decimal::from(acc.n), scale).map(Datum::Numeric).unwrap_or(Datum::Null))
}

/// `(n*sumsq - sum^2) / (n*(n-1))`, or `/ n^2` for the population form.
fn exact_moment(proc_name: &str, state: &TransValue, sample: bool, sqrt: bool) -> AggResult<Datum> {
    let Some(acc) = numeric_of(proc_name, state)? else { return Ok(Datum::Null) };
    if acc.n == 0 || (sample && acc.n == 1) {
        return Ok(Datum::Null);
    }
    let n = Decimal::from(acc.n);
    let numerator = n.mul(&acc.sumsq).sub(&acc.sum.mul(&acc.sum));
    let numerator = if numerator.is_negative() { Decimal::zero() } else { numerator };
    let denominator = if sample { n.mul(&Decimal::from(acc.n - 1)) } else { n.mul(&n) };
    let scale = acc.sumsq.scale().max(MIN_RESULT_SCALE);
    let result = if sqrt {
        numerator.div(&denominator, scale * 2).and_then(|v| v.sqrt(scale))
    } else {
        numerator.div(&denominator, scale)
    };
    Ok(result.map(Datum::Numeric).unwrap_or(Datum::Null))
}

fn moment(proc_name: &str, state: &TransValue, sample: bool, sqrt: bool) -> AggResult<Datum> {
    if is_poly(state) {
        poly_moment(proc_name, state, sample, sqrt)
    } else {
        exact_moment(proc_name, state, sample, sqrt)
    }
}

fn numeric_var_pop(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { moment("numeric_var_pop", state, false, false) }
fn numeric_var_samp(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { moment("numeric_var_samp", state, true, false) }
fn numeric_stddev_pop(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { moment("numeric_stddev_pop", state, false, true) }
fn numeric_stddev_samp(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { moment("numeric_stddev_samp", state, true, true) }

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Datum { Datum::Numeric(s.parse().unwrap()) }

    fn fold(f: super::super::TransFn, inputs: &[Datum]) -> TransValue {
        let mut state = None;
        for x in inputs {
            f(&mut state, std::slice::from_ref(x)).unwrap();
        }
        state
    }

    #[test]
    fn sum_and_avg_are_exact() {
        let state = fold(numeric_avg_accum, &[dec("0.1"), dec("0.2"), Datum::Null, dec("0.3")]);
        assert_eq!(numeric_sum(&state, &FinalCall::default()).unwrap(), dec("0.6"));
        let avg = numeric_avg(&state, &FinalCall::default()).unwrap();
        assert_eq!(avg.to_string(), "0.2000000000000000");
        assert_eq!(numeric_sum(&None, &FinalCall::default()).unwrap(), Datum::Null);
    }

    #[test]
    fn inverse_restores_the_previous_sum() {
        let mut state = fold(numeric_accum, &[dec("1e30"), dec("1"), dec("2")]);
        assert_eq!(numeric_accum_inv(&mut state, &[dec("1e30")]).unwrap(), Inverse::Applied);
        assert_eq!(numeric_sum(&state, &FinalCall::default()).unwrap(), dec("3"));
        assert_eq!(numeric_var_samp(&state, &FinalCall::default()).unwrap(), dec("0.5"));
    }

    #[test]
    fn variance_and_stddev_over_decimals() {
        let state = fold(numeric_accum, &[dec("1"), dec("2"), dec("3"), dec("4")]);
        let call = FinalCall::default();
        assert_eq!(numeric_var_samp(&state, &call).unwrap().to_string(), "1.6666666666666667");
        assert_eq!(numeric_var_pop(&state, &call).unwrap(), dec("1.25"));
        assert_eq!(numeric_stddev_samp(&state, &call).unwrap().to_string(), "1.2909944487358056");
        let single = fold(numeric_accum, &[dec("7.5")]);
        assert_eq!(numeric_var_samp(&single, &call).unwrap(), Datum::Null);
        assert_eq!(numeric_var_pop(&single, &call).unwrap(), dec("0"));
    }

    #[test]
    fn combine_and_serialize_dispatch_on_state_kind() {
        let mut left = fold(numeric_accum, &[dec("1.5")]);
        let right = fold(numeric_accum, &[dec("2.5")]);
        numeric_combine(&mut left, &right).unwrap();
        assert_eq!(numeric_sum(&left, &FinalCall::default()).unwrap(), dec("4"));
        let bytes = numeric_serialize(left.as_ref().unwrap()).unwrap();
        assert_eq!(Some(numeric_deserialize(&bytes).unwrap()), left);

        let poly = Some(super::super::numeric::poly_datum(crate::datum::PolyAccum::new(true).apply(3, 1).unwrap()));
        let bytes = numeric_serialize(poly.as_ref().unwrap()).unwrap();
        assert_eq!(Some(numeric_deserialize(&bytes).unwrap()), poly);
        let mut mixed = left.clone();
        assert!(numeric_combine(&mut mixed, &poly).is_err());
        assert!(numeric_deserialize(&[7]).is_err());
    }
}
