//! Arithmetic aggregate support: integer avg/sum, 128-bit polynomial
//! accumulators for int8 sums and integer variance, float accumulators
//! (Youngs-Cramer), the moving float sum, count and the two-variable
//! regression family.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::{arg_f64, arg_i64, wrong_state, FinalCall, Inverse, ProcHandle, TransValue};
use crate::datum::{type_oid, ArrayValue, Datum, Decimal, InternalState, PolyAccum};
use crate::error::{AggError, AggResult};

pub fn procs() -> Vec<ProcHandle> {
    vec![
        // integer avg / sum over {count,sum} int8 pairs
        ProcHandle::transition("int2_avg_accum", true, int2_avg_accum),
        ProcHandle::transition("int4_avg_accum", true, int4_avg_accum),
        ProcHandle::inverse("int2_avg_accum_inv", true, int2_avg_accum_inv),
        ProcHandle::inverse("int4_avg_accum_inv", true, int4_avg_accum_inv),
        ProcHandle::binary("int4_avg_combine", int4_avg_combine),
        ProcHandle::final_fn("int8_avg", true, int8_avg),
        ProcHandle::final_fn("int2int4_sum", true, int2int4_sum),
        ProcHandle::transition("int2_sum", false, int2_sum),
        ProcHandle::transition("int4_sum", false, int4_sum),
        ProcHandle::binary("int8pl", int8pl),
        // polynomial accumulators
        ProcHandle::transition("int8_avg_accum", false, int8_avg_accum),
        ProcHandle::inverse("int8_avg_accum_inv", false, int8_avg_accum_inv),
        ProcHandle::combine("int8_avg_combine", false, poly_combine),
        ProcHandle::serialize("int8_avg_serialize", poly_serialize),
        ProcHandle::deserialize("int8_avg_deserialize", poly_deserialize),
        ProcHandle::transition("int2_accum", false, int2_accum),
        ProcHandle::transition("int4_accum", false, int4_accum),
        ProcHandle::transition("int8_accum", false, int8_accum),
        ProcHandle::inverse("int2_accum_inv", false, int2_accum_inv),
        ProcHandle::inverse("int4_accum_inv", false, int4_accum_inv),
        ProcHandle::inverse("int8_accum_inv", false, int8_accum_inv),
        ProcHandle::combine("numeric_poly_combine", false, poly_combine),
        ProcHandle::serialize("numeric_poly_serialize", poly_serialize),
        ProcHandle::deserialize("numeric_poly_deserialize", poly_deserialize),
        ProcHandle::final_fn("numeric_poly_sum", false, numeric_poly_sum),
        ProcHandle::final_fn("numeric_poly_avg", false, numeric_poly_avg),
        ProcHandle::final_fn("numeric_poly_var_pop", false, poly_var_pop),
        ProcHandle::final_fn("numeric_poly_var_samp", false, poly_var_samp),
        ProcHandle::final_fn("numeric_poly_stddev_pop", false, poly_stddev_pop),
        ProcHandle::final_fn("numeric_poly_stddev_samp", false, poly_stddev_samp),
        // floats
        ProcHandle::transition("float4_accum", true, float8_accum),
        ProcHandle::transition("float8_accum", true, float8_accum),
        ProcHandle::binary("float8_combine", float8_combine),
        ProcHandle::final_fn("float8_avg", true, float8_avg),
        ProcHandle::final_fn("float8_var_pop", true, float8_var_pop),
        ProcHandle::final_fn("float8_var_samp", true, float8_var_samp),
        ProcHandle::final_fn("float8_stddev_pop", true, float8_stddev_pop),
        ProcHandle::final_fn("float8_stddev_samp", true, float8_stddev_samp),
        ProcHandle::binary("float4pl", float4pl),
        ProcHandle::binary("float8pl", float8pl),
        // moving float sum over {n, sum, inexact}
        ProcHandle::transition("float8_msum_accum", true, float8_msum_accum),
        ProcHandle::inverse("float8_accum_inv_sum", true, float8_accum_inv_sum),
        ProcHandle::final_fn("float8_msum", true, float8_msum),
        // count
        ProcHandle::transition("int8inc", true, int8inc),
        ProcHandle::transition("int8inc_any", true, int8inc),
        ProcHandle::inverse("int8dec", true, int8dec),
        ProcHandle::inverse("int8dec_any", true, int8dec),
        // regression
        ProcHandle::transition("int8inc_float8_float8", true, int8inc),
        ProcHandle::transition("float8_regr_accum", true, float8_regr_accum),
        ProcHandle::binary("float8_regr_combine", float8_regr_combine),
        ProcHandle::final_fn("float8_regr_sxx", true, regr_sxx),
        ProcHandle::final_fn("float8_regr_syy", true, regr_syy),
        ProcHandle::final_fn("float8_regr_sxy", true, regr_sxy),
        ProcHandle::final_fn("float8_regr_avgx", true, regr_avgx),
        ProcHandle::final_fn("float8_regr_avgy", true, regr_avgy),
        ProcHandle::final_fn("float8_regr_r2", true, regr_r2),
        ProcHandle::final_fn("float8_regr_slope", true, regr_slope),
        ProcHandle::final_fn("float8_regr_intercept", true, regr_intercept),
        ProcHandle::final_fn("float8_covar_pop", true, covar_pop),
        ProcHandle::final_fn("float8_covar_samp", true, covar_samp),
        ProcHandle::final_fn("float8_corr", true, corr),
    ]
}

fn state_ref<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<&'a Datum> {
    state.as_ref().ok_or_else(|| AggError::bad_state(proc_name, "called with no transition state"))
}

// ---- {count,sum} pairs ----

fn int8_pair(proc_name: &str, state: &Datum) -> AggResult<(i64, i64)> {
    if let Datum::Array(a) = state {
        if let [c, s] = a.items.as_slice() {
            if let (Some(c), Some(s)) = (c.as_i64(), s.as_i64()) {
                return Ok((c, s));
            }
        }
    }
    Err(AggError::bad_state(proc_name, format!("expected 2-element bigint array, got {}", state)))
}

fn int8_pair_datum(count: i64, sum: i64) -> Datum {
    Datum::Array(ArrayValue::new(type_oid::INT8, vec![Datum::Int8(count), Datum::Int8(sum)]))
}

fn int_avg_step(proc_name: &str, state: &mut TransValue, args: &[Datum], sign: i64) -> AggResult<()> {
    let Some(x) = arg_i64(proc_name, args, 0)? else { return Ok(()) };
    let (count, sum) = int8_pair(proc_name, state_ref(proc_name, state)?)?;
    let count = count.checked_add(sign).ok_or_else(|| AggError::overflow(proc_name, "bigint"))?;
    let sum = x
        .checked_mul(sign)
        .and_then(|dx| sum.checked_add(dx))
        .ok_or_else(|| AggError::overflow(proc_name, "bigint"))?;
    *state = Some(int8_pair_datum(count, sum));
    Ok(())
}

fn int2_avg_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { int_avg_step("int2_avg_accum", state, args, 1) }
fn int4_avg_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { int_avg_step("int4_avg_accum", state, args, 1) }

fn int2_avg_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    int_avg_step("int2_avg_accum_inv", state, args, -1).map(|_| Inverse::Applied)
}

fn int4_avg_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    int_avg_step("int4_avg_accum_inv", state, args, -1).map(|_| Inverse::Applied)
}

fn int4_avg_combine(a: &Datum, b: &Datum) -> AggResult<Datum> {
    let (c1, s1) = int8_pair("int4_avg_combine", a)?;
    let (c2, s2) = int8_pair("int4_avg_combine", b)?;
    match (c1.checked_add(c2), s1.checked_add(s2)) {
        (Some(c), Some(s)) => Ok(int8_pair_datum(c, s)),
        _ => Err(AggError::overflow("int4_avg_combine", "bigint")),
    }
}

fn int8_avg(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    let (count, sum) = int8_pair("int8_avg", state_ref("int8_avg", state)?)?;
    if count == 0 {
        return Ok(Datum::Null);
    }
    Ok(Datum::Float8(sum as f64 / count as f64))
}

fn int2int4_sum(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    let (count, sum) = int8_pair("int2int4_sum", state_ref("int2int4_sum", state)?)?;
    if count == 0 {
        return Ok(Datum::Null);
    }
    Ok(Datum::Int8(sum))
}

fn small_sum(proc_name: &str, state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    let Some(x) = arg_i64(proc_name, args, 0)? else { return Ok(()) };
    let next = match state {
        None | Some(Datum::Null) => x,
        Some(d) => d
            .as_i64()
            .ok_or_else(|| wrong_state(proc_name, d))?
            .checked_add(x)
            .ok_or_else(|| AggError::overflow(proc_name, "bigint"))?,
    };
    *state = Some(Datum::Int8(next));
    Ok(())
}

fn int2_sum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { small_sum("int2_sum", state, args) }
fn int4_sum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { small_sum("int4_sum", state, args) }

fn int8pl(a: &Datum, b: &Datum) -> AggResult<Datum> {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.checked_add(y).map(Datum::Int8).ok_or_else(|| AggError::overflow("int8pl", "bigint")),
        _ => Err(AggError::bad_state("int8pl", format!("cannot add {} and {}", a.kind_name(), b.kind_name()))),
    }
}

// ---- polynomial (128-bit) accumulators ----

pub(super) fn poly_of<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<Option<&'a PolyAccum>> {
    match state {
        None | Some(Datum::Null) => Ok(None),
        Some(d) => match d.as_internal() {
            Some(InternalState::Poly(p)) => Ok(Some(p)),
            _ => Err(wrong_state(proc_name, d)),
        },
    }
}

pub(super) fn poly_datum(p: PolyAccum) -> Datum { Datum::Internal(Box::new(InternalState::Poly(p))) }

fn poly_step(proc_name: &str, state: &mut TransValue, args: &[Datum], calc_sumsq: bool, sign: i64) -> AggResult<()> {
    let Some(x) = arg_i64(proc_name, args, 0)? else { return Ok(()) };
    let next = match poly_of(proc_name, state)? {
        Some(p) => p.apply(x, sign),
        None if sign > 0 => PolyAccum::new(calc_sumsq).apply(x, 1),
        None => return Err(AggError::bad_state(proc_name, "called with no transition state")),
    }
    .ok_or_else(|| AggError::overflow(proc_name, "numeric"))?;
    *state = Some(poly_datum(next));
    Ok(())
}

fn int8_avg_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { poly_step("int8_avg_accum", state, args, false, 1) }
fn int2_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { poly_step("int2_accum", state, args, true, 1) }
fn int4_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { poly_step("int4_accum", state, args, true, 1) }
fn int8_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> { poly_step("int8_accum", state, args, true, 1) }

fn int8_avg_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    poly_step("int8_avg_accum_inv", state, args, false, -1).map(|_| Inverse::Applied)
}
fn int2_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    poly_step("int2_accum_inv", state, args, true, -1).map(|_| Inverse::Applied)
}
fn int4_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    poly_step("int4_accum_inv", state, args, true, -1).map(|_| Inverse::Applied)
}
fn int8_accum_inv(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    poly_step("int8_accum_inv", state, args, true, -1).map(|_| Inverse::Applied)
}

pub(super) fn poly_combine(state: &mut TransValue, other: &TransValue) -> AggResult<()> {
    let Some(b) = poly_of("numeric_poly_combine", other)? else { return Ok(()) };
    let next = match poly_of("numeric_poly_combine", state)? {
        None => b.clone(),
        Some(a) => a.combine(b).ok_or_else(|| AggError::overflow("numeric_poly_combine", "numeric"))?,
    };
    *state = Some(poly_datum(next));
    Ok(())
}

fn poly_serialize(state: &Datum) -> AggResult<Vec<u8>> {
    match state.as_internal() {
        Some(InternalState::Poly(p)) => bincode::serialize(p).map_err(|e| AggError::bad_state("numeric_poly_serialize", e.to_string())),
        _ => Err(wrong_state("numeric_poly_serialize", state)),
    }
}

fn poly_deserialize(bytes: &[u8]) -> AggResult<Datum> {
    bincode::deserialize::<PolyAccum>(bytes)
        .map(poly_datum)
        .map_err(|e| AggError::bad_state("numeric_poly_deserialize", format!("corrupt state: {}", e)))
}

/// The accumulated state when at least one input was seen.
fn poly_nonempty<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<Option<&'a PolyAccum>> {
    Ok(poly_of(proc_name, state)?.filter(|p| p.n > 0))
}

fn numeric_poly_sum(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    Ok(poly_nonempty("numeric_poly_sum", state)?.map(|p| Datum::Numeric(Decimal::from(p.sum))).unwrap_or(Datum::Null))
}

fn numeric_poly_avg(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    Ok(poly_nonempty("numeric_poly_avg", state)?
        .map(|p| Datum::Float8(p.sum as f64 / p.n as f64))
        .unwrap_or(Datum::Null))
}

/// Variance from the exact numerator `n*sumsq - sum^2`.
fn poly_variance(p: &PolyAccum, sample: bool) -> Option<f64> {
    if p.n == 0 || (sample && p.n == 1) {
        return None;
    }
    let n = p.n as f64;
    let sum = BigInt::from(p.sum);
    let numerator = BigInt::from(p.n) * &p.sumsq - &sum * &sum;
    let numerator = numerator.to_f64().unwrap_or(f64::INFINITY).max(0.0);
    let denominator = if sample { n * (n - 1.0) } else { n * n };
    Some(numerator / denominator)
}

pub(super) fn poly_moment(proc_name: &str, state: &TransValue, sample: bool, sqrt: bool) -> AggResult<Datum> {
    let v = poly_of(proc_name, state)?.and_then(|p| poly_variance(p, sample));
    Ok(match v {
        Some(v) if sqrt => Datum::Float8(v.sqrt()),
        Some(v) => Datum::Float8(v),
        None => Datum::Null,
    })
}

fn poly_var_pop(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { poly_moment("numeric_poly_var_pop", state, false, false) }
fn poly_var_samp(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { poly_moment("numeric_poly_var_samp", state, true, false) }
fn poly_stddev_pop(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { poly_moment("numeric_poly_stddev_pop", state, false, true) }
fn poly_stddev_samp(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { poly_moment("numeric_poly_stddev_samp", state, true, true) }

// ---- float accumulators ----

fn float8_vec<const N: usize>(proc_name: &str, state: &Datum) -> AggResult<[f64; N]> {
    if let Datum::Array(a) = state {
        if a.items.len() == N {
            let mut out = [0.0; N];
            for (slot, item) in out.iter_mut().zip(a.items.iter()) {
                *slot = item.as_f64().ok_or_else(|| wrong_state(proc_name, state))?;
            }
            return Ok(out);
        }
    }
    Err(AggError::bad_state(proc_name, format!("expected {}-element float8 array, got {}", N, state)))
}

fn float8_vec_datum(values: &[f64]) -> Datum {
    Datum::Array(ArrayValue::new(type_oid::FLOAT8, values.iter().map(|v| Datum::Float8(*v)).collect()))
}

fn check_float(proc_name: &str, result: f64, inputs: &[f64]) -> AggResult<f64> {
    if result.is_infinite() && inputs.iter().all(|v| v.is_finite()) {
        return Err(AggError::overflow(proc_name, "value"));
    }
    Ok(result)
}

fn float8_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "float8_accum";
    let Some(x) = arg_f64(NAME, args, 0)? else { return Ok(()) };
    let [n, sx, sxx] = float8_vec::<3>(NAME, state_ref(NAME, state)?)?;
    let n = n + 1.0;
    let sx = check_float(NAME, sx + x, &[sx, x])?;
    let sxx = if n > 1.0 {
        let tmp = x * n - sx;
        if x.is_finite() && sx.is_finite() { check_float(NAME, sxx + tmp * tmp / (n * (n - 1.0)), &[sxx, tmp])? } else { f64::NAN }
    } else if x.is_finite() {
        0.0
    } else {
        f64::NAN
    };
    *state = Some(float8_vec_datum(&[n, sx, sxx]));
    Ok(())
}

fn float8_combine(a: &Datum, b: &Datum) -> AggResult<Datum> {
    const NAME: &str = "float8_combine";
    let [n1, sx1, sxx1] = float8_vec::<3>(NAME, a)?;
    let [n2, sx2, sxx2] = float8_vec::<3>(NAME, b)?;
    if n1 == 0.0 {
        return Ok(b.clone());
    }
    if n2 == 0.0 {
        return Ok(a.clone());
    }
    let n = n1 + n2;
    let sx = check_float(NAME, sx1 + sx2, &[sx1, sx2])?;
    let tmp = sx1 / n1 - sx2 / n2;
    let sxx = check_float(NAME, sxx1 + sxx2 + n1 * n2 * tmp * tmp / n, &[sxx1, sxx2])?;
    Ok(float8_vec_datum(&[n, sx, sxx]))
}

fn float8_moments(proc_name: &str, state: &TransValue) -> AggResult<[f64; 3]> {
    float8_vec::<3>(proc_name, state_ref(proc_name, state)?)
}

fn float8_avg(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    let [n, sx, _] = float8_moments("float8_avg", state)?;
    Ok(if n == 0.0 { Datum::Null } else { Datum::Float8(sx / n) })
}

fn float8_var(proc_name: &str, state: &TransValue, sample: bool, sqrt: bool) -> AggResult<Datum> {
    let [n, _, sxx] = float8_moments(proc_name, state)?;
    let denominator = if sample { n - 1.0 } else { n };
    if n == 0.0 || denominator <= 0.0 {
        return Ok(Datum::Null);
    }
    let v = sxx / denominator;
    Ok(Datum::Float8(if sqrt { v.sqrt() } else { v }))
}

fn float8_var_pop(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { float8_var("float8_var_pop", state, false, false) }
fn float8_var_samp(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { float8_var("float8_var_samp", state, true, false) }
fn float8_stddev_pop(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { float8_var("float8_stddev_pop", state, false, true) }
fn float8_stddev_samp(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { float8_var("float8_stddev_samp", state, true, true) }

fn float4pl(a: &Datum, b: &Datum) -> AggResult<Datum> {
    match (a, b) {
        (Datum::Float4(x), Datum::Float4(y)) => {
            let r = x + y;
            if r.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(AggError::overflow("float4pl", "value"));
            }
            Ok(Datum::Float4(r))
        }
        _ => Err(AggError::bad_state("float4pl", format!("cannot add {} and {}", a.kind_name(), b.kind_name()))),
    }
}

fn float8pl(a: &Datum, b: &Datum) -> AggResult<Datum> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => check_float("float8pl", x + y, &[x, y]).map(Datum::Float8),
        _ => Err(AggError::bad_state("float8pl", format!("cannot add {} and {}", a.kind_name(), b.kind_name()))),
    }
}

/// Rounding error of `a + b` (Knuth's two-sum); zero when the sum is exact.
fn two_sum_error(a: f64, b: f64) -> f64 {
    let s = a + b;
    let bb = s - a;
    (a - (s - bb)) + (b - bb)
}

/// Whether `a + b` is the exact real sum.
fn exact_sum(a: f64, b: f64) -> bool { (a + b).is_finite() && two_sum_error(a, b) == 0.0 }

/// Moving float sum. The third slot is sticky: once any addition rounds, the
/// running sum is no longer the exact sum of the frame.
fn float8_msum_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "float8_msum_accum";
    let Some(x) = arg_f64(NAME, args, 0)? else { return Ok(()) };
    let [n, s, inexact] = float8_vec::<3>(NAME, state_ref(NAME, state)?)?;
    let sum = check_float(NAME, s + x, &[s, x])?;
    let inexact = if inexact != 0.0 || !exact_sum(s, x) { 1.0 } else { 0.0 };
    *state = Some(float8_vec_datum(&[n + 1.0, sum, inexact]));
    Ok(())
}

/// Removes `x` from the moving float sum. Refused unless the running sum is
/// exact and the subtraction is exact too, so an applied inverse always
/// leaves the exact sum of the remaining rows.
fn float8_accum_inv_sum(state: &mut TransValue, args: &[Datum]) -> AggResult<Inverse> {
    const NAME: &str = "float8_accum_inv_sum";
    let Some(x) = arg_f64(NAME, args, 0)? else { return Ok(Inverse::Applied) };
    let [n, s, inexact] = float8_vec::<3>(NAME, state_ref(NAME, state)?)?;
    if inexact != 0.0 || !x.is_finite() || !s.is_finite() || !exact_sum(s, -x) {
        return Ok(Inverse::Unsafe);
    }
    *state = Some(float8_vec_datum(&[n - 1.0, s - x, 0.0]));
    Ok(Inverse::Applied)
}

fn float8_msum(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    let [n, sum, _] = float8_vec::<3>("float8_msum", state_ref("float8_msum", state)?)?;
    Ok(if n == 0.0 { Datum::Null } else { Datum::Float8(sum) })
}

// ---- count ----

fn int8inc(state: &mut TransValue, _args: &[Datum]) -> AggResult<()> {
    let n = state_ref("int8inc", state)?;
    let n = n.as_i64().ok_or_else(|| wrong_state("int8inc", n))?;
    *state = Some(Datum::Int8(n.checked_add(1).ok_or_else(|| AggError::overflow("int8inc", "bigint"))?));
    Ok(())
}

fn int8dec(state: &mut TransValue, _args: &[Datum]) -> AggResult<Inverse> {
    let n = state_ref("int8dec", state)?;
    let n = n.as_i64().ok_or_else(|| wrong_state("int8dec", n))?;
    *state = Some(Datum::Int8(n.checked_sub(1).ok_or_else(|| AggError::overflow("int8dec", "bigint"))?));
    Ok(Inverse::Applied)
}

// ---- regression: state {N, Sx, Sxx, Sy, Syy, Sxy}, arguments (Y, X) ----

fn float8_regr_accum(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "float8_regr_accum";
    let (Some(y), Some(x)) = (arg_f64(NAME, args, 0)?, arg_f64(NAME, args, 1)?) else { return Ok(()) };
    let [n, sx, sxx, sy, syy, sxy] = float8_vec::<6>(NAME, state_ref(NAME, state)?)?;
    let n = n + 1.0;
    let sx = check_float(NAME, sx + x, &[sx, x])?;
    let sy = check_float(NAME, sy + y, &[sy, y])?;
    let (sxx, syy, sxy) = if !(x.is_finite() && y.is_finite()) {
        (f64::NAN, f64::NAN, f64::NAN)
    } else if n > 1.0 {
        let tmp_x = x * n - sx;
        let tmp_y = y * n - sy;
        let scale = 1.0 / (n * (n - 1.0));
        (
            check_float(NAME, sxx + tmp_x * tmp_x * scale, &[sxx, tmp_x])?,
            check_float(NAME, syy + tmp_y * tmp_y * scale, &[syy, tmp_y])?,
            check_float(NAME, sxy + tmp_x * tmp_y * scale, &[sxy, tmp_x, tmp_y])?,
        )
    } else {
        (0.0, 0.0, 0.0)
    };
    *state = Some(float8_vec_datum(&[n, sx, sxx, sy, syy, sxy]));
    Ok(())
}

fn float8_regr_combine(a: &Datum, b: &Datum) -> AggResult<Datum> {
    const NAME: &str = "float8_regr_combine";
    let [n1, sx1, sxx1, sy1, syy1, sxy1] = float8_vec::<6>(NAME, a)?;
    let [n2, sx2, sxx2, sy2, syy2, sxy2] = float8_vec::<6>(NAME, b)?;
    if n1 == 0.0 {
        return Ok(b.clone());
    }
    if n2 == 0.0 {
        return Ok(a.clone());
    }
    let n = n1 + n2;
    let tmp_x = sx1 / n1 - sx2 / n2;
    let tmp_y = sy1 / n1 - sy2 / n2;
    let w = n1 * n2 / n;
    Ok(float8_vec_datum(&[
        n,
        check_float(NAME, sx1 + sx2, &[sx1, sx2])?,
        check_float(NAME, sxx1 + sxx2 + w * tmp_x * tmp_x, &[sxx1, sxx2])?,
        check_float(NAME, sy1 + sy2, &[sy1, sy2])?,
        check_float(NAME, syy1 + syy2 + w * tmp_y * tmp_y, &[syy1, syy2])?,
        check_float(NAME, sxy1 + sxy2 + w * tmp_x * tmp_y, &[sxy1, sxy2])?,
    ]))
}

struct Regr {
    n: f64,
    sx: f64,
    sxx: f64,
    sy: f64,
    syy: f64,
    sxy: f64,
}

/// Regression moments, `None` when no rows were accumulated.
fn regr(proc_name: &str, state: &TransValue) -> AggResult<Option<Regr>> {
    let [n, sx, sxx, sy, syy, sxy] = float8_vec::<6>(proc_name, state_ref(proc_name, state)?)?;
    Ok((n >= 1.0).then_some(Regr { n, sx, sxx, sy, syy, sxy }))
}

fn regr_final(proc_name: &str, state: &TransValue, f: impl FnOnce(&Regr) -> Option<f64>) -> AggResult<Datum> {
    Ok(regr(proc_name, state)?.and_then(|r| f(&r)).map(Datum::Float8).unwrap_or(Datum::Null))
}

fn regr_sxx(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { regr_final("float8_regr_sxx", state, |r| Some(r.sxx)) }
fn regr_syy(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { regr_final("float8_regr_syy", state, |r| Some(r.syy)) }
fn regr_sxy(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { regr_final("float8_regr_sxy", state, |r| Some(r.sxy)) }
fn regr_avgx(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { regr_final("float8_regr_avgx", state, |r| Some(r.sx / r.n)) }
fn regr_avgy(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { regr_final("float8_regr_avgy", state, |r| Some(r.sy / r.n)) }

fn regr_r2(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    regr_final("float8_regr_r2", state, |r| {
        if r.sxx == 0.0 {
            None
        } else if r.syy == 0.0 {
            Some(1.0)
        } else {
            Some((r.sxy * r.sxy) / (r.sxx * r.syy))
        }
    })
}

fn regr_slope(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    regr_final("float8_regr_slope", state, |r| (r.sxx != 0.0).then(|| r.sxy / r.sxx))
}

fn regr_intercept(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    regr_final("float8_regr_intercept", state, |r| (r.sxx != 0.0).then(|| (r.sy - r.sx * r.sxy / r.sxx) / r.n))
}

fn covar_pop(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> { regr_final("float8_covar_pop", state, |r| Some(r.sxy / r.n)) }

fn covar_samp(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    regr_final("float8_covar_samp", state, |r| (r.n >= 2.0).then(|| r.sxy / (r.n - 1.0)))
}

fn corr(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    regr_final("float8_corr", state, |r| (r.sxx != 0.0 && r.syy != 0.0).then(|| r.sxy / (r.sxx * r.syy).sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(f: super::super::TransFn, init: TransValue, inputs: &[Datum]) -> TransValue {
        let mut state = init;
        for x in inputs {
            f(&mut state, std::slice::from_ref(x)).unwrap();
        }
        state
    }

    #[test]
    fn int4_sum_adds_and_skips_nulls() {
        let state = fold(int4_sum, None, &[Datum::Int4(3), Datum::Null, Datum::Int4(5), Datum::Int4(-2)]);
        assert_eq!(state, Some(Datum::Int8(6)));
    }

    #[test]
    fn int4_avg_pair_round_trip() {
        let init = Some(int8_pair_datum(0, 0));
        let mut state = fold(int4_avg_accum, init, &[Datum::Int4(2), Datum::Int4(4), Datum::Int4(6)]);
        assert_eq!(int8_avg(&state, &FinalCall::default()).unwrap(), Datum::Float8(4.0));
        assert_eq!(int4_avg_accum_inv(&mut state, &[Datum::Int4(2)]).unwrap(), Inverse::Applied);
        assert_eq!(int8_avg(&state, &FinalCall::default()).unwrap(), Datum::Float8(5.0));
    }

    #[test]
    fn int8pl_overflow_is_reported() {
        let err = int8pl(&Datum::Int8(i64::MAX), &Datum::Int8(1)).unwrap_err();
        match err {
            AggError::TransitionFailed { sqlstate, .. } => assert_eq!(sqlstate, "22003"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn poly_sum_exceeds_bigint() {
        let state = fold(int8_avg_accum, None, &[Datum::Int8(i64::MAX), Datum::Int8(i64::MAX)]);
        let sum = numeric_poly_sum(&state, &FinalCall::default()).unwrap();
        assert_eq!(sum, Datum::Numeric(Decimal::from(2 * i64::MAX as i128)));
    }

    #[test]
    fn poly_state_serializes() {
        let state = fold(int8_accum, None, &[Datum::Int8(1), Datum::Int8(2), Datum::Int8(3)]);
        let bytes = poly_serialize(state.as_ref().unwrap()).unwrap();
        assert_eq!(Some(poly_deserialize(&bytes).unwrap()), state);
        assert!(poly_deserialize(&[1, 2]).is_err());
    }

    #[test]
    fn integer_variance_matches_definition() {
        let state = fold(int4_accum, None, &[Datum::Int4(2), Datum::Int4(4), Datum::Int4(4), Datum::Int4(4), Datum::Int4(5), Datum::Int4(5), Datum::Int4(7), Datum::Int4(9)]);
        assert_eq!(poly_var_pop(&state, &FinalCall::default()).unwrap(), Datum::Float8(4.0));
        assert_eq!(poly_stddev_pop(&state, &FinalCall::default()).unwrap(), Datum::Float8(2.0));
        let single = fold(int4_accum, None, &[Datum::Int4(1)]);
        assert_eq!(poly_var_samp(&single, &FinalCall::default()).unwrap(), Datum::Null);
    }

    #[test]
    fn float_accumulator_combines() {
        let init = Some(float8_vec_datum(&[0.0, 0.0, 0.0]));
        let a = fold(float8_accum, init.clone(), &[Datum::Float8(1.0), Datum::Float8(2.0)]);
        let b = fold(float8_accum, init.clone(), &[Datum::Float8(3.0), Datum::Float8(4.0)]);
        let all = fold(float8_accum, init, &[Datum::Float8(1.0), Datum::Float8(2.0), Datum::Float8(3.0), Datum::Float8(4.0)]);
        let merged = Some(float8_combine(a.as_ref().unwrap(), b.as_ref().unwrap()).unwrap());
        assert_eq!(float8_var_pop(&merged, &FinalCall::default()).unwrap(), float8_var_pop(&all, &FinalCall::default()).unwrap());
        assert_eq!(float8_avg(&merged, &FinalCall::default()).unwrap(), Datum::Float8(2.5));
    }

    #[test]
    fn float_sum_inverse_refuses_inexact_removal() {
        let init = Some(float8_vec_datum(&[0.0, 0.0, 0.0]));
        let mut state = fold(float8_msum_accum, init.clone(), &[Datum::Float8(1.0)]);
        assert_eq!(float8_accum_inv_sum(&mut state, &[Datum::Float8(1e17)]).unwrap(), Inverse::Unsafe);
        assert_eq!(state, Some(float8_vec_datum(&[1.0, 1.0, 0.0])));
        let mut state = fold(float8_msum_accum, init.clone(), &[Datum::Float8(2.0), Datum::Float8(4.0)]);
        assert_eq!(float8_accum_inv_sum(&mut state, &[Datum::Float8(2.0)]).unwrap(), Inverse::Applied);
        assert_eq!(float8_msum(&state, &FinalCall::default()).unwrap(), Datum::Float8(4.0));
        assert_eq!(float8_accum_inv_sum(&mut state, &[Datum::Float8(f64::INFINITY)]).unwrap(), Inverse::Unsafe);
    }

    #[test]
    fn rounded_float_sum_is_never_inverted() {
        let init = Some(float8_vec_datum(&[0.0, 0.0, 0.0]));
        // 1e16 + 1 rounds, so removing 1e16 again would leave 0 instead of 1
        let mut state = fold(float8_msum_accum, init, &[Datum::Float8(1e16), Datum::Float8(1.0)]);
        assert_eq!(float8_msum(&state, &FinalCall::default()).unwrap(), Datum::Float8(1e16));
        assert_eq!(float8_accum_inv_sum(&mut state, &[Datum::Float8(1e16)]).unwrap(), Inverse::Unsafe);
        assert_eq!(float8_accum_inv_sum(&mut state, &[Datum::Float8(1.0)]).unwrap(), Inverse::Unsafe);
        assert_eq!(two_sum_error(1e16, 1.0), 1.0);
        assert_eq!(two_sum_error(0.5, 0.25), 0.0);
    }

    #[test]
    fn wide_integer_variance_does_not_overflow() {
        let rows: Vec<Datum> = (0..7).map(|_| Datum::Int8(5_000_000_000_000_000_000)).collect();
        let state = fold(int8_accum, None, &rows);
        assert_eq!(poly_var_samp(&state, &FinalCall::default()).unwrap(), Datum::Float8(0.0));
        assert_eq!(poly_stddev_pop(&state, &FinalCall::default()).unwrap(), Datum::Float8(0.0));
        // n*sumsq = 2^129
        let spread = fold(int8_accum, None, &[Datum::Int8(i64::MIN), Datum::Int8(i64::MIN), Datum::Int8(0), Datum::Int8(0)]);
        assert_eq!(poly_var_pop(&spread, &FinalCall::default()).unwrap(), Datum::Float8(2f64.powi(124)));
    }

    #[test]
    fn regression_line_through_points() {
        let mut state = Some(float8_vec_datum(&[0.0; 6]));
        for (x, y) in [(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)] {
            float8_regr_accum(&mut state, &[Datum::Float8(y), Datum::Float8(x)]).unwrap();
        }
        let call = FinalCall::default();
        assert_eq!(regr_slope(&state, &call).unwrap(), Datum::Float8(2.0));
        assert_eq!(regr_intercept(&state, &call).unwrap(), Datum::Float8(1.0));
        assert_eq!(regr_r2(&state, &call).unwrap(), Datum::Float8(1.0));
        assert_eq!(regr_avgx(&state, &call).unwrap(), Datum::Float8(2.0));
    }
}
