//!
//! Transition / combine / final dispatch
//! -------------------------------------
//! Drives the support functions of a descriptor over an accumulator. Strict
//! semantics live here: rows with a NULL argument are skipped by strict
//! transition functions, the first non-null input seeds a missing state, a
//! strict final over a NULL state yields NULL and strict combine functions
//! keep whichever side has a state.
//!
//! By-value states go through a candidate copy committed only on success, so
//! a failing transition leaves the accumulator at its last good state.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::catalog::AggregateDescriptor;
use crate::datum::{type_oid, Datum, Oid};
use crate::error::{AggError, AggResult};
use crate::exec::accumulator::GroupAccumulator;
use crate::procs::{FinalCall, Inverse, ProcBody, ProcHandle, TransValue};
use std::sync::Arc;

/// Whether a row reached the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retreat {
    Applied,
    Skipped,
    Unsafe,
}

fn absent(state: &TransValue) -> bool { matches!(state, None | Some(Datum::Null)) }

/// Run one forward transition.
pub(crate) fn advance(proc: &ProcHandle, transtype: Oid, state: &mut TransValue, args: &[Datum]) -> AggResult<Advance> {
    if proc.strict {
        if args.iter().any(Datum::is_null) {
            return Ok(Advance::Skipped);
        }
        if state.is_none() {
            let first = args
                .first()
                .ok_or_else(|| AggError::bad_state(proc.name, "strict transition without arguments needs an initial value"))?;
            *state = Some(first.clone());
            return Ok(Advance::Applied);
        }
        if matches!(state, Some(Datum::Null)) {
            return Ok(Advance::Skipped);
        }
    }
    match proc.body {
        ProcBody::Transition(f) => {
            if transtype == type_oid::INTERNAL {
                f(state, args)?;
            } else {
                let mut candidate = state.clone();
                f(&mut candidate, args)?;
                *state = candidate;
            }
        }
        ProcBody::Binary(f) => {
            let (Some(current), Some(arg)) = (state.as_ref(), args.first()) else {
                return Err(AggError::bad_state(proc.name, "binary transition needs a state and one argument"));
            };
            let next = f(current, arg)?;
            *state = Some(next);
        }
        _ => return Err(AggError::bad_state(proc.name, "not a transition function")),
    }
    Ok(Advance::Applied)
}

/// Run one inverse transition. `Unsafe` leaves the state untouched.
pub(crate) fn retreat(proc: &ProcHandle, transtype: Oid, state: &mut TransValue, args: &[Datum]) -> AggResult<Retreat> {
    if proc.strict {
        if args.iter().any(Datum::is_null) {
            return Ok(Retreat::Skipped);
        }
        if absent(state) {
            return Ok(Retreat::Unsafe);
        }
    }
    let ProcBody::Inverse(f) = proc.body else {
        return Err(AggError::bad_state(proc.name, "not an inverse transition function"));
    };
    let outcome = if transtype == type_oid::INTERNAL {
        f(state, args)?
    } else {
        let mut candidate = state.clone();
        let outcome = f(&mut candidate, args)?;
        if outcome == Inverse::Applied {
            *state = candidate;
        }
        outcome
    };
    Ok(match outcome {
        Inverse::Applied => Retreat::Applied,
        Inverse::Unsafe => Retreat::Unsafe,
    })
}

/// Final function over a plain state, or the state itself when there is none.
pub(crate) fn run_final(desc: &AggregateDescriptor, final_fn: Option<&ProcHandle>, final_extra: bool, state: &TransValue) -> AggResult<Datum> {
    let Some(proc) = final_fn else {
        return Ok(state.clone().unwrap_or(Datum::Null));
    };
    if proc.strict && absent(state) {
        return Ok(Datum::Null);
    }
    let ProcBody::Final(f) = proc.body else {
        return Err(AggError::bad_state(proc.name, "not a final function"));
    };
    let extra_types = final_extra.then(|| desc.final_extra_types());
    let call = FinalCall { extra_arg_types: extra_types.as_deref(), ..FinalCall::default() };
    f(state, &call)
}

/// Feed one input row. Ordered-set rows carry the direct arguments first.
pub fn apply_input(acc: &mut GroupAccumulator, row: &[Datum]) -> AggResult<()> {
    if acc.finalized {
        return Err(AggError::Finalized { aggfnoid: acc.desc.aggfnoid });
    }
    let desc = Arc::clone(&acc.desc);
    match acc.ordered.as_mut() {
        Some(buffer) => {
            let ndirect = desc.num_direct_args as usize;
            if row.len() < ndirect {
                return Err(AggError::invalid_input(
                    desc.transfn.name,
                    format!("expected {} direct arguments, row has {} values", ndirect, row.len()),
                ));
            }
            let (direct, args) = row.split_at(ndirect);
            buffer.append(direct, args);
        }
        None => {
            if advance(&desc.transfn, desc.transtype, &mut acc.state, row)? == Advance::Skipped {
                trace!(target: "pgagg::exec", "aggregate {} skipped a row with NULL input", desc.aggfnoid);
            }
        }
    }
    acc.inputs_seen += 1;
    Ok(())
}

/// Produce the group's result and mark the accumulator finalized.
pub fn finalize(acc: &mut GroupAccumulator) -> AggResult<Datum> {
    if acc.finalized {
        return Err(AggError::Finalized { aggfnoid: acc.desc.aggfnoid });
    }
    let desc = Arc::clone(&acc.desc);
    let result = match acc.ordered.as_mut() {
        Some(buffer) => {
            buffer.sort();
            let proc = desc.finalfn.ok_or_else(|| AggError::invalid(desc.aggfnoid, "ordered-set aggregate without a final function"))?;
            let ProcBody::OrderedFinal(f) = proc.body else {
                return Err(AggError::bad_state(proc.name, "not an ordered-set final function"));
            };
            let extra_types = desc.final_extra.then(|| desc.final_extra_types());
            let call = FinalCall {
                direct_args: buffer.direct_args(),
                extra_arg_types: extra_types.as_deref(),
                sort_keys: buffer.sort_keys(),
            };
            f(buffer.rows(), &call)?
        }
        None => run_final(&desc, desc.finalfn.as_ref(), desc.final_extra, &acc.state)?,
    };
    acc.finalized = true;
    Ok(result)
}

/// Fold `other` into `acc` with the combine function.
pub fn combine(acc: &mut GroupAccumulator, other: &GroupAccumulator) -> AggResult<()> {
    let desc = Arc::clone(&acc.desc);
    if other.desc.aggfnoid != desc.aggfnoid {
        return Err(AggError::invalid(desc.aggfnoid, format!("cannot combine with a state of aggregate {}", other.desc.aggfnoid)));
    }
    if acc.finalized || other.finalized {
        return Err(AggError::Finalized { aggfnoid: desc.aggfnoid });
    }
    let proc = desc.combinefn.ok_or(AggError::CombineUnsupported { aggfnoid: desc.aggfnoid })?;
    if proc.strict {
        if absent(&other.state) {
            acc.inputs_seen += other.inputs_seen;
            return Ok(());
        }
        if absent(&acc.state) {
            acc.state = other.state.clone();
            acc.inputs_seen += other.inputs_seen;
            return Ok(());
        }
    }
    match proc.body {
        ProcBody::Binary(f) => {
            if let (Some(a), Some(b)) = (acc.state.as_ref(), other.state.as_ref()) {
                acc.state = Some(f(a, b)?);
            }
        }
        ProcBody::Combine(f) => {
            if desc.transtype == type_oid::INTERNAL {
                f(&mut acc.state, &other.state)?;
            } else {
                let mut candidate = acc.state.clone();
                f(&mut candidate, &other.state)?;
                acc.state = candidate;
            }
        }
        _ => return Err(AggError::bad_state(proc.name, "not a combine function")),
    }
    acc.inputs_seen += other.inputs_seen;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
enum StatePayload {
    NoState,
    Null,
    /// Output of the aggregate's serialize function.
    Bytes(Vec<u8>),
    /// By-value state copied as is.
    Value(Datum),
}

#[derive(Debug, Serialize, Deserialize)]
struct StateEnvelope {
    aggfnoid: Oid,
    inputs_seen: u64,
    payload: StatePayload,
}

fn check_serializable(acc_desc: &AggregateDescriptor) -> AggResult<()> {
    if acc_desc.is_ordered_set() || (acc_desc.transtype == type_oid::INTERNAL && acc_desc.serialfn.is_none()) {
        return Err(AggError::SerializationUnsupported { aggfnoid: acc_desc.aggfnoid });
    }
    Ok(())
}

/// Encode a partial state for transfer across a process or worker boundary.
pub fn serialize(acc: &GroupAccumulator) -> AggResult<Vec<u8>> {
    let desc = &acc.desc;
    check_serializable(desc)?;
    if acc.finalized {
        return Err(AggError::Finalized { aggfnoid: desc.aggfnoid });
    }
    let payload = match &acc.state {
        None => StatePayload::NoState,
        Some(Datum::Null) => StatePayload::Null,
        Some(state) => match desc.serialfn {
            Some(proc) => match proc.body {
                ProcBody::Serialize(f) => StatePayload::Bytes(f(state)?),
                _ => return Err(AggError::bad_state(proc.name, "not a serialize function")),
            },
            None => StatePayload::Value(state.clone()),
        },
    };
    let env = StateEnvelope { aggfnoid: desc.aggfnoid, inputs_seen: acc.inputs_seen, payload };
    bincode::serialize(&env).map_err(|e| AggError::bad_state("serialize", e.to_string()))
}

/// Rebuild an accumulator from `serialize` output.
pub fn deserialize(desc: &Arc<AggregateDescriptor>, bytes: &[u8]) -> AggResult<GroupAccumulator> {
    check_serializable(desc)?;
    let env: StateEnvelope =
        bincode::deserialize(bytes).map_err(|e| AggError::bad_state("deserialize", format!("corrupt state envelope: {}", e)))?;
    if env.aggfnoid != desc.aggfnoid {
        return Err(AggError::invalid(desc.aggfnoid, format!("serialized state belongs to aggregate {}", env.aggfnoid)));
    }
    let state = match env.payload {
        StatePayload::NoState => None,
        StatePayload::Null => Some(Datum::Null),
        StatePayload::Bytes(b) => match desc.deserialfn.map(|p| (p.name, p.body)) {
            Some((_, ProcBody::Deserialize(f))) => Some(f(&b)?),
            Some((name, _)) => return Err(AggError::bad_state(name, "not a deserialize function")),
            None => return Err(AggError::SerializationUnsupported { aggfnoid: desc.aggfnoid }),
        },
        StatePayload::Value(d) => Some(d),
    };
    Ok(GroupAccumulator::from_parts(Arc::clone(desc), state, env.inputs_seen))
}
