//! Collecting aggregates: array_agg, string_agg (text and bytea), json_agg and
//! json_object_agg. All keep `internal` states that grow in place; every body
//! checks its arguments before touching the state.

use super::{arg, wrong_state, FinalCall, ProcHandle, TransValue};
use crate::datum::{quote_json, type_oid, ArrayAccum, ArrayValue, Datum, InternalState, JsonAccum, JsonObjectAccum, StringAccum};
use crate::error::{AggError, AggResult};

pub fn procs() -> Vec<ProcHandle> {
    vec![
        ProcHandle::transition("array_agg_transfn", false, array_agg_transfn),
        ProcHandle::final_fn("array_agg_finalfn", false, array_agg_finalfn),
        ProcHandle::transition("string_agg_transfn", false, string_agg_transfn),
        ProcHandle::final_fn("string_agg_finalfn", false, string_agg_finalfn),
        ProcHandle::transition("bytea_string_agg_transfn", false, bytea_string_agg_transfn),
        ProcHandle::final_fn("bytea_string_agg_finalfn", false, bytea_string_agg_finalfn),
        ProcHandle::transition("json_agg_transfn", false, json_agg_transfn),
        ProcHandle::final_fn("json_agg_finalfn", false, json_agg_finalfn),
        ProcHandle::transition("json_object_agg_transfn", false, json_object_agg_transfn),
        ProcHandle::final_fn("json_object_agg_finalfn", false, json_object_agg_finalfn),
    ]
}

/// Mutable access to the internal state, creating it with `init` on first use.
fn internal_mut<'a>(proc_name: &str, state: &'a mut TransValue, init: impl FnOnce() -> InternalState) -> AggResult<&'a mut InternalState> {
    if matches!(state, None | Some(Datum::Null)) {
        *state = Some(Datum::Internal(Box::new(init())));
    }
    match state {
        Some(Datum::Internal(s)) => Ok(s.as_mut()),
        Some(other) => Err(wrong_state(proc_name, other)),
        None => Err(AggError::bad_state(proc_name, "called with no transition state")),
    }
}

fn internal_ref<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<Option<&'a InternalState>> {
    match state {
        None | Some(Datum::Null) => Ok(None),
        Some(Datum::Internal(s)) => Ok(Some(s.as_ref())),
        Some(other) => Err(wrong_state(proc_name, other)),
    }
}

fn array_agg_transfn(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "array_agg_transfn";
    let value = arg(NAME, args, 0)?.clone();
    match internal_mut(NAME, state, || InternalState::Array(ArrayAccum::default()))? {
        InternalState::Array(acc) => {
            acc.items.push(value);
            Ok(())
        }
        other => Err(AggError::bad_state(NAME, format!("unexpected transition state {}", other.kind_name()))),
    }
}

/// The element type comes from the final extra argument types when present.
fn array_agg_finalfn(state: &TransValue, call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "array_agg_finalfn";
    let elem_type = call.extra_arg_types.and_then(|t| t.first().copied()).unwrap_or(type_oid::ANYELEMENT);
    match internal_ref(NAME, state)? {
        None => Ok(Datum::Null),
        Some(InternalState::Array(acc)) => {
            let elem_type = if type_oid::is_polymorphic(elem_type) {
                acc.items.iter().find_map(Datum::type_oid).unwrap_or(elem_type)
            } else {
                elem_type
            };
            Ok(Datum::Array(ArrayValue::new(elem_type, acc.items.clone())))
        }
        Some(other) => Err(AggError::bad_state(NAME, format!("unexpected transition state {}", other.kind_name()))),
    }
}

fn string_step(proc_name: &str, state: &mut TransValue, value: &[u8], delimiter: Option<&[u8]>) -> AggResult<()> {
    let fresh = matches!(state, None | Some(Datum::Null));
    match internal_mut(proc_name, state, || InternalState::Str(StringAccum::default()))? {
        InternalState::Str(acc) => {
            if !fresh {
                if let Some(d) = delimiter {
                    acc.buf.extend_from_slice(d);
                }
            }
            acc.buf.extend_from_slice(value);
            Ok(())
        }
        other => Err(AggError::bad_state(proc_name, format!("unexpected transition state {}", other.kind_name()))),
    }
}

fn string_agg_transfn(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "string_agg_transfn";
    let value = match arg(NAME, args, 0)? {
        Datum::Null => return Ok(()),
        Datum::Text(s) => s.as_bytes(),
        other => return Err(AggError::bad_state(NAME, format!("expected text argument, got {}", other.kind_name()))),
    };
    let delimiter = match arg(NAME, args, 1)? {
        Datum::Null => None,
        Datum::Text(s) => Some(s.as_bytes()),
        other => return Err(AggError::bad_state(NAME, format!("expected text delimiter, got {}", other.kind_name()))),
    };
    string_step(NAME, state, value, delimiter)
}

fn bytea_string_agg_transfn(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "bytea_string_agg_transfn";
    let value = match arg(NAME, args, 0)? {
        Datum::Null => return Ok(()),
        Datum::Bytea(b) => b.as_slice(),
        other => return Err(AggError::bad_state(NAME, format!("expected bytea argument, got {}", other.kind_name()))),
    };
    let delimiter = match arg(NAME, args, 1)? {
        Datum::Null => None,
        Datum::Bytea(b) => Some(b.as_slice()),
        other => return Err(AggError::bad_state(NAME, format!("expected bytea delimiter, got {}", other.kind_name()))),
    };
    string_step(NAME, state, value, delimiter)
}

fn string_buf<'a>(proc_name: &str, state: &'a TransValue) -> AggResult<Option<&'a [u8]>> {
    match internal_ref(proc_name, state)? {
        None => Ok(None),
        Some(InternalState::Str(acc)) => Ok(Some(acc.buf.as_slice())),
        Some(other) => Err(AggError::bad_state(proc_name, format!("unexpected transition state {}", other.kind_name()))),
    }
}

fn string_agg_finalfn(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "string_agg_finalfn";
    match string_buf(NAME, state)? {
        None => Ok(Datum::Null),
        Some(buf) => String::from_utf8(buf.to_vec())
            .map(Datum::Text)
            .map_err(|e| AggError::bad_state(NAME, e.to_string())),
    }
}

fn bytea_string_agg_finalfn(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    Ok(string_buf("bytea_string_agg_finalfn", state)?.map(|b| Datum::Bytea(b.to_vec())).unwrap_or(Datum::Null))
}

fn json_agg_transfn(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "json_agg_transfn";
    let rendered = arg(NAME, args, 0)?.to_json_text();
    match internal_mut(NAME, state, || InternalState::Json(JsonAccum::default()))? {
        InternalState::Json(acc) => {
            acc.items.push(rendered);
            Ok(())
        }
        other => Err(AggError::bad_state(NAME, format!("unexpected transition state {}", other.kind_name()))),
    }
}

fn json_agg_finalfn(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "json_agg_finalfn";
    match internal_ref(NAME, state)? {
        None => Ok(Datum::Null),
        Some(InternalState::Json(acc)) => Ok(Datum::Json(format!("[{}]", acc.items.join(", ")))),
        Some(other) => Err(AggError::bad_state(NAME, format!("unexpected transition state {}", other.kind_name()))),
    }
}

fn json_object_agg_transfn(state: &mut TransValue, args: &[Datum]) -> AggResult<()> {
    const NAME: &str = "json_object_agg_transfn";
    let key = match arg(NAME, args, 0)? {
        Datum::Null => return Err(AggError::invalid_input(NAME, "field name must not be null")),
        Datum::Text(s) => s.clone(),
        other => other.to_string(),
    };
    let value = arg(NAME, args, 1)?.to_json_text();
    match internal_mut(NAME, state, || InternalState::JsonObject(JsonObjectAccum::default()))? {
        InternalState::JsonObject(acc) => {
            acc.entries.push((key, value));
            Ok(())
        }
        other => Err(AggError::bad_state(NAME, format!("unexpected transition state {}", other.kind_name()))),
    }
}

fn json_object_agg_finalfn(state: &TransValue, _call: &FinalCall<'_>) -> AggResult<Datum> {
    const NAME: &str = "json_object_agg_finalfn";
    match internal_ref(NAME, state)? {
        None => Ok(Datum::Null),
        Some(InternalState::JsonObject(acc)) => {
            let fields: Vec<String> = acc.entries.iter().map(|(k, v)| format!("{} : {}", quote_json(k), v)).collect();
            Ok(Datum::Json(format!("{{ {} }}", fields.join(", "))))
        }
        Some(other) => Err(AggError::bad_state(NAME, format!("unexpected transition state {}", other.kind_name()))),
    }
}
