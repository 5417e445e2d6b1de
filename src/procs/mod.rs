//!
//! Support-function catalog
//! ------------------------
//! The built-in transition, final, combine, serialize, deserialize and inverse
//! functions referenced by aggregate descriptors. Each entry is a
//! `ProcHandle`: a name, a strictness flag and a capability-tagged body. The
//! dispatcher owns strictness handling (NULL skipping, first-input seeding,
//! NULL results from strict finals); bodies only see the rows they must act on.
//!
//! By-value transition states are updated through a candidate copy that is
//! committed only on success. Bodies over `internal` states mutate in place and
//! therefore validate their inputs before touching the state.

pub mod arrays;
pub mod collect;
pub mod decimal;
pub mod minmax;
pub mod numeric;
pub mod ordered;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use once_cell::sync::Lazy;

use crate::datum::{Datum, Decimal, Oid, SortKey};
use crate::error::{AggError, AggResult};

/// Current transition value; `None` means "no state yet", distinct from a
/// SQL NULL state (`Some(Datum::Null)`).
pub type TransValue = Option<Datum>;

pub type TransFn = fn(&mut TransValue, &[Datum]) -> AggResult<()>;
pub type BinaryFn = fn(&Datum, &Datum) -> AggResult<Datum>;
pub type InverseFn = fn(&mut TransValue, &[Datum]) -> AggResult<Inverse>;
pub type FinalFn = fn(&TransValue, &FinalCall<'_>) -> AggResult<Datum>;
pub type OrderedFinalFn = fn(&[Vec<Datum>], &FinalCall<'_>) -> AggResult<Datum>;
pub type CombineFn = fn(&mut TransValue, &TransValue) -> AggResult<()>;
pub type SerialFn = fn(&Datum) -> AggResult<Vec<u8>>;
pub type DeserialFn = fn(&[u8]) -> AggResult<Datum>;

/// Outcome of an inverse transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inverse {
    Applied,
    /// The row cannot be removed exactly; the state was left untouched and the
    /// caller must recompute from the frame.
    Unsafe,
}

/// Extra context handed to final functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalCall<'a> {
    /// Direct arguments of ordered-set aggregates (empty otherwise).
    pub direct_args: &'a [Datum],
    /// Declared argument types, present when the descriptor asks for final
    /// extra arguments.
    pub extra_arg_types: Option<&'a [Oid]>,
    /// Ordering the buffered rows were sorted with.
    pub sort_keys: &'a [SortKey],
}

#[derive(Clone, Copy)]
pub enum ProcBody {
    /// `(state, args) -> state`
    Transition(TransFn),
    /// Strict two-argument function usable both as `(state, arg)` transition
    /// and as `(state, state)` combine, like `int8pl` or `int4larger`.
    Binary(BinaryFn),
    /// Marker for ordered-set aggregates: rows are buffered, not folded.
    OrderedSetTransition,
    Inverse(InverseFn),
    Final(FinalFn),
    OrderedFinal(OrderedFinalFn),
    Combine(CombineFn),
    Serialize(SerialFn),
    Deserialize(DeserialFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Transition,
    OrderedSetTransition,
    Inverse,
    Final,
    OrderedFinal,
    Combine,
    Serialize,
    Deserialize,
}

impl Capability {
    pub fn describe(&self) -> &'static str {
        match self {
            Capability::Transition => "transition function",
            Capability::OrderedSetTransition => "ordered-set transition function",
            Capability::Inverse => "inverse transition function",
            Capability::Final => "final function",
            Capability::OrderedFinal => "ordered-set final function",
            Capability::Combine => "combine function",
            Capability::Serialize => "serialize function",
            Capability::Deserialize => "deserialize function",
        }
    }
}

#[derive(Clone, Copy)]
pub struct ProcHandle {
    pub name: &'static str,
    pub strict: bool,
    pub body: ProcBody,
}

impl Debug for ProcHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcHandle").field("name", &self.name).field("strict", &self.strict).finish()
    }
}

impl PartialEq for ProcHandle {
    fn eq(&self, other: &Self) -> bool { self.name == other.name }
}

impl ProcHandle {
    pub const fn transition(name: &'static str, strict: bool, f: TransFn) -> Self { Self { name, strict, body: ProcBody::Transition(f) } }
    pub const fn binary(name: &'static str, f: BinaryFn) -> Self { Self { name, strict: true, body: ProcBody::Binary(f) } }
    pub const fn ordered_marker(name: &'static str) -> Self { Self { name, strict: false, body: ProcBody::OrderedSetTransition } }
    pub const fn inverse(name: &'static str, strict: bool, f: InverseFn) -> Self { Self { name, strict, body: ProcBody::Inverse(f) } }
    pub const fn final_fn(name: &'static str, strict: bool, f: FinalFn) -> Self { Self { name, strict, body: ProcBody::Final(f) } }
    pub const fn ordered_final(name: &'static str, f: OrderedFinalFn) -> Self { Self { name, strict: false, body: ProcBody::OrderedFinal(f) } }
    pub const fn combine(name: &'static str, strict: bool, f: CombineFn) -> Self { Self { name, strict, body: ProcBody::Combine(f) } }
    pub const fn serialize(name: &'static str, f: SerialFn) -> Self { Self { name, strict: true, body: ProcBody::Serialize(f) } }
    pub const fn deserialize(name: &'static str, f: DeserialFn) -> Self { Self { name, strict: true, body: ProcBody::Deserialize(f) } }

    /// Whether this function may fill a slot requiring `cap`.
    pub fn supports(&self, cap: Capability) -> bool {
        matches!(
            (&self.body, cap),
            (ProcBody::Transition(_), Capability::Transition)
                | (ProcBody::Binary(_), Capability::Transition)
                | (ProcBody::Binary(_), Capability::Combine)
                | (ProcBody::OrderedSetTransition, Capability::OrderedSetTransition)
                | (ProcBody::Inverse(_), Capability::Inverse)
                | (ProcBody::Final(_), Capability::Final)
                | (ProcBody::OrderedFinal(_), Capability::OrderedFinal)
                | (ProcBody::Combine(_), Capability::Combine)
                | (ProcBody::Serialize(_), Capability::Serialize)
                | (ProcBody::Deserialize(_), Capability::Deserialize)
        )
    }
}

/// Name-indexed set of support functions.
pub struct ProcCatalog {
    procs: HashMap<&'static str, ProcHandle>,
}

static BUILTIN: Lazy<ProcCatalog> = Lazy::new(|| {
    let mut procs = HashMap::new();
    for p in numeric::procs().into_iter().chain(decimal::procs()).chain(minmax::procs()).chain(arrays::procs()).chain(collect::procs()).chain(ordered::procs()) {
        procs.insert(p.name, p);
    }
    ProcCatalog { procs }
});

impl ProcCatalog {
    pub fn builtin() -> &'static ProcCatalog { &BUILTIN }

    pub fn resolve(&self, name: &str) -> Option<ProcHandle> { self.procs.get(name).copied() }

    pub fn len(&self) -> usize { self.procs.len() }

    pub fn is_empty(&self) -> bool { self.procs.is_empty() }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ { self.procs.keys().copied() }
}

// ---- shared argument/state helpers for the built-in bodies ----

pub(crate) fn arg<'a>(proc_name: &str, args: &'a [Datum], idx: usize) -> AggResult<&'a Datum> {
    args.get(idx).ok_or_else(|| AggError::bad_state(proc_name, format!("missing argument {}", idx + 1)))
}

pub(crate) fn arg_i64(proc_name: &str, args: &[Datum], idx: usize) -> AggResult<Option<i64>> {
    match arg(proc_name, args, idx)? {
        Datum::Null => Ok(None),
        d => d.as_i64().map(Some).ok_or_else(|| AggError::bad_state(proc_name, format!("expected an integer argument, got {}", d.kind_name()))),
    }
}

pub(crate) fn arg_f64(proc_name: &str, args: &[Datum], idx: usize) -> AggResult<Option<f64>> {
    match arg(proc_name, args, idx)? {
        Datum::Null => Ok(None),
        d => d.as_f64().map(Some).ok_or_else(|| AggError::bad_state(proc_name, format!("expected a numeric argument, got {}", d.kind_name()))),
    }
}

pub(crate) fn arg_numeric(proc_name: &str, args: &[Datum], idx: usize) -> AggResult<Option<Decimal>> {
    match arg(proc_name, args, idx)? {
        Datum::Null => Ok(None),
        d => d.as_numeric().map(Some).ok_or_else(|| AggError::bad_state(proc_name, format!("expected a numeric argument, got {}", d.kind_name()))),
    }
}

pub(crate) fn wrong_state(proc_name: &str, state: &Datum) -> AggError {
    AggError::bad_state(proc_name, format!("unexpected transition state {}", state.kind_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_resolves_names() {
        let cat = ProcCatalog::builtin();
        let p = cat.resolve("int4_sum").expect("int4_sum");
        assert!(!p.strict);
        assert!(p.supports(Capability::Transition));
        assert!(!p.supports(Capability::Final));
        assert!(cat.resolve("no_such_function").is_none());
    }

    #[test]
    fn binary_functions_fill_transition_and_combine_slots() {
        let p = ProcCatalog::builtin().resolve("int8pl").expect("int8pl");
        assert!(p.strict);
        assert!(p.supports(Capability::Transition));
        assert!(p.supports(Capability::Combine));
        assert!(!p.supports(Capability::Serialize));
    }

    #[test]
    fn every_builtin_name_is_unique() {
        let all: Vec<ProcHandle> = numeric::procs().into_iter().chain(decimal::procs()).chain(minmax::procs()).chain(arrays::procs()).chain(collect::procs()).chain(ordered::procs()).collect();
        assert_eq!(all.len(), ProcCatalog::builtin().len());
    }
}
