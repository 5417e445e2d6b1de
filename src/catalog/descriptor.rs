//! Resolved, validated pg_aggregate descriptors.

use crate::catalog::seed::SeedRow;
use crate::catalog::signature::AggSignature;
use crate::catalog::sortop;
use crate::datum::{parse_literal, type_oid, Datum, Oid, SortKey};
use crate::error::{AggError, AggResult};
use crate::procs::{Capability, ProcCatalog, ProcHandle, TransValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Normal,
    OrderedSet,
    HypotheticalSet,
}

impl AggKind {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'n' => Some(AggKind::Normal),
            'o' => Some(AggKind::OrderedSet),
            'h' => Some(AggKind::HypotheticalSet),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            AggKind::Normal => 'n',
            AggKind::OrderedSet => 'o',
            AggKind::HypotheticalSet => 'h',
        }
    }

    pub fn is_ordered_set(&self) -> bool { !matches!(self, AggKind::Normal) }
}

#[derive(Debug, Clone)]
pub struct AggregateDescriptor {
    pub aggfnoid: Oid,
    pub kind: AggKind,
    pub num_direct_args: u16,
    pub transfn: ProcHandle,
    pub finalfn: Option<ProcHandle>,
    pub combinefn: Option<ProcHandle>,
    pub serialfn: Option<ProcHandle>,
    pub deserialfn: Option<ProcHandle>,
    pub mtransfn: Option<ProcHandle>,
    pub minvtransfn: Option<ProcHandle>,
    pub mfinalfn: Option<ProcHandle>,
    pub final_extra: bool,
    pub moving_final_extra: bool,
    pub sortop: Option<Oid>,
    pub transtype: Oid,
    pub transspace: i32,
    pub mtranstype: Option<Oid>,
    pub mtransspace: i32,
    pub initval: Option<Datum>,
    pub minitval: Option<Datum>,
    pub initval_text: Option<String>,
    pub minitval_text: Option<String>,
    pub signature: AggSignature,
}

impl AggregateDescriptor {
    /// Resolve a seed row's function names against `procs` and parse its
    /// initial values. Unknown functions and unparsable literals are reported
    /// together; structural rules are left to `validate`.
    pub fn resolve(row: &SeedRow, signature: AggSignature, procs: &ProcCatalog) -> AggResult<Self> {
        let mut violations = Vec::new();
        let kind = AggKind::from_char(row.kind);
        if kind.is_none() {
            violations.push(format!("unknown aggregate kind '{}'", row.kind));
        }
        let mut lookup = |slot: &str, name: &Option<String>| -> Option<ProcHandle> {
            let name = name.as_deref()?;
            let found = procs.resolve(name);
            if found.is_none() {
                violations.push(format!("{} {} does not exist", slot, name));
            }
            found
        };
        let transfn = lookup("transition function", &row.transfn);
        let finalfn = lookup("final function", &row.finalfn);
        let combinefn = lookup("combine function", &row.combinefn);
        let serialfn = lookup("serialize function", &row.serialfn);
        let deserialfn = lookup("deserialize function", &row.deserialfn);
        let mtransfn = lookup("moving transition function", &row.mtransfn);
        let minvtransfn = lookup("moving inverse transition function", &row.minvtransfn);
        let mfinalfn = lookup("moving final function", &row.mfinalfn);
        if row.transfn.is_none() {
            violations.push("transition function is required".to_string());
        }

        let mut literal = |what: &str, text: &Option<String>, typ: Oid| -> Option<Datum> {
            let text = text.as_deref()?;
            match parse_literal(text, typ) {
                Ok(d) => Some(d),
                Err(e) => {
                    violations.push(format!("{}: {}", what, e));
                    None
                }
            }
        };
        let initval = literal("initial value", &row.initval, row.transtype);
        let minitval = match row.mtranstype {
            Some(mt) => literal("moving initial value", &row.minitval, mt),
            None => {
                if row.minitval.is_some() {
                    violations.push("moving initial value requires a moving transition type".to_string());
                }
                None
            }
        };

        match (kind, transfn, violations.is_empty()) {
            (Some(kind), Some(transfn), true) => Ok(Self {
                aggfnoid: row.aggfnoid,
                kind,
                num_direct_args: row.num_direct_args,
                transfn,
                finalfn,
                combinefn,
                serialfn,
                deserialfn,
                mtransfn,
                minvtransfn,
                mfinalfn,
                final_extra: row.final_extra,
                moving_final_extra: row.moving_final_extra,
                sortop: row.sortop,
                transtype: row.transtype,
                transspace: row.transspace,
                mtranstype: row.mtranstype,
                mtransspace: row.mtransspace,
                initval,
                minitval,
                initval_text: row.initval.clone(),
                minitval_text: row.minitval.clone(),
                signature,
            }),
            _ => Err(AggError::InvalidDescriptor { aggfnoid: row.aggfnoid, violations }),
        }
    }

    /// Check every structural rule, reporting all violations at once.
    pub fn validate(&self) -> AggResult<()> {
        let mut v: Vec<String> = Vec::new();
        let ndirect = self.num_direct_args as usize;
        let sig = &self.signature;

        match self.kind {
            AggKind::Normal if ndirect != 0 => v.push("normal aggregates cannot have direct arguments".into()),
            AggKind::OrderedSet | AggKind::HypotheticalSet if ndirect == 0 => {
                v.push("ordered-set aggregates need at least one direct argument".into())
            }
            _ => {}
        }
        if sig.direct_arg_types.len() != ndirect {
            v.push(format!("signature declares {} direct arguments, descriptor {}", sig.direct_arg_types.len(), ndirect));
        }
        if self.kind == AggKind::HypotheticalSet {
            let n = sig.arg_types.len();
            let trailing = sig.direct_arg_types.len().checked_sub(n).map(|start| &sig.direct_arg_types[start..]);
            if trailing != Some(sig.arg_types.as_slice()) {
                v.push("hypothetical-set direct arguments must end with the aggregated argument types".into());
            }
        }

        // moving-aggregate support
        if self.mtransfn.is_some() && self.mtranstype.is_none() {
            v.push("moving transition function requires a moving transition type".into());
        }
        if self.mtransfn.is_none() && self.mtranstype.is_some() {
            v.push("moving transition type requires a moving transition function".into());
        }
        if self.mtransfn.is_some() != self.minvtransfn.is_some() {
            v.push("moving transition and inverse transition functions must be declared together".into());
        }
        if self.mtransfn.is_none() && (self.mfinalfn.is_some() || self.moving_final_extra) {
            v.push("moving final function requires a moving transition function".into());
        }

        // partial aggregation
        if self.serialfn.is_some() != self.deserialfn.is_some() {
            v.push("serialize and deserialize functions must be declared together".into());
        }
        if self.serialfn.is_some() {
            if self.transtype != type_oid::INTERNAL {
                v.push("serialize functions are only allowed for transition type internal".into());
            }
            if self.combinefn.is_none() {
                v.push("serialize functions require a combine function".into());
            }
        }

        // final extra arguments
        if self.final_extra && !self.finalfn.map(|f| !f.strict).unwrap_or(false) {
            v.push("final extra arguments need a non-strict final function".into());
        }
        if self.moving_final_extra && !self.mfinalfn.map(|f| !f.strict).unwrap_or(false) {
            v.push("moving final extra arguments need a non-strict moving final function".into());
        }

        // a strict transition with no initial value seeds from the first input,
        // which can never be of type internal
        if self.transfn.strict && self.initval.is_none() && self.transtype == type_oid::INTERNAL {
            v.push("strict transition function with no initial value cannot use transition type internal".into());
        }
        if let (Some(m), Some(mt)) = (self.mtransfn, self.mtranstype) {
            if m.strict && self.minitval.is_none() && mt == type_oid::INTERNAL {
                v.push("strict moving transition function with no initial value cannot use transition type internal".into());
            }
        }

        if self.kind.is_ordered_set() {
            self.check_slot(&mut v, "transition", Some(&self.transfn), Capability::OrderedSetTransition);
            match self.finalfn {
                Some(f) => self.check_slot(&mut v, "final", Some(&f), Capability::OrderedFinal),
                None => v.push("ordered-set aggregates need a final function".into()),
            }
            if self.combinefn.is_some() || self.serialfn.is_some() || self.deserialfn.is_some() {
                v.push("ordered-set aggregates cannot be combined or serialized".into());
            }
            if self.mtransfn.is_some() || self.minvtransfn.is_some() || self.mfinalfn.is_some() {
                v.push("ordered-set aggregates cannot have moving-aggregate support".into());
            }
        } else {
            self.check_slot(&mut v, "transition", Some(&self.transfn), Capability::Transition);
            self.check_slot(&mut v, "final", self.finalfn.as_ref(), Capability::Final);
        }
        self.check_slot(&mut v, "combine", self.combinefn.as_ref(), Capability::Combine);
        self.check_slot(&mut v, "serialize", self.serialfn.as_ref(), Capability::Serialize);
        self.check_slot(&mut v, "deserialize", self.deserialfn.as_ref(), Capability::Deserialize);
        self.check_slot(&mut v, "moving transition", self.mtransfn.as_ref(), Capability::Transition);
        self.check_slot(&mut v, "moving inverse transition", self.minvtransfn.as_ref(), Capability::Inverse);
        self.check_slot(&mut v, "moving final", self.mfinalfn.as_ref(), Capability::Final);

        if let Some(op) = self.sortop {
            if sortop::lookup(op).is_none() {
                v.push(format!("sort operator {} is not a known ordering operator", op));
            }
        }

        if v.is_empty() {
            Ok(())
        } else {
            Err(AggError::InvalidDescriptor { aggfnoid: self.aggfnoid, violations: v })
        }
    }

    fn check_slot(&self, v: &mut Vec<String>, slot: &str, proc: Option<&ProcHandle>, cap: Capability) {
        if let Some(p) = proc {
            if !p.supports(cap) {
                v.push(format!("{} slot holds {}, which is not a {}", slot, p.name, cap.describe()));
            }
        }
    }

    pub fn name(&self) -> &str { &self.signature.name }

    pub fn is_ordered_set(&self) -> bool { self.kind.is_ordered_set() }

    pub fn has_moving(&self) -> bool { self.mtransfn.is_some() }

    pub fn can_combine(&self) -> bool { self.combinefn.is_some() }

    /// Fresh transition value: a copy of the initial value, or "no state yet".
    pub fn initial_state(&self) -> TransValue { self.initval.clone() }

    pub fn moving_initial_state(&self) -> TransValue { self.minitval.clone() }

    /// Types handed to final functions that take extra arguments.
    pub fn final_extra_types(&self) -> Vec<Oid> { self.signature.all_arg_types() }

    /// Ordering of buffered rows: the sort operator's direction for every
    /// aggregated column, ascending otherwise.
    pub fn default_sort_keys(&self) -> Vec<SortKey> {
        let key = self.sortop.and_then(sortop::lookup).map(|op| op.sort_key()).unwrap_or_default();
        vec![key; self.signature.arg_types.len().max(1)]
    }
}
