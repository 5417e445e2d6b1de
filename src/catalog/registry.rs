//!
//! Aggregate descriptor registry
//! -----------------------------
//! Immutable map from aggfnoid to validated descriptors, populated once from
//! the built-in seed table plus an optional extra seed file. The process-wide
//! instance is created by `init_global` and read through `global`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::descriptor::AggregateDescriptor;
use crate::catalog::seed::{parse_row, seed_lines, SeedRow, BUILTIN_SEED};
use crate::catalog::signature::{builtin_signature, AggSignature};
use crate::config::EngineConfig;
use crate::datum::{type_oid, Oid};
use crate::error::{AggError, AggResult};
use crate::procs::ProcCatalog;

/// One entry of an extra seed file: a seed row plus the signature it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraSeedEntry {
    pub row: String,
    pub signature: AggSignature,
}

#[derive(Debug, Default)]
pub struct AggRegistry {
    by_oid: HashMap<Oid, Arc<AggregateDescriptor>>,
    by_name: HashMap<String, Vec<Oid>>,
    order: Vec<Oid>,
}

impl AggRegistry {
    /// Registry over the built-in seed table only.
    pub fn builtin() -> AggResult<Self> {
        RegistryBuilder::new().seed_text(BUILTIN_SEED)?.build()
    }

    /// Built-in rows plus the configured extra seed file.
    pub fn load(cfg: &EngineConfig) -> AggResult<Self> {
        let mut builder = RegistryBuilder::new().strict(cfg.strict_seed).seed_text(BUILTIN_SEED)?;
        if let Some(path) = &cfg.extra_seed_path {
            builder = builder.extra_seed_file(path)?;
        }
        builder.build()
    }

    pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }

    pub fn lookup(&self, aggfnoid: Oid) -> AggResult<Arc<AggregateDescriptor>> {
        self.by_oid.get(&aggfnoid).cloned().ok_or(AggError::NotFound { aggfnoid })
    }

    /// Resolve `name(arg_types)`: an exact signature match wins over a
    /// polymorphic one.
    pub fn lookup_by_name(&self, name: &str, arg_types: &[Oid]) -> AggResult<Arc<AggregateDescriptor>> {
        let candidates: Vec<&Arc<AggregateDescriptor>> = self
            .by_name
            .get(name)
            .map(|oids| oids.iter().filter_map(|oid| self.by_oid.get(oid)).collect())
            .unwrap_or_default();
        candidates
            .iter()
            .find(|d| d.signature.exact(arg_types))
            .or_else(|| candidates.iter().find(|d| d.signature.accepts(arg_types)))
            .map(|d| Arc::clone(d))
            .ok_or_else(|| {
                let types: Vec<&str> = arg_types.iter().map(|t| type_oid::name(*t)).collect();
                AggError::NotFoundByName { name: format!("{}({})", name, types.join(", ")) }
            })
    }

    /// Descriptors in seed order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AggregateDescriptor>> + '_ {
        self.order.iter().filter_map(|oid| self.by_oid.get(oid))
    }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    pub fn contains(&self, aggfnoid: Oid) -> bool { self.by_oid.contains_key(&aggfnoid) }
}

/// Collects seed rows, then resolves and validates them in one pass.
pub struct RegistryBuilder {
    strict: bool,
    procs: &'static ProcCatalog,
    entries: Vec<(SeedRow, AggSignature)>,
}

impl Default for RegistryBuilder {
    fn default() -> Self { Self::new() }
}

impl RegistryBuilder {
    pub fn new() -> Self { Self { strict: true, procs: ProcCatalog::builtin(), entries: Vec::new() } }

    /// In strict mode the first bad row aborts loading; otherwise bad rows are
    /// skipped with a warning.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn reject(&self, err: AggError) -> AggResult<()> {
        if self.strict {
            return Err(err);
        }
        warn!(target: "pgagg::registry", "skipping seed row: {}", err);
        Ok(())
    }

    /// Seed rows whose signatures are built in.
    pub fn seed_text(mut self, text: &str) -> AggResult<Self> {
        for (line_no, line) in seed_lines(text) {
            let row = match parse_row(line_no, line) {
                Ok(row) => row,
                Err(e) => {
                    self.reject(e)?;
                    continue;
                }
            };
            match builtin_signature(row.aggfnoid) {
                Some(sig) => self.entries.push((row, sig)),
                None => self.reject(AggError::seed(line_no, format!("no signature for aggregate {}", row.aggfnoid)))?,
            }
        }
        Ok(self)
    }

    pub fn row(mut self, row: SeedRow, signature: AggSignature) -> Self {
        self.entries.push((row, signature));
        self
    }

    /// Entries of a JSON extra seed file.
    pub fn extra_seed_file(self, path: &Path) -> AggResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| AggError::seed(0, format!("cannot read {}: {}", path.display(), e)))?;
        let entries: Vec<ExtraSeedEntry> =
            serde_json::from_slice(&bytes).map_err(|e| AggError::seed(0, format!("{}: {}", path.display(), e)))?;
        debug!(target: "pgagg::registry", "extra seed file {} holds {} entries", path.display(), entries.len());
        self.extra_entries(entries)
    }

    pub fn extra_entries(mut self, entries: Vec<ExtraSeedEntry>) -> AggResult<Self> {
        for (idx, entry) in entries.into_iter().enumerate() {
            match parse_row(idx + 1, &entry.row) {
                Ok(row) => self.entries.push((row, entry.signature)),
                Err(e) => self.reject(e)?,
            }
        }
        Ok(self)
    }

    pub fn build(self) -> AggResult<AggRegistry> {
        let mut reg = AggRegistry::default();
        for (row, signature) in &self.entries {
            let desc = match AggregateDescriptor::resolve(row, signature.clone(), self.procs).and_then(|d| d.validate().map(|_| d)) {
                Ok(d) => d,
                Err(e) => {
                    self.reject(e)?;
                    continue;
                }
            };
            if reg.by_oid.contains_key(&desc.aggfnoid) {
                self.reject(AggError::invalid(desc.aggfnoid, "duplicate aggfnoid"))?;
                continue;
            }
            if desc.combinefn.is_some() && desc.serialfn.is_none() && desc.transtype == type_oid::INTERNAL {
                info!(
                    target: "pgagg::registry",
                    "aggregate {} ({}) combines internal states in-process only",
                    desc.aggfnoid,
                    desc.signature.display()
                );
            }
            reg.by_name.entry(desc.signature.name.clone()).or_default().push(desc.aggfnoid);
            reg.order.push(desc.aggfnoid);
            reg.by_oid.insert(desc.aggfnoid, Arc::new(desc));
        }
        debug!(target: "pgagg::registry", "registry loaded {} aggregates", reg.order.len());
        Ok(reg)
    }
}

static GLOBAL: OnceCell<Arc<AggRegistry>> = OnceCell::new();

/// Load the process-wide registry. Later calls return the first instance.
pub fn init_global(cfg: &EngineConfig) -> AggResult<Arc<AggRegistry>> {
    GLOBAL.get_or_try_init(|| AggRegistry::load(cfg).map(Arc::new)).cloned()
}

/// The process-wide registry, loaded from the built-in seed on first use.
pub fn global() -> AggResult<Arc<AggRegistry>> {
    GLOBAL.get_or_try_init(|| AggRegistry::builtin().map(Arc::new)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_loads_every_row() {
        let reg = AggRegistry::builtin().expect("builtin registry");
        assert_eq!(reg.len(), crate::catalog::seed::parse_seed(BUILTIN_SEED).unwrap().len());
        assert_eq!(reg.lookup(2108).unwrap().name(), "sum");
        assert_eq!(reg.lookup(999_999).unwrap_err(), AggError::NotFound { aggfnoid: 999_999 });
    }

    #[test]
    fn lookup_by_name_prefers_exact_match() {
        let reg = AggRegistry::builtin().unwrap();
        assert_eq!(reg.lookup_by_name("sum", &[type_oid::INT4]).unwrap().aggfnoid, 2108);
        assert_eq!(reg.lookup_by_name("count", &[type_oid::TEXT]).unwrap().aggfnoid, 2147);
        assert_eq!(reg.lookup_by_name("count", &[]).unwrap().aggfnoid, 2803);
        let err = reg.lookup_by_name("sum", &[type_oid::TEXT]).unwrap_err();
        assert_eq!(err.to_string(), "aggregate sum(text) does not exist");
    }

    #[test]
    fn lenient_mode_skips_bad_rows() {
        let text = "2108 n 0 int4_sum - int8pl - - - - - f f 0 20 0 0 0 _null_ _null_\n\
                    2116 n 0 no_such_fn - - - - - - - f f 521 23 0 0 0 _null_ _null_\n\
                    1 n 0 int4_sum - - - - - - - f f 0 20 0 0 0 _null_ _null_";
        let reg = RegistryBuilder::new().strict(false).seed_text(text).unwrap().build().unwrap();
        assert_eq!(reg.len(), 1);

        let strict = RegistryBuilder::new().seed_text(text);
        assert!(matches!(strict, Err(AggError::Seed { line: 3, .. })));
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let row = "2108 n 0 int4_sum - int8pl - - - - - f f 0 20 0 0 0 _null_ _null_";
        let err = RegistryBuilder::new().seed_text(&format!("{row}\n{row}")).unwrap().build().unwrap_err();
        assert_eq!(err, AggError::invalid(2108, "duplicate aggfnoid"));
    }

    #[test]
    fn global_registry_is_shared() {
        let a = global().unwrap();
        let b = global().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
