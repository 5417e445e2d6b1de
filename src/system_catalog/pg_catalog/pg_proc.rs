use polars::prelude::{DataFrame, NamedFrom, Series};

use crate::catalog::AggRegistry;
use crate::system_catalog::registry;
use crate::system_catalog::registry::{ColType, ColumnDef, SystemTable};

/// pg_proc rows for the registered aggregates (prokind `a`).
pub struct PgProc;

const COLS: &[ColumnDef] = &[
    ColumnDef { name: "oid", coltype: ColType::Integer },
    ColumnDef { name: "proname", coltype: ColType::Text },
    ColumnDef { name: "pronamespace", coltype: ColType::Integer },
    ColumnDef { name: "prokind", coltype: ColType::Text },
    ColumnDef { name: "proisstrict", coltype: ColType::Boolean },
    ColumnDef { name: "pronargs", coltype: ColType::Integer },
    ColumnDef { name: "prorettype", coltype: ColType::Integer },
    ColumnDef { name: "proargtypes", coltype: ColType::Text },
];

// pg_catalog namespace oid
const PG_CATALOG_NAMESPACE: i32 = 11;

impl SystemTable for PgProc {
    fn schema(&self) -> &'static str { "pg_catalog" }
    fn name(&self) -> &'static str { "pg_proc" }
    fn columns(&self) -> &'static [ColumnDef] { COLS }
    fn build(&self, aggs: &AggRegistry) -> Option<DataFrame> {
        let descs: Vec<_> = aggs.iter().collect();
        let oids: Vec<i32> = descs.iter().map(|d| d.aggfnoid as i32).collect();
        let names: Vec<String> = descs.iter().map(|d| d.signature.name.clone()).collect();
        let namespaces: Vec<i32> = vec![PG_CATALOG_NAMESPACE; descs.len()];
        let kinds: Vec<String> = vec!["a".to_string(); descs.len()];
        // strictness belongs to the support functions, not the aggregate
        let strict: Vec<bool> = vec![false; descs.len()];
        let nargs: Vec<i32> = descs.iter().map(|d| d.signature.all_arg_types().len() as i32).collect();
        let rettype: Vec<i32> = descs.iter().map(|d| d.signature.result_type as i32).collect();
        // oidvector text form: space separated
        let argtypes: Vec<String> = descs
            .iter()
            .map(|d| d.signature.all_arg_types().iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" "))
            .collect();

        DataFrame::new(vec![
            Series::new("oid".into(), oids).into(),
            Series::new("proname".into(), names).into(),
            Series::new("pronamespace".into(), namespaces).into(),
            Series::new("prokind".into(), kinds).into(),
            Series::new("proisstrict".into(), strict).into(),
            Series::new("pronargs".into(), nargs).into(),
            Series::new("prorettype".into(), rettype).into(),
            Series::new("proargtypes".into(), argtypes).into(),
        ])
        .ok()
    }
}

pub fn register() { registry::register(Box::new(PgProc)); }
