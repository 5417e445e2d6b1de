// pg_catalog.pg_aggregate over the loaded aggregate registry.
// One row per descriptor; support functions are shown by name, `-` when absent,
// matching how seed rows are written.

use polars::prelude::{DataFrame, NamedFrom, Series};

use crate::catalog::AggRegistry;
use crate::procs::ProcHandle;
use crate::system_catalog::registry;
use crate::system_catalog::registry::{ColType, ColumnDef, SystemTable};

pub struct PgAggregate;

const COLS: &[ColumnDef] = &[
    ColumnDef { name: "aggfnoid", coltype: ColType::Integer },
    ColumnDef { name: "aggkind", coltype: ColType::Text },
    ColumnDef { name: "aggnumdirectargs", coltype: ColType::Integer },
    ColumnDef { name: "aggtransfn", coltype: ColType::Text },
    ColumnDef { name: "aggfinalfn", coltype: ColType::Text },
    ColumnDef { name: "aggcombinefn", coltype: ColType::Text },
    ColumnDef { name: "aggserialfn", coltype: ColType::Text },
    ColumnDef { name: "aggdeserialfn", coltype: ColType::Text },
    ColumnDef { name: "aggmtransfn", coltype: ColType::Text },
    ColumnDef { name: "aggminvtransfn", coltype: ColType::Text },
    ColumnDef { name: "aggmfinalfn", coltype: ColType::Text },
    ColumnDef { name: "aggfinalextra", coltype: ColType::Boolean },
    ColumnDef { name: "aggmfinalextra", coltype: ColType::Boolean },
    ColumnDef { name: "aggsortop", coltype: ColType::Integer },
    ColumnDef { name: "aggtranstype", coltype: ColType::Integer },
    ColumnDef { name: "aggtransspace", coltype: ColType::Integer },
    ColumnDef { name: "aggmtranstype", coltype: ColType::Integer },
    ColumnDef { name: "aggmtransspace", coltype: ColType::Integer },
    ColumnDef { name: "agginitval", coltype: ColType::Text },
    ColumnDef { name: "aggminitval", coltype: ColType::Text },
];

fn fn_name(p: &Option<ProcHandle>) -> String { p.map(|p| p.name).unwrap_or("-").to_string() }

impl SystemTable for PgAggregate {
    fn schema(&self) -> &'static str { "pg_catalog" }
    fn name(&self) -> &'static str { "pg_aggregate" }
    fn columns(&self) -> &'static [ColumnDef] { COLS }
    fn build(&self, aggs: &AggRegistry) -> Option<DataFrame> {
        let descs: Vec<_> = aggs.iter().collect();
        let aggfnoid: Vec<i32> = descs.iter().map(|d| d.aggfnoid as i32).collect();
        let aggkind: Vec<String> = descs.iter().map(|d| d.kind.as_char().to_string()).collect();
        let ndirect: Vec<i32> = descs.iter().map(|d| d.num_direct_args as i32).collect();
        let transfn: Vec<String> = descs.iter().map(|d| d.transfn.name.to_string()).collect();
        let finalfn: Vec<String> = descs.iter().map(|d| fn_name(&d.finalfn)).collect();
        let combinefn: Vec<String> = descs.iter().map(|d| fn_name(&d.combinefn)).collect();
        let serialfn: Vec<String> = descs.iter().map(|d| fn_name(&d.serialfn)).collect();
        let deserialfn: Vec<String> = descs.iter().map(|d| fn_name(&d.deserialfn)).collect();
        let mtransfn: Vec<String> = descs.iter().map(|d| fn_name(&d.mtransfn)).collect();
        let minvtransfn: Vec<String> = descs.iter().map(|d| fn_name(&d.minvtransfn)).collect();
        let mfinalfn: Vec<String> = descs.iter().map(|d| fn_name(&d.mfinalfn)).collect();
        let finalextra: Vec<bool> = descs.iter().map(|d| d.final_extra).collect();
        let mfinalextra: Vec<bool> = descs.iter().map(|d| d.moving_final_extra).collect();
        // 0 = no sort operator / no moving state type
        let sortop: Vec<i32> = descs.iter().map(|d| d.sortop.unwrap_or(0) as i32).collect();
        let transtype: Vec<i32> = descs.iter().map(|d| d.transtype as i32).collect();
        let transspace: Vec<i32> = descs.iter().map(|d| d.transspace).collect();
        let mtranstype: Vec<i32> = descs.iter().map(|d| d.mtranstype.unwrap_or(0) as i32).collect();
        let mtransspace: Vec<i32> = descs.iter().map(|d| d.mtransspace).collect();
        let initval: Vec<Option<String>> = descs.iter().map(|d| d.initval_text.clone()).collect();
        let minitval: Vec<Option<String>> = descs.iter().map(|d| d.minitval_text.clone()).collect();

        DataFrame::new(vec![
            Series::new("aggfnoid".into(), aggfnoid).into(),
            Series::new("aggkind".into(), aggkind).into(),
            Series::new("aggnumdirectargs".into(), ndirect).into(),
            Series::new("aggtransfn".into(), transfn).into(),
            Series::new("aggfinalfn".into(), finalfn).into(),
            Series::new("aggcombinefn".into(), combinefn).into(),
            Series::new("aggserialfn".into(), serialfn).into(),
            Series::new("aggdeserialfn".into(), deserialfn).into(),
            Series::new("aggmtransfn".into(), mtransfn).into(),
            Series::new("aggminvtransfn".into(), minvtransfn).into(),
            Series::new("aggmfinalfn".into(), mfinalfn).into(),
            Series::new("aggfinalextra".into(), finalextra).into(),
            Series::new("aggmfinalextra".into(), mfinalextra).into(),
            Series::new("aggsortop".into(), sortop).into(),
            Series::new("aggtranstype".into(), transtype).into(),
            Series::new("aggtransspace".into(), transspace).into(),
            Series::new("aggmtranstype".into(), mtranstype).into(),
            Series::new("aggmtransspace".into(), mtransspace).into(),
            Series::new("agginitval".into(), initval).into(),
            Series::new("aggminitval".into(), minitval).into(),
        ])
        .ok()
    }
}

pub fn register() { registry::register(Box::new(PgAggregate)); }
