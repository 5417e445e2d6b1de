//! pg_proc facts an aggregate needs besides its pg_aggregate row: SQL name,
//! argument types and result type.

use serde::{Deserialize, Serialize};

use crate::datum::type_oid::*;
use crate::datum::{type_oid, Oid};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggSignature {
    pub name: String,
    #[serde(default)]
    pub direct_arg_types: Vec<Oid>,
    #[serde(default)]
    pub arg_types: Vec<Oid>,
    pub result_type: Oid,
}

impl AggSignature {
    pub fn new(name: &str, direct_arg_types: &[Oid], arg_types: &[Oid], result_type: Oid) -> Self {
        Self { name: name.to_string(), direct_arg_types: direct_arg_types.to_vec(), arg_types: arg_types.to_vec(), result_type }
    }

    /// Direct arguments followed by aggregated arguments.
    pub fn all_arg_types(&self) -> Vec<Oid> {
        self.direct_arg_types.iter().chain(self.arg_types.iter()).copied().collect()
    }

    /// Whether a call with aggregated argument types `args` matches; polymorphic
    /// parameters accept anything.
    pub fn accepts(&self, args: &[Oid]) -> bool {
        self.arg_types.len() == args.len()
            && self.arg_types.iter().zip(args).all(|(want, got)| want == got || type_oid::is_polymorphic(*want))
    }

    pub fn exact(&self, args: &[Oid]) -> bool { self.arg_types == args }

    /// `name(type, ...)` as shown in the catalog views.
    pub fn display(&self) -> String {
        let args: Vec<&str> = self.arg_types.iter().map(|t| type_oid::name(*t)).collect();
        if self.direct_arg_types.is_empty() {
            format!("{}({})", self.name, if args.is_empty() { "*".to_string() } else { args.join(", ") })
        } else {
            let direct: Vec<&str> = self.direct_arg_types.iter().map(|t| type_oid::name(*t)).collect();
            format!("{}({}) WITHIN GROUP (ORDER BY {})", self.name, direct.join(", "), args.join(", "))
        }
    }
}

type Row = (Oid, &'static str, &'static [Oid], &'static [Oid], Oid);

const BUILTIN: &[Row] = &[
    (2100, "avg", &[], &[INT8], FLOAT8),
    (2101, "avg", &[], &[INT4], FLOAT8),
    (2102, "avg", &[], &[INT2], FLOAT8),
    (2103, "avg", &[], &[NUMERIC], NUMERIC),
    (2104, "avg", &[], &[FLOAT4], FLOAT8),
    (2105, "avg", &[], &[FLOAT8], FLOAT8),
    (2107, "sum", &[], &[INT8], NUMERIC),
    (2108, "sum", &[], &[INT4], INT8),
    (2109, "sum", &[], &[INT2], INT8),
    (2110, "sum", &[], &[FLOAT4], FLOAT4),
    (2111, "sum", &[], &[FLOAT8], FLOAT8),
    (2114, "sum", &[], &[NUMERIC], NUMERIC),
    (2115, "max", &[], &[INT8], INT8),
    (2116, "max", &[], &[INT4], INT4),
    (2117, "max", &[], &[INT2], INT2),
    (2118, "max", &[], &[OID], OID),
    (2119, "max", &[], &[FLOAT4], FLOAT4),
    (2120, "max", &[], &[FLOAT8], FLOAT8),
    (2129, "max", &[], &[TEXT], TEXT),
    (2130, "max", &[], &[NUMERIC], NUMERIC),
    (2131, "min", &[], &[INT8], INT8),
    (2132, "min", &[], &[INT4], INT4),
    (2133, "min", &[], &[INT2], INT2),
    (2134, "min", &[], &[OID], OID),
    (2135, "min", &[], &[FLOAT4], FLOAT4),
    (2136, "min", &[], &[FLOAT8], FLOAT8),
    (2145, "min", &[], &[TEXT], TEXT),
    (2146, "min", &[], &[NUMERIC], NUMERIC),
    (2147, "count", &[], &[ANY], INT8),
    (2803, "count", &[], &[], INT8),
    (2718, "var_pop", &[], &[INT8], FLOAT8),
    (2719, "var_pop", &[], &[INT4], FLOAT8),
    (2720, "var_pop", &[], &[INT2], FLOAT8),
    (2721, "var_pop", &[], &[FLOAT4], FLOAT8),
    (2722, "var_pop", &[], &[FLOAT8], FLOAT8),
    (2723, "var_pop", &[], &[NUMERIC], NUMERIC),
    (2641, "var_samp", &[], &[INT8], FLOAT8),
    (2642, "var_samp", &[], &[INT4], FLOAT8),
    (2643, "var_samp", &[], &[INT2], FLOAT8),
    (2644, "var_samp", &[], &[FLOAT4], FLOAT8),
    (2645, "var_samp", &[], &[FLOAT8], FLOAT8),
    (2646, "var_samp", &[], &[NUMERIC], NUMERIC),
    (2148, "variance", &[], &[INT8], FLOAT8),
    (2149, "variance", &[], &[INT4], FLOAT8),
    (2150, "variance", &[], &[INT2], FLOAT8),
    (2151, "variance", &[], &[FLOAT4], FLOAT8),
    (2152, "variance", &[], &[FLOAT8], FLOAT8),
    (2153, "variance", &[], &[NUMERIC], NUMERIC),
    (2724, "stddev_pop", &[], &[INT8], FLOAT8),
    (2725, "stddev_pop", &[], &[INT4], FLOAT8),
    (2726, "stddev_pop", &[], &[INT2], FLOAT8),
    (2727, "stddev_pop", &[], &[FLOAT4], FLOAT8),
    (2728, "stddev_pop", &[], &[FLOAT8], FLOAT8),
    (2729, "stddev_pop", &[], &[NUMERIC], NUMERIC),
    (2712, "stddev_samp", &[], &[INT8], FLOAT8),
    (2713, "stddev_samp", &[], &[INT4], FLOAT8),
    (2714, "stddev_samp", &[], &[INT2], FLOAT8),
    (2715, "stddev_samp", &[], &[FLOAT4], FLOAT8),
    (2716, "stddev_samp", &[], &[FLOAT8], FLOAT8),
    (2717, "stddev_samp", &[], &[NUMERIC], NUMERIC),
    (2154, "stddev", &[], &[INT8], FLOAT8),
    (2155, "stddev", &[], &[INT4], FLOAT8),
    (2156, "stddev", &[], &[INT2], FLOAT8),
    (2157, "stddev", &[], &[FLOAT4], FLOAT8),
    (2158, "stddev", &[], &[FLOAT8], FLOAT8),
    (2159, "stddev", &[], &[NUMERIC], NUMERIC),
    (2818, "regr_count", &[], &[FLOAT8, FLOAT8], INT8),
    (2819, "regr_sxx", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2820, "regr_syy", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2821, "regr_sxy", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2822, "regr_avgx", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2823, "regr_avgy", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2824, "regr_r2", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2825, "regr_slope", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2826, "regr_intercept", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2827, "covar_pop", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2828, "covar_samp", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2829, "corr", &[], &[FLOAT8, FLOAT8], FLOAT8),
    (2517, "bool_and", &[], &[BOOL], BOOL),
    (2518, "bool_or", &[], &[BOOL], BOOL),
    (2519, "every", &[], &[BOOL], BOOL),
    (2236, "bit_and", &[], &[INT2], INT2),
    (2237, "bit_or", &[], &[INT2], INT2),
    (2238, "bit_and", &[], &[INT4], INT4),
    (2239, "bit_or", &[], &[INT4], INT4),
    (2240, "bit_and", &[], &[INT8], INT8),
    (2241, "bit_or", &[], &[INT8], INT8),
    (2242, "bit_and", &[], &[BIT], BIT),
    (2243, "bit_or", &[], &[BIT], BIT),
    (6013, "array_sum", &[], &[INT4_ARRAY], INT4_ARRAY),
    (6216, "sum", &[], &[INT2_ARRAY], INT8_ARRAY),
    (6217, "sum", &[], &[INT4_ARRAY], INT8_ARRAY),
    (6218, "sum", &[], &[INT8_ARRAY], INT8_ARRAY),
    (6219, "sum", &[], &[FLOAT8_ARRAY], FLOAT8_ARRAY),
    (6226, "pivot_sum", &[], &[TEXT_ARRAY, TEXT, INT4], INT4_ARRAY),
    (6228, "pivot_sum", &[], &[TEXT_ARRAY, TEXT, INT8], INT8_ARRAY),
    (6230, "pivot_sum", &[], &[TEXT_ARRAY, TEXT, FLOAT8], FLOAT8_ARRAY),
    (2335, "array_agg", &[], &[ANYELEMENT], ANYARRAY),
    (3538, "string_agg", &[], &[TEXT, TEXT], TEXT),
    (3545, "string_agg", &[], &[BYTEA, BYTEA], BYTEA),
    (3175, "json_agg", &[], &[ANYELEMENT], JSON),
    (3197, "json_object_agg", &[], &[ANY, ANY], JSON),
    (3972, "percentile_disc", &[FLOAT8], &[ANYELEMENT], ANYELEMENT),
    (3974, "percentile_cont", &[FLOAT8], &[FLOAT8], FLOAT8),
    (3978, "percentile_disc", &[FLOAT8_ARRAY], &[ANYELEMENT], ANYARRAY),
    (3980, "percentile_cont", &[FLOAT8_ARRAY], &[FLOAT8], FLOAT8_ARRAY),
    (3986, "rank", &[ANY], &[ANY], INT8),
    (3988, "percent_rank", &[ANY], &[ANY], FLOAT8),
    (3990, "cume_dist", &[ANY], &[ANY], FLOAT8),
    (3992, "dense_rank", &[ANY], &[ANY], INT8),
];

/// Signature of a built-in aggregate.
pub fn builtin_signature(aggfnoid: Oid) -> Option<AggSignature> {
    BUILTIN
        .iter()
        .find(|(oid, ..)| *oid == aggfnoid)
        .map(|(_, name, direct, args, result)| AggSignature::new(name, direct, args, *result))
}
