//!
//! Seed table
//! ----------
//! pg_aggregate rows in text form. One row per line, whitespace separated, in
//! this field order:
//!
//! `aggfnoid kind ndirect transfn finalfn combinefn serialfn deserialfn mtransfn
//!  minvtransfn mfinalfn finalextra mfinalextra sortop transtype transspace
//!  mtranstype mtransspace initval minitval`
//!
//! `-` marks an absent function, `0` no sort operator / no moving transition
//! type, `_null_` no initial value. Initial values may be double-quoted.
//! Blank lines and lines starting with `#` are ignored.

use crate::datum::Oid;
use crate::error::{AggError, AggResult};

pub const FIELD_COUNT: usize = 20;

pub const BUILTIN_SEED: &str = r#"
# avg
2100 n 0 int8_avg_accum numeric_poly_avg int8_avg_combine int8_avg_serialize int8_avg_deserialize int8_avg_accum int8_avg_accum_inv numeric_poly_avg f f 0 2281 48 2281 48 _null_ _null_
2101 n 0 int4_avg_accum int8_avg int4_avg_combine - - int4_avg_accum int4_avg_accum_inv int8_avg f f 0 1016 0 1016 0 "{0,0}" "{0,0}"
2102 n 0 int2_avg_accum int8_avg int4_avg_combine - - int2_avg_accum int2_avg_accum_inv int8_avg f f 0 1016 0 1016 0 "{0,0}" "{0,0}"
2104 n 0 float4_accum float8_avg float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2105 n 0 float8_accum float8_avg float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2103 n 0 numeric_avg_accum numeric_avg numeric_avg_combine numeric_avg_serialize numeric_avg_deserialize numeric_avg_accum numeric_accum_inv numeric_avg f f 0 2281 128 2281 128 _null_ _null_

# sum
2107 n 0 int8_avg_accum numeric_poly_sum int8_avg_combine int8_avg_serialize int8_avg_deserialize int8_avg_accum int8_avg_accum_inv numeric_poly_sum f f 0 2281 48 2281 48 _null_ _null_
2108 n 0 int4_sum - int8pl - - int4_avg_accum int4_avg_accum_inv int2int4_sum f f 0 20 0 1016 0 _null_ "{0,0}"
2109 n 0 int2_sum - int8pl - - int2_avg_accum int2_avg_accum_inv int2int4_sum f f 0 20 0 1016 0 _null_ "{0,0}"
2110 n 0 float4pl - float4pl - - - - - f f 0 700 0 0 0 _null_ _null_
2111 n 0 float8pl - float8pl - - - - - f f 0 701 0 0 0 _null_ _null_
2114 n 0 numeric_avg_accum numeric_sum numeric_avg_combine numeric_avg_serialize numeric_avg_deserialize numeric_avg_accum numeric_accum_inv numeric_sum f f 0 2281 128 2281 128 _null_ _null_

# max
2115 n 0 int8larger - int8larger - - - - - f f 413 20 0 0 0 _null_ _null_
2116 n 0 int4larger - int4larger - - - - - f f 521 23 0 0 0 _null_ _null_
2117 n 0 int2larger - int2larger - - - - - f f 520 21 0 0 0 _null_ _null_
2119 n 0 float4larger - float4larger - - - - - f f 623 700 0 0 0 _null_ _null_
2120 n 0 float8larger - float8larger - - - - - f f 674 701 0 0 0 _null_ _null_
2129 n 0 text_larger - text_larger - - - - - f f 666 25 0 0 0 _null_ _null_
2118 n 0 oidlarger - oidlarger - - - - - f f 610 26 0 0 0 _null_ _null_
2130 n 0 numeric_larger - numeric_larger - - - - - f f 1756 1700 0 0 0 _null_ _null_

# min
2131 n 0 int8smaller - int8smaller - - - - - f f 412 20 0 0 0 _null_ _null_
2132 n 0 int4smaller - int4smaller - - - - - f f 97 23 0 0 0 _null_ _null_
2133 n 0 int2smaller - int2smaller - - - - - f f 95 21 0 0 0 _null_ _null_
2135 n 0 float4smaller - float4smaller - - - - - f f 622 700 0 0 0 _null_ _null_
2136 n 0 float8smaller - float8smaller - - - - - f f 672 701 0 0 0 _null_ _null_
2145 n 0 text_smaller - text_smaller - - - - - f f 664 25 0 0 0 _null_ _null_
2134 n 0 oidsmaller - oidsmaller - - - - - f f 609 26 0 0 0 _null_ _null_
2146 n 0 numeric_smaller - numeric_smaller - - - - - f f 1754 1700 0 0 0 _null_ _null_

# count
2147 n 0 int8inc_any - int8pl - - int8inc_any int8dec_any - f f 0 20 0 20 0 "0" "0"
2803 n 0 int8inc - int8pl - - int8inc int8dec - f f 0 20 0 20 0 "0" "0"

# var_pop
2718 n 0 int8_accum numeric_var_pop numeric_combine numeric_serialize numeric_deserialize int8_accum int8_accum_inv numeric_var_pop f f 0 2281 128 2281 128 _null_ _null_
2719 n 0 int4_accum numeric_poly_var_pop numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int4_accum int4_accum_inv numeric_poly_var_pop f f 0 2281 48 2281 48 _null_ _null_
2720 n 0 int2_accum numeric_poly_var_pop numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int2_accum int2_accum_inv numeric_poly_var_pop f f 0 2281 48 2281 48 _null_ _null_
2721 n 0 float4_accum float8_var_pop float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2722 n 0 float8_accum float8_var_pop float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2723 n 0 numeric_accum numeric_var_pop numeric_combine numeric_serialize numeric_deserialize numeric_accum numeric_accum_inv numeric_var_pop f f 0 2281 128 2281 128 _null_ _null_

# var_samp
2641 n 0 int8_accum numeric_var_samp numeric_combine numeric_serialize numeric_deserialize int8_accum int8_accum_inv numeric_var_samp f f 0 2281 128 2281 128 _null_ _null_
2642 n 0 int4_accum numeric_poly_var_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int4_accum int4_accum_inv numeric_poly_var_samp f f 0 2281 48 2281 48 _null_ _null_
2643 n 0 int2_accum numeric_poly_var_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int2_accum int2_accum_inv numeric_poly_var_samp f f 0 2281 48 2281 48 _null_ _null_
2644 n 0 float4_accum float8_var_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2645 n 0 float8_accum float8_var_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2646 n 0 numeric_accum numeric_var_samp numeric_combine numeric_serialize numeric_deserialize numeric_accum numeric_accum_inv numeric_var_samp f f 0 2281 128 2281 128 _null_ _null_

# variance: historical alias for var_samp
2148 n 0 int8_accum numeric_var_samp numeric_combine numeric_serialize numeric_deserialize int8_accum int8_accum_inv numeric_var_samp f f 0 2281 128 2281 128 _null_ _null_
2149 n 0 int4_accum numeric_poly_var_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int4_accum int4_accum_inv numeric_poly_var_samp f f 0 2281 48 2281 48 _null_ _null_
2150 n 0 int2_accum numeric_poly_var_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int2_accum int2_accum_inv numeric_poly_var_samp f f 0 2281 48 2281 48 _null_ _null_
2151 n 0 float4_accum float8_var_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2152 n 0 float8_accum float8_var_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2153 n 0 numeric_accum numeric_var_samp numeric_combine numeric_serialize numeric_deserialize numeric_accum numeric_accum_inv numeric_var_samp f f 0 2281 128 2281 128 _null_ _null_

# stddev_pop
2724 n 0 int8_accum numeric_stddev_pop numeric_combine numeric_serialize numeric_deserialize int8_accum int8_accum_inv numeric_stddev_pop f f 0 2281 128 2281 128 _null_ _null_
2725 n 0 int4_accum numeric_poly_stddev_pop numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int4_accum int4_accum_inv numeric_poly_stddev_pop f f 0 2281 48 2281 48 _null_ _null_
2726 n 0 int2_accum numeric_poly_stddev_pop numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int2_accum int2_accum_inv numeric_poly_stddev_pop f f 0 2281 48 2281 48 _null_ _null_
2727 n 0 float4_accum float8_stddev_pop float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2728 n 0 float8_accum float8_stddev_pop float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2729 n 0 numeric_accum numeric_stddev_pop numeric_combine numeric_serialize numeric_deserialize numeric_accum numeric_accum_inv numeric_stddev_pop f f 0 2281 128 2281 128 _null_ _null_

# stddev_samp
2712 n 0 int8_accum numeric_stddev_samp numeric_combine numeric_serialize numeric_deserialize int8_accum int8_accum_inv numeric_stddev_samp f f 0 2281 128 2281 128 _null_ _null_
2713 n 0 int4_accum numeric_poly_stddev_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int4_accum int4_accum_inv numeric_poly_stddev_samp f f 0 2281 48 2281 48 _null_ _null_
2714 n 0 int2_accum numeric_poly_stddev_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int2_accum int2_accum_inv numeric_poly_stddev_samp f f 0 2281 48 2281 48 _null_ _null_
2715 n 0 float4_accum float8_stddev_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2716 n 0 float8_accum float8_stddev_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2717 n 0 numeric_accum numeric_stddev_samp numeric_combine numeric_serialize numeric_deserialize numeric_accum numeric_accum_inv numeric_stddev_samp f f 0 2281 128 2281 128 _null_ _null_

# stddev: historical alias for stddev_samp
2154 n 0 int8_accum numeric_stddev_samp numeric_combine numeric_serialize numeric_deserialize int8_accum int8_accum_inv numeric_stddev_samp f f 0 2281 128 2281 128 _null_ _null_
2155 n 0 int4_accum numeric_poly_stddev_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int4_accum int4_accum_inv numeric_poly_stddev_samp f f 0 2281 48 2281 48 _null_ _null_
2156 n 0 int2_accum numeric_poly_stddev_samp numeric_poly_combine numeric_poly_serialize numeric_poly_deserialize int2_accum int2_accum_inv numeric_poly_stddev_samp f f 0 2281 48 2281 48 _null_ _null_
2157 n 0 float4_accum float8_stddev_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2158 n 0 float8_accum float8_stddev_samp float8_combine - - - - - f f 0 1022 0 0 0 "{0,0,0}" _null_
2159 n 0 numeric_accum numeric_stddev_samp numeric_combine numeric_serialize numeric_deserialize numeric_accum numeric_accum_inv numeric_stddev_samp f f 0 2281 128 2281 128 _null_ _null_

# SQL2003 binary regression aggregates
2818 n 0 int8inc_float8_float8 - int8pl - - - - - f f 0 20 0 0 0 "0" _null_
2819 n 0 float8_regr_accum float8_regr_sxx float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2820 n 0 float8_regr_accum float8_regr_syy float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2821 n 0 float8_regr_accum float8_regr_sxy float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2822 n 0 float8_regr_accum float8_regr_avgx float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2823 n 0 float8_regr_accum float8_regr_avgy float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2824 n 0 float8_regr_accum float8_regr_r2 float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2825 n 0 float8_regr_accum float8_regr_slope float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2826 n 0 float8_regr_accum float8_regr_intercept float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2827 n 0 float8_regr_accum float8_covar_pop float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2828 n 0 float8_regr_accum float8_covar_samp float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_
2829 n 0 float8_regr_accum float8_corr float8_regr_combine - - - - - f f 0 1022 0 0 0 "{0,0,0,0,0,0}" _null_

# boolean-and and boolean-or
2517 n 0 booland_statefunc - booland_statefunc - - bool_accum bool_accum_inv bool_alltrue f f 58 16 0 2281 16 _null_ _null_
2518 n 0 boolor_statefunc - boolor_statefunc - - bool_accum bool_accum_inv bool_anytrue f f 59 16 0 2281 16 _null_ _null_
2519 n 0 booland_statefunc - booland_statefunc - - bool_accum bool_accum_inv bool_alltrue f f 58 16 0 2281 16 _null_ _null_

# bitwise integer
2236 n 0 int2and - int2and - - - - - f f 0 21 0 0 0 _null_ _null_
2237 n 0 int2or - int2or - - - - - f f 0 21 0 0 0 _null_ _null_
2238 n 0 int4and - int4and - - - - - f f 0 23 0 0 0 _null_ _null_
2239 n 0 int4or - int4or - - - - - f f 0 23 0 0 0 _null_ _null_
2240 n 0 int8and - int8and - - - - - f f 0 20 0 0 0 _null_ _null_
2241 n 0 int8or - int8or - - - - - f f 0 20 0 0 0 _null_ _null_

# bitwise bit string
2242 n 0 bitand - bitand - - - - - f f 0 1560 0 0 0 _null_ _null_
2243 n 0 bitor - bitor - - - - - f f 0 1560 0 0 0 _null_ _null_

# array_sum: elementwise integer vector sum
6013 n 0 array_add - array_add - - - - - f f 0 1007 0 0 0 "{}" _null_

# sum(array[])
6216 n 0 int2_matrix_accum - int8_matrix_accum - - - - - f f 0 1016 0 0 0 _null_ _null_
6217 n 0 int4_matrix_accum - int8_matrix_accum - - - - - f f 0 1016 0 0 0 _null_ _null_
6218 n 0 int8_matrix_accum - int8_matrix_accum - - - - - f f 0 1016 0 0 0 _null_ _null_
6219 n 0 float8_matrix_accum - float8_matrix_accum - - - - - f f 0 1022 0 0 0 _null_ _null_

# pivot_sum(labels, key, value)
6226 n 0 int4_pivot_accum - int8_matrix_accum - - - - - f f 0 1007 0 0 0 _null_ _null_
6228 n 0 int8_pivot_accum - int8_matrix_accum - - - - - f f 0 1016 0 0 0 _null_ _null_
6230 n 0 float8_pivot_accum - float8_matrix_accum - - - - - f f 0 1022 0 0 0 _null_ _null_

# array, text, json
2335 n 0 array_agg_transfn array_agg_finalfn - - - - - - t f 0 2281 0 0 0 _null_ _null_
3538 n 0 string_agg_transfn string_agg_finalfn - - - - - - f f 0 2281 0 0 0 _null_ _null_
3545 n 0 bytea_string_agg_transfn bytea_string_agg_finalfn - - - - - - f f 0 2281 0 0 0 _null_ _null_
3175 n 0 json_agg_transfn json_agg_finalfn - - - - - - f f 0 2281 0 0 0 _null_ _null_
3197 n 0 json_object_agg_transfn json_object_agg_finalfn - - - - - - f f 0 2281 0 0 0 _null_ _null_

# ordered-set and hypothetical-set
3972 o 1 ordered_set_transition percentile_disc_final - - - - - - t f 0 2281 0 0 0 _null_ _null_
3974 o 1 ordered_set_transition percentile_cont_float8_final - - - - - - f f 0 2281 0 0 0 _null_ _null_
3978 o 1 ordered_set_transition percentile_disc_multi_final - - - - - - t f 0 2281 0 0 0 _null_ _null_
3980 o 1 ordered_set_transition percentile_cont_float8_multi_final - - - - - - f f 0 2281 0 0 0 _null_ _null_
3986 h 1 ordered_set_transition_multi rank_final - - - - - - t f 0 2281 0 0 0 _null_ _null_
3988 h 1 ordered_set_transition_multi percent_rank_final - - - - - - t f 0 2281 0 0 0 _null_ _null_
3990 h 1 ordered_set_transition_multi cume_dist_final - - - - - - t f 0 2281 0 0 0 _null_ _null_
3992 h 1 ordered_set_transition_multi dense_rank_final - - - - - - t f 0 2281 0 0 0 _null_ _null_
"#;

/// One parsed seed row; function references are still names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRow {
    pub line: usize,
    pub aggfnoid: Oid,
    pub kind: char,
    pub num_direct_args: u16,
    pub transfn: Option<String>,
    pub finalfn: Option<String>,
    pub combinefn: Option<String>,
    pub serialfn: Option<String>,
    pub deserialfn: Option<String>,
    pub mtransfn: Option<String>,
    pub minvtransfn: Option<String>,
    pub mfinalfn: Option<String>,
    pub final_extra: bool,
    pub moving_final_extra: bool,
    pub sortop: Option<Oid>,
    pub transtype: Oid,
    pub transspace: i32,
    pub mtranstype: Option<Oid>,
    pub mtransspace: i32,
    pub initval: Option<String>,
    pub minitval: Option<String>,
}

/// Non-comment lines of a seed text with their 1-based line numbers.
pub fn seed_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, raw)| (idx + 1, raw.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse every row of a seed text, failing on the first malformed row.
pub fn parse_seed(text: &str) -> AggResult<Vec<SeedRow>> {
    seed_lines(text).map(|(line_no, line)| parse_row(line_no, line)).collect()
}

pub fn parse_row(line_no: usize, line: &str) -> AggResult<SeedRow> {
    let fields = tokenize(line_no, line)?;
    if fields.len() != FIELD_COUNT {
        return Err(AggError::seed(line_no, format!("expected {} fields, found {}", FIELD_COUNT, fields.len())));
    }
    let f = |i: usize| fields[i].as_str();
    let kind = match f(1) {
        "n" => 'n',
        "o" => 'o',
        "h" => 'h',
        other => return Err(AggError::seed(line_no, format!("unknown aggregate kind '{}'", other))),
    };
    let transtype = parse_oid(line_no, "transtype", f(14))?;
    if transtype == 0 {
        return Err(AggError::seed(line_no, "transtype is required"));
    }
    Ok(SeedRow {
        line: line_no,
        aggfnoid: parse_oid(line_no, "aggfnoid", f(0))?,
        kind,
        num_direct_args: f(2).parse().map_err(|_| AggError::seed(line_no, format!("bad direct argument count '{}'", f(2))))?,
        transfn: func_ref(f(3)),
        finalfn: func_ref(f(4)),
        combinefn: func_ref(f(5)),
        serialfn: func_ref(f(6)),
        deserialfn: func_ref(f(7)),
        mtransfn: func_ref(f(8)),
        minvtransfn: func_ref(f(9)),
        mfinalfn: func_ref(f(10)),
        final_extra: parse_flag(line_no, "finalextra", f(11))?,
        moving_final_extra: parse_flag(line_no, "mfinalextra", f(12))?,
        sortop: nonzero(parse_oid(line_no, "sortop", f(13))?),
        transtype,
        transspace: f(15).parse().map_err(|_| AggError::seed(line_no, format!("bad transspace '{}'", f(15))))?,
        mtranstype: nonzero(parse_oid(line_no, "mtranstype", f(16))?),
        mtransspace: f(17).parse().map_err(|_| AggError::seed(line_no, format!("bad mtransspace '{}'", f(17))))?,
        initval: init_value(&fields[18]),
        minitval: init_value(&fields[19]),
    })
}

#[derive(Debug)]
struct Field {
    text: String,
    quoted: bool,
}

impl Field {
    fn as_str(&self) -> &str { &self.text }
}

fn tokenize(line_no: usize, line: &str) -> AggResult<Vec<Field>> {
    let mut out = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                match ch {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(AggError::seed(line_no, "unterminated quoted value"));
            }
            out.push(Field { text, quoted: true });
        } else {
            let mut text = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                text.push(ch);
                chars.next();
            }
            out.push(Field { text, quoted: false });
        }
    }
    Ok(out)
}

fn func_ref(s: &str) -> Option<String> {
    if s == "-" || s == "0" { None } else { Some(s.to_string()) }
}

fn parse_oid(line_no: usize, what: &str, s: &str) -> AggResult<Oid> {
    s.parse().map_err(|_| AggError::seed(line_no, format!("bad {} '{}'", what, s)))
}

fn nonzero(oid: Oid) -> Option<Oid> { (oid != 0).then_some(oid) }

fn parse_flag(line_no: usize, what: &str, s: &str) -> AggResult<bool> {
    match s {
        "t" | "true" => Ok(true),
        "f" | "false" => Ok(false),
        other => Err(AggError::seed(line_no, format!("bad {} flag '{}'", what, other))),
    }
}

fn init_value(field: &Field) -> Option<String> {
    if !field.quoted && field.text == "_null_" { None } else { Some(field.text.clone()) }
}
