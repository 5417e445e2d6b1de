//! Ordering operators that may appear as an aggregate's sort operator.

use crate::datum::{type_oid, Oid, SortKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOperator {
    pub oid: Oid,
    pub name: &'static str,
    pub left_type: Oid,
    /// `>`-style operators order descending.
    pub descending: bool,
}

impl SortOperator {
    pub fn sort_key(&self) -> SortKey {
        if self.descending { SortKey::desc() } else { SortKey::asc() }
    }
}

const OPERATORS: &[SortOperator] = &[
    SortOperator { oid: 58, name: "<", left_type: type_oid::BOOL, descending: false },
    SortOperator { oid: 59, name: ">", left_type: type_oid::BOOL, descending: true },
    SortOperator { oid: 95, name: "<", left_type: type_oid::INT2, descending: false },
    SortOperator { oid: 520, name: ">", left_type: type_oid::INT2, descending: true },
    SortOperator { oid: 97, name: "<", left_type: type_oid::INT4, descending: false },
    SortOperator { oid: 521, name: ">", left_type: type_oid::INT4, descending: true },
    SortOperator { oid: 412, name: "<", left_type: type_oid::INT8, descending: false },
    SortOperator { oid: 413, name: ">", left_type: type_oid::INT8, descending: true },
    SortOperator { oid: 622, name: "<", left_type: type_oid::FLOAT4, descending: false },
    SortOperator { oid: 623, name: ">", left_type: type_oid::FLOAT4, descending: true },
    SortOperator { oid: 672, name: "<", left_type: type_oid::FLOAT8, descending: false },
    SortOperator { oid: 674, name: ">", left_type: type_oid::FLOAT8, descending: true },
    SortOperator { oid: 609, name: "<", left_type: type_oid::OID, descending: false },
    SortOperator { oid: 610, name: ">", left_type: type_oid::OID, descending: true },
    SortOperator { oid: 1754, name: "<", left_type: type_oid::NUMERIC, descending: false },
    SortOperator { oid: 1756, name: ">", left_type: type_oid::NUMERIC, descending: true },
    SortOperator { oid: 664, name: "<", left_type: type_oid::TEXT, descending: false },
    SortOperator { oid: 666, name: ">", left_type: type_oid::TEXT, descending: true },
];

pub fn lookup(oid: Oid) -> Option<SortOperator> {
    OPERATORS.iter().find(|op| op.oid == oid).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_operators_sort_descending() {
        let gt = lookup(521).expect("int4 >");
        assert!(gt.descending);
        assert_eq!(gt.sort_key(), SortKey::desc());
        assert_eq!(lookup(97).map(|op| op.sort_key()), Some(SortKey::asc()));
        assert!(lookup(0).is_none());
    }
}
