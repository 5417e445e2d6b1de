//! Row buffer behind ordered-set and hypothetical-set aggregates.
//!
//! Rows are kept in arrival order and sorted once at finalization. The direct
//! arguments are taken from the first row; they are constant per group.

use crate::catalog::AggKind;
use crate::datum::{compare_rows, Datum, SortKey};

#[derive(Debug, Clone)]
pub struct OrderedSetBuffer {
    kind: AggKind,
    direct_args: Option<Vec<Datum>>,
    rows: Vec<Vec<Datum>>,
    sort_keys: Vec<SortKey>,
    sorted: bool,
}

impl OrderedSetBuffer {
    pub fn new(kind: AggKind, sort_keys: Vec<SortKey>) -> Self {
        Self { kind, direct_args: None, rows: Vec::new(), sort_keys, sorted: true }
    }

    /// Buffer one row. Percentile-style aggregates ignore rows with a NULL
    /// aggregated value; hypothetical-set aggregates rank NULLs too.
    pub fn append(&mut self, direct: &[Datum], args: &[Datum]) {
        if self.direct_args.is_none() {
            self.direct_args = Some(direct.to_vec());
        }
        if self.kind == AggKind::OrderedSet && args.iter().any(Datum::is_null) {
            return;
        }
        self.rows.push(args.to_vec());
        self.sorted = false;
    }

    pub fn direct_args(&self) -> &[Datum] { self.direct_args.as_deref().unwrap_or(&[]) }

    pub fn rows(&self) -> &[Vec<Datum>] { &self.rows }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Stable sort by the buffer's keys; equal rows keep arrival order.
    pub fn sort(&mut self) {
        if self.sorted {
            return;
        }
        let keys = &self.sort_keys;
        self.rows.sort_by(|a, b| compare_rows(a, b, keys));
        self.sorted = true;
    }

    pub fn sort_keys(&self) -> &[SortKey] { &self.sort_keys }

    pub fn set_sort_keys(&mut self, keys: Vec<SortKey>) {
        self.sort_keys = keys;
        self.sorted = self.rows.len() < 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_row_fixes_direct_arguments() {
        let mut buf = OrderedSetBuffer::new(AggKind::OrderedSet, vec![SortKey::asc()]);
        buf.append(&[Datum::Float8(0.5)], &[Datum::Int4(3)]);
        buf.append(&[Datum::Float8(0.9)], &[Datum::Int4(1)]);
        buf.append(&[Datum::Float8(0.9)], &[Datum::Null]);
        assert_eq!(buf.direct_args(), &[Datum::Float8(0.5)]);
        assert_eq!(buf.len(), 2);
        buf.sort();
        assert_eq!(buf.rows(), &[vec![Datum::Int4(1)], vec![Datum::Int4(3)]]);
    }

    #[test]
    fn hypothetical_buffers_keep_nulls() {
        let mut buf = OrderedSetBuffer::new(AggKind::HypotheticalSet, vec![SortKey::asc()]);
        buf.append(&[Datum::Int4(2)], &[Datum::Null]);
        buf.append(&[Datum::Int4(2)], &[Datum::Int4(5)]);
        buf.sort();
        assert_eq!(buf.rows(), &[vec![Datum::Int4(5)], vec![Datum::Null]]);
        buf.set_sort_keys(vec![SortKey::desc()]);
        buf.sort();
        assert_eq!(buf.rows()[0], vec![Datum::Null]);
    }

    #[test]
    fn empty_buffer_has_no_direct_arguments() {
        let buf = OrderedSetBuffer::new(AggKind::OrderedSet, Vec::new());
        assert!(buf.is_empty());
        assert!(buf.direct_args().is_empty());
    }
}
