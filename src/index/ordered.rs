//! # Ordered Index
//!
//! A B-tree keyed by `(encoded key, row id)`. Keys use the order-preserving
//! encoding from `encoding::key`, so point lookups, prefix lookups on a
//! composite key and range scans are all plain byte-range scans.
//!
//! ## Range Bounds
//!
//! For a key prefix `P` (equality columns) and a range column value `v`:
//!
//! | Predicate | Lower bound | Upper bound |
//! |-----------|-------------|-------------|
//! | `col > v`  | `P ++ enc(v) ++ 0xFF` incl. | |
//! | `col >= v` | `P ++ enc(v)` incl. | |
//! | `col < v`  | | `P ++ enc(v)` excl. |
//! | `col <= v` | | `P ++ enc(v) ++ 0xFF` excl. |
//! | none       | `P ++ 0x02` incl. (skips NULL) | `P ++ 0xFF` excl. |
//!
//! Appending `0xFF` works because every encoded value begins with a type
//! prefix below `0xFF`, so it sorts after any longer key sharing the prefix.

use std::collections::BTreeSet;
use std::ops::Bound;

use crate::encoding::key::{encode_value_to, prefix_upper_bound, type_prefix};
use crate::schema::IndexDef;
use crate::types::{RowId, Value};

#[derive(Debug)]
pub struct OrderedIndex {
    def: IndexDef,
    columns: Vec<usize>,
    entries: BTreeSet<(Vec<u8>, RowId)>,
}

/// A byte range over encoded keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
}

impl KeyRange {
    /// Every key that starts with `prefix`.
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let upper = prefix_upper_bound(&prefix);
        Self {
            lower: Bound::Included(prefix),
            upper: Bound::Excluded(upper),
        }
    }

    /// Range on the column following `prefix`. `None` leaves a side open
    /// (NULLs are still excluded on the lower side).
    pub fn on_column(
        prefix: &[u8],
        lower: Option<(&Value, bool)>,
        upper: Option<(&Value, bool)>,
    ) -> Self {
        let lower = match lower {
            Some((value, inclusive)) => {
                let mut key = prefix.to_vec();
                encode_value_to(value, &mut key);
                if !inclusive {
                    key.push(type_prefix::MAX_KEY);
                }
                Bound::Included(key)
            }
            None => {
                let mut key = prefix.to_vec();
                key.push(type_prefix::NULL + 1);
                Bound::Included(key)
            }
        };

        let upper = match upper {
            Some((value, inclusive)) => {
                let mut key = prefix.to_vec();
                encode_value_to(value, &mut key);
                if inclusive {
                    key.push(type_prefix::MAX_KEY);
                }
                Bound::Excluded(key)
            }
            None => Bound::Excluded(prefix_upper_bound(prefix)),
        };

        Self { lower, upper }
    }
}

impl OrderedIndex {
    pub fn new(def: IndexDef, columns: Vec<usize>) -> Self {
        Self {
            def,
            columns,
            entries: BTreeSet::new(),
        }
    }

    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.def.is_unique()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn key_for(&self, row: &[Value]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.columns.len() * 9);
        for &column in &self.columns {
            encode_value_to(&row[column], &mut key);
        }
        key
    }

    /// Unique indexes ignore keys containing NULL.
    pub fn key_has_null(&self, row: &[Value]) -> bool {
        self.columns.iter().any(|&c| row[c].is_null())
    }

    pub fn insert(&mut self, row_id: RowId, row: &[Value]) -> bool {
        let key = self.key_for(row);
        self.entries.insert((key, row_id))
    }

    pub fn remove(&mut self, row_id: RowId, row: &[Value]) -> bool {
        let key = self.key_for(row);
        self.entries.remove(&(key, row_id))
    }

    /// Row ids whose key lies in `range`, in key order, each reported once.
    pub fn scan(&self, range: &KeyRange) -> Vec<RowId> {
        let lower = match &range.lower {
            Bound::Included(k) => Bound::Included((k.clone(), RowId::MIN)),
            Bound::Excluded(k) => Bound::Excluded((k.clone(), RowId::MAX)),
            Bound::Unbounded => Bound::Unbounded,
        };
        let upper = match &range.upper {
            Bound::Included(k) => Bound::Included((k.clone(), RowId::MAX)),
            Bound::Excluded(k) => Bound::Excluded((k.clone(), RowId::MIN)),
            Bound::Unbounded => Bound::Unbounded,
        };

        if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) =
            (&lower, &upper)
        {
            if lo > hi {
                return Vec::new();
            }
        }

        let mut seen = hashbrown::HashSet::new();
        self.entries
            .range((lower, upper))
            .filter_map(|(_, row_id)| seen.insert(*row_id).then_some(*row_id))
            .collect()
    }

    /// Row ids carrying exactly `key`.
    pub fn lookup(&self, key: &[u8]) -> Vec<RowId> {
        self.scan(&KeyRange {
            lower: Bound::Included(key.to_vec()),
            upper: Bound::Included(key.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::key::encode_key;

    fn index() -> OrderedIndex {
        let mut index = OrderedIndex::new(IndexDef::btree("idx_age", vec!["age".into()], false), vec![0]);
        for (row_id, age) in [(1, 30), (2, 25), (3, 35), (4, 30)] {
            index.insert(row_id, &[Value::Integer(age)]);
        }
        index.insert(5, &[Value::Null]);
        index
    }

    #[test]
    fn lookup_returns_all_rows_with_key() {
        let index = index();
        let key = encode_key(&[Value::Integer(30)]);
        assert_eq!(index.lookup(&key), vec![1, 4]);
    }

    #[test]
    fn range_scans_follow_key_order() {
        let index = index();
        let v = Value::Integer(30);

        let gt = index.scan(&KeyRange::on_column(&[], Some((&v, false)), None));
        assert_eq!(gt, vec![3]);

        let ge = index.scan(&KeyRange::on_column(&[], Some((&v, true)), None));
        assert_eq!(ge, vec![1, 4, 3]);

        let lt = index.scan(&KeyRange::on_column(&[], None, Some((&v, false))));
        assert_eq!(lt, vec![2]);

        let le = index.scan(&KeyRange::on_column(&[], None, Some((&v, true))));
        assert_eq!(le, vec![2, 1, 4]);
    }

    #[test]
    fn inverted_range_is_empty() {
        let index = index();
        let lo = Value::Integer(40);
        let hi = Value::Integer(20);
        assert!(index
            .scan(&KeyRange::on_column(&[], Some((&lo, true)), Some((&hi, true))))
            .is_empty());
    }

    #[test]
    fn composite_prefix_scan() {
        let mut index = OrderedIndex::new(
            IndexDef::btree("idx_ab", vec!["a".into(), "b".into()], false),
            vec![0, 1],
        );
        index.insert(1, &[Value::from("x"), Value::Integer(1)]);
        index.insert(2, &[Value::from("x"), Value::Integer(2)]);
        index.insert(3, &[Value::from("xy"), Value::Integer(1)]);

        let prefix = encode_key(&[Value::from("x")]);
        assert_eq!(index.scan(&KeyRange::prefix(prefix.clone())), vec![1, 2]);

        let one = Value::Integer(1);
        assert_eq!(
            index.scan(&KeyRange::on_column(&prefix, Some((&one, false)), None)),
            vec![2]
        );
    }

    #[test]
    fn removing_entry_hides_row() {
        let mut index = index();
        assert!(index.remove(1, &[Value::Integer(30)]));
        let key = encode_key(&[Value::Integer(30)]);
        assert_eq!(index.lookup(&key), vec![4]);
    }
}
