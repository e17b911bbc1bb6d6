//! Property-based tests for zql-index using proptest.

use proptest::prelude::*;
use std::collections::BTreeSet;
use zql_index::{FieldComparator, Order, SimpleComparator, Treap};
use zql_core::Record;

proptest! {
    /// The treap holds exactly the distinct inserted values, in order.
    #[test]
    fn treap_matches_btreeset(values in prop::collection::vec(-500i64..500, 0..300)) {
        let mut tree = Treap::new(SimpleComparator::asc());
        let mut model = BTreeSet::new();
        for v in &values {
            let replaced = tree.insert(*v).is_some();
            prop_assert_eq!(replaced, !model.insert(*v));
        }
        prop_assert_eq!(tree.len(), model.len());
        prop_assert_eq!(tree.to_vec(), model.iter().copied().collect::<Vec<_>>());
        prop_assert_eq!(tree.first(), model.iter().next());
        prop_assert_eq!(tree.last(), model.iter().next_back());
    }

    /// Interleaved inserts and removes agree with a BTreeSet model.
    #[test]
    fn treap_insert_remove(ops in prop::collection::vec((any::<bool>(), 0i64..50), 0..400)) {
        let mut tree = Treap::new(SimpleComparator::asc());
        let mut model = BTreeSet::new();
        for (insert, v) in ops {
            if insert {
                tree.insert(v);
                model.insert(v);
            } else {
                prop_assert_eq!(tree.remove(&v).is_some(), model.remove(&v));
            }
            prop_assert_eq!(tree.len(), model.len());
        }
        prop_assert_eq!(tree.to_vec(), model.into_iter().collect::<Vec<_>>());
    }

    /// A snapshot taken before writes never observes them.
    #[test]
    fn treap_snapshot_isolated(
        before in prop::collection::vec(0i64..100, 0..50),
        after in prop::collection::vec(0i64..100, 0..50),
    ) {
        let mut tree = Treap::new(SimpleComparator::asc());
        for v in &before {
            tree.insert(*v);
        }
        let snapshot = tree.clone();
        let expected = snapshot.to_vec();
        for v in &after {
            if tree.insert(*v).is_some() {
                tree.remove(v);
            }
        }
        prop_assert_eq!(snapshot.to_vec(), expected);
    }

    /// Records ordered by a descending field stay sorted under that field.
    #[test]
    fn field_comparator_orders_records(ns in prop::collection::vec(0i64..20, 0..60)) {
        let mut tree = Treap::new(FieldComparator::new([("n", Order::Desc)]));
        for (i, n) in ns.iter().enumerate() {
            tree.insert(Record::new().with("id", i as i64).with("n", *n));
        }
        let sorted: Vec<i64> = tree.iter().filter_map(|r| r.get("n").and_then(|v| v.as_i64())).collect();
        prop_assert_eq!(sorted.len(), ns.len());
        prop_assert!(sorted.windows(2).all(|w| w[0] >= w[1]));
    }
}
