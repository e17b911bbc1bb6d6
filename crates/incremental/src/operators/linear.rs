//! Map, filter and distinct.

use super::UnaryOperator;
use crate::multiset::{Entry, Multiset};
use crate::stream::DifferenceStream;
use core::hash::Hash;
use std::rc::Rc;

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Applies `f` to every value. The function runs when the output batch
    /// is iterated, not when the version is propagated.
    pub fn map<U, F>(&self, f: F) -> DifferenceStream<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let f = Rc::new(f);
        UnaryOperator::spawn(
            self,
            Box::new(move |_, data: Multiset<T>| {
                let f = Rc::clone(&f);
                Ok(data.map(move |v| f(v)))
            }),
        )
    }

    /// Keeps the entries whose value satisfies `predicate`, retractions
    /// included.
    pub fn filter<F>(&self, predicate: F) -> DifferenceStream<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let predicate = Rc::new(predicate);
        UnaryOperator::spawn(
            self,
            Box::new(move |_, data: Multiset<T>| {
                let predicate = Rc::clone(&predicate);
                Ok(data.filter(move |v| predicate(v)))
            }),
        )
    }

    /// Collapses each batch to one entry per distinct value with
    /// multiplicity +1 or -1; values that net to zero are dropped.
    ///
    /// Consolidation is per batch: nothing is remembered across versions.
    pub fn distinct(&self) -> DifferenceStream<T>
    where
        T: Hash + Eq,
    {
        UnaryOperator::spawn(
            self,
            Box::new(|_, data: Multiset<T>| {
                Ok(data
                    .consolidate()
                    .into_iter()
                    .map(|e| Entry::new(e.value, e.multiplicity.signum()))
                    .collect())
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::multiset::{Entry, Multiset};
    use crate::stream::tests::Recorder;
    use crate::stream::DifferenceStream;
    use std::cell::Cell;
    use std::rc::Rc;

    fn push(stream: &DifferenceStream<i64>, version: u64, entries: Vec<Entry<i64>>) {
        stream.new_data(version, Multiset::new(entries), None);
        stream.notify(version).unwrap();
        stream.commit(version).unwrap();
    }

    #[test]
    fn test_map() {
        let input = DifferenceStream::new();
        let out = input.map(|v: &i64| v * 2);
        let (rec, _) = Recorder::attach(&out);
        push(&input, 1, vec![Entry::insert(1), Entry::delete(3)]);
        assert_eq!(rec.entries(), vec![Entry::insert(2), Entry::delete(6)]);
        assert_eq!(*rec.commits.borrow(), vec![1]);
    }

    #[test]
    fn test_filter_passes_retractions() {
        let input = DifferenceStream::new();
        let out = input.filter(|v: &i64| *v > 10);
        let (rec, _) = Recorder::attach(&out);
        push(
            &input,
            1,
            vec![Entry::insert(11), Entry::insert(5), Entry::new(20, -2)],
        );
        assert_eq!(rec.entries(), vec![Entry::insert(11), Entry::new(20, -2)]);
    }

    #[test]
    fn test_map_is_lazy() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let input = DifferenceStream::new();
        let out = input.map(move |v: &i64| {
            counter.set(counter.get() + 1);
            *v
        });
        // Nobody iterates the output batch: the closure never runs.
        let _kept = out.clone();
        let sink = out.filter(|_| true);
        let _sink_kept = sink.clone();
        input.new_data(1, Multiset::inserts(vec![1, 2]), None);
        input.notify(1).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_distinct_sign_only() {
        let input = DifferenceStream::new();
        let out = input.distinct();
        let (rec, _) = Recorder::attach(&out);
        push(
            &input,
            1,
            vec![
                Entry::new(1, 3),
                Entry::insert(2),
                Entry::delete(2),
                Entry::new(3, -4),
            ],
        );
        assert_eq!(rec.entries(), vec![Entry::insert(1), Entry::delete(3)]);
    }

    #[test]
    fn test_distinct_forgets_previous_batches() {
        let input = DifferenceStream::new();
        let out = input.distinct();
        let (rec, _) = Recorder::attach(&out);
        push(&input, 1, vec![Entry::insert(7)]);
        push(&input, 2, vec![Entry::insert(7)]);
        assert_eq!(rec.entries(), vec![Entry::insert(7), Entry::insert(7)]);
    }

    #[test]
    fn test_out_of_order_version_is_rejected() {
        let input = DifferenceStream::new();
        let out = input.map(|v: &i64| *v);
        let (_rec, _) = Recorder::attach(&out);
        push(&input, 5, vec![Entry::insert(1)]);
        input.new_data(4, Multiset::inserts(vec![2]), None);
        assert!(input.notify(4).is_err());
    }

    #[test]
    fn test_destroy_cascades_to_fork_point() {
        let input = DifferenceStream::<i64>::new();
        let left = input.map(|v| *v);
        let right = input.filter(|_| true);
        let (_l, left_id) = Recorder::attach(&left);
        let (r, _) = Recorder::attach(&right);
        assert_eq!(input.listener_count(), 2);

        left.remove_listener(left_id);
        assert_eq!(input.listener_count(), 1);
        assert!(!left.has_upstream());

        push(&input, 1, vec![Entry::insert(3)]);
        assert_eq!(r.entries(), vec![Entry::insert(3)]);
    }
}
