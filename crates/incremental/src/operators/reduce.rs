//! Grouped reduction.
//!
//! Reduce tracks the live members of every group and, whenever a version
//! touches a group, recomputes the group's result from all of its members.
//! The previous result is retracted and the new one inserted.

use super::UnaryOperator;
use crate::multiset::{Entry, Multiset};
use crate::stream::DifferenceStream;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};
use zql_core::{Error, Result};

struct ReduceState<K, T, O> {
    groups: HashMap<K, HashMap<String, Entry<T>>>,
    results: HashMap<K, O>,
}

impl<K, T, O> ReduceState<K, T, O>
where
    K: Eq + Hash + Clone,
    T: Clone,
    O: Clone,
{
    fn apply(
        &mut self,
        data: &Multiset<T>,
        key: &dyn Fn(&T) -> K,
        identity: &dyn Fn(&T) -> String,
        reducer: &dyn Fn(&[(&T, i64)]) -> O,
    ) -> Result<Vec<Entry<O>>>
    where
        T: 'static,
    {
        let mut touched = Vec::new();
        let mut seen = HashSet::new();
        for entry in data.iter() {
            if entry.is_noop() {
                continue;
            }
            let group_key = key(&entry.value);
            let id = identity(&entry.value);
            let members = self.groups.entry(group_key.clone()).or_default();
            let member = members
                .entry(id.clone())
                .or_insert_with(|| Entry::new(entry.value.clone(), 0));
            member.multiplicity += entry.multiplicity;
            if entry.is_insert() {
                member.value = entry.value;
            }
            if member.multiplicity < 0 {
                return Err(Error::NegativeMultiplicity {
                    identity: id,
                    multiplicity: member.multiplicity,
                });
            }
            if member.multiplicity == 0 {
                members.remove(&id);
            }
            if seen.insert(group_key.clone()) {
                touched.push(group_key);
            }
        }

        let mut output = Vec::new();
        for group_key in touched {
            if let Some(previous) = self.results.remove(&group_key) {
                output.push(Entry::delete(previous));
            }
            match self.groups.get(&group_key) {
                Some(members) if !members.is_empty() => {
                    let live: Vec<(&T, i64)> = members
                        .values()
                        .map(|m| (&m.value, m.multiplicity))
                        .collect();
                    let result = reducer(&live);
                    output.push(Entry::insert(result.clone()));
                    self.results.insert(group_key, result);
                }
                _ => {
                    self.groups.remove(&group_key);
                }
            }
        }
        Ok(output)
    }
}

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Groups values by `key` and maintains one `reducer` result per
    /// non-empty group.
    ///
    /// `identity` distinguishes members of a group; a member retracted more
    /// times than it was added is an error.
    pub fn reduce<K, O, KF, IF, RF>(&self, key: KF, identity: IF, reducer: RF) -> DifferenceStream<O>
    where
        K: Eq + Hash + Clone + 'static,
        O: Clone + 'static,
        KF: Fn(&T) -> K + 'static,
        IF: Fn(&T) -> String + 'static,
        RF: Fn(&[(&T, i64)]) -> O + 'static,
    {
        let mut state = ReduceState {
            groups: HashMap::new(),
            results: HashMap::new(),
        };
        UnaryOperator::spawn(
            self,
            Box::new(move |_, data: Multiset<T>| {
                state
                    .apply(&data, &key, &identity, &reducer)
                    .map(Multiset::new)
            }),
        )
    }
}
