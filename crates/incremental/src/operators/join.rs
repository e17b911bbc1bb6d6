//! Incremental inner join.
//!
//! The operator keeps an `Index` of everything each side has ever sent. Per
//! version it joins the new left entries against the right history, folds
//! them into the left history, then joins the whole left history against
//! the new right entries. New-to-new pairs are produced exactly once, by
//! the second half.

use super::{Batch, Input, VersionGuard};
use crate::index::{Identity, Index};
use crate::message::{PullReply, PullRequest, Version};
use crate::multiset::{Entry, Multiset};
use crate::stream::{DifferenceStream, Operator, WeakStream};
use core::hash::Hash;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use zql_core::Result;

/// Key, identity and output functions for a join.
pub struct JoinArgs<L, R, K, O> {
    /// Join key of a left value
    pub left_key: Rc<dyn Fn(&L) -> K>,
    /// Join key of a right value
    pub right_key: Rc<dyn Fn(&R) -> K>,
    /// Identity of a left value, used to compact the left history
    pub left_identity: Identity<L>,
    /// Identity of a right value, used to compact the right history
    pub right_identity: Identity<R>,
    /// Builds the output value of a matched pair
    pub combine: Rc<dyn Fn(&L, &R) -> O>,
}

impl<L, R, K, O> JoinArgs<L, R, K, O> {
    /// Bundles the join functions.
    pub fn new(
        left_key: impl Fn(&L) -> K + 'static,
        right_key: impl Fn(&R) -> K + 'static,
        left_identity: impl Fn(&L) -> String + 'static,
        right_identity: impl Fn(&R) -> String + 'static,
        combine: impl Fn(&L, &R) -> O + 'static,
    ) -> Self {
        Self {
            left_key: Rc::new(left_key),
            right_key: Rc::new(right_key),
            left_identity: Rc::new(left_identity),
            right_identity: Rc::new(right_identity),
            combine: Rc::new(combine),
        }
    }
}

struct JoinState<K, L, R> {
    left: Index<K, L>,
    right: Index<K, R>,
}

struct JoinOperator<L, R, K, O> {
    left: Input<L>,
    right: Input<R>,
    output: WeakStream<O>,
    args: JoinArgs<L, R, K, O>,
    state: RefCell<JoinState<K, L, R>>,
    guard: VersionGuard,
}

impl<L, R, K, O> Operator for JoinOperator<L, R, K, O>
where
    L: Clone + PartialEq + 'static,
    R: Clone + PartialEq + 'static,
    K: Eq + Hash + Clone + 'static,
    O: Clone + 'static,
{
    fn run(&self, version: Version) -> Result<()> {
        self.guard.check_run(version)?;
        let Some(output) = self.output.upgrade() else {
            return Ok(());
        };

        // Replies are folded in before live data so that live deltas see the
        // pulled history. Each reply keeps its own tag.
        let mut groups: Vec<ReplyGroup<L, R>> = Vec::new();
        let mut live: (Vec<Batch<L>>, Vec<Batch<R>>) = (Vec::new(), Vec::new());
        for batch in self.left.drain() {
            match batch.reply {
                Some(reply) => group_for(&mut groups, reply).1.push(batch),
                None => live.0.push(batch),
            }
        }
        for batch in self.right.drain() {
            match batch.reply {
                Some(reply) => group_for(&mut groups, reply).2.push(batch),
                None => live.1.push(batch),
            }
        }

        for (reply, left, right) in groups {
            let joined = self.step(left, right);
            output.new_data(version, Multiset::new(joined), Some(reply));
        }
        let joined = self.step(live.0, live.1);
        if !joined.is_empty() {
            output.new_data(version, Multiset::new(joined), None);
        }
        output.notify(version)
    }

    fn commit(&self, version: Version) -> Result<()> {
        if !self.guard.first_commit(version) {
            return Ok(());
        }
        match self.output.upgrade() {
            Some(output) => output.commit(version),
            None => Ok(()),
        }
    }

    fn message_upstream(&self, request: &PullRequest) -> Result<bool> {
        let left = self.left.message_upstream(request)?;
        let right = self.right.message_upstream(request)?;
        Ok(left || right)
    }

    fn destroy(&self) {
        self.left.disconnect();
        self.right.disconnect();
    }
}

impl<L, R, K, O> JoinOperator<L, R, K, O>
where
    L: Clone + PartialEq + 'static,
    R: Clone + PartialEq + 'static,
    K: Eq + Hash + Clone + 'static,
{
    /// Joins one group of batches against the histories and folds it in.
    fn step(&self, left: Vec<Batch<L>>, right: Vec<Batch<R>>) -> Vec<Entry<O>> {
        let mut delta_left = Index::new(Rc::clone(&self.args.left_identity));
        for entry in left.iter().flat_map(|batch| batch.data.iter()) {
            delta_left.add((self.args.left_key)(&entry.value), entry);
        }
        let mut delta_right = Index::new(Rc::clone(&self.args.right_identity));
        for entry in right.iter().flat_map(|batch| batch.data.iter()) {
            delta_right.add((self.args.right_key)(&entry.value), entry);
        }

        let combine = self.args.combine.as_ref();
        let mut joined = Vec::new();
        let mut state = self.state.borrow_mut();
        if !delta_left.is_empty() {
            joined.extend(delta_left.join(&state.right, combine));
            state.left.extend(&delta_left);
            state.left.compact(delta_left.keys());
        }
        if !delta_right.is_empty() {
            joined.extend(state.left.join(&delta_right, combine));
            state.right.extend(&delta_right);
            state.right.compact(delta_right.keys());
        }
        joined
    }
}

type ReplyGroup<L, R> = (PullReply, Vec<Batch<L>>, Vec<Batch<R>>);

fn group_for<L, R>(groups: &mut Vec<ReplyGroup<L, R>>, reply: PullReply) -> &mut ReplyGroup<L, R> {
    let at = match groups.iter().position(|(tag, _, _)| *tag == reply) {
        Some(at) => at,
        None => {
            groups.push((reply, Vec::new(), Vec::new()));
            groups.len() - 1
        }
    };
    &mut groups[at]
}

impl<L: Clone + PartialEq + 'static> DifferenceStream<L> {
    /// Inner-joins this stream with `other` on the keys given by `args`.
    pub fn join<R, K, O>(&self, other: &DifferenceStream<R>, args: JoinArgs<L, R, K, O>) -> DifferenceStream<O>
    where
        R: Clone + PartialEq + 'static,
        K: Eq + Hash + Clone + 'static,
        O: Clone + 'static,
    {
        let output = DifferenceStream::new();
        let weak_output = output.downgrade();
        let operator = Rc::new_cyclic(|me: &Weak<JoinOperator<L, R, K, O>>| {
            let me: Weak<dyn Operator> = me.clone();
            JoinOperator {
                left: Input::connect(self, me.clone()),
                right: Input::connect(other, me),
                output: weak_output,
                state: RefCell::new(JoinState {
                    left: Index::new(Rc::clone(&args.left_identity)),
                    right: Index::new(Rc::clone(&args.right_identity)),
                }),
                args,
                guard: VersionGuard::default(),
            }
        });
        output.adopt(operator);
        output
    }
}
