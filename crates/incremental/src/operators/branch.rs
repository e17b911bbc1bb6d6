//! Fan-out: one input replicated to several outputs.

use super::{Input, VersionGuard};
use crate::message::{PullRequest, Version};
use crate::stream::{DifferenceStream, Operator, WeakStream};
use std::cell::Cell;
use std::rc::{Rc, Weak};
use zql_core::Result;

struct BranchOperator<T> {
    input: Input<T>,
    outputs: Vec<WeakStream<T>>,
    live_outputs: Cell<usize>,
    guard: VersionGuard,
}

impl<T: Clone + 'static> BranchOperator<T> {
    fn outputs(&self) -> Vec<DifferenceStream<T>> {
        self.outputs.iter().filter_map(WeakStream::upgrade).collect()
    }
}

impl<T: Clone + 'static> Operator for BranchOperator<T> {
    fn run(&self, version: Version) -> Result<()> {
        self.guard.check_run(version)?;
        let outputs = self.outputs();
        for batch in self.input.drain() {
            for output in &outputs {
                output.new_data(batch.version, batch.data.clone(), batch.reply);
            }
        }
        for output in &outputs {
            output.notify(version)?;
        }
        Ok(())
    }

    fn commit(&self, version: Version) -> Result<()> {
        if !self.guard.first_commit(version) {
            return Ok(());
        }
        for output in self.outputs() {
            output.commit(version)?;
        }
        Ok(())
    }

    fn message_upstream(&self, request: &PullRequest) -> Result<bool> {
        self.input.message_upstream(request)
    }

    /// Called once per destroyed output; the input is released with the
    /// last one.
    fn destroy(&self) {
        let live = self.live_outputs.get().saturating_sub(1);
        self.live_outputs.set(live);
        if live == 0 {
            self.input.disconnect();
        }
    }
}

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Splits the stream into `count` outputs that each receive every batch.
    pub fn branch(&self, count: usize) -> Vec<DifferenceStream<T>> {
        let outputs: Vec<DifferenceStream<T>> = (0..count).map(|_| DifferenceStream::new()).collect();
        let operator = Rc::new_cyclic(|me: &Weak<BranchOperator<T>>| {
            let me: Weak<dyn Operator> = me.clone();
            BranchOperator {
                input: Input::connect(self, me),
                outputs: outputs.iter().map(DifferenceStream::downgrade).collect(),
                live_outputs: Cell::new(count),
                guard: VersionGuard::default(),
            }
        });
        for output in &outputs {
            output.adopt(operator.clone());
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use crate::message::PullRequest;
    use crate::multiset::{Entry, Multiset};
    use crate::stream::tests::Recorder;
    use crate::stream::DifferenceStream;

    #[test]
    fn test_branch_replicates() {
        let input = DifferenceStream::<i64>::new();
        let outputs = input.branch(2);
        let (a, _) = Recorder::attach(&outputs[0]);
        let (b, _) = Recorder::attach(&outputs[1]);

        input.new_data(1, Multiset::inserts(vec![1, 2]), None);
        input.notify(1).unwrap();
        input.commit(1).unwrap();

        for r in [&a, &b] {
            assert_eq!(r.entries(), vec![Entry::insert(1), Entry::insert(2)]);
            assert_eq!(*r.commits.borrow(), vec![1]);
        }
    }

    #[test]
    fn test_branch_forwards_pull_upstream() {
        let input = DifferenceStream::<i64>::new();
        let outputs = input.branch(1);
        let (_rec, id) = Recorder::attach(&outputs[0]);

        // A bare stream has no source behind it, so nobody is left waiting.
        assert!(!outputs[0].message_upstream(&PullRequest::new(3), id).unwrap());
        assert_eq!(outputs[0].requestor_count(), 0);
        assert_eq!(input.requestor_count(), 0);
    }

    #[test]
    fn test_branch_released_with_last_output() {
        let input = DifferenceStream::<i64>::new();
        let outputs = input.branch(2);
        let (_a, a) = Recorder::attach(&outputs[0]);
        let (b_rec, b) = Recorder::attach(&outputs[1]);

        outputs[0].remove_listener(a);
        assert_eq!(input.listener_count(), 1);

        input.new_data(1, Multiset::inserts(vec![9]), None);
        input.notify(1).unwrap();
        assert_eq!(b_rec.entries(), vec![Entry::insert(9)]);

        outputs[1].remove_listener(b);
        assert_eq!(input.listener_count(), 0);
    }
}
