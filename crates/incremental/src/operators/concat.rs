//! Fan-in: several inputs merged into one output.

use super::{Input, VersionGuard};
use crate::message::{PullRequest, Version};
use crate::stream::{DifferenceStream, Operator, WeakStream};
use std::rc::{Rc, Weak};
use zql_core::Result;

struct ConcatOperator<T> {
    inputs: Vec<Input<T>>,
    output: WeakStream<T>,
    guard: VersionGuard,
}

impl<T: Clone + 'static> Operator for ConcatOperator<T> {
    fn run(&self, version: Version) -> Result<()> {
        self.guard.check_run(version)?;
        let Some(output) = self.output.upgrade() else {
            return Ok(());
        };
        for input in &self.inputs {
            for batch in input.drain() {
                output.new_data(batch.version, batch.data, batch.reply);
            }
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
        let mut accepted = false;
        for input in &self.inputs {
            accepted |= input.message_upstream(request)?;
        }
        Ok(accepted)
    }

    fn destroy(&self) {
        for input in &self.inputs {
            input.disconnect();
        }
    }
}

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Merges this stream with `others`. Each batch keeps its own reply tag.
    pub fn concat(&self, others: &[DifferenceStream<T>]) -> DifferenceStream<T> {
        let output = DifferenceStream::new();
        let weak_output = output.downgrade();
        let operator = Rc::new_cyclic(|me: &Weak<ConcatOperator<T>>| {
            let me: Weak<dyn Operator> = me.clone();
            ConcatOperator {
                inputs: core::iter::once(self)
                    .chain(others)
                    .map(|stream| Input::connect(stream, me.clone()))
                    .collect(),
                output: weak_output,
                guard: VersionGuard::default(),
            }
        });
        output.adopt(operator);
        output
    }
}
