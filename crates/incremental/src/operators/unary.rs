//! Generic single-input operator.

use super::{Input, VersionGuard};
use crate::message::{PullRequest, Version};
use crate::multiset::Multiset;
use crate::stream::{DifferenceStream, Operator, WeakStream};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use zql_core::Result;

/// Turns one input batch into one output batch.
pub(crate) type Transform<I, O> = Box<dyn FnMut(Version, Multiset<I>) -> Result<Multiset<O>>>;

/// An operator with one input, one output, and its behavior supplied as a
/// transform closure. Map, filter, distinct, effect, reduce and the full
/// aggregates are all instances of it.
pub(crate) struct UnaryOperator<I, O> {
    input: Input<I>,
    output: WeakStream<O>,
    transform: RefCell<Transform<I, O>>,
    guard: VersionGuard,
}

impl<I: Clone + 'static, O: Clone + 'static> UnaryOperator<I, O> {
    /// Wires a new operator reading `input` and returns its output stream.
    pub(crate) fn spawn(input: &DifferenceStream<I>, transform: Transform<I, O>) -> DifferenceStream<O> {
        let output = DifferenceStream::new();
        let weak_output = output.downgrade();
        let operator = Rc::new_cyclic(|me: &Weak<Self>| {
            let me: Weak<dyn Operator> = me.clone();
            Self {
                input: Input::connect(input, me),
                output: weak_output,
                transform: RefCell::new(transform),
                guard: VersionGuard::default(),
            }
        });
        output.adopt(operator);
        output
    }
}

impl<I: Clone + 'static, O: Clone + 'static> Operator for UnaryOperator<I, O> {
    fn run(&self, version: Version) -> Result<()> {
        self.guard.check_run(version)?;
        let Some(output) = self.output.upgrade() else {
            return Ok(());
        };
        for batch in self.input.drain() {
            let data = {
                let mut transform = self.transform.borrow_mut();
                (&mut **transform)(batch.version, batch.data)?
            };
            output.new_data(batch.version, data, batch.reply);
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
        self.input.message_upstream(request)
    }

    fn destroy(&self) {
        self.input.disconnect();
    }
}
