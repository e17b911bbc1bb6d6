//! Side-effecting pass-through operators.

use super::UnaryOperator;
use crate::multiset::Multiset;
use crate::stream::DifferenceStream;
use core::fmt::Debug;
use tracing::debug;

impl<T: Clone + 'static> DifferenceStream<T> {
    /// Calls `f` with every value and multiplicity of each batch as it is
    /// propagated, then passes the batch through unchanged.
    pub fn effect<F>(&self, f: F) -> DifferenceStream<T>
    where
        F: Fn(&T, i64) + 'static,
    {
        UnaryOperator::spawn(
            self,
            Box::new(move |_, data: Multiset<T>| {
                for entry in data.iter() {
                    f(&entry.value, entry.multiplicity);
                }
                Ok(data)
            }),
        )
    }

    /// Logs every entry under `label` at debug level and passes the batch
    /// through unchanged.
    pub fn debug(&self, label: impl Into<String>) -> DifferenceStream<T>
    where
        T: Debug,
    {
        let label = label.into();
        UnaryOperator::spawn(
            self,
            Box::new(move |version, data: Multiset<T>| {
                for entry in data.iter() {
                    debug!(
                        target: "zql::stream",
                        label = %label,
                        version,
                        multiplicity = entry.multiplicity,
                        value = ?entry.value,
                    );
                }
                Ok(data)
            }),
        )
    }
}
