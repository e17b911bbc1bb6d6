//! Whole-stream aggregates over records.
//!
//! Unlike `reduce`, these keep one running value for the entire stream and
//! update it from each version's delta alone. Every version that carries
//! entries retracts the previously emitted row and inserts the new one.
//! Once every contributing row has been retracted, only the retraction is
//! emitted.

use super::UnaryOperator;
use crate::multiset::{Entry, Multiset};
use crate::stream::DifferenceStream;
use zql_core::{Error, Record, Result, Value};

/// Running COUNT.
#[derive(Clone, Debug, Default)]
pub struct IncrementalCount {
    count: i64,
}

impl IncrementalCount {
    /// Creates a count starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` rows (negative for retractions).
    pub fn apply(&mut self, delta: i64) {
        self.count += delta;
    }

    /// Returns the current count.
    #[inline]
    pub fn get(&self) -> i64 {
        self.count
    }
}

/// Running SUM.
#[derive(Clone, Debug, Default)]
pub struct IncrementalSum {
    sum: f64,
}

impl IncrementalSum {
    /// Creates a sum starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an already multiplicity-weighted delta.
    pub fn apply(&mut self, delta: f64) {
        self.sum += delta;
    }

    /// Returns the current sum.
    #[inline]
    pub fn get(&self) -> f64 {
        self.sum
    }
}

/// Running AVG, updated as
/// `(avg * count + delta_sum) / (count + delta_count)`.
#[derive(Clone, Debug, Default)]
pub struct IncrementalAvg {
    avg: f64,
    count: i64,
}

impl IncrementalAvg {
    /// Creates an average over no values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in a weighted sum over `delta_count` values. The average
    /// resets to 0 when no values remain.
    pub fn apply(&mut self, delta_sum: f64, delta_count: i64) {
        let count = self.count + delta_count;
        self.avg = if count == 0 {
            0.0
        } else {
            (self.avg * self.count as f64 + delta_sum) / count as f64
        };
        self.count = count;
    }

    /// Returns the current average.
    #[inline]
    pub fn get(&self) -> f64 {
        self.avg
    }

    /// Returns how many values the average covers.
    #[inline]
    pub fn count(&self) -> i64 {
        self.count
    }
}

enum Running {
    Count(IncrementalCount),
    Sum { field: String, sum: IncrementalSum },
    Avg { field: String, avg: IncrementalAvg },
}

impl Running {
    fn field(&self) -> Option<&str> {
        match self {
            Running::Count(_) => None,
            Running::Sum { field, .. } | Running::Avg { field, .. } => Some(field.as_str()),
        }
    }

    fn apply(&mut self, delta_rows: i64, delta_sum: f64, delta_count: i64) {
        match self {
            Running::Count(count) => count.apply(delta_rows),
            Running::Sum { sum, .. } => sum.apply(delta_sum),
            Running::Avg { avg, .. } => avg.apply(delta_sum, delta_count),
        }
    }

    fn value(&self) -> Value {
        match self {
            Running::Count(count) => Value::Int64(count.get()),
            Running::Sum { sum, .. } => Value::Float64(sum.get()),
            Running::Avg { avg, .. } => Value::Float64(avg.get()),
        }
    }

    fn reset(&mut self) {
        match self {
            Running::Count(count) => *count = IncrementalCount::new(),
            Running::Sum { sum, .. } => *sum = IncrementalSum::new(),
            Running::Avg { avg, .. } => *avg = IncrementalAvg::new(),
        }
    }
}

struct FullAggregate {
    running: Running,
    alias: String,
    rows: i64,
    last_row: Option<Record>,
}

impl FullAggregate {
    fn new(running: Running, alias: String) -> Self {
        Self {
            running,
            alias,
            rows: 0,
            last_row: None,
        }
    }

    fn apply(&mut self, data: &Multiset<Record>) -> Result<Vec<Entry<Record>>> {
        let mut saw_entry = false;
        let mut delta_rows = 0;
        let mut delta_sum = 0.0;
        let mut delta_count = 0;
        let mut first_insert = None;
        for entry in data.iter() {
            if entry.is_noop() {
                continue;
            }
            saw_entry = true;
            delta_rows += entry.multiplicity;
            if let Some(field) = self.running.field() {
                let value = entry
                    .value
                    .get_path(field)
                    .ok_or_else(|| Error::FieldNotFound(field.to_string()))?;
                if let Some(n) = value.to_f64() {
                    delta_sum += n * entry.multiplicity as f64;
                    delta_count += entry.multiplicity;
                }
            }
            if entry.is_insert() && first_insert.is_none() {
                first_insert = Some(entry.value);
            }
        }
        if !saw_entry {
            return Ok(Vec::new());
        }

        let rows = self.rows + delta_rows;
        if rows < 0 {
            return Err(Error::NegativeMultiplicity {
                identity: self.alias.clone(),
                multiplicity: rows,
            });
        }
        self.rows = rows;
        self.running.apply(delta_rows, delta_sum, delta_count);

        let mut output = Vec::with_capacity(2);
        let previous = self.last_row.take();
        if let Some(previous) = &previous {
            output.push(Entry::delete(previous.clone()));
        }
        if rows > 0 {
            let mut row = previous.or(first_insert).unwrap_or_default();
            row.set(self.alias.clone(), self.running.value());
            output.push(Entry::insert(row.clone()));
            self.last_row = Some(row);
        } else {
            self.running.reset();
        }
        Ok(output)
    }
}

impl DifferenceStream<Record> {
    fn full_aggregate(&self, running: Running, alias: String) -> DifferenceStream<Record> {
        let mut state = FullAggregate::new(running, alias);
        UnaryOperator::spawn(
            self,
            Box::new(move |_, data: Multiset<Record>| state.apply(&data).map(Multiset::new)),
        )
    }

    /// Counts the rows of the stream into field `alias`.
    pub fn count(&self, alias: impl Into<String>) -> DifferenceStream<Record> {
        self.full_aggregate(Running::Count(IncrementalCount::new()), alias.into())
    }

    /// Sums `field` over the stream into field `alias`. Rows whose field is
    /// not numeric contribute nothing; rows without the field are an error.
    pub fn sum(&self, field: impl Into<String>, alias: impl Into<String>) -> DifferenceStream<Record> {
        let running = Running::Sum {
            field: field.into(),
            sum: IncrementalSum::new(),
        };
        self.full_aggregate(running, alias.into())
    }

    /// Averages `field` over the stream into field `alias`, skipping
    /// non-numeric values.
    pub fn average(&self, field: impl Into<String>, alias: impl Into<String>) -> DifferenceStream<Record> {
        let running = Running::Avg {
            field: field.into(),
            avg: IncrementalAvg::new(),
        };
        self.full_aggregate(running, alias.into())
    }
}
