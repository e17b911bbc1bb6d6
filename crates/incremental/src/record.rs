//! Operator builders for record streams.
//!
//! These are the construction calls a query compiler emits: projections,
//! `where` clauses, aliased joins producing join results, and grouped
//! aggregates. Each returns a new stream and leaves its inputs untouched.

use crate::operators::JoinArgs;
use crate::stream::DifferenceStream;
use zql_core::predicate::{Operand, SimpleOperator};
use zql_core::{Record, Result, Value, ID_FIELD};

/// One side of a record join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinSide {
    alias: Option<String>,
    key: String,
}

impl JoinSide {
    /// Nests this side's records under `alias` in the join result.
    pub fn aliased(alias: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            key: key.into(),
        }
    }

    /// For a side that is already a join result: its fields are merged into
    /// the output instead of nested.
    pub fn flattened(key: impl Into<String>) -> Self {
        Self {
            alias: None,
            key: key.into(),
        }
    }

    /// Alias this side is nested under; `None` when flattened.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Dotted path of the join key.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn place(&self, out: &mut Record, record: &Record) {
        match &self.alias {
            Some(alias) => {
                out.set(alias.clone(), record.clone());
            }
            None => {
                for (field, value) in record.fields() {
                    if field != ID_FIELD {
                        out.set(field, value.clone());
                    }
                }
            }
        }
    }
}

/// Builds the join result of a matched pair: `id` is `<left id>_<right id>`.
fn join_result(left_side: &JoinSide, left: &Record, right_side: &JoinSide, right: &Record) -> Record {
    let mut out = Record::new();
    left_side.place(&mut out, left);
    right_side.place(&mut out, right);
    out.set(ID_FIELD, format!("{}_{}", left.identity(), right.identity()));
    out
}

/// A per-group aggregate computed by `group_by`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregation {
    /// Number of rows in the group
    Count { alias: String },
    /// Sum of a numeric field
    Sum { field: String, alias: String },
    /// Mean of a numeric field
    Avg { field: String, alias: String },
    /// Smallest non-null value of a field
    Min { field: String, alias: String },
    /// Largest non-null value of a field
    Max { field: String, alias: String },
}

impl Aggregation {
    /// Row count, written to `alias`.
    pub fn count(alias: impl Into<String>) -> Self {
        Aggregation::Count { alias: alias.into() }
    }

    /// Sum of `field`, written to `alias`.
    pub fn sum(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Aggregation::Sum {
            field: field.into(),
            alias: alias.into(),
        }
    }

    /// Mean of `field`, written to `alias`.
    pub fn avg(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Aggregation::Avg {
            field: field.into(),
            alias: alias.into(),
        }
    }

    /// Smallest value of `field`, written to `alias`.
    pub fn min(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Aggregation::Min {
            field: field.into(),
            alias: alias.into(),
        }
    }

    /// Largest value of `field`, written to `alias`.
    pub fn max(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Aggregation::Max {
            field: field.into(),
            alias: alias.into(),
        }
    }

    /// Output field name.
    pub fn alias(&self) -> &str {
        match self {
            Aggregation::Count { alias }
            | Aggregation::Sum { alias, .. }
            | Aggregation::Avg { alias, .. }
            | Aggregation::Min { alias, .. }
            | Aggregation::Max { alias, .. } => alias,
        }
    }

    fn evaluate(&self, members: &[(&Record, i64)]) -> Value {
        match self {
            Aggregation::Count { .. } => Value::Int64(members.iter().map(|(_, m)| m).sum()),
            Aggregation::Sum { field, .. } => {
                Value::Float64(numeric(members, field).map(|(n, m)| n * m as f64).sum())
            }
            Aggregation::Avg { field, .. } => {
                let (sum, count) = numeric(members, field)
                    .fold((0.0, 0i64), |(s, c), (n, m)| (s + n * m as f64, c + m));
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float64(sum / count as f64)
                }
            }
            Aggregation::Min { field, .. } => present(members, field).min().cloned().unwrap_or(Value::Null),
            Aggregation::Max { field, .. } => present(members, field).max().cloned().unwrap_or(Value::Null),
        }
    }
}

/// Numeric values of `field` with their multiplicities.
fn numeric<'a>(members: &'a [(&'a Record, i64)], field: &'a str) -> impl Iterator<Item = (f64, i64)> + 'a {
    members
        .iter()
        .filter_map(move |(record, m)| record.get_path(field).and_then(Value::to_f64).map(|n| (n, *m)))
}

/// Non-null values of `field`.
fn present<'a>(members: &'a [(&'a Record, i64)], field: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    members
        .iter()
        .filter_map(move |(record, _)| record.get_path(field))
        .filter(|v| !v.is_null())
}

impl DifferenceStream<Record> {
    /// Projects `fields` (dotted paths allowed). `id` is always kept.
    pub fn select<S: AsRef<str>>(&self, fields: &[S]) -> DifferenceStream<Record> {
        let mut fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
        if !fields.iter().any(|f| f == ID_FIELD) {
            fields.insert(0, ID_FIELD.to_string());
        }
        self.map(move |record| record.project(&fields))
    }

    /// Keeps the records where `field <op> operand` holds. `op` is one of
    /// `= < > >= <= IN LIKE ILIKE`. Records lacking the field, or holding
    /// null there, never match.
    pub fn where_(&self, field: impl Into<String>, op: &str, operand: Operand) -> Result<DifferenceStream<Record>> {
        let op = SimpleOperator::parse(op)?;
        op.validate(&operand)?;
        let field = field.into();
        Ok(self.filter(move |record| match record.get_path(&field) {
            Some(value) if !value.is_null() => op.evaluate(value, &operand).unwrap_or(false),
            _ => false,
        }))
    }

    /// Inner-joins with `other` where `left.key` equals `right.key`.
    ///
    /// Each matched pair becomes a record with id `<left id>_<right id>`;
    /// an aliased side is nested under its alias, a flattened side (itself
    /// a join result) has its fields merged in, so chained joins stay one
    /// level deep.
    pub fn join_records(&self, other: &DifferenceStream<Record>, left: JoinSide, right: JoinSide) -> DifferenceStream<Record> {
        let (left_key, right_key) = (left.key.clone(), right.key.clone());
        let args = JoinArgs::new(
            move |r: &Record| r.get_path(&left_key).cloned().unwrap_or(Value::Null),
            move |r: &Record| r.get_path(&right_key).cloned().unwrap_or(Value::Null),
            Record::identity,
            Record::identity,
            move |l: &Record, r: &Record| join_result(&left, l, &right, r),
        );
        self.join(other, args)
    }

    /// Groups by `fields` and computes `aggregations` per group.
    ///
    /// Output records hold the group fields, one field per aggregation, and
    /// an `id` made of the group values joined by `_`.
    pub fn group_by<S: AsRef<str>>(&self, fields: &[S], aggregations: Vec<Aggregation>) -> DifferenceStream<Record> {
        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
        let key_fields = fields.clone();
        self.reduce(
            move |record: &Record| -> Vec<Value> {
                key_fields
                    .iter()
                    .map(|f| record.get_path(f).cloned().unwrap_or(Value::Null))
                    .collect()
            },
            Record::identity,
            move |members: &[(&Record, i64)]| {
                let mut out = Record::new();
                let mut id = Vec::with_capacity(fields.len());
                if let Some((first, _)) = members.first() {
                    for field in &fields {
                        let value = first.get_path(field).cloned().unwrap_or(Value::Null);
                        id.push(value.to_string());
                        out.set(field.clone(), value);
                    }
                }
                for aggregation in &aggregations {
                    out.set(aggregation.alias(), aggregation.evaluate(members));
                }
                out.set(ID_FIELD, id.join("_"));
                out
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialite::Materialite;
    use crate::multiset::{Entry, Multiset};
    use crate::stream::tests::Recorder;
    use zql_index::FieldComparator;

    fn issue(id: &str, status: &str, n: i64) -> Record {
        Record::new()
            .with("id", id)
            .with("status", status)
            .with("n", n)
    }

    fn net(entries: Vec<Entry<Record>>) -> Vec<Record> {
        Multiset::new(entries)
            .consolidate()
            .into_iter()
            .filter(|e| e.multiplicity > 0)
            .map(|e| e.value)
            .collect()
    }

    #[test]
    fn test_select_keeps_id() {
        let m = Materialite::new();
        let source = m.new_stateless_source();
        let out = source.stream().select(&["n"]);
        let (rec, _) = Recorder::attach(&out);
        source.add(issue("a", "open", 1)).unwrap();
        assert_eq!(
            rec.entries(),
            vec![Entry::insert(Record::new().with("id", "a").with("n", 1i64))]
        );
    }

    #[test]
    fn test_where_operators() {
        let m = Materialite::new();
        let source = m.new_stateless_source();
        let stream = source.stream();
        let gt = stream.where_("n", ">", Operand::scalar(100i64)).unwrap();
        let within = stream
            .where_("status", "IN", Operand::list(["open", "blocked"]))
            .unwrap();
        let like = stream.where_("id", "like", Operand::scalar("b%")).unwrap();
        let (gt_rec, _) = Recorder::attach(&gt);
        let (in_rec, _) = Recorder::attach(&within);
        let (like_rec, _) = Recorder::attach(&like);

        source
            .seed(vec![
                issue("a", "open", 1),
                issue("b1", "closed", 101),
                Record::new().with("id", "b2"),
            ])
            .unwrap();

        assert_eq!(gt_rec.entries().len(), 1);
        assert_eq!(in_rec.entries().len(), 1);
        assert_eq!(like_rec.entries().len(), 2);
    }

    #[test]
    fn test_where_rejects_bad_input() {
        let stream = DifferenceStream::<Record>::new();
        assert!(stream.where_("n", "!=", Operand::scalar(1i64)).is_err());
        assert!(stream.where_("n", "IN", Operand::scalar(1i64)).is_err());
    }

    #[test]
    fn test_join_records_nests_and_flattens() {
        let m = Materialite::new();
        let issues = m.new_set_source(FieldComparator::by_id());
        let labels = m.new_set_source(FieldComparator::by_id());
        let owners = m.new_set_source(FieldComparator::by_id());

        let issue_label = issues.stream().join_records(
            &labels.stream(),
            JoinSide::aliased("issue", "id"),
            JoinSide::aliased("label", "issue_id"),
        );
        let with_owner = issue_label.join_records(
            &owners.stream(),
            JoinSide::flattened("issue.owner"),
            JoinSide::aliased("owner", "id"),
        );
        let (rec, _) = Recorder::attach(&with_owner);

        m.tx(|| {
            issues.add(Record::new().with("id", "i1").with("owner", "u1"))?;
            labels.add(Record::new().with("id", "l1").with("issue_id", "i1"))?;
            owners.add(Record::new().with("id", "u1").with("name", "ann"))
        })
        .unwrap();

        let rows = net(rec.entries());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.identity(), "i1_l1_u1");
        assert_eq!(row.get_path("issue.owner"), Some(&Value::from("u1")));
        assert_eq!(row.get_path("label.id"), Some(&Value::from("l1")));
        assert_eq!(row.get_path("owner.name"), Some(&Value::from("ann")));
        assert!(row.get_path("issue.id").is_some());
        assert!(row.get("issue_label").is_none());

        // Retracting one side retracts the joined row.
        labels
            .delete(Record::new().with("id", "l1"))
            .unwrap();
        assert!(net(rec.entries()).is_empty());
    }

    #[test]
    fn test_group_by() {
        let m = Materialite::new();
        let source = m.new_set_source(FieldComparator::by_id());
        let out = source.stream().group_by(
            &["status"],
            vec![
                Aggregation::count("count"),
                Aggregation::sum("n", "total"),
                Aggregation::avg("n", "mean"),
                Aggregation::min("n", "low"),
                Aggregation::max("n", "high"),
            ],
        );
        let (rec, _) = Recorder::attach(&out);

        m.tx(|| {
            source.add(issue("a", "open", 1))?;
            source.add(issue("b", "open", 3))?;
            source.add(issue("c", "closed", 10))
        })
        .unwrap();
        source.delete(issue("a", "open", 1)).unwrap();

        let mut rows = net(rec.entries());
        rows.sort_by_key(|r| r.identity());
        assert_eq!(rows.len(), 2);
        let open = &rows[1];
        assert_eq!(open.identity(), "open");
        assert_eq!(open.get("count"), Some(&Value::Int64(1)));
        assert_eq!(open.get("total"), Some(&Value::Float64(3.0)));
        assert_eq!(open.get("mean"), Some(&Value::Float64(3.0)));
        assert_eq!(open.get("low"), Some(&Value::Int64(3)));
        assert_eq!(open.get("high"), Some(&Value::Int64(3)));
        assert_eq!(rows[0].get("count"), Some(&Value::Int64(1)));
    }

    #[test]
    fn test_side_and_aggregation_accessors() {
        let nested = JoinSide::aliased("track", "album_id");
        assert_eq!(nested.alias(), Some("track"));
        assert_eq!(nested.key(), "album_id");
        assert_eq!(JoinSide::flattened("id").alias(), None);

        let aggs = [
            Aggregation::count("total"),
            Aggregation::sum("n", "sum_n"),
            Aggregation::avg("n", "avg_n"),
            Aggregation::min("n", "min_n"),
            Aggregation::max("n", "max_n"),
        ];
        let aliases: Vec<&str> = aggs.iter().map(Aggregation::alias).collect();
        assert_eq!(aliases, vec!["total", "sum_n", "avg_n", "min_n", "max_n"]);
        assert_eq!(aggs[1], Aggregation::Sum { field: "n".into(), alias: "sum_n".into() });
    }

    #[test]
    fn test_aggregation_evaluate_empty_field() {
        let r = Record::new().with("id", "a");
        let members = [(&r, 1)];
        assert_eq!(Aggregation::avg("n", "x").evaluate(&members), Value::Null);
        assert_eq!(Aggregation::max("n", "x").evaluate(&members), Value::Null);
        assert_eq!(Aggregation::count("x").evaluate(&members), Value::Int64(1));
    }
}
