//! Benchmarks for zql-incremental.
//!
//! Target: single record propagated through a small pipeline < 100μs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use zql_core::predicate::Operand;
use zql_core::Record;
use zql_incremental::{Entry, IncrementalAvg, IncrementalCount, IncrementalSum, Materialite, Multiset};
use zql_index::FieldComparator;

fn make_record(id: u64, age: i64) -> Record {
    Record::new().with("id", format!("r{id}")).with("age", age)
}

fn bench_multiset(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiset");

    for size in [10, 100, 1000] {
        let data: Multiset<i64> = (0..size).map(|i| Entry::new(i % 50, if i % 3 == 0 { -1 } else { 1 })).collect();

        group.bench_with_input(BenchmarkId::new("filter_map", size), &data, |b, data| {
            b.iter(|| data.filter(|x| *x > 10).map(|x| x * 2).to_vec())
        });

        group.bench_with_input(BenchmarkId::new("consolidate", size), &data, |b, data| {
            b.iter(|| black_box(data.consolidate()))
        });
    }

    group.finish();
}

fn bench_running_aggregates(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate/running");

    group.bench_function("count", |b| {
        let mut count = IncrementalCount::new();
        b.iter(|| count.apply(black_box(1)))
    });

    group.bench_function("sum", |b| {
        let mut sum = IncrementalSum::new();
        b.iter(|| sum.apply(black_box(2.5)))
    });

    group.bench_function("avg", |b| {
        let mut avg = IncrementalAvg::new();
        b.iter(|| avg.apply(black_box(10.0), black_box(1)))
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    group.bench_function("filter_single_insert", |b| {
        let m = Materialite::new();
        let source = m.new_stateless_source();
        let out = source
            .stream()
            .where_("age", ">", Operand::scalar(18i64))
            .expect("valid predicate");
        let mut id = 0;
        b.iter(|| {
            id += 1;
            source.add(black_box(make_record(id, 25))).expect("commit");
        });
        drop(out);
    });

    for size in [10, 100, 1000] {
        let records: Vec<Record> = (0..size).map(|i| make_record(i, (i % 50) as i64)).collect();

        group.bench_with_input(BenchmarkId::new("count_batch", size), &records, |b, records| {
            let m = Materialite::new();
            let source = m.new_stateless_source();
            let out = source.stream().count("n");
            b.iter(|| source.seed(black_box(records.clone())).expect("commit"));
            drop(out);
        });
    }

    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");

    group.bench_function("single_left_insert", |b| {
        let m = Materialite::new();
        let employees = m.new_stateless_source();
        let departments = m.new_set_source(FieldComparator::by_id());
        departments
            .seed((0..10).map(|i| Record::new().with("id", i as i64).with("name", format!("Dept{i}"))))
            .expect("seed");
        let joined = employees.stream().join_records(
            &departments.stream(),
            zql_incremental::JoinSide::aliased("emp", "dept"),
            zql_incremental::JoinSide::aliased("dept", "id"),
        );
        let mut id = 0u64;
        b.iter(|| {
            id += 1;
            let emp = Record::new().with("id", format!("e{id}")).with("dept", (id % 10) as i64);
            employees.add(black_box(emp)).expect("commit");
        });
        drop(joined);
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_multiset,
    bench_running_aggregates,
    bench_pipeline,
    bench_join,
);

criterion_main!(benches);
