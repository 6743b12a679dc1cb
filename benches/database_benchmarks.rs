//! Criterion benchmarks for rust_fbclient

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_fbclient::core::attributes::{
    AttributeBuffer, DPB_LC_CTYPE, DPB_PASSWORD, DPB_SQL_ROLE_NAME, DPB_USER_NAME,
};
use rust_fbclient::core::info::{
    InfoBuilder, ResultBuffer, INFO_INSERT_COUNT, INFO_ODS_VERSION, INFO_PAGE_SIZE,
};
use rust_fbclient::prelude::*;
use std::sync::Arc;

// ============================================================================
// Parameter Buffer Benchmarks
// ============================================================================

fn bench_attribute_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribute_buffer");
    group.throughput(Throughput::Elements(1));

    group.bench_function("build_connect_dpb", |b| {
        b.iter(|| {
            let mut dpb = AttributeBuffer::new();
            dpb.insert(DPB_USER_NAME, black_box("SYSDBA")).unwrap();
            dpb.insert(DPB_PASSWORD, black_box("masterkey")).unwrap();
            dpb.insert(DPB_SQL_ROLE_NAME, black_box("RDB$ADMIN")).unwrap();
            dpb.insert(DPB_LC_CTYPE, black_box("UTF8")).unwrap();
            black_box(dpb)
        });
    });

    group.finish();
}

// ============================================================================
// Result Buffer Benchmarks
// ============================================================================

fn bench_result_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_buffer");

    let facts = InfoBuilder::new()
        .int(INFO_ODS_VERSION, 12)
        .int(INFO_PAGE_SIZE, 8192)
        .end()
        .into_bytes();
    let result = ResultBuffer::from_bytes(facts);
    group.bench_function("get_value", |b| {
        b.iter(|| black_box(result.get_value(black_box(INFO_PAGE_SIZE))));
    });

    for tables in [10u16, 100, 1000] {
        let counts: Vec<(u16, u32)> = (0..tables).map(|t| (t, t as u32 * 3)).collect();
        let bytes = InfoBuilder::new()
            .counts(INFO_INSERT_COUNT, &counts)
            .end()
            .into_bytes();
        let result = ResultBuffer::from_bytes(bytes);
        group.throughput(Throughput::Elements(tables as u64));
        group.bench_with_input(BenchmarkId::new("count_value", tables), &result, |b, r| {
            b.iter(|| black_box(r.get_count_value(INFO_INSERT_COUNT)));
        });
    }

    for users in [1usize, 50, 500] {
        let bytes = (0..users)
            .fold(InfoBuilder::new(), |builder, i| builder.user(&format!("USER_{}", i)))
            .end()
            .into_bytes();
        let result = ResultBuffer::from_bytes(bytes);
        group.throughput(Throughput::Elements(users as u64));
        group.bench_with_input(BenchmarkId::new("user_names", users), &result, |b, r| {
            b.iter(|| black_box(r.user_names()));
        });
    }

    group.finish();
}

// ============================================================================
// Connection Lifecycle Benchmarks
// ============================================================================

fn bench_connection_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("connection_lifecycle");

    let driver = Arc::new(MemoryDriver::new());
    driver.add_database("bench.fdb");

    group.bench_function("connect_disconnect", |b| {
        let db = Database::new(driver.clone(), ConnectionConfig::new("bench.fdb").user("SYSDBA"));
        b.iter(|| {
            db.connect().unwrap();
            db.disconnect().unwrap();
        });
    });

    for dependents in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(dependents as u64));
        group.bench_with_input(
            BenchmarkId::new("inactivate", dependents),
            &dependents,
            |b, &count| {
                let db = Database::new(
                    driver.clone(),
                    ConnectionConfig::new("bench.fdb").user("SYSDBA"),
                );
                db.connect().unwrap();
                b.iter(|| {
                    let held: Vec<_> = (0..count)
                        .map(|_| {
                            let tr = Transaction::new(&db).unwrap();
                            tr.start().unwrap();
                            let stmt = Statement::new(&db).unwrap();
                            stmt.prepare("SELECT 1 FROM RDB$DATABASE").unwrap();
                            (tr, stmt)
                        })
                        .collect();
                    db.inactivate().unwrap();
                    black_box(held)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_attribute_buffer,
    bench_result_buffer,
    bench_connection_lifecycle
);
criterion_main!(benches);
