//! Benchmarks for the append hot path.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use logflume_ingest::{
    AppenderConfig, FixedWindowRollingPolicy, LogEvent, RollingAppender, SizeTriggeringPolicy,
};
use logflume_storage::LocalStorage;

fn appender(dir: &TempDir, max_bytes: u64) -> RollingAppender {
    let config = AppenderConfig::new(dir.path(), "program.log")
        .with_dir_permissions("750")
        .with_file_permissions("640");
    RollingAppender::new(
        &config,
        0,
        Arc::new(LocalStorage::new()),
        Box::new(SizeTriggeringPolicy::new(max_bytes)),
        Box::new(FixedWindowRollingPolicy::new(3)),
    )
    .unwrap()
}

fn event(application: &str) -> LogEvent {
    LogEvent::new(1_700_000_000_000, "2024-01-01 INFO worker started\n")
        .with_tag("namespace", "bench")
        .with_tag("application", application)
}

fn bench_append_single_stream(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let appender = appender(&dir, u64::MAX);
    let event = event("app");

    c.bench_function("append_single_stream", |b| {
        b.iter(|| {
            black_box(appender.append(black_box(&event)));
        });
    });
}

fn bench_append_many_streams(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let appender = appender(&dir, u64::MAX);
    let events: Vec<LogEvent> = (0..64).map(|i| event(&format!("app-{i}"))).collect();

    c.bench_function("append_64_streams", |b| {
        let mut next = 0usize;
        b.iter(|| {
            black_box(appender.append(&events[next % events.len()]));
            next += 1;
        });
    });
}

fn bench_append_with_rollover(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    // Roll every ~4 KiB so the bench exercises the rollover path too.
    let appender = appender(&dir, 4 * 1024);
    let event = event("app");

    c.bench_function("append_with_rollover", |b| {
        b.iter(|| {
            black_box(appender.append(black_box(&event)));
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_stream,
    bench_append_many_streams,
    bench_append_with_rollover
);
criterion_main!(benches);
