//! Variant benchmark: JSON round trip and dictionary merge of a typical event.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use edr_agent::variant::{json, merge, MergeMode, Variant};
use edr_agent::{dict, seq};

fn make_event(i: i64) -> Variant {
    dict! {
        "type" => "fileWrite",
        "path" => format!("/home/user/documents/file_{i}.txt"),
        "pid" => i,
        "removable" => i % 2 == 0,
        "tags" => seq!["io", "user", i],
        "process" => dict! { "name" => "bench", "ppid" => 1, "cmdline" => "bench --write" },
    }
}

fn bench_json_roundtrip(c: &mut Criterion) {
    let events: Variant = (0..100).map(make_event).collect::<Vec<_>>().into();

    c.bench_function("json_roundtrip_100_events", |b| {
        b.iter(|| {
            let text = json::serialize(black_box(&events)).unwrap();
            black_box(json::deserialize(&text).unwrap())
        })
    });
}

fn bench_merge(c: &mut Criterion) {
    let defaults = make_event(1);
    let call = dict! { "pid" => 7, "process" => dict! { "name" => "other" }, "extra" => true };

    c.bench_function("merge_shallow", |b| {
        b.iter(|| black_box(merge(black_box(&defaults), black_box(&call), MergeMode::empty()).unwrap()))
    });
    c.bench_function("merge_nested", |b| {
        b.iter(|| black_box(merge(black_box(&defaults), black_box(&call), MergeMode::ALL).unwrap()))
    });
}

criterion_group!(benches, bench_json_roundtrip, bench_merge);
criterion_main!(benches);
