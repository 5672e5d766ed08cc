//! Scenario benchmark: notification fan-out through thread pools (low-power device target).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use edr_agent::object::{put_catalog_data, CommandProcessor, ObjPtr, Object, Service};
use edr_agent::scenario::{Priority, ScenarioManager, ThreadPool};
use edr_agent::{dict, seq, Result, Variant};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Tick(AtomicU64);

impl Object for Tick {
    fn class_id(&self) -> u32 {
        0x0B0E_0002
    }

    fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
        Some(self)
    }
}

impl CommandProcessor for Tick {
    fn execute(&self, _command: &Variant, _params: &Variant) -> Result<Variant> {
        Ok(Variant::from(self.0.fetch_add(1, Ordering::Relaxed) as i64))
    }
}

fn bench_thread_pool(c: &mut Criterion) {
    let pool = ThreadPool::new("bench", 4, Priority::Normal).unwrap();
    let counter = Arc::new(AtomicU64::new(0));

    c.bench_function("thread_pool_1000_tasks", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                let counter = Arc::clone(&counter);
                pool.run(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            }
            pool.drain();
        })
    });
}

fn bench_scenario_notify(c: &mut Criterion) {
    let obj: ObjPtr = Arc::new(Tick::default());
    put_catalog_data("bench.tick", obj);
    let step = dict! { "processor" => "bench.tick", "command" => "tick" };

    for collect in [false, true] {
        let manager = ScenarioManager::from_config(&dict! {
            "scenarios" => dict! { "s" => dict! { "code" => seq![step.clone(), step.clone(), step.clone()] } },
            "collectStatistic" => collect,
        })
        .unwrap();
        manager.start().unwrap();

        let name = if collect { "scenario_notify_100_with_statistic" } else { "scenario_notify_100" };
        c.bench_function(name, |b| {
            b.iter(|| {
                for _ in 0..100 {
                    manager.notify(black_box("s"));
                }
                manager.wait_idle();
            })
        });
        manager.stop().unwrap();
    }
}

criterion_group!(benches, bench_thread_pool, bench_scenario_notify);
criterion_main!(benches);
