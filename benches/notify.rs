use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use kyrobus::{EventVariable, Listener, ListenerConfig, UserTrigger};

fn bench_notify_and_drain(c: &mut Criterion) {
    let variable = EventVariable::new("bench");
    let notifier = variable.notifier(17).expect("slot in range");
    let waiter = variable.waiter();

    let mut group = c.benchmark_group("event_variable");
    group.throughput(Throughput::Elements(1));
    group.bench_function("notify", |b| b.iter(|| notifier.notify()));
    group.bench_function("notify_then_drain", |b| {
        b.iter(|| {
            notifier.notify();
            waiter.timed_wait(Duration::ZERO)
        });
    });
    group.finish();
}

fn bench_listener_round_trip(c: &mut Criterion) {
    static DISPATCHED: AtomicU64 = AtomicU64::new(0);

    let listener = Listener::with_config(ListenerConfig::with_capacity(1)).expect("listener");
    let trigger = Arc::new(UserTrigger::new());
    listener
        .attach_event(&trigger, |_: &UserTrigger| {
            DISPATCHED.fetch_add(1, Ordering::Release);
        })
        .expect("attach");

    c.bench_function("listener/trigger_to_callback", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let before = DISPATCHED.load(Ordering::Acquire);
                trigger.trigger();
                while DISPATCHED.load(Ordering::Acquire) == before {
                    std::hint::spin_loop();
                }
            }
            start.elapsed()
        });
    });
}

fn bench_attach_detach(c: &mut Criterion) {
    let listener = Listener::new().expect("listener");
    let trigger = Arc::new(UserTrigger::new());

    c.bench_function("listener/attach_detach", |b| {
        b.iter(|| {
            listener.attach_event(&trigger, |_: &UserTrigger| {}).expect("attach");
            listener.detach_event(&trigger);
        });
    });
}

criterion_group!(benches, bench_notify_and_drain, bench_listener_round_trip, bench_attach_detach);
criterion_main!(benches);
