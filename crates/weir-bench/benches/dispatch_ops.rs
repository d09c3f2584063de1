//! Criterion micro-benchmarks for command dispatch through a session.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weir_bench::{fill_pattern, vec3_registry, Vec3Slots, DOT_OP, NORMALIZE_OP};
use weir_core::ElementKind;
use weir_engine::{RealtimeSession, Session, SessionConfig};
use weir_test_utils::{negate_registry, negate_session, NEGATE_LEN, NEGATE_OP};

/// Benchmark: lockstep submit, dispatch, and poll of one negate call.
fn bench_lockstep_negate(c: &mut Criterion) {
    let mut session = negate_session(1 << 16);
    let input = session.host().allocate_tensor(ElementKind::F32, &[NEGATE_LEN]).unwrap();
    let output = session.host().allocate_tensor(ElementKind::F32, &[NEGATE_LEN]).unwrap();
    session.host().write_as(&input, &vec![1.5f32; NEGATE_LEN as usize]).unwrap();

    c.bench_function("lockstep_negate_f32x64", |b| {
        b.iter(|| {
            let outcome = session.call(NEGATE_OP, &[input.clone()], output.clone()).unwrap();
            black_box(outcome.unwrap());
        });
    });
}

/// Benchmark: one vector cycle on 1024 3-vectors (write, normalize, dot).
fn bench_lockstep_vec3_1024(c: &mut Criterion) {
    let mut session =
        Session::new(SessionConfig::with_arena_capacity(1 << 16), vec3_registry()).unwrap();
    let slots = Vec3Slots::allocate(session.host(), 1024).unwrap();
    let mut payload = vec![0u8; slots.vectors.length as usize];
    let mut cycle = 0u64;

    c.bench_function("lockstep_vec3_cycle_1024", |b| {
        b.iter(|| {
            fill_pattern(&mut payload, cycle);
            cycle += 1;
            session.host().write(&slots.vectors, &payload).unwrap();
            let normalized = session
                .call(NORMALIZE_OP, &[slots.vectors.clone()], slots.normalized.clone())
                .unwrap();
            let dot = session
                .call(
                    DOT_OP,
                    &[slots.flat_vectors.clone(), slots.flat_normalized.clone()],
                    slots.dot.clone(),
                )
                .unwrap();
            black_box((normalized.unwrap(), dot.unwrap()));
        });
    });
}

/// Benchmark: round trip of one negate call through the dispatch thread.
fn bench_realtime_negate(c: &mut Criterion) {
    let mut session =
        RealtimeSession::new(SessionConfig::with_arena_capacity(1 << 16), negate_registry())
            .unwrap();
    let input = session.allocate_tensor(ElementKind::F32, &[NEGATE_LEN]).unwrap();
    let output = session.allocate_tensor(ElementKind::F32, &[NEGATE_LEN]).unwrap();
    session.write_as(&input, &vec![1.5f32; NEGATE_LEN as usize]).unwrap();

    c.bench_function("realtime_negate_f32x64", |b| {
        b.iter(|| {
            let outcome = session
                .call(NEGATE_OP, &[input.clone()], output.clone(), Duration::from_secs(1))
                .unwrap();
            black_box(outcome.unwrap());
        });
    });
    session.shutdown();
}

criterion_group!(
    benches,
    bench_lockstep_negate,
    bench_lockstep_vec3_1024,
    bench_realtime_negate
);
criterion_main!(benches);
