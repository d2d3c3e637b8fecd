use criterion::{Criterion, black_box, criterion_group, criterion_main};

use dilutor_core::pi::{PiParams, compute, compute_all};

// Generate a synthetic OD trace: slow drift toward the setpoint with
// additive white noise
fn synth_ods(n: usize, seed: u32) -> Vec<f64> {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|i| 0.3 + 0.4 * (i as f64 / n as f64) + (next_f64() - 0.5) * 0.02)
        .collect()
}

pub fn bench_pi(c: &mut Criterion) {
    let params = PiParams {
        ki: 1.0,
        kp: 5.0,
        min_dilution: 0.0,
        max_dilution: 400.0,
    };

    c.bench_function("pi_compute_single", |b| {
        b.iter(|| compute(black_box(0.72), black_box(0.6), black_box(90.0), &params))
    });

    let trace = synth_ods(8, 7);
    c.bench_function("pi_compute_all_8_chambers", |b| {
        let setpoints = vec![0.6; 8];
        b.iter(|| {
            let mut integrals = vec![90.0; 8];
            compute_all(
                black_box(&trace),
                black_box(&setpoints),
                &mut integrals,
                90.0,
                &params,
            )
        })
    });
}

criterion_group!(benches, bench_pi);
criterion_main!(benches);
