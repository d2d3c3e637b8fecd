use rstest::rstest;

use dilutor_core::pi::{PiParams, compute, compute_all};

fn params() -> PiParams {
    PiParams {
        ki: 1.0,
        kp: 5.0,
        min_dilution: 0.0,
        max_dilution: 400.0,
    }
}

#[test]
fn at_setpoint_first_tick_emits_the_seed() {
    // No persisted integral yet: the seed carries straight through when
    // the error is zero.
    let mut integrals = Vec::new();
    let out = compute_all(&[0.6], &[0.6], &mut integrals, 90.0, &params());
    assert_eq!(out, vec![Some(90)]);
    assert_eq!(integrals, vec![90.0]);
}

#[test]
fn oversized_seed_is_capped_by_the_actuator_limit() {
    let mut integrals = Vec::new();
    let out = compute_all(&[0.6], &[0.6], &mut integrals, 1000.0, &params());
    assert_eq!(out, vec![Some(400)]);
}

#[test]
fn integral_never_winds_up_past_max_dilution() {
    // Sustained large positive error for many ticks.
    let p = params();
    let mut integral = 0.0;
    for _ in 0..200 {
        let out = compute(1.4, 0.6, integral, &p);
        integral = out.integral;
        assert!(integral <= p.max_dilution, "integral wound up to {integral}");
        assert!(out.dilution <= p.max_dilution as i64);
    }
    // And it actually saturates rather than hovering below.
    assert_eq!(integral, p.max_dilution);
}

#[rstest]
// Deep negative error: output pinned at the minimum.
#[case(0.1, 0.9, 10)]
// Deep positive error: output pinned at the maximum.
#[case(1.9, 0.2, 400)]
// At setpoint: the accumulator carries through unchanged.
#[case(0.6, 0.6, 50)]
fn output_saturates_at_the_actuator_limits(
    #[case] od: f64,
    #[case] setpoint: f64,
    #[case] expected: i64,
) {
    let p = PiParams {
        ki: 1.0,
        kp: 5.0,
        min_dilution: 10.0,
        max_dilution: 400.0,
    };
    assert_eq!(compute(od, setpoint, 50.0, &p).dilution, expected);
}

#[test]
fn unavailable_chamber_is_skipped_entirely() {
    let mut integrals = vec![90.0, 120.0];
    let out = compute_all(&[0.0, 0.7], &[0.6, 0.6], &mut integrals, 90.0, &params());
    assert_eq!(out[0], None);
    assert!(out[1].is_some());
    // Skipped chamber's accumulator is untouched.
    assert_eq!(integrals[0], 90.0);
    assert_ne!(integrals[1], 120.0);
}

#[test]
fn integral_tracks_error_sign() {
    let p = params();
    // Above setpoint: accumulator grows (more dilution needed).
    let up = compute(0.7, 0.6, 90.0, &p);
    assert!(up.integral > 90.0);
    // Below setpoint: accumulator shrinks.
    let down = compute(0.5, 0.6, 90.0, &p);
    assert!(down.integral < 90.0);
}
