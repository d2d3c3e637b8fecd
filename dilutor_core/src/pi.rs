//! Proportional-integral dilution controller with anti-windup.
//!
//! Pure computation: the caller owns persistence of the returned
//! integral term. The error is scaled by 1000 so the gains operate on
//! OD-fraction-times-1000 units, matching the sensor resolution the
//! gains were tuned against.

/// Gains and actuator limits, shared across chambers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiParams {
    pub ki: f64,
    pub kp: f64,
    /// Actuator saturation limits in dilution command units
    /// (e.g. pump-cycle counts).
    pub min_dilution: f64,
    pub max_dilution: f64,
}

/// Result of one PI step for one chamber.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiOutput {
    /// Dilution command, truncated to actuator granularity.
    pub dilution: i64,
    /// Updated integral term; persist before the next tick.
    pub integral: f64,
}

/// One PI step.
///
/// The integral accumulator itself is clamped to `[0, max_dilution]`,
/// not just the final output, so it can never wind up beyond what the
/// actuator could ever deliver.
pub fn compute(od: f64, setpoint: f64, prior_integral: f64, params: &PiParams) -> PiOutput {
    debug_assert!(od.is_finite() && setpoint.is_finite(), "reject on ingest");
    let error = 1000.0 * (od - setpoint);
    let integral = (prior_integral + error * params.ki).clamp(0.0, params.max_dilution);
    let raw = integral + error * params.kp;
    let dilution = raw.clamp(params.min_dilution, params.max_dilution) as i64;
    PiOutput { dilution, integral }
}

/// PI step across all chambers.
///
/// `integral_state` is seeded with `seed` on first use (empty vector).
/// Chambers reporting the `0.0` "measurement unavailable" sentinel are
/// skipped: no command, integral untouched.
pub fn compute_all(
    ods: &[f64],
    setpoints: &[f64],
    integral_state: &mut Vec<f64>,
    seed: f64,
    params: &PiParams,
) -> Vec<Option<i64>> {
    if integral_state.is_empty() {
        integral_state.resize(setpoints.len(), seed);
    }
    ods.iter()
        .zip(setpoints)
        .enumerate()
        .map(|(i, (&od, &setpoint))| {
            if od == 0.0 {
                return None;
            }
            let out = compute(od, setpoint, integral_state[i], params);
            integral_state[i] = out.integral;
            Some(out.dilution)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PiParams {
        PiParams {
            ki: 1.0,
            kp: 5.0,
            min_dilution: 0.0,
            max_dilution: 400.0,
        }
    }

    #[test]
    fn zero_error_passes_integral_through() {
        let out = compute(0.6, 0.6, 90.0, &params());
        assert_eq!(out.dilution, 90);
        assert_eq!(out.integral, 90.0);
    }

    #[test]
    fn output_truncates_toward_zero() {
        // error ~= 1.1, integral -> 91.1, raw -> 96.6, command truncates.
        let out = compute(0.6011, 0.6, 90.0, &params());
        assert_eq!(out.dilution, 96);
    }

    #[test]
    fn integral_clamps_at_zero_below() {
        // Large negative error drives the accumulator to its floor.
        let out = compute(0.1, 0.9, 10.0, &params());
        assert_eq!(out.integral, 0.0);
        assert_eq!(out.dilution, 0);
    }
}
