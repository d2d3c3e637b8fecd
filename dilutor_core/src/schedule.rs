//! Global interval phase machine (schedule mode).
//!
//! Open-loop: OD never participates. The elapsed time is measured from
//! the most recent block-log row, so the log is the durable timer and
//! the machine keeps correct time across process restarts.

use chrono::Duration;

use crate::state::Block;

/// Evaluate one tick. Returns the block to enter, or `None` to stay.
/// The boundary is inclusive: the machine switches exactly when the
/// configured interval has elapsed, not one tick later.
pub fn step(
    block: Block,
    elapsed: Duration,
    growth_interval: Duration,
    dilution_interval: Duration,
) -> Option<Block> {
    match block {
        Block::Growth if elapsed >= growth_interval => Some(Block::Dilution),
        Block::Dilution if elapsed >= dilution_interval => Some(Block::Growth),
        _ => None,
    }
}

/// Convert a configured interval in hours to a duration, rounded to
/// whole milliseconds.
pub fn interval(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}
