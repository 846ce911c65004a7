//! The counter value model.
//!
//! The "current value" is never stored: it is a pure function of wall-clock
//! time against fixed calibration constants (a world-population growth
//! model). Every read site recomputes it, so delivery failures can never
//! corrupt state.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Population at the calibration instant.
pub const BASE_POPULATION: f64 = 8_170_154_059.0;

/// People per second.
pub const GROWTH_PER_SECOND: f64 = 2.54;

/// Calibration instant: 2024-08-12T17:36:00Z.
pub const EPOCH_UNIX_MS: i64 = 1_723_484_160_000;

/// Counter value at the given instant.
pub fn value_at(at: DateTime<Utc>) -> u64 {
    let elapsed_secs = (at.timestamp_millis() - EPOCH_UNIX_MS) as f64 / 1000.0;
    (BASE_POPULATION + elapsed_secs * GROWTH_PER_SECOND).round() as u64
}

/// Counter value right now.
pub fn current_value() -> u64 {
    value_at(Utc::now())
}

/// The wire payload pushed to subscribers, serialized identically on the
/// direct and delegated paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CounterUpdate {
    pub value: u64,
}

impl CounterUpdate {
    /// Snapshot of the current value.
    pub fn current() -> Self {
        Self {
            value: current_value(),
        }
    }

    /// The update as one server-sent-event frame.
    ///
    /// Single source of framing for both delivery paths, so a direct
    /// subscriber and a provider-held subscriber receive byte-identical
    /// frames.
    pub fn sse_frame(&self) -> Result<String, Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("data: {json}\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(EPOCH_UNIX_MS).unwrap()
    }

    #[test]
    fn value_at_epoch_is_base_population() {
        assert_eq!(value_at(epoch()), BASE_POPULATION as u64);
    }

    #[test]
    fn value_ten_seconds_after_epoch_is_exact() {
        // round(8_170_154_059 + 10 * 2.54)
        assert_eq!(value_at(epoch() + Duration::seconds(10)), 8_170_154_084);
    }

    #[test]
    fn value_is_monotonically_non_decreasing() {
        let t1 = epoch() + Duration::seconds(100);
        let t2 = t1 + Duration::milliseconds(250);
        let t3 = t2 + Duration::days(365);

        assert!(value_at(t1) <= value_at(t2));
        assert!(value_at(t2) <= value_at(t3));
    }

    #[test]
    fn update_serializes_as_value_object() {
        let json = serde_json::to_string(&CounterUpdate { value: 42 }).unwrap();
        assert_eq!(json, r#"{"value":42}"#);
    }

    #[test]
    fn sse_frame_uses_standard_event_stream_framing() {
        let frame = CounterUpdate { value: 42 }.sse_frame().unwrap();
        assert_eq!(frame, "data: {\"value\":42}\n\n");
    }
}
