//! Timestamp and sample-count conversions

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a sample count at `sample_rate` to seconds (0.0 for a zero rate)
pub fn samples_to_seconds(samples: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_samples_to_seconds() {
        assert_eq!(samples_to_seconds(24000, 24000), 1.0);
        assert_eq!(samples_to_seconds(12000, 48000), 0.25);
        assert_eq!(samples_to_seconds(100, 0), 0.0);
    }
}
