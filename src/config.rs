use crate::orientation::DEFAULT_DAMPING;
use crate::types::{OrientationMode, Smoothing};
use std::time::Duration;

/// Tunables for a `Wiimote` session.
#[derive(Debug, Clone, PartialEq)]
pub struct WiimoteConfig {
    /// Period of the `0x15` status request.
    pub status_poll_interval: Duration,
    /// Period of the MotionPlus presence probe while it is requested.
    pub motion_plus_poll_interval: Duration,
    /// How long still gyro samples are averaged into the zero-rate offsets.
    pub motion_plus_calibration_window: Duration,
    /// Acceleration history length (EMA span).
    pub max_acceleration_samples: usize,
    pub smoothing: Smoothing,
    pub orientation_mode: OrientationMode,
    /// Gyro deviations from zero-rate up to this many counts are ignored.
    pub gyro_deadband: u16,
    /// Scale applied to integrated gyro angles.
    pub gyro_damping: f64,
    /// Calibration read attempts after the first one before giving up.
    /// `None` retries forever.
    pub calibration_retry_limit: Option<u32>,
    /// Blocking read granularity; bounds how long `close` waits for the
    /// reader thread.
    pub read_poll_timeout_ms: i32,
}

impl Default for WiimoteConfig {
    fn default() -> Self {
        Self {
            status_poll_interval: Duration::from_secs(12),
            motion_plus_poll_interval: Duration::from_secs(1),
            motion_plus_calibration_window: Duration::from_secs(8),
            max_acceleration_samples: 24,
            smoothing: Smoothing::Ema,
            orientation_mode: OrientationMode::Raw,
            gyro_deadband: 30,
            gyro_damping: DEFAULT_DAMPING,
            calibration_retry_limit: None,
            read_poll_timeout_ms: 50,
        }
    }
}

impl WiimoteConfig {
    /// Defaults overridden by `WIIMOTE_*` environment variables:
    ///
    /// | Variable | Value |
    /// |---|---|
    /// | `WIIMOTE_STATUS_POLL_MS` | milliseconds |
    /// | `WIIMOTE_MOTIONPLUS_POLL_MS` | milliseconds |
    /// | `WIIMOTE_MOTIONPLUS_CALIBRATION_MS` | milliseconds |
    /// | `WIIMOTE_ACCEL_SAMPLES` | history length |
    /// | `WIIMOTE_SMOOTHING` | `none` \| `ema` |
    /// | `WIIMOTE_ORIENTATION` | `none` \| `raw` \| `mixed` |
    /// | `WIIMOTE_GYRO_DEADBAND` | raw counts |
    /// | `WIIMOTE_GYRO_DAMPING` | factor |
    /// | `WIIMOTE_CALIBRATION_RETRIES` | count, or `unlimited` |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
        };
        let millis = |name: &str, default: Duration| {
            read(name)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let smoothing = match read("WIIMOTE_SMOOTHING").as_deref() {
            Some("none") => Smoothing::None,
            Some("ema") => Smoothing::Ema,
            Some(other) => {
                log::warn!("Unknown WIIMOTE_SMOOTHING='{}', using ema (supported: none|ema)", other);
                defaults.smoothing
            }
            None => defaults.smoothing,
        };
        let orientation_mode = match read("WIIMOTE_ORIENTATION").as_deref() {
            Some("none") => OrientationMode::None,
            Some("raw") => OrientationMode::Raw,
            Some("mixed") => OrientationMode::Mixed,
            Some(other) => {
                log::warn!(
                    "Unknown WIIMOTE_ORIENTATION='{}', using raw (supported: none|raw|mixed)",
                    other
                );
                defaults.orientation_mode
            }
            None => defaults.orientation_mode,
        };
        let calibration_retry_limit = match read("WIIMOTE_CALIBRATION_RETRIES").as_deref() {
            None | Some("unlimited") => None,
            Some(v) => v.parse::<u32>().ok(),
        };

        Self {
            status_poll_interval: millis("WIIMOTE_STATUS_POLL_MS", defaults.status_poll_interval),
            motion_plus_poll_interval: millis(
                "WIIMOTE_MOTIONPLUS_POLL_MS",
                defaults.motion_plus_poll_interval,
            ),
            motion_plus_calibration_window: millis(
                "WIIMOTE_MOTIONPLUS_CALIBRATION_MS",
                defaults.motion_plus_calibration_window,
            ),
            max_acceleration_samples: read("WIIMOTE_ACCEL_SAMPLES")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_acceleration_samples),
            smoothing,
            orientation_mode,
            gyro_deadband: read("WIIMOTE_GYRO_DEADBAND")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(defaults.gyro_deadband),
            gyro_damping: read("WIIMOTE_GYRO_DAMPING")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|d| d.is_finite())
                .unwrap_or(defaults.gyro_damping),
            calibration_retry_limit,
            read_poll_timeout_ms: defaults.read_poll_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_lookup_gives_defaults() {
        assert_eq!(WiimoteConfig::from_lookup(|_| None), WiimoteConfig::default());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WIIMOTE_STATUS_POLL_MS", "500"),
            ("WIIMOTE_SMOOTHING", " None "),
            ("WIIMOTE_ORIENTATION", "mixed"),
            ("WIIMOTE_ACCEL_SAMPLES", "0"),
            ("WIIMOTE_GYRO_DAMPING", "0.8"),
            ("WIIMOTE_CALIBRATION_RETRIES", "25"),
        ]
        .into_iter()
        .collect();
        let config = WiimoteConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.status_poll_interval, Duration::from_millis(500));
        assert_eq!(config.smoothing, Smoothing::None);
        assert_eq!(config.orientation_mode, OrientationMode::Mixed);
        assert_eq!(config.max_acceleration_samples, 24);
        assert_eq!(config.gyro_damping, 0.8);
        assert_eq!(config.calibration_retry_limit, Some(25));
        assert_eq!(config.motion_plus_poll_interval, Duration::from_secs(1));
    }
}
