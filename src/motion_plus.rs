//! MotionPlus gyroscope extension lifecycle.
//!
//! `Inactive -> Activated -> Working -> Calibrated`, and
//! `Working | Calibrated -> Inactive` when disabled. The state machine only
//! tracks state and zero-rate calibration; the engine issues the matching
//! register reads and writes.

use crate::clock::Timestamp;
use crate::protocol::GyroSample;
use crate::types::{MotionPlusState, Vector3};
use std::time::Duration;

/// Raw counts per degree/second in the slow range.
pub const SLOW_LSB_PER_DPS: f64 = 8192.0 / 595.0;
/// Raw counts per degree/second in the fast range (2000 vs 440 deg/s full scale).
pub const FAST_LSB_PER_DPS: f64 = SLOW_LSB_PER_DPS * 440.0 / 2000.0;

/// Exclusive raw band a sample must lie in to count as "still".
pub const STILL_BAND: (u16, u16) = (7000, 9000);

#[derive(Debug, Clone)]
pub struct MotionPlus {
    state: MotionPlusState,
    polling: bool,
    window: Duration,
    window_start: Option<Timestamp>,
    sum: [i64; 3],
    samples: u32,
    /// Zero-rate offsets `[pitch, roll, yaw]` in raw counts.
    zero: Vector3,
    still: bool,
}

impl MotionPlus {
    pub fn new(calibration_window: Duration) -> Self {
        Self {
            state: MotionPlusState::Inactive,
            polling: false,
            window: calibration_window,
            window_start: None,
            sum: [0; 3],
            samples: 0,
            zero: [0.0; 3],
            still: false,
        }
    }

    pub fn state(&self) -> MotionPlusState {
        self.state
    }

    /// Whether the presence probe timer should be running.
    pub fn polling(&self) -> bool {
        self.polling
    }

    #[cfg(test)]
    pub(crate) fn zero(&self) -> Vector3 {
        self.zero
    }

    /// Whether the last gyro sample was inside the still band.
    pub fn is_still(&self) -> bool {
        self.still
    }

    /// User requested MotionPlus data. `Inactive -> Activated`; resumes a
    /// paused probe if already `Activated`. Returns true on a state change.
    pub fn request(&mut self) -> bool {
        match self.state {
            MotionPlusState::Inactive => {
                self.state = MotionPlusState::Activated;
                self.polling = true;
                true
            }
            MotionPlusState::Activated => {
                self.polling = true;
                false
            }
            MotionPlusState::Working | MotionPlusState::Calibrated => false,
        }
    }

    /// User stopped requesting MotionPlus data. `Working | Calibrated ->
    /// Inactive`, returning true if the extension must be disabled on the
    /// device. An `Activated` extension only stops probing.
    pub fn release(&mut self) -> bool {
        self.polling = false;
        if self.state.is_reporting() {
            self.state = MotionPlusState::Inactive;
            self.window_start = None;
            self.still = false;
            return true;
        }
        false
    }

    /// The identification signature was read. `Activated -> Working`,
    /// restarting the zero-rate calibration window at `at`.
    pub fn identified(&mut self, at: Timestamp) -> bool {
        if self.state != MotionPlusState::Activated {
            return false;
        }
        self.state = MotionPlusState::Working;
        self.window_start = Some(at);
        self.sum = [0; 3];
        self.samples = 0;
        self.zero = [0.0; 3];
        true
    }

    /// Feed a gyro sample. While `Working`, still samples accumulate into the
    /// zero-rate average; once the window has elapsed the average is
    /// finalized and the state becomes `Calibrated` (returns true).
    pub fn feed(&mut self, gyro: &GyroSample, at: Timestamp) -> bool {
        self.still = is_still(gyro);
        if self.state != MotionPlusState::Working {
            return false;
        }
        if self.still {
            for axis in 0..3 {
                self.sum[axis] += gyro.raw[axis] as i64;
            }
            self.samples += 1;
        }
        let Some(start) = self.window_start else {
            return false;
        };
        if self.samples == 0 || at.saturating_duration_since(start) <= self.window {
            return false;
        }
        for axis in 0..3 {
            self.zero[axis] = self.sum[axis] as f64 / self.samples as f64;
        }
        self.state = MotionPlusState::Calibrated;
        log::debug!(
            "MotionPlus calibrated from {} samples: zero={:?}",
            self.samples,
            self.zero
        );
        true
    }

    /// Angular rates `[pitch, roll, yaw]` in degrees/second. Deviations from
    /// zero of at most `deadband` counts read as no rotation.
    pub fn rates(&self, gyro: &GyroSample, deadband: u16) -> Vector3 {
        let mut rates = [0.0; 3];
        for axis in 0..3 {
            let delta = gyro.raw[axis] as f64 - self.zero[axis];
            if delta.abs() <= deadband as f64 {
                continue;
            }
            let scale = if gyro.fast[axis] {
                FAST_LSB_PER_DPS
            } else {
                SLOW_LSB_PER_DPS
            };
            rates[axis] = delta / scale;
        }
        rates
    }
}

/// Slow range on every axis and every value inside `STILL_BAND`.
pub fn is_still(gyro: &GyroSample) -> bool {
    gyro.fast.iter().all(|fast| !fast)
        && gyro
            .raw
            .iter()
            .all(|&raw| raw > STILL_BAND.0 && raw < STILL_BAND.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;

    fn sample(raw: [u16; 3]) -> GyroSample {
        GyroSample { raw, fast: [false; 3] }
    }

    #[test]
    fn test_lifecycle() {
        let t0 = clock::now();
        let mut mp = MotionPlus::new(Duration::from_secs(8));
        assert!(!mp.identified(t0));
        assert!(!mp.release());

        assert!(mp.request());
        assert_eq!(mp.state(), MotionPlusState::Activated);
        assert!(mp.polling());

        assert!(mp.identified(t0));
        assert_eq!(mp.state(), MotionPlusState::Working);
        assert!(!mp.request());
        assert!(!mp.identified(t0));
        assert_eq!(mp.state(), MotionPlusState::Working);

        for i in 0..=9 {
            let calibrated = mp.feed(&sample([8000, 8100, 8200]), t0 + Duration::from_secs(i));
            assert_eq!(calibrated, i == 9);
        }
        assert_eq!(mp.state(), MotionPlusState::Calibrated);
        assert_eq!(mp.zero(), [8000.0, 8100.0, 8200.0]);

        assert!(mp.release());
        assert_eq!(mp.state(), MotionPlusState::Inactive);
        assert!(!mp.polling());

        assert!(mp.request());
        assert_eq!(mp.state(), MotionPlusState::Activated);
    }

    #[test]
    fn test_release_while_activated_only_pauses_probe() {
        let mut mp = MotionPlus::new(Duration::from_secs(8));
        mp.request();
        assert!(!mp.release());
        assert_eq!(mp.state(), MotionPlusState::Activated);
        assert!(!mp.polling());
        assert!(!mp.request());
        assert!(mp.polling());
    }

    #[test]
    fn test_calibration_skips_moving_samples() {
        let t0 = clock::now();
        let mut mp = MotionPlus::new(Duration::from_millis(100));
        mp.request();
        mp.identified(t0);

        let late = t0 + Duration::from_secs(1);
        assert!(!mp.feed(&sample([6000, 8000, 8000]), late));
        let mut fast = sample([8000, 8000, 8000]);
        fast.fast[1] = true;
        assert!(!mp.feed(&fast, late));
        assert_eq!(mp.state(), MotionPlusState::Working);

        assert!(mp.feed(&sample([8000, 8002, 8004]), late));
        assert_eq!(mp.zero(), [8000.0, 8002.0, 8004.0]);
    }

    #[test]
    fn test_rates_deadband_and_range() {
        let t0 = clock::now();
        let mut mp = MotionPlus::new(Duration::ZERO);
        mp.request();
        mp.identified(t0);
        mp.feed(&sample([8000, 8000, 8000]), t0 + Duration::from_millis(1));

        let rates = mp.rates(&sample([8030, 7970, 8000]), 30);
        assert_eq!(rates, [0.0, 0.0, 0.0]);

        let rates = mp.rates(&sample([8000 + 595, 8000, 8000 - 595]), 30);
        let expected = 595.0 / SLOW_LSB_PER_DPS;
        assert!((rates[0] - expected).abs() < 1e-9);
        assert!((rates[2] + expected).abs() < 1e-9);

        let mut fast = sample([8000, 8000 + 595, 8000]);
        fast.fast = [false, true, false];
        let rates = mp.rates(&fast, 30);
        assert!((rates[1] - 595.0 / FAST_LSB_PER_DPS).abs() < 1e-9);
        assert!(rates[1] > expected);
    }
}
