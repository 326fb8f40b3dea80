use crate::calibration::AccelCalibration;
use crate::clock::Timestamp;
use crate::types::{Smoothing, Vector3};
use std::collections::VecDeque;

/// Raw noise floor for `Smoothing::None`, in counts.
pub const NONE_THRESHOLD: i32 = 3;
/// Minimum change of the EMA output before it is published, in g.
pub const EMA_THRESHOLD: f64 = 0.01;

/// A calibrated accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationSample {
    pub timestamp: Timestamp,
    pub calibrated: Vector3,
}

/// Turns calibrated samples into the published acceleration value.
///
/// History is kept most-recent-first and bounded to `max_samples`.
#[derive(Debug, Clone)]
pub struct AccelSmoother {
    strategy: Smoothing,
    max_samples: usize,
    history: VecDeque<AccelerationSample>,
    raw: [u16; 3],
    value: Vector3,
}

impl AccelSmoother {
    pub fn new(strategy: Smoothing, max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            strategy,
            max_samples,
            history: VecDeque::with_capacity(max_samples),
            raw: [0; 3],
            value: [0.0; 3],
        }
    }

    pub fn strategy(&self) -> Smoothing {
        self.strategy
    }

    /// Switch strategy. Clears the history when the strategy changes.
    pub fn set_strategy(&mut self, strategy: Smoothing) {
        if self.strategy == strategy {
            return;
        }
        self.history.clear();
        self.strategy = strategy;
    }

    /// Forget all samples and zero the published values.
    pub fn reset(&mut self) {
        self.history.clear();
        self.raw = [0; 3];
        self.value = [0.0; 3];
    }

    /// Last raw sample taken into account.
    pub fn raw(&self) -> [u16; 3] {
        self.raw
    }

    /// Published acceleration in g.
    pub fn value(&self) -> Vector3 {
        self.value
    }

    #[cfg(test)]
    pub(crate) fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Feed one raw sample. Returns the new published value if it changed
    /// by more than the strategy's threshold.
    pub fn push(
        &mut self,
        timestamp: Timestamp,
        raw: [u16; 3],
        calibration: &AccelCalibration,
    ) -> Option<Vector3> {
        match self.strategy {
            Smoothing::None => {
                let moved = (0..3)
                    .any(|axis| (raw[axis] as i32 - self.raw[axis] as i32).abs() > NONE_THRESHOLD);
                if !moved {
                    return None;
                }
                self.raw = raw;
                self.value = calibration.calibrate(raw);
                Some(self.value)
            }
            Smoothing::Ema => {
                self.raw = raw;
                self.history.push_front(AccelerationSample {
                    timestamp,
                    calibrated: calibration.calibrate(raw),
                });
                self.history.truncate(self.max_samples);

                let ema = self.ema();
                let moved = (0..3).any(|axis| (ema[axis] - self.value[axis]).abs() > EMA_THRESHOLD);
                if !moved {
                    return None;
                }
                self.value = ema;
                Some(ema)
            }
        }
    }

    /// `sum(sample[i] * a * (1 - a)^i) / sum(a * (1 - a)^i)` with
    /// `a = 2 / (max_samples + 1)`.
    fn ema(&self) -> Vector3 {
        let alpha = 2.0 / (self.max_samples as f64 + 1.0);
        let mut weight = alpha;
        let mut total_weight = 0.0;
        let mut sum = [0.0; 3];
        for sample in &self.history {
            for axis in 0..3 {
                sum[axis] += sample.calibrated[axis] * weight;
            }
            total_weight += weight;
            weight *= 1.0 - alpha;
        }
        if total_weight == 0.0 {
            return [0.0; 3];
        }
        sum.map(|s| s / total_weight)
    }
}
