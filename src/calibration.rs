use crate::protocol::MemoryRead;
use crate::types::Vector3;

/// Accelerometer calibration read once from EEPROM at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelCalibration {
    /// Raw reading at 0 g, per axis.
    pub zero: [i32; 3],
    /// Raw counts per 1 g (the 1 g reading minus `zero`), per axis.
    pub gravity: [i32; 3],
}

/// Rebuild a 10-bit value from its high byte and a 2-bit field of `low`.
fn ten_bit(high: u8, low: u8, shift: u8) -> i32 {
    ((high as i32) << 2) | ((low as i32 >> shift) & 0x03)
}

impl AccelCalibration {
    /// Parse the 8-byte calibration block.
    ///
    /// Layout: `[0..2]` zero high bytes, `[3]` zero low bits (x: 5-4,
    /// y: 3-2, z: 1-0), `[4..6]` 1 g high bytes, `[7]` 1 g low bits.
    /// Returns `None` if any axis has a zero gravity span.
    pub fn from_block(block: &[u8]) -> Option<Self> {
        if block.len() < 8 {
            return None;
        }
        let zero = [
            ten_bit(block[0], block[3], 4),
            ten_bit(block[1], block[3], 2),
            ten_bit(block[2], block[3], 0),
        ];
        let one_g = [
            ten_bit(block[4], block[7], 4),
            ten_bit(block[5], block[7], 2),
            ten_bit(block[6], block[7], 0),
        ];
        let gravity = [one_g[0] - zero[0], one_g[1] - zero[1], one_g[2] - zero[2]];
        if gravity.contains(&0) {
            return None;
        }
        Some(Self { zero, gravity })
    }

    /// Calibration from a `0x21` response, if it is a successful read of the
    /// calibration block.
    pub fn from_read(read: &MemoryRead) -> Option<Self> {
        if !read.is_calibration() {
            return None;
        }
        Self::from_block(&read.data[..8])
    }

    /// Encode back into the 8-byte EEPROM block layout read by `from_block`.
    pub fn to_block(&self) -> [u8; 8] {
        let mut block = [0u8; 8];
        for (axis, shift) in [4u8, 2, 0].into_iter().enumerate() {
            let zero = self.zero[axis];
            let one_g = zero + self.gravity[axis];
            block[axis] = (zero >> 2) as u8;
            block[3] |= ((zero & 0x03) as u8) << shift;
            block[4 + axis] = (one_g >> 2) as u8;
            block[7] |= ((one_g & 0x03) as u8) << shift;
        }
        block
    }

    /// Convert raw counts to g: `(raw - zero) / gravity`.
    pub fn calibrate(&self, raw: [u16; 3]) -> Vector3 {
        let mut out = [0.0; 3];
        for axis in 0..3 {
            out[axis] = (raw[axis] as i32 - self.zero[axis]) as f64 / self.gravity[axis] as f64;
        }
        out
    }

    /// Inverse of `calibrate`, rounded to the nearest count.
    pub fn uncalibrate(&self, value: Vector3) -> [u16; 3] {
        let mut out = [0u16; 3];
        for axis in 0..3 {
            let raw = value[axis] * self.gravity[axis] as f64 + self.zero[axis] as f64;
            out[axis] = raw.round().clamp(0.0, 1023.0) as u16;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, Report, IN_READ_MEMORY, REPORT_SIZE};

    fn calibration_block(zero: [i32; 3], one_g: [i32; 3]) -> [u8; 8] {
        let gravity = [one_g[0] - zero[0], one_g[1] - zero[1], one_g[2] - zero[2]];
        AccelCalibration { zero, gravity }.to_block()
    }

    #[test]
    fn test_scenario_calibration_report() {
        let mut data = [0u8; REPORT_SIZE];
        data[0] = IN_READ_MEMORY;
        data[3] = 0x70;
        data[4] = 0x00;
        data[5] = 0x16;
        data[6..14].copy_from_slice(&calibration_block([510, 511, 509], [610, 609, 608]));

        let Report::MemoryRead(read) = decode(&data).unwrap() else {
            panic!("expected memory read");
        };
        let cal = AccelCalibration::from_read(&read).unwrap();
        assert_eq!(cal.zero, [510, 511, 509]);
        assert_eq!(cal.gravity, [100, 98, 99]);

        let g = cal.calibrate([560, 511, 509]);
        assert!((g[0] - 0.5).abs() < 1e-12);
        assert_eq!(g[1], 0.0);
    }

    #[test]
    fn test_rejects_error_and_degenerate_blocks() {
        let mut read = MemoryRead {
            buttons: Default::default(),
            error: true,
            offset: 0x0016,
            data: [0; 16],
            len: 16,
        };
        read.data[..8].copy_from_slice(&calibration_block([500; 3], [600; 3]));
        assert!(AccelCalibration::from_read(&read).is_none());

        read.error = false;
        assert!(AccelCalibration::from_read(&read).is_some());

        read.len = 3;
        assert!(AccelCalibration::from_read(&read).is_none());

        read.len = 8;
        read.offset = 0x00FA;
        assert!(AccelCalibration::from_read(&read).is_none());

        assert!(AccelCalibration::from_block(&calibration_block([500; 3], [500, 600, 600])).is_none());
    }

    #[test]
    fn test_reconstruction_within_one_lsb() {
        let cals = [
            AccelCalibration { zero: [510, 511, 509], gravity: [100, 98, 99] },
            AccelCalibration { zero: [0, 1023, 512], gravity: [1, -3, 511] },
            AccelCalibration { zero: [300, 700, 128], gravity: [-120, 57, 250] },
        ];
        for cal in cals {
            for raw in (0u16..1024).step_by(7) {
                let value = cal.calibrate([raw; 3]);
                let back = cal.uncalibrate(value);
                for axis in 0..3 {
                    assert!((back[axis] as i32 - raw as i32).abs() <= 1);
                }
            }
        }
    }
}
