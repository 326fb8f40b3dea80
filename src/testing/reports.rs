use crate::calibration::AccelCalibration;
use crate::clock::Timestamp;
use crate::protocol::{self, RawReport, REPORT_SIZE};
use crate::types::Buttons;

pub(crate) fn raw(at: Timestamp, data: [u8; REPORT_SIZE]) -> RawReport {
    RawReport::new(at, &data)
}

pub(crate) fn buttons(at: Timestamp, mask: Buttons) -> RawReport {
    let [b1, b2] = protocol::encode_buttons(mask);
    let mut data = [0u8; REPORT_SIZE];
    data[..3].copy_from_slice(&[protocol::IN_BUTTONS, b1, b2]);
    raw(at, data)
}

pub(crate) fn status(at: Timestamp, level: u8, empty: bool) -> RawReport {
    let mut data = [0u8; REPORT_SIZE];
    data[0] = protocol::IN_STATUS;
    data[3] = empty as u8;
    data[6] = level;
    raw(at, data)
}

pub(crate) fn memory_read(at: Timestamp, offset: u16, error: bool, payload: &[u8]) -> RawReport {
    let mut data = [0u8; REPORT_SIZE];
    data[0] = protocol::IN_READ_MEMORY;
    data[3] = if error { 0xF0 } else { ((payload.len().max(1) - 1) as u8) << 4 };
    data[4..6].copy_from_slice(&offset.to_be_bytes());
    data[6..6 + payload.len()].copy_from_slice(payload);
    raw(at, data)
}

pub(crate) fn calibration(at: Timestamp, zero: [i32; 3], gravity: [i32; 3]) -> RawReport {
    let block = AccelCalibration { zero, gravity }.to_block();
    memory_read(at, protocol::CALIBRATION_ADDRESS as u16, false, &block)
}

pub(crate) fn motion_plus_id(at: Timestamp) -> RawReport {
    memory_read(
        at,
        (protocol::MOTION_PLUS_ID_ADDRESS & 0xFFFF) as u16,
        false,
        &protocol::MOTION_PLUS_SIGNATURE,
    )
}

/// Set the 10-bit accelerometer fields. Y and Z lose their lowest bit.
fn put_accel(data: &mut [u8; REPORT_SIZE], accel: [u16; 3]) {
    data[1] |= ((accel[0] & 0x03) << 5) as u8;
    data[2] |= (((accel[1] >> 1) & 0x01) << 5) as u8 | (((accel[2] >> 1) & 0x01) << 6) as u8;
    data[3] = (accel[0] >> 2) as u8;
    data[4] = (accel[1] >> 2) as u8;
    data[5] = (accel[2] >> 2) as u8;
}

pub(crate) fn accel(at: Timestamp, accel: [u16; 3]) -> RawReport {
    let mut data = [0u8; REPORT_SIZE];
    data[0] = protocol::IN_BUTTONS_ACCEL;
    put_accel(&mut data, accel);
    raw(at, data)
}

/// `0x35` report; `gyro` is `[pitch, roll, yaw]`, all axes in slow range.
pub(crate) fn accel_gyro(at: Timestamp, accel: [u16; 3], gyro: [u16; 3]) -> RawReport {
    let [pitch, roll, yaw] = gyro;
    let mut data = [0u8; REPORT_SIZE];
    data[0] = protocol::IN_BUTTONS_ACCEL_EXTENSION;
    put_accel(&mut data, accel);
    data[6] = yaw as u8;
    data[7] = roll as u8;
    data[8] = pitch as u8;
    data[9] = ((yaw >> 8) << 2) as u8 | 0x03;
    data[10] = ((roll >> 8) << 2) as u8 | 0x02;
    data[11] = ((pitch >> 8) << 2) as u8;
    raw(at, data)
}
