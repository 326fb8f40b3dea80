use crate::clock::Timestamp;
use crate::types::{BatteryState, Buttons, Leds};
use crate::{Result, WiimoteError};

// -- USB/Bluetooth HID identifiers --
pub const VID: u16 = 0x057E;
pub const PID: u16 = 0x0306;

// -- Packet geometry --
pub const REPORT_SIZE: usize = 22;

// -- Output report ids --
pub const OUT_LEDS: u8 = 0x11;
pub const OUT_DATA_MODE: u8 = 0x12;
pub const OUT_STATUS_REQUEST: u8 = 0x15;
pub const OUT_WRITE_MEMORY: u8 = 0x16;
pub const OUT_READ_MEMORY: u8 = 0x17;

// -- Input report ids --
pub const IN_STATUS: u8 = 0x20;
pub const IN_READ_MEMORY: u8 = 0x21;
pub const IN_ACKNOWLEDGE: u8 = 0x22;
pub const IN_BUTTONS: u8 = 0x30;
pub const IN_BUTTONS_ACCEL: u8 = 0x31;
pub const IN_BUTTONS_ACCEL_EXTENSION: u8 = 0x35;

// -- Byte 1 flags of output reports --
pub const FLAG_RUMBLE: u8 = 0x01;
pub const FLAG_CONTINUOUS: u8 = 0x04;
pub const FLAG_REGISTER_SPACE: u8 = 0x04;

// -- Memory map --
pub const CALIBRATION_ADDRESS: u32 = 0x00_0016;
pub const CALIBRATION_LENGTH: u16 = 8;
pub const MOTION_PLUS_ID_ADDRESS: u32 = 0xA6_00FA;
pub const MOTION_PLUS_ID_LENGTH: u16 = 6;
pub const MOTION_PLUS_ENABLE_ADDRESS: u32 = 0xA6_00FE;
pub const MOTION_PLUS_ENABLE_VALUE: u8 = 0x04;
pub const MOTION_PLUS_DISABLE_ADDRESS: u32 = 0xA4_00F0;
pub const MOTION_PLUS_DISABLE_VALUE: u8 = 0x55;

/// Identification bytes read from `MOTION_PLUS_ID_ADDRESS` when a MotionPlus
/// is plugged in. Byte 4 changes with the extension mode and is not compared.
pub const MOTION_PLUS_SIGNATURE: [u8; 6] = [0x00, 0x00, 0xA6, 0x20, 0x00, 0x05];
const MOTION_PLUS_SIGNATURE_MASK: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xFF];

/// Largest payload accepted by a single `0x16` write.
pub const MAX_WRITE_PAYLOAD: usize = 16;

/// Input report layout requested with the `0x12` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Buttons = 0x30,
    ButtonsAccel = 0x31,
    ButtonsAccelExtension = 0x35,
}

/// Target of a memory read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Eeprom,
    /// Control registers (extensions, speaker, camera).
    Register,
}

impl AddressSpace {
    fn flag(self) -> u8 {
        match self {
            AddressSpace::Eeprom => 0x00,
            AddressSpace::Register => FLAG_REGISTER_SPACE,
        }
    }
}

fn rumble_bit(rumble: bool) -> u8 {
    if rumble {
        FLAG_RUMBLE
    } else {
        0
    }
}

/// Build a 22-byte output report, zero padded.
pub fn build_report(data: &[u8]) -> [u8; REPORT_SIZE] {
    let mut buf = [0u8; REPORT_SIZE];
    let len = data.len().min(REPORT_SIZE);
    buf[..len].copy_from_slice(&data[..len]);
    buf
}

/// `0x11`: LED and rumble state. Rumble is bit 0 of the mask itself.
pub fn build_led_report(leds: Leds) -> [u8; REPORT_SIZE] {
    build_report(&[OUT_LEDS, leds.bits()])
}

/// `0x12`: data reporting mode. Every mode except buttons-only is requested
/// as continuous reporting.
pub fn build_data_mode_report(mode: DataMode, rumble: bool) -> [u8; REPORT_SIZE] {
    let continuous = if mode == DataMode::Buttons {
        0
    } else {
        FLAG_CONTINUOUS
    };
    build_report(&[OUT_DATA_MODE, continuous | rumble_bit(rumble), mode as u8])
}

/// `0x15`: request a `0x20` status report.
pub fn build_status_request(rumble: bool) -> [u8; REPORT_SIZE] {
    build_report(&[OUT_STATUS_REQUEST, rumble_bit(rumble)])
}

/// `0x16`: write up to 16 bytes to EEPROM or the register space.
/// Payload beyond 16 bytes is truncated.
pub fn build_write_memory(
    space: AddressSpace,
    address: u32,
    data: &[u8],
    rumble: bool,
) -> [u8; REPORT_SIZE] {
    let len = data.len().min(MAX_WRITE_PAYLOAD);
    let mut buf = [0u8; REPORT_SIZE];
    buf[0] = OUT_WRITE_MEMORY;
    buf[1] = space.flag() | rumble_bit(rumble);
    buf[2..5].copy_from_slice(&address.to_be_bytes()[1..]);
    buf[5] = len as u8;
    buf[6..6 + len].copy_from_slice(&data[..len]);
    buf
}

/// `0x17`: read `length` bytes from EEPROM or the register space.
pub fn build_read_memory(
    space: AddressSpace,
    address: u32,
    length: u16,
    rumble: bool,
) -> [u8; REPORT_SIZE] {
    let mut buf = [0u8; REPORT_SIZE];
    buf[0] = OUT_READ_MEMORY;
    buf[1] = space.flag() | rumble_bit(rumble);
    buf[2..5].copy_from_slice(&address.to_be_bytes()[1..]);
    buf[5..7].copy_from_slice(&length.to_be_bytes());
    buf
}

/// One input report with its arrival time. Lives for a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReport {
    pub timestamp: Timestamp,
    len: usize,
    bytes: [u8; REPORT_SIZE],
}

impl RawReport {
    /// Copy up to `REPORT_SIZE` bytes of `data`.
    pub fn new(timestamp: Timestamp, data: &[u8]) -> Self {
        let len = data.len().min(REPORT_SIZE);
        let mut bytes = [0u8; REPORT_SIZE];
        bytes[..len].copy_from_slice(&data[..len]);
        Self { timestamp, len, bytes }
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Raw MotionPlus angular rates in `[pitch, roll, yaw]` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GyroSample {
    /// 14-bit rate values, ~8192 at rest.
    pub raw: [u16; 3],
    /// True when the axis is in the fast (low resolution) range.
    pub fast: [bool; 3],
}

/// Payload of a `0x21` read-memory response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRead {
    pub buttons: Buttons,
    pub error: bool,
    /// Low 16 bits of the address that was read.
    pub offset: u16,
    pub data: [u8; 16],
    /// Payload bytes actually present in the report.
    pub len: usize,
}

impl MemoryRead {
    /// Successful read of the accelerometer calibration block.
    pub fn is_calibration(&self) -> bool {
        !self.error
            && self.offset == (CALIBRATION_ADDRESS & 0xFFFF) as u16
            && self.len >= CALIBRATION_LENGTH as usize
    }

    /// Successful read whose payload carries the MotionPlus identification.
    pub fn is_motion_plus_id(&self) -> bool {
        !self.error
            && self.len >= MOTION_PLUS_ID_LENGTH as usize
            && self.data[..6]
                .iter()
                .zip(MOTION_PLUS_SIGNATURE.iter().zip(MOTION_PLUS_SIGNATURE_MASK.iter()))
                .all(|(&b, (&sig, &mask))| b & mask == sig & mask)
    }
}

/// A decoded input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Status {
        buttons: Buttons,
        battery: BatteryState,
    },
    MemoryRead(MemoryRead),
    /// Result of an output report, sent by the device after writes.
    Acknowledge {
        buttons: Buttons,
        report: u8,
        error: u8,
    },
    Buttons(Buttons),
    ButtonsAccel {
        buttons: Buttons,
        accel: [u16; 3],
    },
    ButtonsAccelExtension {
        buttons: Buttons,
        accel: [u16; 3],
        gyro: GyroSample,
    },
    Unknown(u8),
}

impl Report {
    /// Button state carried by the report, if the layout is known.
    pub fn buttons(&self) -> Option<Buttons> {
        match *self {
            Report::Status { buttons, .. }
            | Report::Acknowledge { buttons, .. }
            | Report::Buttons(buttons)
            | Report::ButtonsAccel { buttons, .. }
            | Report::ButtonsAccelExtension { buttons, .. } => Some(buttons),
            Report::MemoryRead(read) => Some(read.buttons),
            Report::Unknown(_) => None,
        }
    }
}

/// Encode a button mask into the two core button bytes.
pub fn encode_buttons(buttons: Buttons) -> [u8; 2] {
    buttons.bits().to_le_bytes()
}

/// Decode the core button bytes, dropping the accelerometer low bits that
/// share them.
pub fn decode_buttons(b1: u8, b2: u8) -> Buttons {
    Buttons::from_bits_truncate(u16::from_le_bytes([b1, b2]))
}

/// Decode 10-bit accelerometer values from bytes 1..=5 of a `0x31`/`0x35`
/// report.
///
/// X carries two low bits (byte 1, bits 5-6). Y and Z only carry bit 1
/// (byte 2, bits 5 and 6 respectively); their bit 0 is always zero.
pub fn decode_accel(data: &[u8]) -> [u16; 3] {
    let x = ((data[3] as u16) << 2) | ((data[1] as u16 & 0x60) >> 5);
    let y = ((data[4] as u16) << 2) | ((data[2] as u16 & 0x20) >> 4);
    let z = ((data[5] as u16) << 2) | ((data[2] as u16 & 0x40) >> 5);
    [x, y, z]
}

/// Decode MotionPlus rates from bytes 6..=11 of a `0x35` report.
pub fn decode_gyro(data: &[u8]) -> GyroSample {
    let yaw = data[6] as u16 | ((data[9] as u16 & 0xFC) << 6);
    let roll = data[7] as u16 | ((data[10] as u16 & 0xFC) << 6);
    let pitch = data[8] as u16 | ((data[11] as u16 & 0xFC) << 6);
    GyroSample {
        raw: [pitch, roll, yaw],
        fast: [
            data[9] & 0x01 == 0,
            data[10] & 0x02 == 0,
            data[9] & 0x02 == 0,
        ],
    }
}

fn require(data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(WiimoteError::ReportTooShort {
            id: data.first().copied().unwrap_or(0),
            len: data.len(),
        });
    }
    Ok(())
}

/// Decode a raw input report, dispatching on its first byte.
///
/// Layouts:
/// - `0x20`: `[1..2]` buttons, `[3]` bit 0 battery empty, `[6]` battery level
/// - `0x21`: `[1..2]` buttons, `[3]` high nibble 0xF on error, `[4..5]` offset, `[6..21]` data
/// - `0x22`: `[1..2]` buttons, `[3]` acknowledged report, `[4]` error code
/// - `0x30`: `[1..2]` buttons
/// - `0x31`: as `0x30` plus `[3..5]` accelerometer high bytes
/// - `0x35`: as `0x31` plus `[6..11]` MotionPlus rates
pub fn decode(data: &[u8]) -> Result<Report> {
    require(data, 1)?;
    let id = data[0];
    let report = match id {
        IN_STATUS => {
            require(data, 7)?;
            Report::Status {
                buttons: decode_buttons(data[1], data[2]),
                battery: BatteryState {
                    level: data[6],
                    empty: data[3] & 0x01 == 0x01,
                },
            }
        }
        IN_READ_MEMORY => {
            require(data, 6)?;
            let mut payload = [0u8; 16];
            let available = data.len().saturating_sub(6).min(16);
            payload[..available].copy_from_slice(&data[6..6 + available]);
            Report::MemoryRead(MemoryRead {
                buttons: decode_buttons(data[1], data[2]),
                error: data[3] & 0xF0 == 0xF0,
                offset: u16::from_be_bytes([data[4], data[5]]),
                data: payload,
                len: available,
            })
        }
        IN_ACKNOWLEDGE => {
            require(data, 5)?;
            Report::Acknowledge {
                buttons: decode_buttons(data[1], data[2]),
                report: data[3],
                error: data[4],
            }
        }
        IN_BUTTONS => {
            require(data, 3)?;
            Report::Buttons(decode_buttons(data[1], data[2]))
        }
        IN_BUTTONS_ACCEL => {
            require(data, 6)?;
            Report::ButtonsAccel {
                buttons: decode_buttons(data[1], data[2]),
                accel: decode_accel(data),
            }
        }
        IN_BUTTONS_ACCEL_EXTENSION => {
            require(data, 12)?;
            Report::ButtonsAccelExtension {
                buttons: decode_buttons(data[1], data[2]),
                accel: decode_accel(data),
                gyro: decode_gyro(data),
            }
        }
        other => Report::Unknown(other),
    };
    Ok(report)
}
