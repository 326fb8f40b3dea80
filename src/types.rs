/// Three-component vector `[x, y, z]`.
pub type Vector3 = [f64; 3];

/// 3x3 row-major rotation matrix.
pub type Matrix3 = [[f64; 3]; 3];

bitflags::bitflags! {
    /// Data reporting types. Buttons are always reported; the empty set is
    /// the default (buttons only) mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DataTypes: u8 {
        const ACCELEROMETER = 0x01;
        /// Implies `ACCELEROMETER`.
        const MOTION_PLUS   = 0x02;
    }
}

bitflags::bitflags! {
    /// Button mask, laid out exactly as bytes 1..=2 of every input report
    /// (little-endian).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u16 {
        const LEFT  = 0x0001;
        const RIGHT = 0x0002;
        const DOWN  = 0x0004;
        const UP    = 0x0008;
        const PLUS  = 0x0010;
        const TWO   = 0x0100;
        const ONE   = 0x0200;
        const B     = 0x0400;
        const A     = 0x0800;
        const MINUS = 0x1000;
        const HOME  = 0x8000;
    }
}

bitflags::bitflags! {
    /// LED and rumble state, laid out as byte 1 of the `0x11` output report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Leds: u8 {
        const RUMBLE = 0x01;
        const LED1   = 0x10;
        const LED2   = 0x20;
        const LED3   = 0x40;
        const LED4   = 0x80;
    }
}

/// State of the MotionPlus gyroscope extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionPlusState {
    /// Not requested.
    #[default]
    Inactive,
    /// Requested by the user; waiting for the extension to identify itself.
    Activated,
    /// Enabled and reporting, zero-rate calibration in progress.
    Working,
    /// Calibrated; rates are integrated into the orientation.
    Calibrated,
}

impl MotionPlusState {
    /// True while the extension is enabled on the device.
    pub fn is_reporting(self) -> bool {
        matches!(self, MotionPlusState::Working | MotionPlusState::Calibrated)
    }
}

/// Acceleration smoothing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Smoothing {
    /// Emit the latest sample once it leaves the raw noise floor.
    None,
    /// Exponential moving average over the sample history.
    #[default]
    Ema,
}

/// How orientation is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationMode {
    /// Orientation is not processed.
    None,
    /// Integrated gyro rotation when MotionPlus is calibrated, otherwise the
    /// accelerometer tilt rebuilt from scratch on every report.
    #[default]
    Raw,
    /// Integrated yaw combined with accelerometer pitch and roll.
    Mixed,
}

/// Lifecycle of the device state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Closed,
    /// Transport open, handshake not yet started.
    Opening,
    /// Waiting for the accelerometer calibration read.
    AwaitingCalibration,
    Ready,
}

/// Battery health as reported by the last status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryState {
    pub level: u8,
    pub empty: bool,
}

/// Notifications emitted by the device state machine.
///
/// Every variant except `DeviceError` and `CalibrationAbandoned` is sent after
/// the matching part of the device state has already been updated.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ButtonsChanged(Buttons),
    AccelerationChanged(Vector3),
    BatteryChanged(u8),
    BatteryEmpty(bool),
    MotionPlusStateChanged(MotionPlusState),
    OrientationChanged,
    /// A read completed with an error. The read loop is not re-armed.
    DeviceError(String),
    /// The configured calibration retry limit was exhausted.
    CalibrationAbandoned,
}

/// Point-in-time copy of the decoded device state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSnapshot {
    pub phase: Phase,
    pub data_types: DataTypes,
    pub leds: Leds,
    pub buttons: Buttons,
    pub raw_acceleration: Vector3,
    pub acceleration: Vector3,
    pub orientation: Matrix3,
    /// Euler angles `[pitch, roll, yaw]` in degrees.
    pub euler_deg: Vector3,
    pub battery: BatteryState,
    pub motion_plus: MotionPlusState,
    pub still: bool,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Closed,
            data_types: DataTypes::empty(),
            leds: Leds::empty(),
            buttons: Buttons::empty(),
            raw_acceleration: [0.0; 3],
            acceleration: [0.0; 3],
            orientation: crate::orientation::IDENTITY,
            euler_deg: [0.0; 3],
            battery: BatteryState::default(),
            motion_plus: MotionPlusState::Inactive,
            still: false,
        }
    }
}
