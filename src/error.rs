/// Errors that can occur when talking to a Wii Remote.
#[derive(Debug, thiserror::Error)]
pub enum WiimoteError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("Device not found (VID=057E PID=0306)")]
    DeviceNotFound,

    #[error("Report write failed: {0}")]
    Write(String),

    #[error("Report read failed: {0}")]
    Read(String),

    #[error("Invalid output report length {0} (expected 1..=22)")]
    InvalidLength(usize),

    #[error("Report 0x{id:02x} too short: {len} bytes")]
    ReportTooShort { id: u8, len: usize },

    #[error("Wiimote is not running")]
    NotRunning,

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Channel disconnected")]
    ChannelDisconnected,
}
