//! # wiimote - host-side driver for the Nintendo Wii Remote
//!
//! Cross-platform driver using hidapi. Provides:
//! - Button state with change notifications
//! - Calibrated, optionally smoothed acceleration
//! - Orientation from accelerometer tilt and MotionPlus gyro integration
//! - Battery level, player LEDs and rumble
//!
//! ## Quick Start
//! ```no_run
//! use std::time::Duration;
//! use wiimote::{DataTypes, Event, Leds, Wiimote};
//!
//! let wiimote = Wiimote::start(DataTypes::MOTION_PLUS).unwrap();
//! wiimote.set_leds(Leds::LED1).unwrap();
//!
//! for _ in 0..100 {
//!     if let Ok(Event::AccelerationChanged(acc)) =
//!         wiimote.recv_event_timeout(Duration::from_secs(1))
//!     {
//!         println!("acc: {:?} yaw: {:.1}", acc, wiimote.orientation_yaw());
//!     }
//! }
//! wiimote.stop().unwrap();
//! ```

pub mod calibration;
pub mod clock;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod hid;
pub mod motion_plus;
pub mod orientation;
pub mod protocol;
pub mod smoothing;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::WiimoteConfig;
pub use device::Wiimote;
pub use error::WiimoteError;
pub use hid::{ReportSink, ReportSource, Transport};
pub use types::*;

/// Result type alias for wiimote operations.
pub type Result<T> = std::result::Result<T, WiimoteError>;
