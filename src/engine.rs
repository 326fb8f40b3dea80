//! Device state machine.
//!
//! `Engine` owns the whole decoded device state and runs the bring-up
//! handshake, data mode selection, report dispatch and the MotionPlus and
//! orientation subsystems. It performs no I/O of its own besides writing
//! output reports through a `ReportWriter`, and it is driven from a single
//! thread: the reactor in `device.rs` feeds it reports and timer ticks.

use crate::calibration::AccelCalibration;
use crate::clock::{self, Timestamp};
use crate::config::WiimoteConfig;
use crate::motion_plus::MotionPlus;
use crate::orientation::Orientation;
use crate::protocol::{self, AddressSpace, DataMode, GyroSample, MemoryRead, RawReport, Report};
use crate::smoothing::AccelSmoother;
use crate::types::{
    BatteryState, Buttons, DataTypes, DeviceSnapshot, Event, Leds, Matrix3, MotionPlusState,
    OrientationMode, Phase, Smoothing, Vector3,
};
use crate::Result;

/// Synchronous sink for output reports.
pub trait ReportWriter {
    fn write_report(&mut self, report: &[u8]) -> Result<()>;
}

pub struct Engine<W> {
    writer: W,
    config: WiimoteConfig,
    phase: Phase,
    data_types: DataTypes,
    leds: Leds,
    buttons: Buttons,
    battery: BatteryState,
    status_requested: bool,
    status_polling: bool,
    calibration: Option<AccelCalibration>,
    calibration_retries: u32,
    calibration_abandoned: bool,
    smoother: AccelSmoother,
    motion_plus: MotionPlus,
    orientation: Orientation,
    last_report: Option<Timestamp>,
    events: Vec<Event>,
}

impl<W: ReportWriter> Engine<W> {
    /// Engine for a freshly opened transport.
    pub fn new(writer: W, config: WiimoteConfig) -> Self {
        Self {
            writer,
            phase: Phase::Opening,
            data_types: DataTypes::empty(),
            leds: Leds::empty(),
            buttons: Buttons::empty(),
            battery: BatteryState::default(),
            status_requested: false,
            status_polling: false,
            calibration: None,
            calibration_retries: 0,
            calibration_abandoned: false,
            smoother: AccelSmoother::new(config.smoothing, config.max_acceleration_samples),
            motion_plus: MotionPlus::new(config.motion_plus_calibration_window),
            orientation: Orientation::new(config.orientation_mode, config.gyro_damping),
            last_report: None,
            events: Vec::new(),
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn writer(&self) -> &W {
        &self.writer
    }

    #[cfg(test)]
    pub(crate) fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn data_types(&self) -> DataTypes {
        self.data_types
    }

    pub fn leds(&self) -> Leds {
        self.leds
    }

    pub fn buttons(&self) -> Buttons {
        self.buttons
    }

    pub fn battery(&self) -> BatteryState {
        self.battery
    }

    pub fn calibration(&self) -> Option<AccelCalibration> {
        self.calibration
    }

    pub fn acceleration(&self) -> Vector3 {
        self.smoother.value()
    }

    pub fn raw_acceleration(&self) -> Vector3 {
        self.smoother.raw().map(f64::from)
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoother.strategy()
    }

    pub fn orientation(&self) -> Matrix3 {
        self.orientation.matrix()
    }

    pub fn orientation_mode(&self) -> OrientationMode {
        self.orientation.mode()
    }

    pub fn motion_plus_state(&self) -> MotionPlusState {
        self.motion_plus.state()
    }

    pub fn is_still(&self) -> bool {
        self.motion_plus.is_still()
    }

    /// Whether the periodic status poll should run.
    pub fn status_polling(&self) -> bool {
        self.status_polling
    }

    /// Whether the periodic MotionPlus probe should run.
    pub fn motion_plus_polling(&self) -> bool {
        self.motion_plus.polling()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            phase: self.phase,
            data_types: self.data_types,
            leds: self.leds,
            buttons: self.buttons,
            raw_acceleration: self.raw_acceleration(),
            acceleration: self.acceleration(),
            orientation: self.orientation.matrix(),
            euler_deg: self.orientation.euler_deg(),
            battery: self.battery,
            motion_plus: self.motion_plus.state(),
            still: self.motion_plus.is_still(),
        }
    }

    /// Take the notifications queued since the last call.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: Event) {
        log::trace!("event: {:?}", event);
        self.events.push(event);
    }

    fn rumble(&self) -> bool {
        self.leds.contains(Leds::RUMBLE)
    }

    fn send(&mut self, report: &[u8]) -> Result<()> {
        self.writer.write_report(report).map_err(|e| {
            log::warn!("Write of report 0x{:02x} failed: {}", report[0], e);
            e
        })
    }

    /// Start the handshake: select the data mode, then ask for the
    /// accelerometer calibration block.
    pub fn begin(&mut self, requested: DataTypes) -> Result<()> {
        self.phase = Phase::AwaitingCalibration;
        log::debug!("Awaiting calibration (requested {:?})", requested);
        let mode = self.set_data_types(requested);
        let calibration = self.request_calibration();
        mode.and(calibration)
    }

    /// Return to buttons-only reporting and stop all polling.
    pub fn shutdown(&mut self) -> Result<()> {
        let result = if self.phase == Phase::Closed {
            Ok(())
        } else {
            self.set_data_types(DataTypes::empty())
        };
        self.status_polling = false;
        self.phase = Phase::Closed;
        result
    }

    /// Request a set of data types and re-send the reporting mode.
    ///
    /// `MOTION_PLUS` implies `ACCELEROMETER`. Requesting it while `Inactive`
    /// activates the extension probe; dropping it while the extension is
    /// reporting disables the extension.
    pub fn set_data_types(&mut self, requested: DataTypes) -> Result<()> {
        let mut requested = requested;
        let mut result = Ok(());
        let mut probe_now = false;

        if requested.contains(DataTypes::MOTION_PLUS) {
            requested |= DataTypes::ACCELEROMETER;
            let was_polling = self.motion_plus.polling();
            if self.motion_plus.request() {
                log::info!("MotionPlus activated, probing for extension");
                self.emit(Event::MotionPlusStateChanged(MotionPlusState::Activated));
            }
            probe_now = !was_polling && self.motion_plus.polling();
        } else if self.motion_plus.release() {
            log::info!("MotionPlus disabled");
            let disable = protocol::build_write_memory(
                AddressSpace::Register,
                protocol::MOTION_PLUS_DISABLE_ADDRESS,
                &[protocol::MOTION_PLUS_DISABLE_VALUE],
                self.rumble(),
            );
            result = result.and(self.send(&disable));
            self.emit(Event::MotionPlusStateChanged(MotionPlusState::Inactive));
        }

        self.data_types = requested;
        result = result.and(self.send_data_mode());
        if probe_now {
            result = result.and(self.probe_motion_plus());
        }
        result
    }

    /// Set LEDs and rumble.
    pub fn set_leds(&mut self, leds: Leds) -> Result<()> {
        self.leds = leds;
        self.send(&protocol::build_led_report(leds))
    }

    pub fn set_smoothing(&mut self, smoothing: Smoothing) {
        self.smoother.set_strategy(smoothing);
    }

    pub fn set_orientation_mode(&mut self, mode: OrientationMode) {
        self.orientation.set_mode(mode);
    }

    /// Status poll timer tick.
    pub fn poll_status(&mut self) -> Result<()> {
        self.send(&protocol::build_status_request(self.rumble()))?;
        self.status_requested = true;
        Ok(())
    }

    /// MotionPlus poll timer tick: probe for the extension and re-send the
    /// reporting mode.
    pub fn poll_motion_plus(&mut self) -> Result<()> {
        if !self.motion_plus.polling() {
            return Ok(());
        }
        let probe = self.probe_motion_plus();
        probe.and(self.send_data_mode())
    }

    fn probe_motion_plus(&mut self) -> Result<()> {
        self.send(&protocol::build_read_memory(
            AddressSpace::Register,
            protocol::MOTION_PLUS_ID_ADDRESS,
            protocol::MOTION_PLUS_ID_LENGTH,
            self.rumble(),
        ))
    }

    fn request_calibration(&mut self) -> Result<()> {
        self.send(&protocol::build_read_memory(
            AddressSpace::Eeprom,
            protocol::CALIBRATION_ADDRESS,
            protocol::CALIBRATION_LENGTH,
            self.rumble(),
        ))
    }

    fn data_mode(&self) -> DataMode {
        if self.data_types.contains(DataTypes::MOTION_PLUS) && self.motion_plus.state().is_reporting()
        {
            DataMode::ButtonsAccelExtension
        } else if self.data_types.contains(DataTypes::ACCELEROMETER) {
            DataMode::ButtonsAccel
        } else {
            DataMode::Buttons
        }
    }

    fn send_data_mode(&mut self) -> Result<()> {
        let mode = self.data_mode();
        if mode == DataMode::Buttons {
            self.smoother.reset();
        }
        log::debug!("Reporting mode 0x{:02x}", mode as u8);
        self.send(&protocol::build_data_mode_report(mode, self.rumble()))
    }

    /// Dispatch one input report.
    pub fn handle_report(&mut self, raw: &RawReport) {
        let at = raw.timestamp;
        match protocol::decode(raw.data()) {
            Ok(report) => match self.phase {
                Phase::AwaitingCalibration => self.handle_handshake(&report),
                Phase::Ready => self.dispatch(&report, at),
                Phase::Closed | Phase::Opening => {
                    log::trace!("Ignoring report in {:?}: {:?}", self.phase, report);
                }
            },
            Err(e) => {
                log::trace!("Undecodable report: {}", e);
                if self.phase == Phase::AwaitingCalibration {
                    self.retry_calibration();
                }
            }
        }
        self.last_report = Some(at);
    }

    fn handle_handshake(&mut self, report: &Report) {
        let calibration = match report {
            Report::MemoryRead(read) => AccelCalibration::from_read(read),
            _ => None,
        };
        let Some(calibration) = calibration else {
            self.retry_calibration();
            return;
        };

        log::info!(
            "Calibration received: zero={:?} gravity={:?}",
            calibration.zero,
            calibration.gravity
        );
        self.calibration = Some(calibration);
        self.phase = Phase::Ready;
        self.status_polling = true;
        let _ = self.poll_status();
    }

    fn retry_calibration(&mut self) {
        if self.calibration_abandoned {
            return;
        }
        if let Some(limit) = self.config.calibration_retry_limit {
            if self.calibration_retries >= limit {
                log::warn!("No calibration after {} retries, giving up", limit);
                self.calibration_abandoned = true;
                self.emit(Event::CalibrationAbandoned);
                return;
            }
        }
        self.calibration_retries += 1;
        log::trace!("Re-requesting calibration (retry {})", self.calibration_retries);
        let _ = self.request_calibration();
    }

    fn dispatch(&mut self, report: &Report, at: Timestamp) {
        match *report {
            Report::ButtonsAccelExtension { accel, gyro, .. } => {
                let rates = self.handle_gyro(&gyro, at);
                self.handle_accel(accel, rates, at);
            }
            Report::ButtonsAccel { accel, .. } => self.handle_accel(accel, None, at),
            Report::MemoryRead(read) => self.handle_memory_read(&read, at),
            Report::Status { battery, .. } => self.handle_status(battery),
            Report::Acknowledge { report, error, .. } => {
                if error != 0 {
                    log::warn!("Device rejected report 0x{:02x} (error {})", report, error);
                }
            }
            Report::Buttons(_) => {}
            Report::Unknown(id) => log::trace!("Ignoring report 0x{:02x}", id),
        }

        if let Some(buttons) = report.buttons() {
            if buttons != self.buttons {
                self.buttons = buttons;
                self.emit(Event::ButtonsChanged(buttons));
            }
        }
    }

    /// Returns angular rates once the extension is calibrated.
    fn handle_gyro(&mut self, gyro: &GyroSample, at: Timestamp) -> Option<Vector3> {
        if !self.data_types.contains(DataTypes::MOTION_PLUS) {
            return None;
        }
        match self.motion_plus.state() {
            MotionPlusState::Working => {
                if self.motion_plus.feed(gyro, at) {
                    log::info!("MotionPlus calibrated");
                    self.emit(Event::MotionPlusStateChanged(MotionPlusState::Calibrated));
                }
                None
            }
            MotionPlusState::Calibrated => {
                self.motion_plus.feed(gyro, at);
                Some(self.motion_plus.rates(gyro, self.config.gyro_deadband))
            }
            MotionPlusState::Inactive | MotionPlusState::Activated => None,
        }
    }

    fn handle_accel(&mut self, accel: [u16; 3], rates: Option<Vector3>, at: Timestamp) {
        if !self.data_types.contains(DataTypes::ACCELEROMETER) {
            return;
        }
        let Some(calibration) = self.calibration else {
            return;
        };
        if let Some(value) = self.smoother.push(at, accel, &calibration) {
            self.emit(Event::AccelerationChanged(value));
        }
        self.update_orientation(rates, at);
    }

    fn update_orientation(&mut self, rates: Option<Vector3>, at: Timestamp) {
        let mode = self.orientation.mode();
        if mode == OrientationMode::None {
            return;
        }
        let acceleration = self.smoother.value();
        let updated = if let Some(rates) = rates {
            let elapsed_ms = self
                .last_report
                .map(|previous| clock::elapsed_ms(previous, at))
                .unwrap_or(0.0);
            self.orientation.integrate(rates, elapsed_ms);
            if mode == OrientationMode::Mixed {
                self.orientation.mix(&acceleration);
            }
            true
        } else if !self.data_types.contains(DataTypes::MOTION_PLUS) {
            self.orientation.from_gravity(&acceleration)
        } else {
            false
        };
        if updated {
            self.emit(Event::OrientationChanged);
        }
    }

    fn handle_memory_read(&mut self, read: &MemoryRead, at: Timestamp) {
        if !read.is_motion_plus_id() {
            if read.error {
                log::debug!("Memory read at 0x{:04x} failed", read.offset);
            }
            return;
        }
        if !self.data_types.contains(DataTypes::MOTION_PLUS) || !self.motion_plus.identified(at) {
            return;
        }

        log::info!("MotionPlus detected, enabling");
        let enable = protocol::build_write_memory(
            AddressSpace::Register,
            protocol::MOTION_PLUS_ENABLE_ADDRESS,
            &[protocol::MOTION_PLUS_ENABLE_VALUE],
            self.rumble(),
        );
        let _ = self.send(&enable);
        self.emit(Event::MotionPlusStateChanged(MotionPlusState::Working));
        let _ = self.send_data_mode();
    }

    fn handle_status(&mut self, battery: BatteryState) {
        if battery.level != self.battery.level {
            self.battery.level = battery.level;
            self.emit(Event::BatteryChanged(battery.level));
        }
        if battery.empty != self.battery.empty {
            self.battery.empty = battery.empty;
            self.emit(Event::BatteryEmpty(battery.empty));
        }

        // An unsolicited status report means the device dropped back to its
        // default reporting mode (e.g. extension hot-plug).
        if !self.status_requested {
            log::debug!("Unsolicited status report, re-sending reporting mode");
            let _ = self.send_data_mode();
        }
        self.status_requested = false;
    }
}
