use crate::config::WiimoteConfig;
use crate::engine::Engine;
use crate::hid::{HidWriter, ReadCompletion, Reader, Transport};
use crate::types::{
    Buttons, DataTypes, DeviceSnapshot, Event, Leds, Matrix3, MotionPlusState, OrientationMode,
    Phase, Smoothing, Vector3,
};
use crate::{Result, WiimoteError};
use crossbeam_channel::{Receiver, Sender};
use hidapi::HidApi;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum Command {
    SetDataTypes(DataTypes, Sender<Result<()>>),
    SetLeds(Leds, Sender<Result<()>>),
    SetSmoothing(Smoothing),
    SetOrientationMode(OrientationMode),
    Stop(Sender<Result<()>>),
}

/// A running Wii Remote session.
///
/// All device state is owned by a single reactor thread that serializes
/// input reports, timer ticks and the commands issued through this handle.
/// Getters read the snapshot published after each of those steps.
pub struct Wiimote {
    commands: Sender<Command>,
    events: Receiver<Event>,
    state: Arc<Mutex<DeviceSnapshot>>,
    thread: Option<JoinHandle<()>>,
    /// HidApi keeps the IOKit run loop alive on macOS.
    _api: Option<HidApi>,
}

impl Wiimote {
    /// Open the first Wii Remote and start reporting `data_types`, with
    /// configuration taken from `WIIMOTE_*` environment variables.
    pub fn start(data_types: DataTypes) -> Result<Wiimote> {
        Self::start_with_config(data_types, WiimoteConfig::from_env())
    }

    pub fn start_with_config(data_types: DataTypes, config: WiimoteConfig) -> Result<Wiimote> {
        let transport = Transport::open(&config)?;
        Self::start_with_transport(transport, data_types, config)
    }

    /// Run a session over an already open transport.
    ///
    /// Issues the reporting mode and the calibration read before returning.
    /// Sample reports are ignored until the calibration response arrives.
    pub fn start_with_transport(
        transport: Transport,
        data_types: DataTypes,
        config: WiimoteConfig,
    ) -> Result<Wiimote> {
        let (api, writer, mut reader) = transport.into_parts();
        let mut engine = Engine::new(writer, config.clone());

        reader.arm();
        if let Err(e) = engine.begin(data_types) {
            reader.close();
            return Err(e);
        }

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(256);
        let state = Arc::new(Mutex::new(engine.snapshot()));

        let mut reactor = Reactor {
            engine,
            reader,
            config,
            commands: command_rx,
            events: event_tx,
            state: state.clone(),
        };
        reactor.publish();

        let thread = std::thread::Builder::new()
            .name("wiimote-reactor".into())
            .spawn(move || reactor.run())
            .map_err(|e| WiimoteError::Read(format!("Failed to spawn reactor thread: {}", e)))?;

        Ok(Wiimote {
            commands: command_tx,
            events: event_rx,
            state,
            thread: Some(thread),
            _api: api,
        })
    }

    fn request<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(Sender<Result<()>>) -> Command,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(build(reply_tx))
            .map_err(|_| WiimoteError::NotRunning)?;
        reply_rx.recv().map_err(|_| WiimoteError::NotRunning)?
    }

    /// Select which data types are reported. `MOTION_PLUS` implies
    /// `ACCELEROMETER`.
    pub fn set_data_types(&self, data_types: DataTypes) -> Result<()> {
        self.request(|reply| Command::SetDataTypes(data_types, reply))
    }

    /// Set the player LEDs and rumble motor.
    pub fn set_leds(&self, leds: Leds) -> Result<()> {
        self.request(|reply| Command::SetLeds(leds, reply))
    }

    pub fn set_smoothing(&self, smoothing: Smoothing) -> Result<()> {
        self.commands
            .send(Command::SetSmoothing(smoothing))
            .map_err(|_| WiimoteError::NotRunning)
    }

    pub fn set_orientation_mode(&self, mode: OrientationMode) -> Result<()> {
        self.commands
            .send(Command::SetOrientationMode(mode))
            .map_err(|_| WiimoteError::NotRunning)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> DeviceSnapshot {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Calibrated (smoothed) acceleration in g.
    pub fn acceleration(&self) -> Vector3 {
        self.snapshot().acceleration
    }

    /// Last raw accelerometer sample used.
    pub fn raw_acceleration(&self) -> Vector3 {
        self.snapshot().raw_acceleration
    }

    pub fn orientation(&self) -> Matrix3 {
        self.snapshot().orientation
    }

    pub fn orientation_pitch(&self) -> f64 {
        self.snapshot().euler_deg[0]
    }

    pub fn orientation_roll(&self) -> f64 {
        self.snapshot().euler_deg[1]
    }

    pub fn orientation_yaw(&self) -> f64 {
        self.snapshot().euler_deg[2]
    }

    pub fn buttons(&self) -> Buttons {
        self.snapshot().buttons
    }

    pub fn battery_level(&self) -> u8 {
        self.snapshot().battery.level
    }

    pub fn battery_empty(&self) -> bool {
        self.snapshot().battery.empty
    }

    pub fn leds(&self) -> Leds {
        self.snapshot().leds
    }

    pub fn data_types(&self) -> DataTypes {
        self.snapshot().data_types
    }

    pub fn motion_plus_state(&self) -> MotionPlusState {
        self.snapshot().motion_plus
    }

    pub fn phase(&self) -> Phase {
        self.snapshot().phase
    }

    /// Whether the last gyro sample was at rest.
    pub fn is_still(&self) -> bool {
        self.snapshot().still
    }

    /// Block until the next event.
    pub fn recv_event(&self) -> Result<Event> {
        self.events
            .recv()
            .map_err(|_| WiimoteError::ChannelDisconnected)
    }

    pub fn try_recv_event(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<Event> {
        self.events.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => WiimoteError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => WiimoteError::ChannelDisconnected,
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Revert the device to buttons-only reporting and close the session.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let result = match self.commands.send(Command::Stop(reply_tx)) {
            Ok(()) => reply_rx.recv().unwrap_or(Err(WiimoteError::NotRunning)),
            Err(_) => Err(WiimoteError::NotRunning),
        };
        let _ = thread.join();
        result
    }
}

impl Drop for Wiimote {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::debug!("Shutdown on drop: {}", e);
        }
    }
}

fn ticker(enabled: bool, interval: Duration) -> Receiver<Instant> {
    if enabled {
        crossbeam_channel::tick(interval)
    } else {
        crossbeam_channel::never()
    }
}

struct Reactor {
    engine: Engine<HidWriter>,
    reader: Reader,
    config: WiimoteConfig,
    commands: Receiver<Command>,
    events: Sender<Event>,
    state: Arc<Mutex<DeviceSnapshot>>,
}

impl Reactor {
    fn run(mut self) {
        log::info!("Reactor started");
        let commands = self.commands.clone();
        let mut completions = self.reader.completions().clone();
        let mut status_on = false;
        let mut status_timer = crossbeam_channel::never();
        let mut motion_plus_on = false;
        let mut motion_plus_timer = crossbeam_channel::never();

        loop {
            if self.engine.status_polling() != status_on {
                status_on = self.engine.status_polling();
                status_timer = ticker(status_on, self.config.status_poll_interval);
            }
            if self.engine.motion_plus_polling() != motion_plus_on {
                motion_plus_on = self.engine.motion_plus_polling();
                motion_plus_timer = ticker(motion_plus_on, self.config.motion_plus_poll_interval);
            }

            crossbeam_channel::select! {
                recv(completions) -> msg => match msg {
                    Ok(ReadCompletion::Report(raw)) => {
                        self.reader.arm();
                        self.engine.handle_report(&raw);
                    }
                    Ok(ReadCompletion::Error(e)) => {
                        log::error!("Read failed, input loop halted: {}", e);
                        self.send_event(Event::DeviceError(e));
                    }
                    Err(_) => {
                        log::warn!("Reader disconnected");
                        completions = crossbeam_channel::never();
                    }
                },
                recv(commands) -> cmd => match cmd {
                    Ok(Command::SetDataTypes(data_types, reply)) => {
                        let _ = reply.send(self.engine.set_data_types(data_types));
                    }
                    Ok(Command::SetLeds(leds, reply)) => {
                        let _ = reply.send(self.engine.set_leds(leds));
                    }
                    Ok(Command::SetSmoothing(smoothing)) => self.engine.set_smoothing(smoothing),
                    Ok(Command::SetOrientationMode(mode)) => self.engine.set_orientation_mode(mode),
                    Ok(Command::Stop(reply)) => {
                        let result = self.engine.shutdown();
                        self.close();
                        let _ = reply.send(result);
                        break;
                    }
                    Err(_) => {
                        if let Err(e) = self.engine.shutdown() {
                            log::warn!("Shutdown failed: {}", e);
                        }
                        self.close();
                        break;
                    }
                },
                recv(status_timer) -> _ => {
                    if let Err(e) = self.engine.poll_status() {
                        log::warn!("Status poll failed: {}", e);
                    }
                }
                recv(motion_plus_timer) -> _ => {
                    if let Err(e) = self.engine.poll_motion_plus() {
                        log::warn!("MotionPlus probe failed: {}", e);
                    }
                }
            }

            self.publish();
        }
        log::info!("Reactor stopped");
    }

    fn close(&mut self) {
        self.reader.close();
        self.publish();
    }

    fn publish(&mut self) {
        let snapshot = self.engine.snapshot();
        match self.state.lock() {
            Ok(mut state) => *state = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        for event in self.engine.drain_events() {
            self.send_event(event);
        }
    }

    fn send_event(&self, event: Event) {
        if let Err(e) = self.events.try_send(event) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("Event channel full, dropping event");
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {}
            }
        }
    }
}
