//! HID transport: device discovery, output report writes and the
//! single-outstanding-read input loop.

use crate::config::WiimoteConfig;
use crate::engine::ReportWriter;
use crate::protocol::{self, RawReport, PID, REPORT_SIZE, VID};
use crate::types::Leds;
use crate::{clock, Result, WiimoteError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use hidapi::{HidApi, HidDevice};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Output half of a HID connection.
pub trait ReportSink: Send {
    fn send_report(&mut self, data: &[u8]) -> Result<usize>;
}

/// Input half of a HID connection. `Ok(0)` means the timeout elapsed.
pub trait ReportSource: Send {
    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;
}

impl ReportSink for HidDevice {
    fn send_report(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.write(data)?)
    }
}

impl ReportSource for HidDevice {
    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        Ok(self.read_timeout(buf, timeout_ms)?)
    }
}

/// Outcome of one armed read.
#[derive(Debug, Clone)]
pub enum ReadCompletion {
    Report(RawReport),
    Error(String),
}

fn is_wiimote(d: &hidapi::DeviceInfo) -> bool {
    d.vendor_id() == VID && d.product_id() == PID
}

fn create_hid_api() -> Result<HidApi> {
    let api = HidApi::new()?;
    #[cfg(target_os = "macos")]
    {
        // The writer and the reader each hold their own handle.
        api.set_open_exclusive(false);
    }
    Ok(api)
}

/// Writes fixed-size output reports.
pub struct HidWriter {
    sink: Box<dyn ReportSink>,
}

impl HidWriter {
    pub fn new(sink: Box<dyn ReportSink>) -> Self {
        Self { sink }
    }
}

impl ReportWriter for HidWriter {
    /// Pads `report` with zeros to the 22-byte report size.
    fn write_report(&mut self, report: &[u8]) -> Result<()> {
        if report.is_empty() || report.len() > REPORT_SIZE {
            return Err(WiimoteError::InvalidLength(report.len()));
        }
        let padded = protocol::build_report(report);
        self.sink
            .send_report(&padded)
            .map_err(|e| WiimoteError::Write(e.to_string()))?;
        Ok(())
    }
}

/// Background input loop.
///
/// The reader thread performs one read per `arm()` call and posts the
/// outcome on `completions()`. It never reads ahead of the consumer.
pub struct Reader {
    arm: Option<Sender<()>>,
    completions: Receiver<ReadCompletion>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Reader {
    pub fn start(source: Box<dyn ReportSource>, poll_timeout_ms: i32) -> Result<Reader> {
        let (arm_tx, arm_rx) = crossbeam_channel::bounded(1);
        let (completion_tx, completions) = crossbeam_channel::bounded(1);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name("wiimote-reader".into())
            .spawn(move || {
                reader_loop(source, arm_rx, completion_tx, stop_clone, poll_timeout_ms);
            })
            .map_err(|e| WiimoteError::Read(format!("Failed to spawn reader thread: {}", e)))?;

        Ok(Reader {
            arm: Some(arm_tx),
            completions,
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Allow the reader to perform its next read. No-op if a read is
    /// already armed or the reader is closed.
    pub fn arm(&self) {
        if let Some(arm) = &self.arm {
            let _ = arm.try_send(());
        }
    }

    pub fn completions(&self) -> &Receiver<ReadCompletion> {
        &self.completions
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the loop and wait for the reader thread. Idempotent.
    pub fn close(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        self.arm = None;
        // Unblock a reader waiting to post a completion nobody will take.
        while self.completions.try_recv().is_ok() {}
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

fn reader_loop(
    mut source: Box<dyn ReportSource>,
    arm: Receiver<()>,
    completions: Sender<ReadCompletion>,
    stop_flag: Arc<AtomicBool>,
    poll_timeout_ms: i32,
) {
    let poll = Duration::from_millis(poll_timeout_ms.max(1) as u64);
    let mut buf = [0u8; REPORT_SIZE];

    log::debug!("Reader started");

    'armed: loop {
        match arm.recv_timeout(poll) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let completion = loop {
            if stop_flag.load(Ordering::Relaxed) {
                break 'armed;
            }
            // Bounded wait so the stop flag is observed.
            match source.read_report(&mut buf, poll_timeout_ms) {
                Ok(0) => continue,
                Ok(n) => break ReadCompletion::Report(RawReport::new(clock::now(), &buf[..n])),
                Err(e) => {
                    log::warn!("Read error: {}", e);
                    break ReadCompletion::Error(e.to_string());
                }
            }
        };

        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        if completions.send(completion).is_err() {
            log::debug!("Completion channel disconnected, stopping reader");
            break;
        }
    }

    log::debug!("Reader stopped");
}

/// An open connection: the report writer plus the input loop.
pub struct Transport {
    /// Kept alive for the lifetime of the handles (IOKit run loop on macOS).
    api: Option<HidApi>,
    writer: HidWriter,
    reader: Reader,
}

impl Transport {
    /// Open the first connected Wii Remote.
    ///
    /// A zeroed LED report is written as a liveness probe. Paired but
    /// unreachable controllers are still listed by the OS and fail here.
    pub fn open(config: &WiimoteConfig) -> Result<Transport> {
        let api = create_hid_api()?;

        let info = api
            .device_list()
            .find(|d| is_wiimote(d))
            .ok_or(WiimoteError::DeviceNotFound)?;
        let path = info.path().to_owned();
        log::info!(
            "Found Wii Remote at {:?} ({})",
            path,
            info.product_string().unwrap_or("unknown")
        );

        let write_handle = api.open_path(&path)?;
        let read_handle = api.open_path(&path)?;

        let mut writer = HidWriter::new(Box::new(write_handle));
        if let Err(e) = writer.write_report(&protocol::build_led_report(Leds::empty())) {
            log::warn!("Liveness probe failed: {}", e);
            return Err(WiimoteError::DeviceNotFound);
        }

        let reader = Reader::start(Box::new(read_handle), config.read_poll_timeout_ms)?;
        Ok(Transport {
            api: Some(api),
            writer,
            reader,
        })
    }

    /// Build a transport over arbitrary report endpoints.
    pub fn from_parts(
        sink: Box<dyn ReportSink>,
        source: Box<dyn ReportSource>,
        config: &WiimoteConfig,
    ) -> Result<Transport> {
        Ok(Transport {
            api: None,
            writer: HidWriter::new(sink),
            reader: Reader::start(source, config.read_poll_timeout_ms)?,
        })
    }

    pub(crate) fn into_parts(self) -> (Option<HidApi>, HidWriter, Reader) {
        (self.api, self.writer, self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<Vec<u8>>>>);

    impl ReportSink for Captured {
        fn send_report(&mut self, data: &[u8]) -> Result<usize> {
            self.0.lock().unwrap().push(data.to_vec());
            Ok(data.len())
        }
    }

    struct Scripted {
        reads: Vec<Result<Vec<u8>>>,
    }

    impl ReportSource for Scripted {
        fn read_report(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize> {
            if self.reads.is_empty() {
                std::thread::sleep(Duration::from_millis(1));
                return Ok(0);
            }
            let data = self.reads.remove(0)?;
            buf[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_writer_pads_and_validates() {
        let captured = Captured::default();
        let mut writer = HidWriter::new(Box::new(captured.clone()));

        writer.write_report(&[0x11, 0x10]).unwrap();
        assert!(matches!(writer.write_report(&[]), Err(WiimoteError::InvalidLength(0))));
        assert!(matches!(
            writer.write_report(&[0u8; 23]),
            Err(WiimoteError::InvalidLength(23))
        ));

        let writes = captured.0.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), REPORT_SIZE);
        assert_eq!(&writes[0][..3], &[0x11, 0x10, 0x00]);
    }

    #[test]
    fn test_reader_reads_only_when_armed() {
        let source = Scripted {
            reads: vec![Ok(vec![0x30, 0x00, 0x08]), Ok(vec![0x30, 0x00, 0x00])],
        };
        let mut reader = Reader::start(Box::new(source), 5).unwrap();

        assert!(reader
            .completions()
            .recv_timeout(Duration::from_millis(50))
            .is_err());

        reader.arm();
        match reader.completions().recv_timeout(Duration::from_secs(1)) {
            Ok(ReadCompletion::Report(raw)) => assert_eq!(raw.data(), &[0x30, 0x00, 0x08]),
            other => panic!("unexpected completion: {:?}", other),
        }
        assert!(reader
            .completions()
            .recv_timeout(Duration::from_millis(50))
            .is_err());

        reader.arm();
        assert!(matches!(
            reader.completions().recv_timeout(Duration::from_secs(1)),
            Ok(ReadCompletion::Report(_))
        ));
        reader.close();
        assert!(!reader.is_active());
    }

    #[test]
    fn test_reader_reports_errors() {
        let source = Scripted {
            reads: vec![Err(WiimoteError::Read("link lost".into()))],
        };
        let mut reader = Reader::start(Box::new(source), 5).unwrap();
        reader.arm();
        match reader.completions().recv_timeout(Duration::from_secs(1)) {
            Ok(ReadCompletion::Error(msg)) => assert!(msg.contains("link lost")),
            other => panic!("unexpected completion: {:?}", other),
        }
        reader.close();
    }
}
