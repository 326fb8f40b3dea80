use crate::engine::ReportWriter;
use crate::{Result, WiimoteError};

/// Records every output report and can be told to fail.
#[derive(Debug, Default)]
pub(crate) struct RecordingWriter {
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
}

impl RecordingWriter {
    pub(crate) fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub(crate) fn clear(&mut self) {
        self.writes.clear();
    }

    pub(crate) fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of writes whose leading bytes equal `prefix`.
    pub(crate) fn count(&self, prefix: &[u8]) -> usize {
        self.writes.iter().filter(|w| w.starts_with(prefix)).count()
    }

    pub(crate) fn last(&self) -> Option<&[u8]> {
        self.writes.last().map(|w| w.as_slice())
    }
}

impl ReportWriter for RecordingWriter {
    fn write_report(&mut self, report: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(WiimoteError::Write("injected failure".into()));
        }
        self.writes.push(report.to_vec());
        Ok(())
    }
}
