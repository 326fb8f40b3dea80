//! Test doubles and input report builders.

pub(crate) mod mock;
pub(crate) mod reports;

pub(crate) use mock::RecordingWriter;
