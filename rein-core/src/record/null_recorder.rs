use super::{Record, Recorder};

/// Discards all records, for runs whose metrics are not inspected.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRecorder;

impl NullRecorder {
    /// Creates the recorder.
    pub fn new() -> Self {
        Self
    }
}

impl Recorder for NullRecorder {
    fn write(&mut self, _: Record) {}
}
