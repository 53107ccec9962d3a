use std::sync::Mutex;

use baton_core::error::{BatonError, Result};
use baton_core::signal::{Signal, SignalType};
use baton_core::traits::SignalSink;

/// Signal sink that keeps every emitted signal.
#[derive(Default)]
pub struct RecordingSink {
    signals: Mutex<Vec<Signal>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn types(&self) -> Vec<SignalType> {
        self.signals().iter().map(|s| s.signal_type).collect()
    }

    pub fn count(&self, signal_type: SignalType) -> usize {
        self.signals()
            .iter()
            .filter(|s| s.signal_type == signal_type)
            .count()
    }
}

impl SignalSink for RecordingSink {
    fn emit(&self, signal: Signal) -> Result<()> {
        self.signals.lock().unwrap().push(signal);
        Ok(())
    }
}

/// Signal sink that rejects every signal.
#[derive(Default)]
pub struct FailingSink;

impl SignalSink for FailingSink {
    fn emit(&self, signal: Signal) -> Result<()> {
        Err(BatonError::Signal(format!(
            "sink unavailable for {} signal",
            signal.signal_type
        )))
    }
}
