use crate::error::Result;
use crate::signal::Signal;
use crate::traits::SignalSink;

/// Signal bus using tokio broadcast channel.
/// All subscribers receive all signals.
pub struct SignalBus {
    tx: tokio::sync::broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, signal: Signal) {
        // Ignore error if no receivers
        let _ = self.tx.send(signal);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SignalSink for SignalBus {
    fn emit(&self, signal: Signal) -> Result<()> {
        self.publish(signal);
        Ok(())
    }
}
