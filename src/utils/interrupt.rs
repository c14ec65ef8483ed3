//! Caller-issued interrupts
//!
//! A run is interrupted by SIGINT/SIGTERM (or programmatically in tests).
//! Long running awaits race against [`InterruptSignal::raised`] and unwind
//! with `PipelineError::Interrupted` as soon as it fires.

use tokio::sync::watch;
use tracing::warn;

/// Receiving side, cheap to clone into every stage
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side
#[derive(Debug)]
pub struct InterruptTrigger {
    tx: watch::Sender<bool>,
}

pub fn interrupt_channel() -> (InterruptTrigger, InterruptSignal) {
    let (tx, rx) = watch::channel(false);
    (InterruptTrigger { tx }, InterruptSignal { rx })
}

impl InterruptTrigger {
    pub fn raise(&self) {
        let _ = self.tx.send(true);
    }
}

impl InterruptSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_trigger, signal) = interrupt_channel();
        signal
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the interrupt has been raised; pends forever otherwise
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Trigger dropped without firing
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Spawn a task that raises the interrupt on Ctrl+C or SIGTERM
pub fn listen_for_signals() -> InterruptSignal {
    let (trigger, signal) = interrupt_channel();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            warn!("📡 Received SIGINT (Ctrl+C), stopping pipeline...")
                        }
                        _ = sigterm.recv() => warn!("📡 Received SIGTERM, stopping pipeline..."),
                    }
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("📡 Received SIGINT (Ctrl+C), stopping pipeline...");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("📡 Received Ctrl+C, stopping pipeline...");
            }
        }

        trigger.raise();
    });

    signal
}
