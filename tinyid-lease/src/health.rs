use std::{fmt, sync::Arc, time::Duration};

use tokio::{select, sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::stream::IdentifierStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Up,
    Down,
}

impl Readiness {
    pub fn of<S: IdentifierStream + ?Sized>(stream: &S) -> Readiness {
        if stream.ready() {
            Readiness::Up
        } else {
            Readiness::Down
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, Readiness::Up)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Up => f.write_str("UP"),
            Readiness::Down => f.write_str("DOWN"),
        }
    }
}

/// Periodically polls an identifier stream's readiness and publishes it.
pub struct ReadinessProbe {
    readiness_rx: watch::Receiver<Readiness>,
    handle: JoinHandle<()>,
}

impl ReadinessProbe {
    pub fn spawn<S>(stream: Arc<S>, interval: Duration, cancel: CancellationToken) -> ReadinessProbe
    where
        S: IdentifierStream + 'static,
    {
        let (readiness_tx, readiness_rx) = watch::channel(Readiness::of(stream.as_ref()));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                select! {
                    _ = cancel.cancelled() => {
                        return;
                    }
                    _ = ticker.tick() => {
                        let readiness = Readiness::of(stream.as_ref());
                        readiness_tx.send_if_modified(|current| {
                            if *current == readiness {
                                return false;
                            }
                            info!(%readiness, "identifier stream readiness changed");
                            *current = readiness;
                            true
                        });
                    }
                }
            }
        });
        ReadinessProbe {
            readiness_rx,
            handle,
        }
    }

    pub fn subscribe_readiness(&self) -> watch::Receiver<Readiness> {
        self.readiness_rx.clone()
    }

    pub fn current(&self) -> Readiness {
        *self.readiness_rx.borrow()
    }

    /// Wait for the probe task to stop after its token is cancelled.
    pub async fn stopped(self) {
        let _ = self.handle.await;
    }
}
