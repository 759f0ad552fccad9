//! Connection state monitoring for [`ConnectClient`](crate::ConnectClient).
//!
//! `gRPC`'s `ClientConn.GetState()`/`WaitForStateChange` pair doesn't have a
//! direct analogue over plain HTTP, so [`ConnectionMonitor`] samples
//! reachability instead: it issues a cheap probe against the client's base
//! URL on a timer and publishes the observed state through a
//! `tokio::sync::watch` channel, emitting only on change after the initial
//! sample.

use std::time::Duration;

use tokio::sync::watch;

use crate::ConnectClient;

/// Default poll interval used when the caller passes `Duration::ZERO`.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Observed reachability of a [`ConnectClient`]'s upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The most recent probe succeeded.
    Ready,
    /// The most recent probe failed (transport error or non-2xx/404 status).
    Unavailable,
}

/// Periodically samples a client's reachability and publishes state changes.
///
/// Drop the monitor (or the [`watch::Receiver`] returned by
/// [`subscribe`](Self::subscribe)) to stop polling.
pub struct ConnectionMonitor {
    rx: watch::Receiver<ConnectionState>,
    _task: tokio::task::JoinHandle<()>,
}

impl ConnectionMonitor {
    /// Start monitoring `client`, sampling every `interval`.
    ///
    /// `interval` of zero is coerced to the 2 second default. The initial
    /// state is emitted immediately (a synchronous best-effort probe cannot
    /// be performed before returning, so the monitor starts in
    /// [`ConnectionState::Unavailable`] until the first sample completes).
    pub fn new(client: ConnectClient, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };

        let (tx, rx) = watch::channel(ConnectionState::Unavailable);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let state = probe(&client).await;
                // `send_if_modified` only emits when the state actually changes.
                tx.send_if_modified(|current| {
                    if *current == state {
                        false
                    } else {
                        *current = state;
                        true
                    }
                });
                if tx.is_closed() {
                    return;
                }
            }
        });

        Self { rx, _task: task }
    }

    /// Subscribe to state changes. The returned receiver always yields the
    /// current state first, then only on subsequent changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// The most recently observed state.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self._task.abort();
    }
}

async fn probe(client: &ConnectClient) -> ConnectionState {
    match client.http().head(client.base_url()).send().await {
        Ok(_) => ConnectionState::Ready,
        Err(_) => ConnectionState::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_coerces_to_default() {
        assert_eq!(DEFAULT_POLL_INTERVAL, Duration::from_secs(2));
    }
}
