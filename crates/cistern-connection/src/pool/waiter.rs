//! Handoff rendezvous between `release` and a waiting `acquire`
//!
//! Each waiter owns a single-use channel. `release` sends the connection into
//! the channel of one specific waiter, so exactly one caller is woken per
//! released connection. A waiter leaves by closing its receiver; from then on
//! sends to it fail and hand the connection back to the releaser.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;

use super::handle::PooledConnection;
use super::pool::ConnectionPool;

pub(super) type HandoffSender = oneshot::Sender<PooledConnection>;
pub(super) type HandoffReceiver = oneshot::Receiver<PooledConnection>;

pub(super) fn channel() -> (HandoffSender, HandoffReceiver) {
    oneshot::channel()
}

/// Offer `conn` to waiters in the order `next_waiter` yields them
///
/// Waiters that already left are skipped. Gives the connection back if no
/// waiter took it.
pub(super) fn hand_off(
    mut next_waiter: impl FnMut() -> Option<HandoffSender>,
    mut conn: PooledConnection,
    in_transit: &AtomicUsize,
) -> Result<(), PooledConnection> {
    while let Some(tx) = next_waiter() {
        if tx.is_closed() {
            continue;
        }

        let id = conn.id();
        in_transit.fetch_add(1, Ordering::SeqCst);
        match tx.send(conn) {
            Ok(()) => {
                tracing::debug!(connection_id = %id, "handed connection to waiter");
                return Ok(());
            }
            Err(returned) => {
                // Waiter left between the check and the send
                in_transit.fetch_sub(1, Ordering::SeqCst);
                conn = returned;
            }
        }
    }
    Err(conn)
}

/// A caller's place in the waiting queue
///
/// Dropping an unsettled ticket (for example when the `acquire` future is
/// cancelled) closes the channel and releases anything that already arrived
/// back into the pool.
pub(super) struct WaitTicket<'a, P: ConnectionPool + ?Sized> {
    rx: HandoffReceiver,
    in_transit: &'a AtomicUsize,
    pool: &'a P,
    settled: bool,
}

impl<'a, P: ConnectionPool + ?Sized> WaitTicket<'a, P> {
    pub(super) fn new(rx: HandoffReceiver, in_transit: &'a AtomicUsize, pool: &'a P) -> Self {
        Self {
            rx,
            in_transit,
            pool,
            settled: false,
        }
    }

    /// Wait up to `timeout` for a handoff
    ///
    /// On timeout the waiter leaves. A connection that was sent before it
    /// left is still returned; later sends are refused.
    pub(super) async fn wait(mut self, timeout: Duration) -> Option<PooledConnection> {
        let received = match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(conn)) => Some(conn),
            Ok(Err(_)) => None,
            Err(_) => self.leave(),
        };
        self.settle(received)
    }

    /// Leave the queue now, keeping anything that already arrived
    pub(super) fn depart(mut self) -> Option<PooledConnection> {
        let received = self.leave();
        self.settle(received)
    }

    fn leave(&mut self) -> Option<PooledConnection> {
        self.rx.close();
        self.rx.try_recv().ok()
    }

    fn settle(&mut self, received: Option<PooledConnection>) -> Option<PooledConnection> {
        self.settled = true;
        if received.is_some() {
            self.in_transit.fetch_sub(1, Ordering::SeqCst);
        }
        received
    }
}

impl<P: ConnectionPool + ?Sized> Drop for WaitTicket<'_, P> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(conn) = self.leave() {
            self.in_transit.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(connection_id = %conn.id(), "waiter cancelled after handoff, releasing connection");
            self.pool.release(conn);
        }
    }
}
