//! Unbuffered, acknowledged hand-off between tasks.
//!
//! [`Handoff::deliver`] does not return until the receiving side has taken
//! the value *and* completed the returned [`Delivery`]. Meta notifications
//! and the reset-ready signal travel over this queue, which is what keeps the
//! reset handshake synchronous: a sender can never run ahead of the engine.

use tokio::sync::{mpsc, oneshot};

use crate::error::QueueClosed;

/// Create a connected sender/receiver pair.
pub fn channel<T>() -> (Handoff<T>, Accept<T>) {
    let (tx, rx) = mpsc::channel(1);
    (Handoff { tx }, Accept { rx })
}

/// Sending half. Cloneable; every clone feeds the same receiver.
#[derive(Debug)]
pub struct Handoff<T> {
    tx: mpsc::Sender<Delivery<T>>,
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Handoff<T> {
    /// Hand `value` over and wait until the receiver has completed it.
    ///
    /// Fails if the receiver is dropped, or drops the delivery without
    /// completing it.
    pub async fn deliver(&self, value: T) -> Result<(), QueueClosed> {
        let (done, completed) = oneshot::channel();
        self.tx
            .send(Delivery { value, done })
            .await
            .map_err(|_| QueueClosed)?;
        completed.await.map_err(|_| QueueClosed)
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct Accept<T> {
    rx: mpsc::Receiver<Delivery<T>>,
}

impl<T> Accept<T> {
    /// Wait for the next delivery. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Delivery<T>> {
        self.rx.recv().await
    }

    /// Take a delivery only if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Delivery<T>> {
        self.rx.try_recv().ok()
    }
}

/// A value in flight. The sender stays blocked until [`Delivery::complete`].
#[derive(Debug)]
#[must_use = "the sender stays blocked until the delivery is completed"]
pub struct Delivery<T> {
    value: T,
    done: oneshot::Sender<()>,
}

impl<T> Delivery<T> {
    /// Borrow the delivered value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Split into the value and a completion token.
    pub fn into_parts(self) -> (T, Completion) {
        (self.value, Completion { done: self.done })
    }

    /// Release the sender without looking at the value.
    pub fn complete(self) {
        let _ = self.done.send(());
    }
}

/// Releases the sender of a [`Delivery`] once processing is finished.
#[derive(Debug)]
#[must_use = "the sender stays blocked until completed"]
pub struct Completion {
    done: oneshot::Sender<()>,
}

impl Completion {
    /// Release the sender.
    pub fn complete(self) {
        let _ = self.done.send(());
    }
}
