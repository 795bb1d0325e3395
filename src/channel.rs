//! Bounded synchronous FIFO channels.
//!
//! All coordination between workers is message passing on these channels;
//! there is no shared mutable state across worker boundaries. Delivery is
//! strictly first-in, first-out — the control pipeline depends on sensor
//! readings being applied in arrival order.
//!
//! [`Duplex`] pairs two channels into the full-duplex links used between the
//! supervisor and each worker (and between the control and sensor workers in
//! testing mode). [`Slot`] is a shared cell that lets service launchers hand
//! fresh endpoints to dependent services across restarts.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{Error, Result};

struct Shared<T> {
    queue: Mutex<Inner<T>>,
    data_available: Condvar,
    space_available: Condvar,
}

struct Inner<T> {
    data: VecDeque<T>,
    capacity: usize,
    senders: usize,
    receivers: usize,
}

impl<T> Shared<T> {
    fn send(&self, value: T) -> Result<()> {
        let mut inner = self.queue.lock();
        loop {
            if inner.receivers == 0 {
                return Err(Error::ChannelClosed);
            }
            if inner.data.len() < inner.capacity {
                inner.data.push_back(value);
                self.data_available.notify_one();
                return Ok(());
            }
            self.space_available.wait(&mut inner);
        }
    }
    fn try_send(&self, value: T) -> Result<()> {
        let mut inner = self.queue.lock();
        if inner.receivers == 0 {
            return Err(Error::ChannelClosed);
        }
        if inner.data.len() < inner.capacity {
            inner.data.push_back(value);
            self.data_available.notify_one();
            Ok(())
        } else {
            Err(Error::ChannelFull)
        }
    }
    fn recv(&self) -> Result<T> {
        let mut inner = self.queue.lock();
        loop {
            if let Some(value) = inner.data.pop_front() {
                self.space_available.notify_one();
                return Ok(value);
            }
            if inner.senders == 0 {
                return Err(Error::ChannelClosed);
            }
            self.data_available.wait(&mut inner);
        }
    }
    fn try_recv(&self) -> Result<T> {
        let mut inner = self.queue.lock();
        if let Some(value) = inner.data.pop_front() {
            self.space_available.notify_one();
            Ok(value)
        } else if inner.senders == 0 {
            Err(Error::ChannelClosed)
        } else {
            Err(Error::ChannelEmpty)
        }
    }
    fn recv_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = std::time::Instant::now() + timeout;
        let mut inner = self.queue.lock();
        loop {
            if let Some(value) = inner.data.pop_front() {
                self.space_available.notify_one();
                return Ok(value);
            }
            if inner.senders == 0 {
                return Err(Error::ChannelClosed);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            if self
                .data_available
                .wait_for(&mut inner, deadline - now)
                .timed_out()
                && inner.data.is_empty()
            {
                return Err(Error::Timeout);
            }
        }
    }
}

/// The sending half of a channel
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Sends a value, blocking while the channel is full
    pub fn send(&self, value: T) -> Result<()> {
        self.shared.send(value)
    }
    /// Sends a value or fails immediately with [`Error::ChannelFull`]
    pub fn try_send(&self, value: T) -> Result<()> {
        self.shared.try_send(value)
    }
    /// True while at least one receiver exists
    pub fn is_alive(&self) -> bool {
        self.shared.queue.lock().receivers > 0
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.queue.lock().senders += 1;
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut inner = self.shared.queue.lock();
        inner.senders -= 1;
        if inner.senders == 0 {
            self.shared.data_available.notify_all();
        }
    }
}

/// The receiving half of a channel
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Receives a value, blocking while the channel is empty
    pub fn recv(&self) -> Result<T> {
        self.shared.recv()
    }
    /// Receives a value or fails immediately ([`Error::ChannelEmpty`] /
    /// [`Error::ChannelClosed`])
    pub fn try_recv(&self) -> Result<T> {
        self.shared.try_recv()
    }
    /// Receives a value, waiting up to `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T> {
        self.shared.recv_timeout(timeout)
    }
    /// Drains everything currently queued, never blocking
    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(v) = self.try_recv() {
            out.push(v);
        }
        out
    }
    /// True while at least one sender exists
    pub fn is_alive(&self) -> bool {
        self.shared.queue.lock().senders > 0
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.shared.queue.lock().receivers += 1;
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut inner = self.shared.queue.lock();
        inner.receivers -= 1;
        if inner.receivers == 0 {
            self.shared.space_available.notify_all();
            self.shared.data_available.notify_all();
        }
    }
}

impl<T> Iterator for Receiver<T> {
    type Item = T;
    fn next(&mut self) -> Option<Self::Item> {
        self.recv().ok()
    }
}

/// Creates a bounded FIFO channel
///
/// # Panics
///
/// Will panic if the capacity is zero
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "channel capacity MUST be > 0");
    let shared = Arc::new(Shared {
        queue: Mutex::new(Inner {
            data: VecDeque::with_capacity(capacity),
            capacity,
            senders: 1,
            receivers: 1,
        }),
        data_available: Condvar::new(),
        space_available: Condvar::new(),
    });
    (
        Sender {
            shared: shared.clone(),
        },
        Receiver { shared },
    )
}

/// One end of a full-duplex link: sends `T`, receives `R`.
pub struct Duplex<T, R> {
    /// Outgoing half
    pub tx: Sender<T>,
    /// Incoming half
    pub rx: Receiver<R>,
}

impl<T, R> Duplex<T, R> {
    /// See [`Sender::send`]
    pub fn send(&self, value: T) -> Result<()> {
        self.tx.send(value)
    }
    /// See [`Sender::try_send`]
    pub fn try_send(&self, value: T) -> Result<()> {
        self.tx.try_send(value)
    }
    /// See [`Receiver::recv`]
    pub fn recv(&self) -> Result<R> {
        self.rx.recv()
    }
    /// See [`Receiver::try_recv`]
    pub fn try_recv(&self) -> Result<R> {
        self.rx.try_recv()
    }
    /// See [`Receiver::recv_timeout`]
    pub fn recv_timeout(&self, timeout: Duration) -> Result<R> {
        self.rx.recv_timeout(timeout)
    }
}

impl<T, R> Clone for Duplex<T, R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

/// Creates a full-duplex link. The first end sends `A` and receives `B`,
/// the second end mirrors it.
pub fn duplex<A, B>(capacity: usize) -> (Duplex<A, B>, Duplex<B, A>) {
    let (a_tx, a_rx) = bounded(capacity);
    let (b_tx, b_rx) = bounded(capacity);
    (
        Duplex { tx: a_tx, rx: b_rx },
        Duplex { tx: b_tx, rx: a_rx },
    )
}

/// A shared cell for channel endpoints.
///
/// When a service is (re)started its launcher publishes fresh endpoints
/// here; launchers of dependent services pick them up on their own restart.
pub struct Slot<T>(Arc<Mutex<Option<T>>>);

impl<T> Slot<T> {
    /// Creates an empty slot
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }
    /// Replaces the stored endpoint
    pub fn put(&self, value: T) {
        *self.0.lock() = Some(value);
    }
}

impl<T: Clone> Slot<T> {
    /// Returns a clone of the stored endpoint, if any
    pub fn get(&self) -> Option<T> {
        self.0.lock().clone()
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_is_preserved() {
        let (tx, rx) = bounded::<usize>(16);
        for i in 0..10 {
            tx.send(i).unwrap();
        }
        let got: Vec<usize> = rx.drain();
        insta::assert_debug_snapshot!(got, @"[
    0,
    1,
    2,
    3,
    4,
    5,
    6,
    7,
    8,
    9,
]");
    }

    #[test]
    fn recv_fails_once_senders_are_gone() {
        let (tx, rx) = bounded::<u8>(4);
        tx.send(1).unwrap();
        drop(tx);
        assert_eq!(rx.recv().unwrap(), 1);
        assert!(matches!(rx.recv(), Err(Error::ChannelClosed)));
    }

    #[test]
    fn send_fails_once_receivers_are_gone() {
        let (tx, rx) = bounded::<u8>(4);
        drop(rx);
        assert!(matches!(tx.send(1), Err(Error::ChannelClosed)));
    }

    #[test]
    fn try_recv_distinguishes_empty_from_closed() {
        let (tx, rx) = bounded::<u8>(4);
        assert!(matches!(rx.try_recv(), Err(Error::ChannelEmpty)));
        drop(tx);
        assert!(matches!(rx.try_recv(), Err(Error::ChannelClosed)));
    }

    #[test]
    fn recv_timeout_expires_and_delivers() {
        let (tx, rx) = bounded::<u8>(4);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(20)),
            Err(Error::Timeout)
        ));
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(7).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn duplex_ends_talk_both_ways() {
        let (a, b) = duplex::<&str, u32>(4);
        a.send("ping").unwrap();
        assert_eq!(b.recv().unwrap(), "ping");
        b.send(42).unwrap();
        assert_eq!(a.recv().unwrap(), 42);
    }

    #[test]
    fn slot_hands_out_clones() {
        let slot: Slot<Sender<u8>> = Slot::new();
        assert!(slot.get().is_none());
        let (tx, rx) = bounded::<u8>(4);
        slot.put(tx);
        let tx2 = slot.get().unwrap();
        tx2.send(9).unwrap();
        assert_eq!(rx.recv().unwrap(), 9);
    }
}
