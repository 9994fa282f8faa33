use std::collections::VecDeque;

use tokio::sync::Notify;
use util::sync::Mutex as SyncMutex;

use crate::error::{Error, Result};

struct PacketQueueInternal<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// PacketQueue is the bounded buffer between the router and a slow
/// consumer. A push into a full queue evicts the oldest entry; pushing
/// never waits. Once closed, readers drain what is left and then get
/// `ErrClosedPipe`.
pub struct PacketQueue<T> {
    internal: SyncMutex<PacketQueueInternal<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> PacketQueue<T> {
    pub fn new(capacity: usize) -> Self {
        PacketQueue {
            internal: SyncMutex::new(PacketQueueInternal {
                items: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// push appends an item. Returns `true` when the oldest entry had to be
    /// dropped to make room. Items pushed after close are discarded.
    pub fn push(&self, item: T) -> bool {
        let overflowed = {
            let mut internal = self.internal.lock();
            if internal.closed {
                return false;
            }
            let overflowed = if internal.items.len() >= self.capacity {
                internal.items.pop_front();
                true
            } else {
                false
            };
            internal.items.push_back(item);
            overflowed
        };

        self.notify.notify_one();
        overflowed
    }

    /// pop waits for the next item.
    pub async fn pop(&self) -> Result<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut internal = self.internal.lock();
                if let Some(item) = internal.items.pop_front() {
                    return Ok(item);
                }
                if internal.closed {
                    return Err(Error::ErrClosedPipe);
                }
            }
            notified.await;
        }
    }

    /// try_pop returns the next item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut internal = self.internal.lock();
        internal.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.internal.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.internal.lock().closed
    }

    /// close wakes every pending reader. Idempotent.
    pub fn close(&self) {
        {
            let mut internal = self.internal.lock();
            if internal.closed {
                return;
            }
            internal.closed = true;
        }
        self.notify.notify_waiters();
    }
}
