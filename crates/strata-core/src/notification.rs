//! Outward notifications published to subscribers on the control side.

use crate::time::FramePosition;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

/// Severity of a device fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSeverity {
    Warning,
    Critical,
}

/// Events delivered to subscribers of an audio device.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// One or more cycles completed. `cycle` is the latest cycle counter.
    CycleFinished { cycle: u64 },
    TransportPositionChanged {
        session: u64,
        position: FramePosition,
    },
    BufferUnderrun {
        source: u64,
    },
    SourceOutOfSync {
        source: u64,
        position: FramePosition,
    },
    DeviceFault {
        severity: FaultSeverity,
        reason: String,
    },
    DriverChanged {
        name: String,
        sample_rate: u32,
        buffer_size: usize,
    },
}

/// Fan-out of notifications to any number of subscribers.
///
/// Each subscriber gets its own bounded queue; a slow subscriber loses
/// notifications instead of stalling the publisher.
pub struct NotificationHub {
    subscribers: Mutex<Vec<Sender<Notification>>>,
    capacity: usize,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, notification: Notification) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(notification.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_disconnect() {
        let hub = NotificationHub::new(4);
        let a = hub.subscribe();
        let b = hub.subscribe();
        hub.publish(Notification::CycleFinished { cycle: 1 });
        assert_eq!(a.try_recv(), Ok(Notification::CycleFinished { cycle: 1 }));
        assert_eq!(b.try_recv(), Ok(Notification::CycleFinished { cycle: 1 }));

        drop(b);
        hub.publish(Notification::CycleFinished { cycle: 2 });
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_full_subscriber_is_kept() {
        let hub = NotificationHub::new(1);
        let rx = hub.subscribe();
        hub.publish(Notification::CycleFinished { cycle: 1 });
        hub.publish(Notification::CycleFinished { cycle: 2 });
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(rx.len(), 1);
    }
}
