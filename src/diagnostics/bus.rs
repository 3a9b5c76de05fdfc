/// Diagnostic fan-out
///
/// Every subscriber gets its own unbounded channel, so publishing never
/// blocks the thread driving the sound system. Subscribers whose receiver
/// has been dropped are pruned on the next publish.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;

use super::events::SoundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

#[derive(Default)]
struct Shared {
    subscribers: RwLock<Vec<(SubscriberId, Sender<SoundEvent>)>>,
    next_id: AtomicUsize,
}

/// Cloning yields another handle onto the same subscriber list.
#[derive(Clone, Default)]
pub struct DiagnosticBus {
    shared: Arc<Shared>,
}

impl DiagnosticBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (Receiver<SoundEvent>, SubscriberId) {
        let (tx, rx) = unbounded();
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.subscribers.write().push((id, tx));
        (rx, id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.shared.subscribers.write().retain(|(sub, _)| *sub != id);
    }

    pub fn publish(&self, event: SoundEvent) {
        let mut gone = Vec::new();
        for (id, sender) in self.shared.subscribers.read().iter() {
            // Unbounded: the only failure is a dropped receiver
            if sender.try_send(event.clone()).is_err() {
                gone.push(*id);
            }
        }

        if !gone.is_empty() {
            let mut subscribers = self.shared.subscribers.write();
            subscribers.retain(|(id, _)| !gone.contains(id));
            tracing::debug!("Pruned {} diagnostic subscribers, {} left", gone.len(), subscribers.len());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }
}
