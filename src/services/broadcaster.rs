use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::RunEvent;

/// A live subscriber of one run: a bounded channel into its transport task.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    sender: mpsc::Sender<RunEvent>,
}

impl Subscriber {
    pub fn channel(capacity: usize) -> (Subscriber, mpsc::Receiver<RunEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Subscriber {
                id: Uuid::new_v4(),
                sender,
            },
            receiver,
        )
    }
}

/// Fans run events out to whoever is listening right now.
///
/// Delivery never waits: a subscriber whose buffer is full or whose receiver
/// is gone is dropped on the spot. Nothing is buffered for subscribers that
/// arrive later.
#[derive(Default)]
pub struct UpdateBroadcaster {
    subscribers: DashMap<Uuid, Vec<Subscriber>>,
}

impl UpdateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, run_id: Uuid, subscriber: Subscriber) {
        log::info!("Subscriber {} joined run {}", subscriber.id, run_id);
        self.subscribers.entry(run_id).or_default().push(subscriber);
    }

    pub fn unsubscribe(&self, run_id: Uuid, subscriber_id: Uuid) {
        if let Some(mut subscribers) = self.subscribers.get_mut(&run_id) {
            subscribers.retain(|s| s.id != subscriber_id);
        }
        self.subscribers.remove_if(&run_id, |_, subscribers| subscribers.is_empty());
        log::info!("Subscriber {} left run {}", subscriber_id, run_id);
    }

    /// Delivers `event` to every current subscriber of `run_id` and returns
    /// how many accepted it.
    pub fn publish(&self, run_id: Uuid, event: &RunEvent) -> usize {
        let mut delivered = 0;

        if let Some(mut subscribers) = self.subscribers.get_mut(&run_id) {
            subscribers.retain(|subscriber| match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    log::warn!(
                        "Dropping subscriber {} of run {}: {}",
                        subscriber.id,
                        run_id,
                        e
                    );
                    false
                }
            });
        }
        self.subscribers.remove_if(&run_id, |_, subscribers| subscribers.is_empty());

        delivered
    }

    pub fn subscriber_count(&self, run_id: Uuid) -> usize {
        self.subscribers
            .get(&run_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
