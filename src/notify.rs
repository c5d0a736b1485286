use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{AccommodationId, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for marketplace events: one firehose plus one channel per accommodation.
pub struct NotifyHub {
    all: broadcast::Sender<Event>,
    channels: DashMap<AccommodationId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            all: broadcast::channel(CHANNEL_CAPACITY).0,
            channels: DashMap::new(),
        }
    }

    /// Every event, in commit order.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Events concerning one accommodation. Creates the channel if needed,
    /// so subscribing before the accommodation exists is allowed.
    pub fn subscribe(&self, accommodation_id: AccommodationId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(accommodation_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        let _ = self.all.send(event.clone());
        if let Some(sender) = self.channels.get(&event.accommodation_id()) {
            let _ = sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Principal;

    fn created(id: AccommodationId) -> Event {
        Event::AccommodationCreated {
            id,
            owner: Principal::from("alice"),
            price_per_night: 100,
            listed: false,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(1);

        hub.send(&created(1));

        let received = rx.recv().await.unwrap();
        assert_eq!(received, created(1));
    }

    #[tokio::test]
    async fn per_accommodation_channels_are_isolated() {
        let hub = NotifyHub::new();
        let mut rx_one = hub.subscribe(1);
        let mut rx_all = hub.subscribe_all();

        hub.send(&created(2));
        hub.send(&created(1));

        assert_eq!(rx_all.recv().await.unwrap(), created(2));
        assert_eq!(rx_all.recv().await.unwrap(), created(1));
        assert_eq!(rx_one.recv().await.unwrap(), created(1));
        assert!(rx_one.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber, must not panic
        hub.send(&created(3));
    }
}
