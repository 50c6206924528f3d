//! Process-wide registry of per-ride live channels.
//!
//! A ride's channel exists while someone is subscribed to it: the first
//! [`ChannelRegistry::join`] creates it, dropping the last [`Subscription`]
//! removes it, and [`ChannelRegistry::close`] tears it down early. The
//! registry does no authorization of its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::{self, Stream};
use ridepool_core::LocationSample;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

pub struct ChannelRegistry {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<LocationSample>>>,
    capacity: usize,
}

impl ChannelRegistry {
    /// `capacity` is how many samples a subscriber may fall behind before it
    /// starts skipping.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        })
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<Uuid, broadcast::Sender<LocationSample>>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn join(self: &Arc<Self>, ride_id: Uuid) -> Subscription {
        let receiver = self
            .channels()
            .entry(ride_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        tracing::debug!(ride_id = %ride_id, "Joined ride channel");

        Subscription {
            ride_id,
            receiver: Some(receiver),
            registry: Arc::clone(self),
        }
    }

    /// Fan a sample out to the ride's subscribers. Returns how many received it;
    /// a ride nobody listens to is a no-op.
    pub fn publish(&self, sample: &LocationSample) -> usize {
        match self.channels().get(&sample.ride_id) {
            Some(sender) => sender.send(sample.clone()).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the ride's channel. Subscribers drain what they already have and
    /// then see end-of-stream.
    pub fn close(&self, ride_id: Uuid) -> bool {
        let closed = self.channels().remove(&ride_id).is_some();
        if closed {
            tracing::debug!(ride_id = %ride_id, "Closed ride channel");
        }
        closed
    }

    pub fn subscriber_count(&self, ride_id: Uuid) -> usize {
        self.channels()
            .get(&ride_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    fn leave(&self, ride_id: Uuid) {
        let mut channels = self.channels();
        if let Some(sender) = channels.get(&ride_id) {
            if sender.receiver_count() == 0 {
                channels.remove(&ride_id);
                tracing::debug!(ride_id = %ride_id, "Removed idle ride channel");
            }
        }
    }
}

/// Membership in one ride's channel. Dropping it leaves the channel.
pub struct Subscription {
    ride_id: Uuid,
    receiver: Option<broadcast::Receiver<LocationSample>>,
    registry: Arc<ChannelRegistry>,
}

impl Subscription {
    pub fn ride_id(&self) -> Uuid {
        self.ride_id
    }

    /// Next sample, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<LocationSample> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(sample) => return Some(sample),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(ride_id = %self.ride_id, skipped, "Subscriber lagging, skipped samples");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn leave(self) {}

    pub fn into_stream(self) -> impl Stream<Item = LocationSample> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|sample| (sample, subscription))
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("ride_id", &self.ride_id)
            .field("open", &self.receiver.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Release the receiver first so the registry sees the updated count.
        self.receiver.take();
        self.registry.leave(self.ride_id);
        tracing::debug!(ride_id = %self.ride_id, "Left ride channel");
    }
}
