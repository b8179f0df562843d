use crate::models::{Poll, PollId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// Fan-out of poll snapshots to subscribers, one watch channel per poll.
///
/// A channel only ever moves forward: a snapshot is dropped unless its
/// version is newer than the one already held.
#[derive(Default)]
pub struct PollFeed {
    channels: Mutex<HashMap<PollId, watch::Sender<Option<Poll>>>>,
}

impl PollFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// The receiver starts at the latest published snapshot, if any.
    pub fn subscribe(&self, poll_id: &PollId) -> watch::Receiver<Option<Poll>> {
        let mut channels = self.channels();
        channels.retain(|_, tx| !tx.is_closed());
        channels
            .entry(poll_id.clone())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    pub fn publish(&self, poll: &Poll) {
        let mut channels = self.channels();
        let Some(tx) = channels.get(&poll.id) else {
            return;
        };
        if tx.is_closed() {
            channels.remove(&poll.id);
            return;
        }
        tx.send_if_modified(|current| {
            let stale = current
                .as_ref()
                .is_some_and(|held| held.version >= poll.version);
            if !stale {
                *current = Some(poll.clone());
            }
            !stale
        });
    }

    pub fn subscriber_count(&self, poll_id: &PollId) -> usize {
        self.channels()
            .get(poll_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    // The map only holds channel handles, so a poisoned lock leaves nothing half-written.
    fn channels(&self) -> MutexGuard<'_, HashMap<PollId, watch::Sender<Option<Poll>>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll_at(version: u64) -> Poll {
        let mut poll = Poll::new("Lunch choice?", &["Pizza", "Salad"]).unwrap();
        poll.id = PollId::from("feed-test");
        poll.version = version;
        poll
    }

    #[test]
    fn stale_snapshots_are_not_delivered() {
        let feed = PollFeed::new();
        let rx = feed.subscribe(&PollId::from("feed-test"));

        feed.publish(&poll_at(3));
        feed.publish(&poll_at(2));
        assert_eq!(rx.borrow().as_ref().map(|p| p.version), Some(3));

        feed.publish(&poll_at(4));
        assert_eq!(rx.borrow().as_ref().map(|p| p.version), Some(4));
    }

    #[test]
    fn publishing_without_subscribers_keeps_nothing() {
        let feed = PollFeed::new();
        feed.publish(&poll_at(1));
        assert_eq!(feed.subscriber_count(&PollId::from("feed-test")), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = PollFeed::new();
        let id = PollId::from("feed-test");
        let rx = feed.subscribe(&id);
        assert_eq!(feed.subscriber_count(&id), 1);

        drop(rx);
        feed.publish(&poll_at(1));
        assert_eq!(feed.subscriber_count(&id), 0);
    }
}
