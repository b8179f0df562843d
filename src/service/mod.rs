mod subscription;

pub use subscription::PollSubscription;

use crate::db::PollStore;
use crate::error::{Error, Result};
use crate::models::{parse_options, validate_poll_id, Poll, PollId};
use crate::voting::PollResults;
use std::sync::Arc;

/// Poll creation, reads and live snapshots, on top of a [`PollStore`].
pub struct PollService {
    store: Arc<dyn PollStore>,
}

impl PollService {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self { store }
    }

    pub async fn create_poll<S: AsRef<str>>(&self, question: &str, options: &[S]) -> Result<PollId> {
        let options: Vec<String> = options.iter().map(|o| o.as_ref().to_string()).collect();
        let poll = self.store.create_poll(question, &options).await?;
        Ok(poll.id)
    }

    /// Same as [`create_poll`](Self::create_poll) with one option per line.
    pub async fn create_poll_from_text(&self, question: &str, options_text: &str) -> Result<PollId> {
        let options = parse_options(options_text);
        let poll = self.store.create_poll(question, &options).await?;
        Ok(poll.id)
    }

    /// `Ok(None)` when there is no such poll.
    pub async fn get_poll_snapshot(&self, poll_id: &PollId) -> Result<Option<Poll>> {
        validate_poll_id(poll_id)?;
        match self.store.read_poll(poll_id).await {
            Ok(poll) => Ok(Some(poll)),
            Err(Error::PollNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_results(&self, poll_id: &PollId) -> Result<Option<PollResults>> {
        let snapshot = self.get_poll_snapshot(poll_id).await?;
        Ok(snapshot.as_ref().map(PollResults::from_poll))
    }

    /// Live snapshots of a poll, starting with its current state.
    ///
    /// The poll does not have to exist yet; the stream starts emitting once it
    /// is created. Versions never go backwards, but intermediate versions may be
    /// skipped when commits land faster than the subscriber reads.
    pub async fn subscribe(&self, poll_id: &PollId) -> Result<PollSubscription> {
        validate_poll_id(poll_id)?;
        let rx = self.store.subscribe(poll_id);

        match self.store.read_poll(poll_id).await {
            Ok(poll) => self.store.feed().publish(&poll),
            Err(Error::PollNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        Ok(PollSubscription::new(poll_id.clone(), rx))
    }
}
