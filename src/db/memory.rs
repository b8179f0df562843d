use super::{check_tally, CommitOutcome, PollFeed, PollStore};
use crate::error::{Error, Result};
use crate::models::{Ballot, Poll, PollId, Tally, VoterRecord};
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

struct PollSlot {
    poll: Poll,
    voters: HashMap<String, VoterRecord>,
}

/// Process-local store. Each poll lives behind its own mutex, so the
/// check-and-write in `commit_vote` is atomic without blocking other polls.
pub struct MemoryStore {
    polls: RwLock<HashMap<PollId, Arc<Mutex<PollSlot>>>>,
    feed: PollFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            polls: RwLock::new(HashMap::new()),
            feed: PollFeed::new(),
        }
    }

    fn slot(&self, poll_id: &PollId) -> Result<Arc<Mutex<PollSlot>>> {
        self.polls
            .read()?
            .get(poll_id)
            .cloned()
            .ok_or_else(|| Error::PollNotFound(poll_id.clone()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_poll(&self, question: &str, options: &[String]) -> Result<Poll> {
        let mut poll = Poll::new(question, options)?;

        // Create a new poll slot under a fresh id
        {
            let mut polls = self.polls.write()?;
            while polls.contains_key(&poll.id) {
                poll.id = PollId::generate();
            }
            let slot = PollSlot {
                poll: poll.clone(),
                voters: HashMap::new(),
            };
            polls.insert(poll.id.clone(), Arc::new(Mutex::new(slot)));
        }

        info!("Created poll {} with {} options", poll.id, poll.options.len());
        self.feed.publish(&poll);
        Ok(poll)
    }

    async fn read_poll(&self, poll_id: &PollId) -> Result<Poll> {
        let slot = self.slot(poll_id)?;
        let slot = slot.lock()?;
        Ok(slot.poll.clone())
    }

    async fn read_voter_record(
        &self,
        poll_id: &PollId,
        voter_id: &str,
    ) -> Result<Option<VoterRecord>> {
        let slot = match self.slot(poll_id) {
            Ok(slot) => slot,
            Err(Error::PollNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let slot = slot.lock()?;
        Ok(slot.voters.get(voter_id).cloned())
    }

    async fn commit_vote(
        &self,
        expected_version: u64,
        new_tally: Tally,
        ballot: Ballot,
    ) -> Result<CommitOutcome> {
        let slot = self.slot(&ballot.poll_id)?;
        let (record, snapshot) = {
            // Check version and voter under the poll's lock
            let mut slot = slot.lock()?;
            if slot.poll.version != expected_version {
                return Ok(CommitOutcome::VersionConflict);
            }
            if slot.voters.contains_key(&ballot.voter_id) {
                return Ok(CommitOutcome::AlreadyVoted);
            }
            check_tally(&slot.poll, &new_tally, &ballot)?;

            // Write tally, version and voter record together
            let record = ballot.into_record(Utc::now());
            slot.poll.tally = new_tally;
            slot.poll.version += 1;
            slot.voters.insert(record.voter_id.clone(), record.clone());
            (record, slot.poll.clone())
        };

        // Notify subscribers after releasing the lock
        self.feed.publish(&snapshot);
        Ok(CommitOutcome::Committed(record))
    }

    async fn list_voter_records(&self, poll_id: &PollId) -> Result<Vec<VoterRecord>> {
        let slot = self.slot(poll_id)?;
        let slot = slot.lock()?;
        let mut records: Vec<VoterRecord> = slot.voters.values().cloned().collect();
        records.sort_by(|a, b| a.committed_at.cmp(&b.committed_at));
        Ok(records)
    }

    async fn count_voter_records(&self, poll_id: &PollId) -> Result<u64> {
        let slot = self.slot(poll_id)?;
        let slot = slot.lock()?;
        Ok(slot.voters.len() as u64)
    }

    fn feed(&self) -> &PollFeed {
        &self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(poll: &Poll, voter_id: &str, option: &str) -> Ballot {
        Ballot {
            poll_id: poll.id.clone(),
            voter_id: voter_id.to_string(),
            option: option.to_string(),
        }
    }

    async fn lunch_poll(store: &MemoryStore) -> Poll {
        let options = vec!["Pizza".to_string(), "Salad".to_string()];
        store.create_poll("Lunch choice?", &options).await.unwrap()
    }

    #[tokio::test]
    async fn commit_bumps_version_and_records_voter() {
        let store = MemoryStore::new();
        let poll = lunch_poll(&store).await;

        let tally = poll.tally_with_vote("Pizza").unwrap();
        let outcome = store
            .commit_vote(0, tally, ballot(&poll, "voter-000001", "Pizza"))
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(ref r) if r.chosen_option == "Pizza"));

        let after = store.read_poll(&poll.id).await.unwrap();
        assert_eq!(after.version, 1);
        assert_eq!(after.votes_for("Pizza"), 1);
        assert!(store
            .read_voter_record(&poll.id, "voter-000001")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn stale_version_changes_nothing() {
        let store = MemoryStore::new();
        let poll = lunch_poll(&store).await;

        let tally = poll.tally_with_vote("Pizza").unwrap();
        store
            .commit_vote(0, tally.clone(), ballot(&poll, "voter-000001", "Pizza"))
            .await
            .unwrap();

        let outcome = store
            .commit_vote(0, tally, ballot(&poll, "voter-000002", "Pizza"))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::VersionConflict);

        let after = store.read_poll(&poll.id).await.unwrap();
        assert_eq!(after.version, 1);
        assert_eq!(after.total_votes(), 1);
        assert_eq!(store.count_voter_records(&poll.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn existing_voter_record_blocks_commit() {
        let store = MemoryStore::new();
        let poll = lunch_poll(&store).await;

        let first = poll.tally_with_vote("Pizza").unwrap();
        store
            .commit_vote(0, first, ballot(&poll, "voter-000001", "Pizza"))
            .await
            .unwrap();

        let current = store.read_poll(&poll.id).await.unwrap();
        let second = current.tally_with_vote("Salad").unwrap();
        let outcome = store
            .commit_vote(current.version, second, ballot(&poll, "voter-000001", "Salad"))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::AlreadyVoted);
        assert_eq!(store.read_poll(&poll.id).await.unwrap().votes_for("Salad"), 0);
    }

    #[tokio::test]
    async fn unknown_poll_is_not_found() {
        let store = MemoryStore::new();
        let missing = PollId::from("missing");
        assert!(matches!(
            store.read_poll(&missing).await,
            Err(Error::PollNotFound(_))
        ));
        assert!(store
            .read_voter_record(&missing, "voter-000001")
            .await
            .unwrap()
            .is_none());
    }
}
