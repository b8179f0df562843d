mod feed;
mod memory;
mod sqlite;

pub use feed::PollFeed;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Ballot, Poll, PollId, Tally, VoterRecord};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// Result of a conditional vote commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Tally and voter record were written together.
    Committed(VoterRecord),
    /// The poll moved past `expected_version`. Nothing was written.
    VersionConflict,
    /// The voter already has a record for this poll. Nothing was written.
    AlreadyVoted,
}

/// Durable, versioned storage for polls and voter records.
///
/// The store is the only component that mutates poll state. Every
/// implementation must make `commit_vote` linearizable per poll: two calls
/// carrying the same `expected_version` can never both commit.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Validates and inserts a new poll with a zeroed tally at version 0.
    async fn create_poll(&self, question: &str, options: &[String]) -> Result<Poll>;

    /// Snapshot read. Fails with [`Error::PollNotFound`] if absent.
    async fn read_poll(&self, poll_id: &PollId) -> Result<Poll>;

    async fn read_voter_record(
        &self,
        poll_id: &PollId,
        voter_id: &str,
    ) -> Result<Option<VoterRecord>>;

    /// Atomically checks the poll version and the voter's absence, then
    /// writes `new_tally`, bumps the version and inserts the voter record.
    /// The ballot names the poll; the store stamps the commit time.
    async fn commit_vote(
        &self,
        expected_version: u64,
        new_tally: Tally,
        ballot: Ballot,
    ) -> Result<CommitOutcome>;

    async fn list_voter_records(&self, poll_id: &PollId) -> Result<Vec<VoterRecord>>;

    async fn count_voter_records(&self, poll_id: &PollId) -> Result<u64>;

    /// Change notifications for polls written through this store.
    fn feed(&self) -> &PollFeed;

    /// Registers interest in a poll's snapshots.
    ///
    /// Stores whose data can change behind their back (another process on
    /// the same database) override this to also pick up those writes.
    fn subscribe(&self, poll_id: &PollId) -> watch::Receiver<Option<Poll>> {
        self.feed().subscribe(poll_id)
    }
}

/// Opens the store selected by `config.database_url`.
pub async fn open(config: &Config) -> Result<Arc<dyn PollStore>> {
    if config.database_url == "memory" {
        info!("Using in-memory poll store; votes will not survive a restart.");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::connect(config).await?;
    Ok(Arc::new(store))
}

/// A new tally must cover exactly the poll's options, one of which is the voted option.
fn check_tally(poll: &Poll, new_tally: &Tally, ballot: &Ballot) -> Result<()> {
    let same_keys = new_tally.len() == poll.options.len()
        && poll.options.iter().all(|option| new_tally.contains_key(option));
    if !same_keys || !poll.options.contains(&ballot.option) {
        return Err(Error::InvalidOption {
            poll_id: poll.id.clone(),
            option: ballot.option.clone(),
        });
    }
    Ok(())
}
