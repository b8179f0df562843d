use super::RetryPolicy;
use crate::db::{CommitOutcome, PollStore};
use crate::error::{Error, Result};
use crate::models::{validate_poll_id, validate_voter_id, Ballot, PollId, VoteResult};
use log::{debug, info, warn};
use std::sync::Arc;

/// Turns a vote intent into exactly one committed tally increment.
///
/// Each attempt re-reads the voter record and the poll, then tries a
/// conditional commit against the version it read. Version conflicts are
/// retried with backoff and never reach the caller.
///
/// Dropping a `cast_vote` future mid-flight leaves the outcome unknown: the
/// vote may already be committed. Callers should re-read the voter record.
pub struct VoteCoordinator {
    store: Arc<dyn PollStore>,
    policy: RetryPolicy,
}

impl VoteCoordinator {
    pub fn new(store: Arc<dyn PollStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn cast_vote(
        &self,
        poll_id: &PollId,
        option: &str,
        voter_id: &str,
    ) -> Result<VoteResult> {
        validate_poll_id(poll_id)?;
        validate_voter_id(voter_id)?;

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            // Fast path only; commit_vote repeats this check atomically.
            if self.store.read_voter_record(poll_id, voter_id).await?.is_some() {
                return Ok(VoteResult::AlreadyVoted);
            }

            let poll = self.store.read_poll(poll_id).await?;
            let Some(new_tally) = poll.tally_with_vote(option) else {
                return Err(Error::InvalidOption {
                    poll_id: poll_id.clone(),
                    option: option.to_string(),
                });
            };

            let ballot = Ballot {
                poll_id: poll_id.clone(),
                voter_id: voter_id.to_string(),
                option: option.to_string(),
            };

            match self.store.commit_vote(poll.version, new_tally, ballot).await? {
                CommitOutcome::Committed(record) => {
                    info!(
                        "Vote for {:?} committed on poll {} at version {} (attempt {})",
                        option,
                        poll_id,
                        poll.version + 1,
                        attempt
                    );
                    return Ok(VoteResult::Voted(record));
                }
                CommitOutcome::AlreadyVoted => return Ok(VoteResult::AlreadyVoted),
                CommitOutcome::VersionConflict => {
                    debug!(
                        "Version conflict on poll {} at version {} (attempt {}/{})",
                        poll_id, poll.version, attempt, max_attempts
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        warn!(
            "Giving up on vote for poll {} after {} conflicting attempts",
            poll_id, max_attempts
        );
        Err(Error::Busy {
            poll_id: poll_id.clone(),
            attempts: max_attempts,
        })
    }
}
