use crate::error::{Result, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

pub const QUESTION_MIN_CHARS: usize = 5;
pub const QUESTION_MAX_CHARS: usize = 200;
pub const MIN_OPTIONS: usize = 2;
pub const VOTER_ID_MIN_CHARS: usize = 10;

/// Option label -> vote count. Keys are exactly the poll's options.
pub type Tally = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(String);

impl PollId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PollId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PollId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    /// Display order; fixed at creation.
    pub options: Vec<String>,
    pub tally: Tally,
    /// Bumped by every committed vote. Starts at 0.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    /// Validates the inputs and builds a fresh poll with a zeroed tally.
    pub fn new<S: AsRef<str>>(question: &str, options: &[S]) -> Result<Self> {
        let question = validate_question(question)?;
        let options = normalize_options(options)?;
        let tally = options.iter().map(|option| (option.clone(), 0)).collect();

        Ok(Self {
            id: PollId::generate(),
            question,
            options,
            tally,
            version: 0,
            created_at: Utc::now(),
        })
    }

    pub fn votes_for(&self, option: &str) -> u64 {
        self.tally.get(option).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> u64 {
        self.tally.values().sum()
    }

    /// The tally after one more vote for `option`, or `None` if the poll has no such option.
    pub fn tally_with_vote(&self, option: &str) -> Option<Tally> {
        let mut tally = self.tally.clone();
        *tally.get_mut(option)? += 1;
        Some(tally)
    }
}

/// Proof that a voter voted. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub poll_id: PollId,
    pub voter_id: String,
    pub chosen_option: String,
    pub committed_at: DateTime<Utc>,
}

/// A vote about to be committed. The store stamps the commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub poll_id: PollId,
    pub voter_id: String,
    pub option: String,
}

impl Ballot {
    pub fn into_record(self, committed_at: DateTime<Utc>) -> VoterRecord {
        VoterRecord {
            poll_id: self.poll_id,
            voter_id: self.voter_id,
            chosen_option: self.option,
            committed_at,
        }
    }
}

/// Terminal outcome of a vote that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResult {
    Voted(VoterRecord),
    /// This voter already has a record for the poll. Nothing was changed.
    AlreadyVoted,
}

impl VoteResult {
    pub fn is_voted(&self) -> bool {
        matches!(self, VoteResult::Voted(_))
    }
}

pub fn validate_question(question: &str) -> Result<String> {
    let question = question.trim();
    let len = question.chars().count();
    if len < QUESTION_MIN_CHARS {
        return Err(ValidationError::QuestionTooShort { min: QUESTION_MIN_CHARS }.into());
    }
    if len > QUESTION_MAX_CHARS {
        return Err(ValidationError::QuestionTooLong { max: QUESTION_MAX_CHARS }.into());
    }
    Ok(question.to_string())
}

/// Trims labels, drops empty ones and collapses duplicates (first one wins).
pub fn normalize_options<S: AsRef<str>>(options: &[S]) -> Result<Vec<String>> {
    let mut labels: Vec<String> = Vec::with_capacity(options.len());
    for option in options {
        let label = option.as_ref().trim();
        if !label.is_empty() && !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }

    if labels.len() < MIN_OPTIONS {
        return Err(ValidationError::TooFewOptions.into());
    }
    Ok(labels)
}

/// Splits one-option-per-line text as typed into the authoring form.
pub fn parse_options(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn validate_voter_id(voter_id: &str) -> Result<()> {
    if voter_id.chars().count() < VOTER_ID_MIN_CHARS {
        return Err(ValidationError::VoterIdTooShort { min: VOTER_ID_MIN_CHARS }.into());
    }
    Ok(())
}

pub fn validate_poll_id(poll_id: &PollId) -> Result<()> {
    if poll_id.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyPollId.into());
    }
    Ok(())
}
