//! Exclusive, concurrency-safe voting on shared polls.
//!
//! A [`PollStore`] holds polls and voter records and offers a versioned,
//! compare-and-swap `commit_vote`. The [`VoteCoordinator`] drives the
//! read-validate-commit cycle with bounded retry, and the [`PollService`]
//! creates polls and streams their snapshots.
//!
//! The store is built once by the caller and shared by `Arc`:
//!
//! ```no_run
//! # async fn demo() -> vote_lock::Result<()> {
//! use std::sync::Arc;
//! use vote_lock::{MemoryStore, PollService, RetryPolicy, VoteCoordinator};
//!
//! let store = Arc::new(MemoryStore::new());
//! let polls = PollService::new(store.clone());
//! let votes = VoteCoordinator::new(store, RetryPolicy::default());
//!
//! let poll_id = polls.create_poll("Lunch choice?", &["Pizza", "Salad"]).await?;
//! votes.cast_vote(&poll_id, "Pizza", "device-fingerprint-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod voting;

pub use config::Config;
pub use db::{CommitOutcome, MemoryStore, PollStore, SqliteStore};
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use models::{Poll, PollId, Tally, VoteResult, VoterRecord};
pub use service::{PollService, PollSubscription};
pub use voting::{PollResults, RetryPolicy, VoteCoordinator};
