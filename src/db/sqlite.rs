use super::{check_tally, CommitOutcome, PollFeed, PollStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Ballot, Poll, PollId, Tally, VoterRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Poll store backed by a SQLite database file.
///
/// Optimistic concurrency is enforced by the `version` column: a vote only
/// commits if its `UPDATE ... WHERE version = ?` matches a row.
///
/// Other processes may write to the same file, so every subscribed poll gets a
/// background task that re-reads its version and publishes what it finds.
pub struct SqliteStore {
    pool: SqlitePool,
    feed: Arc<PollFeed>,
    watched: Arc<Mutex<HashSet<PollId>>>,
    watch_interval: Duration,
}

impl SqliteStore {
    pub async fn connect(config: &Config) -> Result<Self> {
        // Create the database file on first use
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        // Connect to the database
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        // Initialize schema
        Self::init_schema(&pool).await?;
        info!("Connected to poll database at {}", config.database_url);

        Ok(Self {
            pool,
            feed: Arc::new(PollFeed::new()),
            watched: Arc::new(Mutex::new(HashSet::new())),
            watch_interval: config.watch_interval,
        })
    }

    // Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of polls with a running change watcher.
    pub fn watched_polls(&self) -> usize {
        self.watched().len()
    }

    // Initialize the database schema
    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        // One row per poll; options and tally are JSON
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                options TEXT NOT NULL,
                tally TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        // One row per (poll, voter); the primary key forbids a second vote
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS voter_records (
                poll_id TEXT NOT NULL,
                voter_id TEXT NOT NULL,
                chosen_option TEXT NOT NULL,
                committed_at TEXT NOT NULL,
                PRIMARY KEY (poll_id, voter_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn fetch_poll(
        tx: &mut Transaction<'_, Sqlite>,
        poll_id: &PollId,
    ) -> Result<Option<Poll>> {
        let row = sqlx::query(
            r#"
            SELECT id, question, options, tally, version, created_at
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(poll_from_row).transpose()
    }

    // The set only names polls, so a poisoned lock leaves nothing half-written.
    fn watched(&self) -> MutexGuard<'_, HashSet<PollId>> {
        self.watched.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Poll the database for writes this store did not make itself
    fn spawn_watcher(&self, poll_id: PollId) {
        let pool = self.pool.clone();
        let feed = Arc::clone(&self.feed);
        let watched = Arc::clone(&self.watched);
        let period = self.watch_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut seen: Option<u64> = None;

            loop {
                ticker.tick().await;

                // Stop once every subscriber is gone
                let done = {
                    let mut watched = watched.lock().unwrap_or_else(|p| p.into_inner());
                    let done = pool.is_closed() || feed.subscriber_count(&poll_id) == 0;
                    if done {
                        watched.remove(&poll_id);
                    }
                    done
                };
                if done {
                    debug!("Stopped watching poll {}", poll_id);
                    break;
                }

                match current_version(&pool, &poll_id).await {
                    Ok(Some(version)) if seen != Some(version) => {
                        match load_poll(&pool, &poll_id).await {
                            Ok(Some(poll)) => {
                                seen = Some(poll.version);
                                feed.publish(&poll);
                            }
                            Ok(None) => {}
                            Err(e) => warn!("Failed to reload watched poll {}: {}", poll_id, e),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to check poll {} for changes: {}", poll_id, e),
                }
            }
        });
    }
}

async fn load_poll(pool: &SqlitePool, poll_id: &PollId) -> Result<Option<Poll>> {
    let row = sqlx::query(
        r#"
        SELECT id, question, options, tally, version, created_at
        FROM polls
        WHERE id = ?
        "#,
    )
    .bind(poll_id.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(poll_from_row).transpose()
}

async fn current_version(pool: &SqlitePool, poll_id: &PollId) -> Result<Option<u64>> {
    let row = sqlx::query("SELECT version FROM polls WHERE id = ?")
        .bind(poll_id.as_str())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get::<i64, _>("version") as u64))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::StorageUnavailable(format!("Failed to parse timestamp: {}", e)))
}

fn poll_from_row(row: &SqliteRow) -> Result<Poll> {
    let options: Vec<String> = serde_json::from_str(&row.get::<String, _>("options"))?;
    let tally: Tally = serde_json::from_str(&row.get::<String, _>("tally"))?;

    Ok(Poll {
        id: PollId::from(row.get::<String, _>("id")),
        question: row.get("question"),
        options,
        tally,
        version: row.get::<i64, _>("version") as u64,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn voter_record_from_row(row: &SqliteRow) -> Result<VoterRecord> {
    Ok(VoterRecord {
        poll_id: PollId::from(row.get::<String, _>("poll_id")),
        voter_id: row.get("voter_id"),
        chosen_option: row.get("chosen_option"),
        committed_at: parse_timestamp(&row.get::<String, _>("committed_at"))?,
    })
}

#[async_trait]
impl PollStore for SqliteStore {
    async fn create_poll(&self, question: &str, options: &[String]) -> Result<Poll> {
        let poll = Poll::new(question, options)?;

        // Insert the poll with a zeroed tally at version 0
        sqlx::query(
            r#"
            INSERT INTO polls (id, question, options, tally, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(poll.id.as_str())
        .bind(&poll.question)
        .bind(serde_json::to_string(&poll.options)?)
        .bind(serde_json::to_string(&poll.tally)?)
        .bind(poll.version as i64)
        .bind(poll.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!("Created poll {} with {} options", poll.id, poll.options.len());
        self.feed.publish(&poll);
        Ok(poll)
    }

    async fn read_poll(&self, poll_id: &PollId) -> Result<Poll> {
        load_poll(&self.pool, poll_id)
            .await?
            .ok_or_else(|| Error::PollNotFound(poll_id.clone()))
    }

    async fn read_voter_record(
        &self,
        poll_id: &PollId,
        voter_id: &str,
    ) -> Result<Option<VoterRecord>> {
        let row = sqlx::query(
            r#"
            SELECT poll_id, voter_id, chosen_option, committed_at
            FROM voter_records
            WHERE poll_id = ? AND voter_id = ?
            "#,
        )
        .bind(poll_id.as_str())
        .bind(voter_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(voter_record_from_row).transpose()
    }

    async fn commit_vote(
        &self,
        expected_version: u64,
        new_tally: Tally,
        ballot: Ballot,
    ) -> Result<CommitOutcome> {
        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock for the rest of the transaction.
        let updated = sqlx::query(
            r#"
            UPDATE polls
            SET tally = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(serde_json::to_string(&new_tally)?)
        .bind(ballot.poll_id.as_str())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?;

        // No match: either the poll is gone or someone committed first
        if updated.rows_affected() == 0 {
            let exists = Self::fetch_poll(&mut tx, &ballot.poll_id).await?.is_some();
            tx.rollback().await?;
            return if exists {
                Ok(CommitOutcome::VersionConflict)
            } else {
                Err(Error::PollNotFound(ballot.poll_id))
            };
        }

        // Check the voter has no record yet
        let already_voted = sqlx::query("SELECT 1 FROM voter_records WHERE poll_id = ? AND voter_id = ?")
            .bind(ballot.poll_id.as_str())
            .bind(&ballot.voter_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if already_voted {
            tx.rollback().await?;
            return Ok(CommitOutcome::AlreadyVoted);
        }

        // Re-read the updated row and make sure the tally still fits the poll
        let snapshot = Self::fetch_poll(&mut tx, &ballot.poll_id)
            .await?
            .ok_or_else(|| Error::PollNotFound(ballot.poll_id.clone()))?;
        if let Err(e) = check_tally(&snapshot, &new_tally, &ballot) {
            tx.rollback().await?;
            return Err(e);
        }

        // Insert the voter record
        let record = ballot.into_record(Utc::now());
        let inserted = sqlx::query(
            r#"
            INSERT INTO voter_records (poll_id, voter_id, chosen_option, committed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(record.poll_id.as_str())
        .bind(&record.voter_id)
        .bind(&record.chosen_option)
        .bind(record.committed_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tx.rollback().await?;
                return Ok(CommitOutcome::AlreadyVoted);
            }
            Err(e) => return Err(e.into()),
        }

        // Both writes become visible together
        tx.commit().await?;
        self.feed.publish(&snapshot);
        Ok(CommitOutcome::Committed(record))
    }

    async fn list_voter_records(&self, poll_id: &PollId) -> Result<Vec<VoterRecord>> {
        sqlx::query(
            r#"
            SELECT poll_id, voter_id, chosen_option, committed_at
            FROM voter_records
            WHERE poll_id = ?
            ORDER BY committed_at
            "#,
        )
        .bind(poll_id.as_str())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(voter_record_from_row)
        .collect()
    }

    async fn count_voter_records(&self, poll_id: &PollId) -> Result<u64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM voter_records WHERE poll_id = ?")
            .bind(poll_id.as_str())
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(count as u64)
    }

    fn feed(&self) -> &PollFeed {
        &self.feed
    }

    fn subscribe(&self, poll_id: &PollId) -> watch::Receiver<Option<Poll>> {
        // Hold the set while subscribing so a stopping watcher cannot miss us
        let mut watched = self.watched();
        let rx = self.feed.subscribe(poll_id);
        if watched.insert(poll_id.clone()) {
            self.spawn_watcher(poll_id.clone());
        }
        rx
    }
}
