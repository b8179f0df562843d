//! Live poll snapshots

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use vote_lock::{MemoryStore, PollId, PollService, PollStore, RetryPolicy, VoteCoordinator};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_subscriber_sees_current_state_then_votes() {
    let store = Arc::new(MemoryStore::new());
    let service = PollService::new(store.clone());
    let coordinator = VoteCoordinator::new(store.clone(), RetryPolicy::default());
    let poll_id = service
        .create_poll("Lunch choice?", &["Pizza", "Salad"])
        .await
        .unwrap();

    let mut snapshots = service.subscribe(&poll_id).await.unwrap();
    let first = timeout(WAIT, snapshots.next()).await.unwrap().unwrap();
    assert_eq!(first.version, 0);
    assert_eq!(first.total_votes(), 0);

    coordinator
        .cast_vote(&poll_id, "Pizza", "fingerprint-0001")
        .await
        .unwrap();
    let second = timeout(WAIT, snapshots.next()).await.unwrap().unwrap();
    assert_eq!(second.version, 1);
    assert_eq!(second.votes_for("Pizza"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_versions_never_go_backwards() {
    let store = Arc::new(MemoryStore::new());
    let service = PollService::new(store.clone());
    let coordinator = Arc::new(VoteCoordinator::new(
        store.clone(),
        RetryPolicy {
            max_attempts: 100,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        },
    ));
    let poll_id = service
        .create_poll("Lunch choice?", &["Pizza", "Salad"])
        .await
        .unwrap();
    let mut snapshots = service.subscribe(&poll_id).await.unwrap();

    let voters = {
        let coordinator = coordinator.clone();
        let poll_id = poll_id.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                coordinator
                    .cast_vote(&poll_id, "Salad", &format!("fingerprint-{:04}", i))
                    .await
                    .unwrap();
            }
        })
    };

    let mut last = None;
    loop {
        let poll = timeout(WAIT, snapshots.next()).await.unwrap().unwrap();
        if let Some(previous) = last {
            assert!(poll.version > previous);
        }
        assert_eq!(poll.total_votes(), poll.version);
        last = Some(poll.version);
        if poll.version == 20 {
            break;
        }
    }
    voters.await.unwrap();
}

#[tokio::test]
async fn test_unknown_poll_stream_stays_quiet() {
    let service = PollService::new(Arc::new(MemoryStore::new()));
    let mut snapshots = service.subscribe(&PollId::from("not-yet")).await.unwrap();
    assert!(timeout(Duration::from_millis(100), snapshots.next()).await.is_err());
}

#[tokio::test]
async fn test_dropping_the_stream_unsubscribes() {
    let store = Arc::new(MemoryStore::new());
    let service = PollService::new(store.clone());
    let coordinator = VoteCoordinator::new(store.clone(), RetryPolicy::default());
    let poll_id = service
        .create_poll("Lunch choice?", &["Pizza", "Salad"])
        .await
        .unwrap();

    let snapshots = service.subscribe(&poll_id).await.unwrap();
    assert_eq!(store.feed().subscriber_count(&poll_id), 1);
    drop(snapshots);

    coordinator
        .cast_vote(&poll_id, "Pizza", "fingerprint-0001")
        .await
        .unwrap();
    assert_eq!(store.feed().subscriber_count(&poll_id), 0);
}
