use crate::models::{Poll, PollId};
use std::pin::Pin;
use std::task::{ready, Context, Poll as TaskPoll};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;

/// Unbounded stream of snapshots for one poll. Drop it to unsubscribe.
#[derive(Debug)]
pub struct PollSubscription {
    poll_id: PollId,
    inner: WatchStream<Option<Poll>>,
}

impl PollSubscription {
    pub(crate) fn new(poll_id: PollId, rx: watch::Receiver<Option<Poll>>) -> Self {
        Self {
            poll_id,
            inner: WatchStream::new(rx),
        }
    }

    pub fn poll_id(&self) -> &PollId {
        &self.poll_id
    }
}

impl Stream for PollSubscription {
    type Item = Poll;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> TaskPoll<Option<Poll>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Some(poll)) => return TaskPoll::Ready(Some(poll)),
                // Not created yet.
                Some(None) => continue,
                None => return TaskPoll::Ready(None),
            }
        }
    }
}
