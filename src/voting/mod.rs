mod coordinator;
mod results;
mod retry;

pub use coordinator::VoteCoordinator;
pub use results::{PollResults, Standing};
pub use retry::RetryPolicy;
