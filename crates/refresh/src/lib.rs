//! Single-flight credential renewal
//!
//! When a request comes back 401 the client hands it to the
//! `RefreshCoordinator`. The coordinator runs at most one renewal at a time
//! and parks every other unauthorized request in a FIFO queue behind it:
//!
//! 1. First eligible 401 while idle: start renewal, park the trigger.
//! 2. Further 401s while renewing: park.
//! 3. Renewal succeeds: store the new pair, release the queue and replay each
//!    request once through the client.
//! 4. Renewal fails: end the session once, reject the whole queue.
//!
//! The coordinator never sends business traffic itself; replays go back
//! through the `Replay` implementation (the client).

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod metrics;

pub use classify::{Recovery, classify_unauthorized};
pub use coordinator::{RefreshCoordinator, Replay, ReplayFuture};
pub use error::{Error, Result};
