//! Sync dispatcher and run records

pub mod cancel;
pub mod dispatcher;
pub mod retry;
pub mod run;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use dispatcher::{DispatchOptions, PushFailure, Pusher, SyncDispatcher, SyncObserver};
pub use retry::RetryPolicy;
pub use run::{FailReason, OverallStatus, Outcome, RemoteOutcome, SkipReason, SyncRun};
