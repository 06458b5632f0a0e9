pub mod operations;
pub mod transport;

// Re-export commonly used items
pub use operations::{
    clean_error_message, current_ref, is_rate_limit_error, is_transient_error, run_git,
};
pub use transport::{GitProber, GitPusher};
