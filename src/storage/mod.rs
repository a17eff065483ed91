pub mod cleanup;
pub mod retention;

pub use cleanup::PendingDeletions;
pub use retention::RetentionWindow;
