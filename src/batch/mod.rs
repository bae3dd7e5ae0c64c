pub mod job;
pub mod runner;

pub use job::{BatchJob, BatchOutcome, BatchProgress, BatchStatus};
pub use runner::BatchRunner;
