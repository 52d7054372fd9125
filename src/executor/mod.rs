mod runner;

pub use runner::{Canceller, ProcessEvent, ProcessRunner, RunHandle, RunOutcome};
