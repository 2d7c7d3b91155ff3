pub mod batch;
pub mod executor;
pub mod process;
pub mod sequencer;
pub mod state;

pub use batch::{BatchResult, BatchState, OutcomeStatus, PhaseOutcome};
pub use executor::{BatchEvent, ExecutorOptions, PhaseExecutor, RefusalStage};
pub use sequencer::{Judgment, Sequencer};
pub use state::{ExecutionRecord, PhaseStatus, StateLock, StateStore};
