mod context;
mod control_flow;
mod evaluator;
mod natives;
mod process;
mod step;

pub use context::{Context, ContextKind};
pub use evaluator::CallRequest;
pub use natives::{NativeCallback, NativeRegistry};
pub use process::{
    Process, ProcessOptions, ProcessState, RunStatus, StepOutcome, DEFAULT_MAX_CALL_DEPTH,
    DEFAULT_MAX_STEPS,
};
