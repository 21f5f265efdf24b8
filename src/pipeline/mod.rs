//! Interaction pipeline: mailbox → state machine → cancellable workers.
//!
//! ```text
//! EventMailbox ──poll──▶ InteractionMachine (async loop, one task)
//!                              │
//!                              ▼
//!                         TaskRunner ──spawn_blocking──▶ worker(CancelFlag)
//!                              │ press / shutdown
//!                              └─▶ CancelFlag::cancel + POST /cancel + join
//! ```

pub mod cancel;
pub mod machine;
pub mod runner;
pub mod state;

pub use cancel::CancelFlag;
pub use machine::{AppContext, Buttons, InteractionMachine};
pub use runner::{RunnerTiming, TaskOutcome, TaskRunner, TaskSpec};
pub use state::InteractionState;
