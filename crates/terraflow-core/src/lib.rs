//! # CoreMachine (C5)
//!
//! The orchestrator itself: `processJob`/`processTask` (§4.5.1, §4.5.2),
//! the stage-completion algorithm they share (§4.5.3), the worker loop that
//! drives both off the Message Bus (§5), and the submission-API convenience
//! wrapper a thin external HTTP layer calls into (§6.2).

pub mod machine;
pub mod submit;
pub mod worker;

pub use machine::{CoreMachine, JobOutcome};
pub use submit::{JobSubmitter, SubmitOutcome};
pub use worker::WorkerLoop;
