//! # Relink Library
//!
//! Scenario loading and replay shared by the `relink` binary and its tests.

pub mod replay;
pub mod scenario;

pub use replay::{Identity, Replay, ReplayReport, StepReport, Summary};
pub use scenario::{FragmentSpec, Scenario, SetOp, Step, StoreSeed};
