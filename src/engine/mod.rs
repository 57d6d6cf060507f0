//! Engine module: instruction set, clock, and the executor.
//!
//! - Instruction/SignedInstruction: the signed operation envelope
//! - Clock: pluggable time source for issuance schedules
//! - Executor: applies instructions under per-escrow locks

pub mod clock;
pub mod executor;
pub mod instruction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{Executor, Genesis};
pub use instruction::{Instruction, Receipt, SignedInstruction};
