//! A pipe pair: one `InputPipe` and one `OutputPipe` sharing a logical pipe id, used
//! together by one `Call` (spec.md §3).

pub mod input;
pub mod output;

use std::sync::Mutex;

pub use input::{InputPipe, SuspendedInputPipe};
pub use output::{OutputPipe, PendingChunk, SuspendedOutputPipe};

/// Per spec.md §5: each pipe has its own lock, and no code holds one while doing channel I/O.
pub struct PipePair {
	pub input: Mutex<InputPipe>,
	pub output: Mutex<OutputPipe>,
}

impl PipePair {
	pub fn new(ensure_delivery: bool) -> Self {
		Self { input: Mutex::new(InputPipe::new()), output: Mutex::new(OutputPipe::new(ensure_delivery)) }
	}
}
