//! Typed remote function invocation built on top of `Call` (spec.md §4.8).

use std::sync::Arc;
use std::time::Duration;

use fibre_utils::error::{err_detail, ErrorKind, Result};

use crate::call::Call;
use crate::codec::{FormatTag, Value};
use crate::node::RemoteNode;

/// A callable descriptor for one remote function: its wire handle plus the argument and
/// return-value codecs (spec.md §4.8, §9's codec registry).
pub struct RemoteFunction {
	pub name: String,
	pub handle: u64,
	pub inputs: Vec<FormatTag>,
	pub outputs: Vec<FormatTag>,
}

impl RemoteFunction {
	pub fn new(name: impl Into<String>, handle: u64, inputs: Vec<FormatTag>, outputs: Vec<FormatTag>) -> Self {
		Self { name: name.into(), handle, inputs, outputs }
	}

	/// Open a call, write the handle and every argument, close the send side, then block for
	/// the matching number of response frames and decode each with its output codec.
	pub fn invoke(&self, node: Arc<RemoteNode>, args: &[Value], timeout: Duration) -> Result<Vec<Value>> {
		if args.len() != self.inputs.len() {
			return Err(err_detail(ErrorKind::ArgumentInvalid, "argument count did not match the function signature"));
		}

		for (arg, expected) in args.iter().zip(&self.inputs) {
			if arg.tag() != *expected {
				return Err(err_detail(ErrorKind::ArgumentInvalid, "argument type did not match the function signature"));
			}
		}

		let mut call = Call::open(node);

		let mut handle_bytes = Vec::new();
		Value::U64(self.handle).encode(&mut handle_bytes);
		call.send_argument(&handle_bytes);

		for arg in args {
			let mut bytes = Vec::new();
			arg.encode(&mut bytes);
			call.send_argument(&bytes);
		}

		let frames = match call.recv_frames(self.outputs.len(), timeout) {
			Ok(frames) => frames,
			Err(e) => {
				call.abort();
				return Err(e);
			}
		};

		frames.into_iter().zip(&self.outputs).map(|(bytes, tag)| Value::decode(*tag, &bytes)).collect()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::config::Config;

	fn test_node() -> Arc<RemoteNode> {
		let config = Config { pool_capacity: 4, default_resend_interval: Duration::from_millis(20), handshake_timeout: Duration::from_secs(1) };
		RemoteNode::new(uuid::Uuid::new_v4(), &config)
	}

	#[test]
	fn wrong_argument_count_is_rejected_before_opening_a_call() {
		let node = test_node();
		let function = RemoteFunction::new("f", 1, vec![FormatTag::U32], vec![FormatTag::U32]);

		let err = function.invoke(node, &[], Duration::from_millis(10)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
	}

	#[test]
	fn wrong_argument_type_is_rejected() {
		let node = test_node();
		let function = RemoteFunction::new("f", 1, vec![FormatTag::U32], vec![FormatTag::U32]);

		let err = function.invoke(node, &[Value::Bool(true)], Duration::from_millis(10)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
	}

	#[test]
	fn invoke_times_out_when_the_peer_never_responds() {
		let node = test_node();
		let function = RemoteFunction::new("f", 1, vec![FormatTag::U32], vec![FormatTag::U32]);

		let err = function.invoke(node, &[Value::U32(7)], Duration::from_millis(20)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Closed);
	}
}
