//! Request/response call lifecycle bound to one client-initiated pipe pair (spec.md §4.7).

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use fibre_utils::error::{err, ErrorKind, Result};

use crate::node::RemoteNode;
use crate::pipe::PipePair;

struct ResponseState {
	/// Completed frames, each the concatenation of bytes delivered up to a packet break.
	frames: VecDeque<Vec<u8>>,
	current: Vec<u8>,
	/// Set once the peer sends a drop notification for this pipe's output direction.
	aborted: bool,
}

/// Binds one acquired client pipe pair to a single function invocation.
///
/// Created by `RemoteFunction::invoke`, destroyed once both sides have closed — on drop, the
/// pipe pair is released back to the node's client pool (spec.md §4.7).
pub struct Call {
	node: Arc<RemoteNode>,
	pool_index: usize,
	pair: Arc<PipePair>,
	written: u64,
	response: Arc<(Mutex<ResponseState>, Condvar)>,
}

impl Call {
	/// Acquire a free client pipe pair and start demuxing its responses into frames, one per
	/// packet break.
	pub fn open(node: Arc<RemoteNode>) -> Self {
		let (pool_index, pair) = node.acquire_pipe(true, None, true);

		let response = Arc::new((
			Mutex::new(ResponseState { frames: VecDeque::new(), current: Vec::new(), aborted: false }),
			Condvar::new(),
		));

		let handler_state = response.clone();
		let abort_state = response.clone();

		let mut input = pair.input.lock().unwrap();

		input.set_handler(move |bytes, packet_break| {
			let (lock, cv) = &*handler_state;
			let mut state = lock.lock().unwrap();

			if packet_break {
				// The break offset is a reserved, zero-value wire byte (OutputPipe::send_bytes'
				// `append_break`), not part of any argument's bytes — don't fold it into the frame.
				let frame = std::mem::take(&mut state.current);
				state.frames.push_back(frame);
				cv.notify_all();
			} else {
				state.current.extend_from_slice(bytes);
			}
		});

		input.set_abort_handler(move || {
			let (lock, cv) = &*abort_state;
			lock.lock().unwrap().aborted = true;
			cv.notify_all();
		});

		drop(input);

		Self { node, pool_index, pair, written: 0, response }
	}

	/// Write one argument payload followed by a frame boundary.
	pub fn send_argument(&mut self, bytes: &[u8]) {
		self.pair.output.lock().unwrap().send_bytes(bytes, true);
		self.written += bytes.len() as u64 + 1;
		self.node.notify_output_ready();
	}

	/// Block until `count` response frames have arrived, the peer aborts, or `timeout` elapses.
	pub fn recv_frames(&self, count: usize, timeout: Duration) -> Result<Vec<Vec<u8>>> {
		let (lock, cv) = &*self.response;
		let mut state = lock.lock().unwrap();
		let deadline = Instant::now() + timeout;

		while state.frames.len() < count && !state.aborted {
			let remaining = deadline.saturating_duration_since(Instant::now());

			if remaining.is_zero() {
				return Err(err(ErrorKind::Closed));
			}

			let (guard, result) = cv.wait_timeout(state, remaining).unwrap();
			state = guard;

			if result.timed_out() && state.frames.len() < count && !state.aborted {
				return Err(err(ErrorKind::Closed));
			}
		}

		if state.aborted {
			return Err(err(ErrorKind::HostUnreachable));
		}

		Ok(state.frames.drain(..count).collect())
	}

	/// Abort the call: drop this call's unacknowledged bytes rather than let them resend.
	pub fn abort(self) {
		self.pair.output.lock().unwrap().drop_range(0, self.written);
		self.node.notify_output_ready();
	}
}

impl Drop for Call {
	fn drop(&mut self) {
		self.node.release_pipe(true, self.pool_index);
	}
}
