//! Reassembly of one direction of a pipe pair (spec.md §4.4).

use log::{trace, warn};

use crate::crc::{crc16, CRC16_INIT};

/// A closed `InputPipe`'s state, kept so the slot can later be rematerialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendedInputPipe {
	pub pos: u64,
	pub crc: u16,
}

/// Reassembles out-of-order, potentially duplicated chunks into an in-order byte stream.
///
/// Does not buffer ahead: a chunk that starts past `pos` is dropped rather than queued,
/// matching spec.md §4.4's "reassembly is not implemented" for the disjoint-ahead case.
pub struct InputPipe {
	pos: u64,
	crc: u16,
	/// `(bytes, ends_a_frame)` — `ends_a_frame` is true exactly when this delivery reaches a
	/// packet-break position, letting `Call`'s receive side split the stream into frames.
	handler: Option<Box<dyn FnMut(&[u8], bool) + Send>>,
	aborted: Option<Box<dyn FnMut() + Send>>,
}

impl InputPipe {
	pub fn new() -> Self {
		Self { pos: 0, crc: CRC16_INIT, handler: None, aborted: None }
	}

	/// Rematerialize a pipe from a previously suspended one.
	pub fn resume(suspended: SuspendedInputPipe) -> Self {
		Self { pos: suspended.pos, crc: suspended.crc, handler: None, aborted: None }
	}

	pub fn pos(&self) -> u64 {
		self.pos
	}

	pub fn crc(&self) -> u16 {
		self.crc
	}

	/// Install the handler invoked with each newly-delivered, in-order byte range.
	pub fn set_handler(&mut self, handler: impl FnMut(&[u8], bool) + Send + 'static) {
		self.handler = Some(Box::new(handler));
	}

	/// Install the handler invoked when the peer sends a drop notification for this pipe.
	pub fn set_abort_handler(&mut self, handler: impl FnMut() + Send + 'static) {
		self.aborted = Some(Box::new(handler));
	}

	/// The peer reported it is abandoning bytes it was sending on the matching output pipe.
	pub fn note_drop(&mut self) {
		if let Some(aborted) = &mut self.aborted {
			aborted();
		}
	}

	/// Process one chunk arriving from the `ChannelDecoder`.
	///
	/// `chunk_offset` is the payload's position within the pipe; `chunk_crc_init` is the
	/// CRC-16 the sender claims for `[0..chunk_offset)`; `packet_break` is whether this
	/// chunk's end is a frame boundary.
	pub fn process_chunk(&mut self, payload: &[u8], chunk_offset: u64, chunk_crc_init: u16, packet_break: bool) {
		if chunk_offset > self.pos {
			trace!("dropping chunk ahead of pos ({chunk_offset} > {})", self.pos);
			return;
		}

		let end = chunk_offset + payload.len() as u64;

		if end <= self.pos {
			trace!("dropping fully duplicated chunk at offset {chunk_offset}");
			return;
		}

		let trim = (self.pos - chunk_offset) as usize;
		let (trimmed, payload) = payload.split_at(trim);
		let crc_init = crc16(chunk_crc_init, trimmed);

		if crc_init != self.crc {
			warn!("dropping dangling chunk: crc_init {crc_init:#06x} != expected {:#06x}", self.crc);
			return;
		}

		if let Some(handler) = &mut self.handler {
			handler(payload, packet_break);
		}

		self.pos += payload.len() as u64;
		self.crc = crc16(self.crc, payload);
	}

	/// Close the pipe, capturing enough state to resume it later.
	pub fn close(&mut self) -> SuspendedInputPipe {
		self.handler = None;
		self.aborted = None;
		SuspendedInputPipe { pos: self.pos, crc: self.crc }
	}
}

impl Default for InputPipe {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use super::*;

	fn collecting() -> (InputPipe, Arc<Mutex<Vec<u8>>>) {
		let received = Arc::new(Mutex::new(Vec::new()));
		let sink = received.clone();

		let mut pipe = InputPipe::new();
		pipe.set_handler(move |bytes, _packet_break| sink.lock().unwrap().extend_from_slice(bytes));

		(pipe, received)
	}

	#[test]
	fn duplicate_chunks_advance_pos_exactly_once() {
		let (mut pipe, received) = collecting();
		let crc = CRC16_INIT;

		pipe.process_chunk(b"AB", 0, crc, false);
		pipe.process_chunk(b"AB", 0, crc, false);

		assert_eq!(pipe.pos(), 2);
		assert_eq!(&*received.lock().unwrap(), b"AB");
	}

	#[test]
	fn overlapping_chunks_merge_into_one_prefix() {
		let (mut pipe, received) = collecting();
		let crc = CRC16_INIT;

		pipe.process_chunk(b"ABCD", 0, crc, false);
		let crc_after_ab = crc16(crc, b"AB");
		pipe.process_chunk(b"CDEF", 2, crc_after_ab, false);

		assert_eq!(pipe.pos(), 6);
		assert_eq!(&*received.lock().unwrap(), b"ABCDEF");
	}

	#[test]
	fn future_chunk_is_dropped_until_gap_filled() {
		let (mut pipe, received) = collecting();
		let crc = CRC16_INIT;

		pipe.process_chunk(b"EF", 4, crc, false);
		assert_eq!(pipe.pos(), 0);
		assert!(received.lock().unwrap().is_empty());

		pipe.process_chunk(b"ABCD", 0, crc, false);
		assert_eq!(pipe.pos(), 4);
		assert_eq!(&*received.lock().unwrap(), b"ABCD");
	}

	#[test]
	fn wrong_crc_init_is_dropped_without_advancing() {
		let (mut pipe, received) = collecting();

		pipe.process_chunk(b"AB", 0, 0xdead, false);

		assert_eq!(pipe.pos(), 0);
		assert!(received.lock().unwrap().is_empty());
	}

	#[test]
	fn crc_tracks_the_received_prefix() {
		let (mut pipe, _received) = collecting();
		let crc = CRC16_INIT;

		pipe.process_chunk(b"hello", 0, crc, false);
		assert_eq!(pipe.crc(), crc16(CRC16_INIT, b"hello"));
	}

	#[test]
	fn packet_break_flag_reaches_the_handler() {
		let breaks = Arc::new(Mutex::new(Vec::new()));
		let sink = breaks.clone();

		let mut pipe = InputPipe::new();
		pipe.set_handler(move |_bytes, packet_break| sink.lock().unwrap().push(packet_break));

		pipe.process_chunk(b"AB", 0, CRC16_INIT, false);
		pipe.process_chunk(b"C", 2, crc16(CRC16_INIT, b"AB"), true);

		assert_eq!(&*breaks.lock().unwrap(), &[false, true]);
	}

	#[test]
	fn drop_notification_invokes_the_abort_handler() {
		let aborted = Arc::new(Mutex::new(false));
		let sink = aborted.clone();

		let mut pipe = InputPipe::new();
		pipe.set_abort_handler(move || *sink.lock().unwrap() = true);
		pipe.note_drop();

		assert!(*aborted.lock().unwrap());
	}

	#[test]
	fn close_then_resume_preserves_pos_and_crc() {
		let (mut pipe, _received) = collecting();
		pipe.process_chunk(b"hi", 0, CRC16_INIT, false);

		let suspended = pipe.close();
		let resumed = InputPipe::resume(suspended);

		assert_eq!(resumed.pos(), 2);
		assert_eq!(resumed.crc(), crc16(CRC16_INIT, b"hi"));
	}
}
