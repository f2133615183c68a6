//! Buffering, state tracking, and chunk emission for one direction of a pipe pair
//! (spec.md §4.3).

use std::time::Instant;

use fibre_collections::IntervalList;

use crate::chunk::DataState;
use crate::crc::{crc16, CRC16_INIT};

/// A closed `OutputPipe`'s state: the offset already committed and the CRC-16 of
/// everything up to it, so the slot can be rematerialized later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendedOutputPipe {
	pub pos: u64,
	pub crc: u16,
}

/// One chunk `pending_chunks` has determined is eligible for (re)transmission.
///
/// `length` is the logical byte range this chunk covers for bookkeeping purposes; a drop
/// chunk's *wire* payload is always empty (spec.md §9 open question (a)) even though
/// `length` here may cover more than zero bytes of buffer being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingChunk {
	pub offset: u64,
	pub length: u64,
	pub is_drop: bool,
	pub packet_break: bool,
}

/// Holds pending bytes, classifies each byte range, and produces chunks eligible for
/// (re)transmission.
pub struct OutputPipe {
	/// Absolute offset of `buffer[0]`; everything before this has been retired and forgotten.
	start: u64,
	/// CRC-16 of every byte before `start`, so a chunk starting anywhere in `buffer` can
	/// compute the `crc_init` the wire header requires without re-hashing from offset zero.
	crc_at_start: u16,
	buffer: Vec<u8>,
	state: IntervalList<DataState>,
	packet_breaks: Vec<u64>,
	next_due_time: Option<Instant>,
	ensure_delivery: bool,
}

impl OutputPipe {
	/// `ensure_delivery` mirrors spec.md §3's flag: when false, the scheduler fires the
	/// pipe's chunks and forgets them immediately rather than tracking them for resend.
	pub fn new(ensure_delivery: bool) -> Self {
		Self {
			start: 0,
			crc_at_start: CRC16_INIT,
			buffer: Vec::new(),
			state: IntervalList::new(DataState::ResponseReceived),
			packet_breaks: Vec::new(),
			next_due_time: None,
			ensure_delivery,
		}
	}

	pub fn resume(suspended: SuspendedOutputPipe, ensure_delivery: bool) -> Self {
		Self {
			start: suspended.pos,
			crc_at_start: suspended.crc,
			buffer: Vec::new(),
			state: IntervalList::new(DataState::ResponseReceived),
			packet_breaks: Vec::new(),
			next_due_time: None,
			ensure_delivery,
		}
	}

	pub fn ensure_delivery(&self) -> bool {
		self.ensure_delivery
	}

	pub fn next_due_time(&self) -> Option<Instant> {
		self.next_due_time
	}

	/// Absolute offset one past the last byte ever appended.
	pub fn end(&self) -> u64 {
		self.start + self.buffer.len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	/// Append `data`, marking the new range `TO_BE_SENT`. If `append_break`, also append a
	/// one-byte frame boundary marker, consuming one offset slot.
	pub fn send_bytes(&mut self, data: &[u8], append_break: bool) {
		if !data.is_empty() {
			let offset = self.end();
			self.buffer.extend_from_slice(data);
			self.state.set(offset, data.len() as u64, DataState::ToBeSent);
		}

		if append_break {
			let offset = self.end();
			self.buffer.push(0);
			self.state.set(offset, 1, DataState::ToBeSent);
			self.packet_breaks.push(offset);
		}
	}

	fn state_at(&self, offset: u64) -> DataState {
		self.state.intervals(offset, 1).next().map(|(_, _, v)| *v).unwrap_or(DataState::ResponseReceived)
	}

	/// Split `[off, off+len)` at any packet-break boundary it contains, since chunks must
	/// never cross a frame boundary. The break byte itself (a single reserved offset) is
	/// split out into its own one-byte sub-range rather than merged into the data before it.
	fn sub_ranges(&self, off: u64, len: u64) -> Vec<(u64, u64)> {
		let end = off + len;
		let mut points: Vec<u64> =
			self.packet_breaks.iter().flat_map(|&b| [b, b + 1]).filter(|&p| p > off && p < end).collect();
		points.sort_unstable();
		points.dedup();

		let mut ranges = Vec::with_capacity(points.len() + 1);
		let mut cur = off;

		for p in points {
			ranges.push((cur, p - cur));
			cur = p;
		}

		ranges.push((cur, end - cur));
		ranges
	}

	/// The CRC-16 a receiver must already have to accept a chunk starting at `offset`.
	pub fn crc_init_at(&self, offset: u64) -> u16 {
		let rel = (offset - self.start) as usize;
		crc16(self.crc_at_start, &self.buffer[..rel])
	}

	/// The buffered payload for `[offset, offset+length)`.
	pub fn payload_at(&self, offset: u64, length: u64) -> &[u8] {
		let rel = (offset - self.start) as usize;
		&self.buffer[rel..rel + length as usize]
	}

	/// Chunks eligible for emission right now: `TO_BE_SENT`/`TO_BE_DROPPED` unconditionally,
	/// or `WAIT_RESEND`/`WAIT_REDROP` once `now` has reached `next_due_time`.
	pub fn pending_chunks(&self, now: Instant) -> Vec<PendingChunk> {
		let mut out = Vec::new();

		if self.buffer.is_empty() {
			return out;
		}

		for (off, len, &state) in self.state.intervals(self.start, self.buffer.len() as u64) {
			if !state.is_pending_emission() {
				continue;
			}

			if matches!(state, DataState::WaitResend | DataState::WaitRedrop) && !self.next_due_time.map_or(true, |t| now >= t) {
				continue;
			}

			for (sub_off, sub_len) in self.sub_ranges(off, len) {
				if sub_len == 0 {
					continue;
				}

				let packet_break = self.packet_breaks.contains(&(sub_off + sub_len - 1));
				out.push(PendingChunk { offset: sub_off, length: sub_len, is_drop: state.is_drop_variant(), packet_break });
			}
		}

		out
	}

	/// Record that `[offset, offset+length)` was just emitted. `was_reliable` selects
	/// between settling (`SENT`/`DROPPED`) and scheduling a resend (`WAIT_RESEND`/
	/// `WAIT_REDROP`) at `next_due_time`.
	pub fn did_emit(&mut self, offset: u64, length: u64, was_reliable: bool, next_due_time: Instant) {
		let current = self.state_at(offset);
		self.state.set(offset, length, current.after_emit(was_reliable));
		self.next_due_time = Some(next_due_time);
		self.compact();
	}

	/// Fire-and-forget emission for a pipe with `ensure_delivery == false`: the chunk leaves
	/// the buffer immediately with no resend bookkeeping.
	pub fn drop_chunk(&mut self, offset: u64, length: u64) {
		self.state.set(offset, length, DataState::ResponseReceived);
		self.compact();
	}

	/// Mark `[offset, offset+length)` for an explicit drop (e.g. a call aborting).
	pub fn drop_range(&mut self, offset: u64, length: u64) {
		self.state.set(offset, length, DataState::ToBeDropped);
	}

	/// The peer has consumed `[offset, offset+length)`; it may now leave the buffer.
	pub fn did_receive_response(&mut self, offset: u64, length: u64) {
		self.state.set(offset, length, DataState::ResponseReceived);
		self.compact();
	}

	/// Drop any bytes at the front of the buffer whose state has settled, advancing `start`
	/// and rolling their bytes into `crc_at_start`.
	fn compact(&mut self) {
		loop {
			let Some((off, len, &state)) = self.state.intervals(self.start, self.buffer.len() as u64).next() else { break };

			if off != self.start || !state.is_retired() {
				break;
			}

			let n = len as usize;
			let removed: Vec<u8> = self.buffer.drain(..n).collect();
			self.crc_at_start = crc16(self.crc_at_start, &removed);
			self.start += len;
			self.state.forget_before(self.start);
			self.packet_breaks.retain(|&b| b >= self.start);
		}
	}

	/// Close the pipe, capturing enough state to resume it later.
	pub fn close(&mut self) -> SuspendedOutputPipe {
		SuspendedOutputPipe { pos: self.start, crc: self.crc_at_start }
	}

	#[cfg(debug_assertions)]
	pub fn sanity_check(&self) {
		let covered: u64 = self.state.intervals(self.start, self.buffer.len() as u64).map(|(_, l, _)| l).sum();
		assert_eq!(covered, self.buffer.len() as u64, "state must cover the whole buffer with no gaps");
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[test]
	fn send_then_emit_then_ack_retires_bytes() {
		let mut pipe = OutputPipe::new(true);
		pipe.send_bytes(b"hello", false);

		let now = Instant::now();
		let pending = pipe.pending_chunks(now);
		assert_eq!(pending, vec![PendingChunk { offset: 0, length: 5, is_drop: false, packet_break: false }]);

		pipe.did_emit(0, 5, true, now);
		assert!(pipe.pending_chunks(now).is_empty());

		pipe.did_receive_response(0, 5);
		assert_eq!(pipe.end(), 5);
		assert!(pipe.is_empty());
	}

	#[test]
	fn resend_after_timeout_then_stops_once_acked() {
		let mut pipe = OutputPipe::new(true);
		pipe.send_bytes(b"AB", false);

		let t0 = Instant::now();
		pipe.did_emit(0, 2, false, t0 + Duration::from_millis(100));

		assert!(pipe.pending_chunks(t0).is_empty(), "must not resend before the deadline");

		let later = t0 + Duration::from_millis(150);
		let pending = pipe.pending_chunks(later);
		assert_eq!(pending, vec![PendingChunk { offset: 0, length: 2, is_drop: false, packet_break: false }]);

		pipe.did_emit(0, 2, true, later);
		pipe.did_receive_response(0, 2);
		assert!(pipe.pending_chunks(later + Duration::from_secs(1)).is_empty());
	}

	#[test]
	fn chunks_never_cross_a_packet_break() {
		let mut pipe = OutputPipe::new(true);
		pipe.send_bytes(b"AB", true);
		pipe.send_bytes(b"CD", false);

		let now = Instant::now();
		let mut pending = pipe.pending_chunks(now);
		pending.sort_by_key(|c| c.offset);

		assert_eq!(
			pending,
			vec![
				PendingChunk { offset: 0, length: 2, is_drop: false, packet_break: false },
				PendingChunk { offset: 2, length: 1, is_drop: false, packet_break: true },
				PendingChunk { offset: 3, length: 2, is_drop: false, packet_break: false },
			]
		);
	}

	#[test]
	fn aborting_a_call_drops_its_range() {
		let mut pipe = OutputPipe::new(true);
		pipe.send_bytes(b"abort me", false);
		pipe.drop_range(0, 8);

		let now = Instant::now();
		let pending = pipe.pending_chunks(now);
		assert_eq!(pending, vec![PendingChunk { offset: 0, length: 8, is_drop: true, packet_break: false }]);

		pipe.did_emit(0, 8, true, now);
		assert!(pipe.is_empty());
	}

	#[test]
	fn unreliable_pipe_forgets_bytes_immediately_after_fire_and_forget() {
		let mut pipe = OutputPipe::new(false);
		pipe.send_bytes(b"ping", false);

		pipe.drop_chunk(0, 4);
		assert!(pipe.is_empty());
	}

	#[test]
	fn crc_init_accounts_for_already_forgotten_bytes() {
		let mut pipe = OutputPipe::new(true);
		pipe.send_bytes(b"AB", false);
		pipe.did_emit(0, 2, true, Instant::now());
		pipe.did_receive_response(0, 2);

		pipe.send_bytes(b"CD", false);
		assert_eq!(pipe.crc_init_at(2), crc16(CRC16_INIT, b"AB"));
		assert_eq!(pipe.payload_at(2, 2), b"CD");
	}
}
