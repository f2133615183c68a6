//! Parses the wire-level chunk header stream arriving on one channel (spec.md §4.5) and the
//! traits a transport must implement to plug into the scheduler (spec.md §1).

use std::time::Duration;

use fibre_utils::error::Result;

use crate::chunk::{ChunkHeader, HEADER_LEN};
use crate::crc::crc16;

/// What the core requires from a transport-level outgoing connection.
///
/// Concrete transports (TCP, UDP, USB, serial) are out of scope here; this is only the seam
/// the scheduler writes through.
pub trait OutputChannel: Send {
	/// Bytes currently writable without blocking.
	fn min_non_blocking_bytes(&self) -> usize;

	/// How long the scheduler should wait before resending a chunk sent on this channel.
	fn resend_interval(&self) -> Duration;

	/// Write `bytes` without blocking. Must not be called with more than
	/// `min_non_blocking_bytes()` bytes.
	fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// What the core requires from a transport-level incoming byte source.
pub trait StreamSource: Send {
	/// Block until at least one byte is available, or the source is closed/cancelled.
	fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

enum State {
	Header { buf: [u8; HEADER_LEN], len: usize },
	Payload { header: ChunkHeader, crc_init: u16, delivered: u16, remaining: u16 },
}

impl State {
	fn fresh() -> Self {
		Self::Header { buf: [0; HEADER_LEN], len: 0 }
	}
}

/// State machine over one channel's incoming byte stream: `IN_HEADER` then `IN_PAYLOAD`,
/// dispatching each chunk as it completes.
pub struct ChannelDecoder {
	state: State,
}

impl ChannelDecoder {
	pub fn new() -> Self {
		Self { state: State::fresh() }
	}

	/// How many more bytes this decoder can usefully consume right now.
	pub fn min_useful_bytes(&self) -> usize {
		match &self.state {
			State::Header { len, .. } => HEADER_LEN - len,
			State::Payload { .. } => 1,
		}
	}

	/// Feed newly-read bytes, invoking `on_chunk(header, slice_offset, payload, crc_init,
	/// is_final_slice)` once per delivered payload slice. A chunk whose payload spans
	/// multiple `feed` calls is delivered in pieces, each offset by how much of that chunk
	/// has already been delivered; `is_final_slice` is true only for the piece that reaches
	/// the chunk's declared length, which is when `header.packet_break` takes effect.
	pub fn feed(&mut self, mut bytes: &[u8], mut on_chunk: impl FnMut(&ChunkHeader, u64, &[u8], u16, bool)) {
		while !bytes.is_empty() {
			match &mut self.state {
				State::Header { buf, len } => {
					let need = HEADER_LEN - *len;
					let take = need.min(bytes.len());
					buf[*len..*len + take].copy_from_slice(&bytes[..take]);
					*len += take;
					bytes = &bytes[take..];

					if *len == HEADER_LEN {
						let header = ChunkHeader::decode(*buf);
						let crc_init = header.crc_init;

						if header.length == 0 {
							on_chunk(&header, header.offset as u64, &[], crc_init, true);
							self.state = State::fresh();
						} else {
							self.state = State::Payload { header, crc_init, delivered: 0, remaining: header.length };
						}
					}
				}

				State::Payload { header, crc_init, delivered, remaining } => {
					let take = (*remaining as usize).min(bytes.len());
					let slice = &bytes[..take];
					let slice_offset = header.offset as u64 + *delivered as u64;

					*remaining -= take as u16;
					let is_final = *remaining == 0;

					on_chunk(header, slice_offset, slice, *crc_init, is_final);

					*crc_init = crc16(*crc_init, slice);
					*delivered += take as u16;
					bytes = &bytes[take..];

					if is_final {
						self.state = State::fresh();
					}
				}
			}
		}
	}
}

impl Default for ChannelDecoder {
	fn default() -> Self {
		Self::new()
	}
}
