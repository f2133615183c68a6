//! One remote peer: its pipe pools, attached channels, and the scheduler thread that drains
//! pending chunks onto those channels (spec.md §4.6).

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};
use uuid::Uuid;

use fibre_utils::error::{err_detail, ErrorKind, Result};

use crate::chunk::{ChunkHeader, HEADER_LEN, PER_PACKET_OVERHEAD};
use crate::channel::OutputChannel;
use crate::config::Config;
use crate::pipe::PipePair;
use crate::pool::PipePool;
use crate::sync::{CancellationToken, ReadyEvent};

/// A handle identifying one attached channel, for later detachment on a write failure.
type ChannelId = u64;

struct AttachedChannel {
	id: ChannelId,
	channel: Box<dyn OutputChannel>,
}

/// One peer's pair of pipe pools plus the channels currently carrying its traffic.
///
/// The scheduler thread holds no pipe lock across a channel write (spec.md §5): each round
/// snapshots the active pipes under the pool's lock, then does all I/O against the cloned
/// `Arc<PipePair>` handles.
pub struct RemoteNode {
	pub peer_uuid: Uuid,
	client_pool: PipePool<Arc<PipePair>>,
	server_pool: PipePool<Arc<PipePair>>,
	channels: Mutex<Vec<AttachedChannel>>,
	next_channel_id: Mutex<ChannelId>,
	ready: ReadyEvent,
	cancel: CancellationToken,
	scheduler: Mutex<Option<JoinHandle<()>>>,
	default_resend_interval: Duration,
}

impl RemoteNode {
	pub fn new(peer_uuid: Uuid, config: &Config) -> Arc<Self> {
		let node = Arc::new(Self {
			peer_uuid,
			client_pool: PipePool::new(config.pool_capacity),
			server_pool: PipePool::new(config.pool_capacity),
			channels: Mutex::new(Vec::new()),
			next_channel_id: Mutex::new(0),
			ready: ReadyEvent::new(),
			cancel: CancellationToken::new(),
			scheduler: Mutex::new(None),
			default_resend_interval: config.default_resend_interval,
		});

		let scheduler_node = node.clone();
		let handle = std::thread::spawn(move || scheduler_node.run_scheduler());
		*node.scheduler.lock().unwrap() = Some(handle);

		node
	}

	pub fn pool(&self, is_client: bool) -> &PipePool<Arc<PipePair>> {
		if is_client {
			&self.client_pool
		} else {
			&self.server_pool
		}
	}

	/// Acquire a pipe pair, creating it if the slot is empty.
	pub fn acquire_pipe(&self, is_client: bool, index: Option<usize>, ensure_delivery: bool) -> (usize, Arc<PipePair>) {
		self.pool(is_client).acquire(index, || Arc::new(PipePair::new(ensure_delivery)))
	}

	pub fn release_pipe(&self, is_client: bool, index: usize) {
		self.pool(is_client).release(index);
	}

	/// Wake the scheduler immediately: new data is queued on some output pipe.
	pub fn notify_output_ready(&self) {
		self.ready.notify();
	}

	pub fn attach_channel(self: &Arc<Self>, channel: Box<dyn OutputChannel>) -> ChannelId {
		let mut id_guard = self.next_channel_id.lock().unwrap();
		let id = *id_guard;
		*id_guard += 1;

		self.channels.lock().unwrap().push(AttachedChannel { id, channel });
		self.ready.notify();
		id
	}

	fn detach_channel(&self, id: ChannelId) {
		self.channels.lock().unwrap().retain(|c| c.id != id);
	}

	/// Deliver a chunk read off the wire to the matching pipe's `InputPipe`, lazily acquiring
	/// the pipe pair if this is the first chunk seen for it.
	///
	/// A `pipe_id` whose slot index falls outside this pool's capacity is an unsupported
	/// pipe-id (spec.md §7): the caller must close the channel rather than let it reach
	/// `PipePool::acquire`, which indexes its slots unchecked.
	pub fn ingest_chunk(&self, header: &ChunkHeader, payload: &[u8], payload_offset: u64, crc_init: u16, packet_break: bool) -> Result<()> {
		let is_client = header.is_client_pool();
		let slot_index = header.slot_index();

		if slot_index >= self.pool(is_client).capacity() {
			return Err(err_detail(ErrorKind::Protocol, "pipe id exceeds pool capacity"));
		}

		let (_, pair) = self.acquire_pipe(is_client, Some(slot_index), true);

		let mut input = pair.input.lock().unwrap();

		if header.is_drop_marker() {
			input.note_drop();
		} else {
			input.process_chunk(payload, payload_offset, crc_init, packet_break);
		}

		Ok(())
	}

	pub fn shutdown(&self) {
		self.cancel.cancel();
		self.ready.notify();

		if let Some(handle) = self.scheduler.lock().unwrap().take() {
			let _ = handle.join();
		}
	}

	/// The earliest instant any active output pipe next needs attention, across both pools.
	fn next_deadline(&self) -> Option<Instant> {
		self.client_pool
			.active_items()
			.into_iter()
			.chain(self.server_pool.active_items())
			.filter_map(|(_, pair)| pair.output.lock().unwrap().next_due_time())
			.min()
	}

	fn run_scheduler(&self) {
		loop {
			if self.cancel.is_cancelled() {
				return;
			}

			self.run_scheduler_round();

			if self.cancel.is_cancelled() {
				return;
			}

			let wait_for = self.next_deadline().map(|due| due.saturating_duration_since(Instant::now()));
			self.ready.wait(wait_for);
		}
	}

	/// One pass over every attached channel: spend its non-blocking budget on pending chunks
	/// from both pools, trimming oversized chunks to fit rather than skipping them.
	fn run_scheduler_round(&self) {
		let now = Instant::now();

		let mut channels = self.channels.lock().unwrap();
		let mut failed = Vec::new();

		for attached in channels.iter_mut() {
			let resend_interval = self.default_resend_interval;
			let mut budget = attached.channel.min_non_blocking_bytes().saturating_sub(PER_PACKET_OVERHEAD);

			if budget <= HEADER_LEN {
				continue;
			}

			let pipes = self
				.client_pool
				.active_items()
				.into_iter()
				.map(|(i, p)| (i, true, p))
				.chain(self.server_pool.active_items().into_iter().map(|(i, p)| (i, false, p)));

			let mut channel_failed = false;

			'pipes: for (index, is_client, pair) in pipes {
				if channel_failed || budget <= HEADER_LEN {
					break;
				}

				let pipe_id = ((index as u16) << 1) | u16::from(is_client);
				let mut output = pair.output.lock().unwrap();

				for chunk in output.pending_chunks(now) {
					if budget <= HEADER_LEN {
						break;
					}

					let available = (budget - HEADER_LEN) as u64;
					let send_len = chunk.length.min(available);
					let reaches_end = send_len == chunk.length;
					let wire_break = chunk.packet_break && reaches_end;

					let (payload, crc_init): (&[u8], u16) = if chunk.is_drop {
						(&[], output.crc_init_at(chunk.offset))
					} else {
						(output.payload_at(chunk.offset, send_len), output.crc_init_at(chunk.offset))
					};

					let wire_length = if chunk.is_drop { 0 } else { send_len as u16 };

					let header = ChunkHeader {
						pipe_id,
						offset: chunk.offset as u16,
						crc_init,
						length: wire_length,
						packet_break: wire_break,
					};

					let mut frame = header.encode().to_vec();
					frame.extend_from_slice(payload);

					if let Err(err) = attached.channel.write(&frame) {
						warn!("tearing down channel after write error: {err}");
						failed.push(attached.id);
						channel_failed = true;
						break 'pipes;
					}

					budget = budget.saturating_sub(HEADER_LEN + payload.len());

					let due = now + resend_interval;
					let reliable = output.ensure_delivery();

					if chunk.is_drop {
						if reliable {
							output.did_emit(chunk.offset, chunk.length, true, due);
						} else {
							output.drop_chunk(chunk.offset, chunk.length);
						}
					} else if reliable {
						output.did_emit(chunk.offset, send_len, true, due);
					} else {
						output.did_emit(chunk.offset, send_len, false, due);
						output.drop_chunk(chunk.offset, send_len);
					}

					debug!("emitted chunk pipe={pipe_id} offset={} len={send_len} break={wire_break}", chunk.offset);
				}
			}
		}

		channels.retain(|c| !failed.contains(&c.id));
		drop(channels);

		for id in failed {
			self.detach_channel(id);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex as StdMutex;

	use super::*;

	struct RecordingChannel {
		budget: usize,
		writes: Arc<StdMutex<Vec<Vec<u8>>>>,
	}

	impl OutputChannel for RecordingChannel {
		fn min_non_blocking_bytes(&self) -> usize {
			self.budget
		}

		fn resend_interval(&self) -> Duration {
			Duration::from_millis(50)
		}

		fn write(&mut self, bytes: &[u8]) -> fibre_utils::error::Result<()> {
			self.writes.lock().unwrap().push(bytes.to_vec());
			Ok(())
		}
	}

	fn test_config() -> Config {
		Config { pool_capacity: 4, default_resend_interval: Duration::from_millis(50), handshake_timeout: Duration::from_secs(1) }
	}

	#[test]
	fn queued_bytes_are_emitted_once_a_channel_is_attached() {
		let node = RemoteNode::new(Uuid::new_v4(), &test_config());
		let (_, pair) = node.acquire_pipe(true, Some(0), true);
		pair.output.lock().unwrap().send_bytes(b"hi", false);

		let writes = Arc::new(StdMutex::new(Vec::new()));
		node.attach_channel(Box::new(RecordingChannel { budget: 1024, writes: writes.clone() }));

		std::thread::sleep(Duration::from_millis(30));
		node.shutdown();

		let seen = writes.lock().unwrap();
		assert_eq!(seen.len(), 1);
		assert_eq!(&seen[0][HEADER_LEN..], b"hi");

		let header = ChunkHeader::decode(seen[0][..HEADER_LEN].try_into().unwrap());
		assert_eq!(header.pipe_id, 1);
		assert!(!header.packet_break);
	}

	#[test]
	fn ingest_chunk_rejects_a_pipe_id_past_pool_capacity_instead_of_panicking() {
		let node = RemoteNode::new(Uuid::new_v4(), &test_config());

		// pool_capacity is 4, so slot index 4 (pipe_id 8, server pool) has no backing slot.
		let header = ChunkHeader { pipe_id: 8, offset: 0, crc_init: 0, length: 2, packet_break: false };
		let err = node.ingest_chunk(&header, b"hi", 0, 0, false).unwrap_err();

		assert_eq!(err.kind(), ErrorKind::Protocol);
	}

	#[test]
	fn oversized_chunk_is_trimmed_to_the_channel_budget() {
		let node = RemoteNode::new(Uuid::new_v4(), &test_config());
		let (_, pair) = node.acquire_pipe(false, Some(0), true);
		pair.output.lock().unwrap().send_bytes(b"0123456789", true);

		let writes = Arc::new(StdMutex::new(Vec::new()));
		let small_budget = PER_PACKET_OVERHEAD + HEADER_LEN + 4;
		node.attach_channel(Box::new(RecordingChannel { budget: small_budget, writes: writes.clone() }));

		std::thread::sleep(Duration::from_millis(30));
		node.shutdown();

		let seen = writes.lock().unwrap();
		assert!(!seen.is_empty());
		let first = ChunkHeader::decode(seen[0][..HEADER_LEN].try_into().unwrap());
		assert!((first.length as usize) <= 4);
		assert!(!first.packet_break, "a trimmed send must not claim the frame boundary early");
	}
}
