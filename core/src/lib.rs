//! Fibre's transport-agnostic core: multiplexed reliable pipes, the chunk-framed channel
//! codec, the per-remote-node scheduler, and the call/codec layer built on top of them.

/// Request/response lifecycle bound to one client pipe pair.
pub mod call;
/// Wire-level chunk header parsing over one channel's incoming byte stream.
pub mod channel;
/// Argument and return-value wire formats.
pub mod codec;
/// The chunk header and per-byte-range delivery state machine.
pub mod chunk;
/// Embedder-supplied knobs (pool capacity, resend interval, handshake timeout).
pub mod config;
/// The bit-serial CRC-8/CRC-16 engine.
pub mod crc;
/// Typed remote function invocation.
pub mod function;
/// Once-per-channel peer identification.
pub mod handshake;
/// RemoteNode: pipe pools, attached channels, and the scheduler thread.
pub mod node;
/// One direction of a pipe pair (input and output halves) and the pair they form.
pub mod pipe;
/// Bounded, index-addressable pipe pools.
pub mod pool;
/// Process-wide node identity and remote-node registry.
pub mod runtime;
/// Blocking primitives shared by the scheduler and pipe pool.
pub mod sync;

pub use call::Call;
pub use channel::{ChannelDecoder, OutputChannel, StreamSource};
pub use chunk::{ChunkHeader, DataState};
pub use codec::{FormatTag, Value};
pub use config::Config;
pub use function::RemoteFunction;
pub use node::RemoteNode;
pub use runtime::Runtime;
