//! The once-per-channel handshake that establishes which `RemoteNode` a channel belongs to
//! (spec.md §4.6).

use std::time::{Duration, Instant};

use fibre_utils::error::{err, err_detail, ErrorKind, Result};
use uuid::Uuid;

use crate::channel::{OutputChannel, StreamSource};
use crate::chunk::HANDSHAKE_LEN;

/// Send `own_uuid` and read the peer's, retrying reads until `timeout` elapses.
///
/// Matches the source material's retry-with-backoff handshake: a peer that hasn't sent its
/// full UUID within `timeout` is treated as an invalid handshake (spec.md §7: "invalid
/// handshake → close the channel").
pub fn perform(own_uuid: Uuid, channel: &mut dyn OutputChannel, source: &mut dyn StreamSource, timeout: Duration) -> Result<Uuid> {
	channel.write(own_uuid.as_bytes())?;

	let deadline = Instant::now() + timeout;
	let mut buf = [0u8; HANDSHAKE_LEN];
	let mut filled = 0;

	while filled < HANDSHAKE_LEN {
		if Instant::now() >= deadline {
			return Err(err_detail(ErrorKind::Protocol, "handshake timed out waiting for peer UUID"));
		}

		let n = source.read(&mut buf[filled..])?;

		if n == 0 {
			return Err(err(ErrorKind::Closed));
		}

		filled += n;
	}

	Ok(Uuid::from_bytes(buf))
}
