use core::fmt;
use core::result;

/// The surface-level classification of a failure, per the core's error handling design.
///
/// Kinds are deliberately coarse: they describe how a caller should react (retry, surface
/// to the user, tear down a channel), not the precise internal cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// An argument did not typecheck or decode against its codec.
	ArgumentInvalid,
	/// The operation was aborted via a cancellation token.
	Cancelled,
	/// The pipe or call was closed (clean EOF), not an error in itself but surfaced as one
	/// to callers blocked on a read.
	Closed,
	/// The operation could not proceed without blocking and the caller asked not to block.
	Busy,
	/// A malformed frame, wrong CRC-init, or unsupported codec was observed on the wire.
	Protocol,
	/// The remote peer (or the object a reference points to) is no longer reachable.
	HostUnreachable,
	/// A bug or unexpected internal state, not attributable to the peer or caller.
	Internal,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::ArgumentInvalid => "argument invalid",
			Self::Cancelled => "cancelled",
			Self::Closed => "closed",
			Self::Busy => "busy",
			Self::Protocol => "protocol error",
			Self::HostUnreachable => "host unreachable",
			Self::Internal => "internal error",
		})
	}
}

/// An error surfaced by the core, carrying an [`ErrorKind`] plus a short human-readable detail.
#[derive(Debug, Clone)]
pub struct Error {
	kind: ErrorKind,
	detail: &'static str,
}

impl Error {
	/// Construct an error of `kind` with no further detail.
	#[inline]
	pub const fn new(kind: ErrorKind) -> Self {
		Self { kind, detail: "" }
	}

	/// Construct an error of `kind` carrying a static detail message.
	#[inline]
	pub const fn with_detail(kind: ErrorKind, detail: &'static str) -> Self {
		Self { kind, detail }
	}

	/// The classification of this error.
	#[inline]
	pub fn kind(&self) -> ErrorKind {
		self.kind
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.detail.is_empty() {
			write!(f, "{}", self.kind)
		} else {
			write!(f, "{}: {}", self.kind, self.detail)
		}
	}
}

impl std::error::Error for Error {}

/// Shorthand for constructing an [`Error`] of a given kind.
#[inline]
pub const fn err(kind: ErrorKind) -> Error {
	Error::new(kind)
}

/// Shorthand for constructing an [`Error`] of a given kind with a detail message.
#[inline]
pub const fn err_detail(kind: ErrorKind, detail: &'static str) -> Error {
	Error::with_detail(kind, detail)
}

pub type Result<T = (), E = Error> = result::Result<T, E>;

#[doc(hidden)]
pub trait Ext<T, E> {
	fn ok_or(self, f: impl FnOnce(E)) -> Option<T>;
}

impl<T, E> Ext<T, E> for result::Result<T, E> {
	fn ok_or(self, f: impl FnOnce(E)) -> Option<T> {
		match self {
			Ok(v) => Some(v),
			Err(e) => {
				f(e);
				None
			}
		}
	}
}

#[doc(hidden)]
pub trait ExtOpaque<T> {
	fn some_or(self, f: impl FnOnce()) -> Option<T>;
}

impl<T> ExtOpaque<T> for Option<T> {
	fn some_or(self, f: impl FnOnce()) -> Option<T> {
		match self {
			Some(_) => {}
			None => f(),
		}

		self
	}
}

pub use Ext as _;
