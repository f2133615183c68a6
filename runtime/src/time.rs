use std::time::{Instant, SystemTime};

/// The current system time.
pub fn system() -> SystemTime {
	SystemTime::now()
}

/// The current UNIX time in seconds.
pub fn unix() -> u32 {
	system()
		.duration_since(SystemTime::UNIX_EPOCH)
		.expect("the current time should be after the UNIX epoch")
		.as_secs()
		.try_into()
		.expect("32-bit UNIX time should not overflow")
}

/// A monotonic instant, suitable for resend timers and scheduler deadlines.
pub fn monotonic() -> Instant {
	Instant::now()
}
