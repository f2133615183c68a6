/// Process-wide logger installation.
pub mod logger;
/// Monotonic and system clock helpers shared by the scheduler and resend timers.
pub mod time;
