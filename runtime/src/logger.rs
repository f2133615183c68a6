use std::sync::Once;
use std::time::SystemTime;

use log::{Level, LevelFilter};
use nu_ansi_term::ansi::RESET;
use nu_ansi_term::{Color, Style};

static INIT: Once = Once::new();

/// Install the process-wide logger, defaulting to `level` when `RUST_LOG` is unset.
///
/// Safe to call more than once; only the first call takes effect.
pub fn install(level: LevelFilter) {
	INIT.call_once(|| {
		let filter = std::env::var("RUST_LOG").ok().and_then(|s| s.parse().ok()).unwrap_or(level);

		log::set_boxed_logger(Box::new(Logger)).expect("logger not already installed");
		log::set_max_level(filter);
	});
}

pub struct Logger;

impl log::Log for Logger {
	fn enabled(&self, _: &log::Metadata) -> bool {
		true
	}

	fn log(&self, record: &log::Record) {
		let time = humantime::format_rfc3339_nanos(SystemTime::now());

		let dim = Style::new().dimmed().prefix();

		eprintln!(
			"{dim}{time}{RESET} {}{:5}{RESET} {}{}{RESET}{dim}:{RESET} {}",
			match record.level() {
				Level::Trace => Color::Purple,
				Level::Debug => Color::Blue,
				Level::Info => Color::Green,
				Level::Warn => Color::Yellow,
				Level::Error => Color::Red,
			}
			.bold()
			.prefix(),
			record.level(),
			Style::new().bold().prefix(),
			record.target(),
			record.args()
		);
	}

	fn flush(&self) {}
}
