//! Colorized, TTY-aware logging plus the progress-reporting seam.
//!
//! Mirrors the ambient logging the teacher hand-rolls rather than
//! reaching for a logging crate: `log_info`/`log_warning`/`log_error`
//! write to stdout/stderr, colorized only when the target stream is a
//! terminal, serialized behind one mutex so background threads (the
//! hook runner's chroot child, trigger execution) don't interleave
//! output mid-line.
use std::io::{self, Write as _};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_YELLOW: &str = "\x1b[33m";
const COLOR_RED: &str = "\x1b[31m";
const COLOR_RESET: &str = "\x1b[0m";

static LOG_MUTEX: Mutex<()> = Mutex::new(());
static TTY_CHECKED: AtomicBool = AtomicBool::new(false);
static STDOUT_TTY: AtomicBool = AtomicBool::new(false);
static STDERR_TTY: AtomicBool = AtomicBool::new(false);

fn ensure_tty_checked()
{
	if TTY_CHECKED.swap(true, Ordering::SeqCst) { return; }
	unsafe
	{
		STDOUT_TTY.store(libc::isatty(libc::STDOUT_FILENO) != 0, Ordering::SeqCst);
		STDERR_TTY.store(libc::isatty(libc::STDERR_FILENO) != 0, Ordering::SeqCst);
	}
}

fn log_internal(prefix: &str, color: &str, msg: &str, stdout: bool)
{
	let _guard = LOG_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
	ensure_tty_checked();

	let is_tty = if stdout { STDOUT_TTY.load(Ordering::SeqCst) } else { STDERR_TTY.load(Ordering::SeqCst) };

	if stdout
	{
		let stdout = io::stdout();
		let mut h = stdout.lock();
		if is_tty { let _ = writeln!(h, "{color}{prefix}{COLOR_RESET}{msg}"); }
		else { let _ = writeln!(h, "{prefix}{msg}"); }
	}
	else
	{
		let stderr = io::stderr();
		let mut h = stderr.lock();
		if is_tty { let _ = writeln!(h, "{color}{prefix}{COLOR_RESET}{msg}"); }
		else { let _ = writeln!(h, "{prefix}{msg}"); }
	}
}

pub(crate) fn info(msg: &str)    { log_internal("==> ", COLOR_GREEN, msg, true); }
pub(crate) fn warning(msg: &str) { log_internal("warning: ", COLOR_YELLOW, msg, false); }
pub(crate) fn error(msg: &str)   { log_internal("error: ", COLOR_RED, msg, false); }


/// The external progress-reporting collaborator named in spec.md §1.
/// Enqueuing what to report about (bytes fetched, entries extracted) is
/// core; rendering a bar is not, so it's a trait with a terminal and a
/// silent implementation.
pub(crate) trait ProgressSink: Send + Sync
{
	fn update(&self, label: &str, done: u64, total: Option<u64>);
	fn finish(&self, label: &str);
}

/// No-op sink, used in tests and non-interactive / piped runs.
pub(crate) struct SilentSink;

impl ProgressSink for SilentSink
{
	fn update(&self, _label: &str, _done: u64, _total: Option<u64>) {}
	fn finish(&self, _label: &str) {}
}

/// Terminal progress bar, only actually drawn when stdout is a TTY.
pub(crate) struct TermSink;

impl ProgressSink for TermSink
{
	fn update(&self, label: &str, done: u64, total: Option<u64>)
	{
		ensure_tty_checked();
		if !STDOUT_TTY.load(Ordering::SeqCst) { return; }

		use indicatif::{ProgressBar, ProgressStyle};
		// A fresh bar per call keeps this trait object-safe and
		// allocation-free for the common "no TTY" path; indicatif's
		// bars are cheap enough that this is fine for our granularity
		// (spec.md §4.2: a log line every 100 archive entries).
		let bar = match total
		{
			Some(t) => ProgressBar::new(t),
			None => ProgressBar::new_spinner(),
		};
		if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
		{
			bar.set_style(style);
		}
		bar.set_message(label.to_string());
		bar.set_position(done);
		bar.finish_and_clear();
	}

	fn finish(&self, label: &str)
	{
		info(&format!("{label}: done"));
	}
}
