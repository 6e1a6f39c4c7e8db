//! Misc util funcs.

/// SHA256 hashing utils.
pub(crate) mod hash;

/// Filesystem helpers: atomic writes, line parsing, tmp-dir GC, re-rooting.
pub(crate) mod fs;

/// Colorized TTY-aware logging plus the progress-reporting seam.
pub(crate) mod log;
