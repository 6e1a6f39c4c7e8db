//! Exclusive lock (C6): one cross-process writer via a non-blocking
//! advisory `flock(2)` on a well-known path, per spec.md §4.6.
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};


#[derive(Debug, thiserror::Error)]
pub(crate) enum LockErr
{
	#[error("another instance is running")]
	AlreadyRunning,

	#[error("lock file I/O error: {0}")]
	IO(#[from] std::io::Error),
}


/// Held for the lifetime of a mutating transaction.  Dropping it (or the
/// process dying) releases the `flock`.
pub(crate) struct ExclusiveLock
{
	_file: File,
	path: PathBuf,
}

impl ExclusiveLock
{
	/// `lock_path` is normally `<root>/var/lpkg/db.lck` (spec.md §6.1).
	pub(crate) fn acquire(lock_path: &Path) -> Result<Self, LockErr>
	{
		if let Some(parent) = lock_path.parent()
		{
			std::fs::create_dir_all(parent)?;
		}

		let file = OpenOptions::new().create(true).write(true).open(lock_path)?;

		let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
		if rc != 0
		{
			let errno = std::io::Error::last_os_error();
			if errno.raw_os_error() == Some(libc::EWOULDBLOCK)
			{
				return Err(LockErr::AlreadyRunning);
			}
			return Err(LockErr::IO(errno));
		}

		Ok(ExclusiveLock { _file: file, path: lock_path.to_path_buf() })
	}

	pub(crate) fn path(&self) -> &Path { &self.path }
}

impl Drop for ExclusiveLock
{
	fn drop(&mut self)
	{
		// flock is released automatically when the fd closes; nothing
		// to do here besides let `_file` drop.  Kept as an explicit
		// Drop impl so the release point is documented at the call
		// site rather than implicit.
	}
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn second_acquire_fails()
	{
		let dir = tempfile::tempdir().unwrap();
		let lockfile = dir.path().join("db.lck");

		let first = ExclusiveLock::acquire(&lockfile).unwrap();
		let second = ExclusiveLock::acquire(&lockfile);
		assert!(matches!(second, Err(LockErr::AlreadyRunning)));
		drop(first);
	}

	#[test]
	fn release_then_reacquire_ok()
	{
		let dir = tempfile::tempdir().unwrap();
		let lockfile = dir.path().join("db.lck");

		{
			let _first = ExclusiveLock::acquire(&lockfile).unwrap();
		}
		ExclusiveLock::acquire(&lockfile).unwrap();
	}
}
