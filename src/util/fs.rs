//! Filesystem-related helpers shared across the store, resolver and
//! install engine: atomic writes, directory bootstrapping and tmp-dir
//! garbage collection.
use std::path::{Path, PathBuf};
use std::fs;

use anyhow::Context as _;


/// Make sure a directory exists, creating parents as needed.  Errors if
/// the path exists but isn't a directory.
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<(), anyhow::Error>
{
	if !path.exists()
	{
		fs::create_dir_all(path)
				.with_context(|| format!("creating dir {}", path.display()))?;
	}
	else if !path.is_dir()
	{
		anyhow::bail!("{} exists and isn't a directory", path.display());
	}
	Ok(())
}


/// Write `contents` to `path` via `tmp + rename`, so a crash mid-write
/// leaves either the old file or the new one fully intact, never a
/// half-written one.  This is the mechanism behind invariant 3 in
/// spec.md §3 (atomic `pkgs`/`holdpkgs`/`files.db`/`provides.db`
/// updates).
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), anyhow::Error>
{
	let tmp = tmp_sibling(path);
	fs::write(&tmp, contents)
			.with_context(|| format!("writing {}", tmp.display()))?;
	fs::rename(&tmp, path)
			.with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
	Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf
{
	let mut name = path.file_name()
			.map(|n| n.to_os_string())
			.unwrap_or_default();
	name.push(".tmp");
	path.with_file_name(name)
}


/// Read a file into a `Vec<String>` of lines, skipping blank lines and
/// trailing `\r` (tolerating CRLF-authored archives).
pub(crate) fn read_lines(path: &Path) -> Result<Vec<String>, anyhow::Error>
{
	if !path.is_file() { return Ok(Vec::new()); }
	let raw = fs::read_to_string(path)
			.with_context(|| format!("reading {}", path.display()))?;
	Ok(split_lines(&raw))
}

/// Split a blob of text the same way [`read_lines`] would, for callers
/// that already have the bytes in hand (e.g. pulled out of an archive
/// via `extract_single`).
pub(crate) fn split_lines(raw: &str) -> Vec<String>
{
	raw.lines()
			.map(|l| l.trim_end_matches('\r'))
			.filter(|l| !l.is_empty())
			.map(str::to_owned)
			.collect()
}


/// Garbage-collect peer temp directories under `tmp_root` matching the
/// `lpkg_*` naming convention, owned by the current user and older than
/// `max_age`.  Run once at engine startup (spec.md §5).
pub(crate) fn gc_tmp_dirs(tmp_root: &Path, max_age: std::time::Duration)
		-> Result<(), anyhow::Error>
{
	if !tmp_root.is_dir() { return Ok(()); }

	let now = std::time::SystemTime::now();
	for entry in fs::read_dir(tmp_root)?
	{
		let entry = entry?;
		let name = entry.file_name();
		let name = name.to_string_lossy();
		if !name.starts_with("lpkg_") { continue; }
		if !entry.path().is_dir() { continue; }

		let meta = match entry.metadata() { Ok(m) => m, Err(_) => continue };
		let age = match meta.modified().ok().and_then(|m| now.duration_since(m).ok())
		{
			Some(a) => a,
			None => continue,
		};

		if age > max_age
		{
			// Best-effort; a peer process may still be mid-cleanup.
			let _ = fs::remove_dir_all(entry.path());
		}
	}
	Ok(())
}


/// Re-root a logical (package-view) absolute path under `root`.
///
/// Distinct from [`crate::core::path::validate_path`]: that one guards
/// untrusted archive entries against traversal, while this one just maps
/// an already-trusted logical path (from `files.db`, `files.txt`, etc)
/// onto the physical filesystem.
pub(crate) fn reroot(logical: &Path, root: &Path) -> PathBuf
{
	let rel = logical.strip_prefix("/").unwrap_or(logical);
	root.join(rel)
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn atomic_write_leaves_no_tmp_sibling()
	{
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("pkgs");
		write_atomic(&path, b"foo:1.0\n").unwrap();
		assert_eq!(fs::read_to_string(&path).unwrap(), "foo:1.0\n");
		assert!(!path.with_file_name("pkgs.tmp").exists());
	}

	#[test]
	fn read_lines_strips_blank_and_cr()
	{
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("files.txt");
		fs::write(&path, "a\r\n\nb\r\n").unwrap();
		assert_eq!(read_lines(&path).unwrap(), vec!["a".to_string(), "b".to_string()]);
	}

	#[test]
	fn reroot_strips_leading_slash()
	{
		let root = Path::new("/target");
		assert_eq!(reroot(Path::new("/usr/bin/ls"), root), PathBuf::from("/target/usr/bin/ls"));
	}
}
