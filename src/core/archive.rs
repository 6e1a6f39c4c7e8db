//! Safe archive extractor (C2): stream tar+zstd entries, rewrite
//! pathnames/links via C1, preserve modes/SUID/symlinks.
use std::fs::{self, File};
use std::io::{self, Read, Write as _};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::core::path::{validate_path, PathErr};
use crate::util::log;


#[derive(Debug, thiserror::Error)]
pub(crate) enum ExtractErr
{
	#[error("malicious archive path: {0}")]
	MaliciousArchivePath(String),

	#[error("extraction of {archive} failed: {reason}")]
	ExtractFailed { archive: String, reason: String },

	#[error("I/O error: {0}")]
	IO(#[from] std::io::Error),
}

fn open_reader(archive: &Path) -> Result<tar::Archive<zstd::Decoder<'static, io::BufReader<File>>>, ExtractErr>
{
	let file = File::open(archive)?;
	let decoder = zstd::Decoder::new(file)?;
	Ok(tar::Archive::new(decoder))
}

/// Strip a leading `./`, matching how `extract_single` compares entry
/// names (spec.md §4.2).
fn strip_leading_cur(p: &Path) -> PathBuf
{
	match p.strip_prefix("./") { Ok(rest) => rest.to_path_buf(), Err(_) => p.to_path_buf() }
}


/// Stream every entry in `archive` into `dest`, rewriting pathnames
/// (and hardlink/symlink targets where applicable) through C1.  A
/// progress log line is emitted every 100 entries.
pub(crate) fn extract(archive: &Path, dest: &Path, sink: &dyn log::ProgressSink)
		-> Result<(), ExtractErr>
{
	fs::create_dir_all(dest)?;
	let mut tarfh = open_reader(archive)?;

	let entries = tarfh.entries().map_err(|e| ExtractErr::ExtractFailed {
		archive: archive.display().to_string(), reason: e.to_string(),
	})?;

	let mut count: u64 = 0;
	for entry in entries
	{
		let mut entry = entry.map_err(|e| ExtractErr::ExtractFailed {
			archive: archive.display().to_string(), reason: e.to_string(),
		})?;

		let name = entry.path().map_err(|e| ExtractErr::ExtractFailed {
			archive: archive.display().to_string(), reason: e.to_string(),
		})?.into_owned();
		let name = strip_leading_cur(&name);

		let target = match validate_path(&name, dest)
		{
			Ok(p) => p,
			Err(PathErr::Security(n)) | Err(PathErr::Traversal(n)) => {
				return Err(ExtractErr::MaliciousArchivePath(n));
			},
		};

		let header = entry.header().clone();
		let entry_type = header.entry_type();
		let mode = header.mode().unwrap_or(0o644);

		if let Some(parent) = target.parent() { fs::create_dir_all(parent)?; }

		if entry_type.is_dir()
		{
			fs::create_dir_all(&target)?;
			let _ = fs::set_permissions(&target, fs::Permissions::from_mode(mode));
		}
		else if entry_type.is_hard_link()
		{
			// Rewrite through C1; an invalid link target becomes an
			// empty file rather than failing the whole extraction
			// (spec.md §4.2.b).
			let link_name = entry.link_name().ok().flatten().map(|p| p.into_owned());
			match link_name.map(|l| validate_path(&l, dest))
			{
				Some(Ok(linksrc)) => {
					unlink_before_overwrite(&target)?;
					if fs::hard_link(&linksrc, &target).is_err()
					{
						File::create(&target)?;
					}
				},
				_ => { File::create(&target)?; },
			}
		}
		else if entry_type.is_symlink()
		{
			let link_name = entry.link_name().ok().flatten().map(|p| p.into_owned());
			let rewritten = match link_name
			{
				Some(ref l) if l.is_absolute() => {
					// Absolute symlink targets are rewritten through
					// C1; an invalid one drops the target, per
					// spec.md §4.2.c.
					match validate_path(l, dest)
					{
						Ok(p) => Some(p),
						Err(_) => None,
					}
				},
				// Relative targets are preserved verbatim; packages
				// legitimately ship `../` symlinks.
				Some(l) => Some(l),
				None => None,
			};

			if let Some(linktarget) = rewritten
			{
				unlink_before_overwrite(&target)?;
				symlink(&linktarget, &target)?;
			}
		}
		else
		{
			unlink_before_overwrite(&target)?;
			let mut out = File::create(&target)?;
			if let Err(e) = io::copy(&mut entry, &mut out)
			{
				return Err(ExtractErr::ExtractFailed {
					archive: archive.display().to_string(), reason: e.to_string(),
				});
			}
			// Preserve mode (so SUID/SGID survive).  Deliberately not
			// touching owner/group: uid/gid name lookups break inside
			// a staged chroot (spec.md §4.2.d).
			let _ = fs::set_permissions(&target, fs::Permissions::from_mode(mode));
		}

		count += 1;
		if count % 100 == 0
		{
			sink.update("extracting", count, None);
			log::info(&format!("extracted {count} entries"));
		}
	}
	sink.finish("extracting");

	Ok(())
}

fn unlink_before_overwrite(target: &Path) -> io::Result<()>
{
	match fs::symlink_metadata(target)
	{
		Ok(_) => fs::remove_file(target).or_else(|_| fs::remove_dir_all(target)),
		Err(_) => Ok(()),
	}
}


/// Return the first matching entry's content, or empty bytes if
/// absent.  A leading `./` on the entry name is stripped before
/// comparison (spec.md §4.2).
pub(crate) fn extract_single(archive: &Path, internal_path: &str) -> Result<Vec<u8>, ExtractErr>
{
	let mut tarfh = open_reader(archive)?;
	let entries = tarfh.entries().map_err(|e| ExtractErr::ExtractFailed {
		archive: archive.display().to_string(), reason: e.to_string(),
	})?;

	let want = strip_leading_cur(Path::new(internal_path));

	for entry in entries
	{
		let mut entry = entry.map_err(|e| ExtractErr::ExtractFailed {
			archive: archive.display().to_string(), reason: e.to_string(),
		})?;
		let name = entry.path().map_err(|e| ExtractErr::ExtractFailed {
			archive: archive.display().to_string(), reason: e.to_string(),
		})?.into_owned();
		let name = strip_leading_cur(&name);

		if name == want
		{
			let mut buf = Vec::new();
			entry.read_to_end(&mut buf)?;
			return Ok(buf);
		}
	}

	Ok(Vec::new())
}


/// Build a `.tar.zst` archive from a directory tree, for the `pack`
/// command.  Symlinks are stored verbatim (`append_dir_all` follows
/// this policy via explicit per-entry appends rather than following
/// them).
pub(crate) fn create(dest: &Path, src_root: &Path) -> Result<(), ExtractErr>
{
	let file = File::create(dest)?;
	let encoder = zstd::Encoder::new(file, 0)?;
	let mut builder = tar::Builder::new(encoder);
	builder.append_dir_all(".", src_root)?;
	let encoder = builder.into_inner()?;
	let mut file = encoder.finish()?;
	file.flush()?;
	Ok(())
}


#[cfg(test)]
mod tests
{
	use super::*;
	use crate::util::log::SilentSink;

	fn make_archive(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf
	{
		let archive_path = dir.join("test.tar.zst");
		let file = File::create(&archive_path).unwrap();
		let encoder = zstd::Encoder::new(file, 0).unwrap();
		let mut builder = tar::Builder::new(encoder);
		for (name, content) in entries
		{
			let mut header = tar::Header::new_gnu();
			header.set_size(content.len() as u64);
			header.set_mode(0o644);
			header.set_cksum();
			builder.append_data(&mut header, name, *content).unwrap();
		}
		let encoder = builder.into_inner().unwrap();
		encoder.finish().unwrap().flush().unwrap();
		archive_path
	}

	#[test]
	fn extracts_regular_files()
	{
		let dir = tempfile::tempdir().unwrap();
		let archive = make_archive(dir.path(), &[("hello.txt", b"hi")]);
		let dest = dir.path().join("dest");

		extract(&archive, &dest, &SilentSink).unwrap();
		assert_eq!(fs::read_to_string(dest.join("hello.txt")).unwrap(), "hi");
	}

	#[test]
	fn rejects_traversal_entry()
	{
		let dir = tempfile::tempdir().unwrap();
		let archive = make_archive(dir.path(), &[("../escape.txt", b"pwn")]);
		let dest = dir.path().join("dest");

		let err = extract(&archive, &dest, &SilentSink).unwrap_err();
		assert!(matches!(err, ExtractErr::MaliciousArchivePath(_)));
	}

	#[test]
	fn extract_single_strips_leading_dot_slash()
	{
		let dir = tempfile::tempdir().unwrap();
		let archive = make_archive(dir.path(), &[("./files.txt", b"a\tb\n")]);

		let got = extract_single(&archive, "files.txt").unwrap();
		assert_eq!(got, b"a\tb\n");
	}

	#[test]
	fn extract_single_missing_returns_empty()
	{
		let dir = tempfile::tempdir().unwrap();
		let archive = make_archive(dir.path(), &[("files.txt", b"x")]);

		let got = extract_single(&archive, "nope.txt").unwrap();
		assert!(got.is_empty());
	}

	/// spec.md §8 S5: a traversal entry is rejected and whatever it was
	/// aiming at is left alone.
	#[test]
	fn s5_malicious_archive_path_leaves_target_unmodified()
	{
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path().join("root");
		fs::create_dir_all(dest.join("etc")).unwrap();
		fs::write(dest.join("etc/passwd"), "original\n").unwrap();

		let archive = make_archive(dir.path(), &[("../etc/passwd", b"pwned")]);
		let err = extract(&archive, &dest, &SilentSink).unwrap_err();

		assert!(matches!(err, ExtractErr::MaliciousArchivePath(_)));
		assert_eq!(fs::read_to_string(dest.join("etc/passwd")).unwrap(), "original\n");
	}

	/// spec.md §8 invariant 10: SUID survives the copy.
	#[test]
	fn preserves_suid_bit()
	{
		let dir = tempfile::tempdir().unwrap();
		let archive_path = dir.path().join("suid.tar.zst");
		let file = File::create(&archive_path).unwrap();
		let encoder = zstd::Encoder::new(file, 0).unwrap();
		let mut builder = tar::Builder::new(encoder);
		let mut header = tar::Header::new_gnu();
		header.set_size(2);
		header.set_mode(0o4755);
		header.set_cksum();
		builder.append_data(&mut header, "bin/suidbin", &b"hi"[..]).unwrap();
		let encoder = builder.into_inner().unwrap();
		encoder.finish().unwrap().flush().unwrap();

		let dest = dir.path().join("dest");
		extract(&archive_path, &dest, &SilentSink).unwrap();

		let mode = fs::metadata(dest.join("bin/suidbin")).unwrap().permissions().mode();
		assert_eq!(mode & 0o7777, 0o4755);
	}
}
