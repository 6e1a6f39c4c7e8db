//! Path validator (C1): reject absolute or `..`-bearing archive paths,
//! join the rest safely under a root.
use std::path::{Component, Path, PathBuf};


#[derive(Debug, thiserror::Error)]
pub(crate) enum PathErr
{
	#[error("absolute path not allowed: {0}")]
	Security(String),

	#[error("path traversal not allowed: {0}")]
	Traversal(String),
}


/// Normalize `relative` (collapsing `.` and repeated separators without
/// touching the filesystem) and join it under `root`.  Rejects absolute
/// inputs and any `..` component once normalized.
pub(crate) fn validate_path(relative: &Path, root: &Path) -> Result<PathBuf, PathErr>
{
	if relative.is_absolute()
	{
		return Err(PathErr::Security(relative.display().to_string()));
	}

	let mut normalized = PathBuf::new();
	for comp in relative.components()
	{
		match comp
		{
			Component::Normal(part) => normalized.push(part),
			Component::CurDir => continue,
			Component::ParentDir => {
				return Err(PathErr::Traversal(relative.display().to_string()));
			},
			// RootDir/Prefix shouldn't show up in a non-absolute path,
			// but treat them as traversal attempts rather than silently
			// dropping them.
			Component::RootDir | Component::Prefix(_) => {
				return Err(PathErr::Security(relative.display().to_string()));
			},
		}
	}

	Ok(root.join(normalized))
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn rejects_absolute()
	{
		let err = validate_path(Path::new("/etc/passwd"), Path::new("/root")).unwrap_err();
		assert!(matches!(err, PathErr::Security(_)));
	}

	#[test]
	fn rejects_traversal()
	{
		let err = validate_path(Path::new("../etc/passwd"), Path::new("/root")).unwrap_err();
		assert!(matches!(err, PathErr::Traversal(_)));
	}

	#[test]
	fn rejects_embedded_traversal()
	{
		let err = validate_path(Path::new("usr/../../etc/passwd"), Path::new("/root")).unwrap_err();
		assert!(matches!(err, PathErr::Traversal(_)));
	}

	#[test]
	fn collapses_dot_and_joins()
	{
		let got = validate_path(Path::new("./usr/./bin/ls"), Path::new("/root")).unwrap();
		assert_eq!(got, PathBuf::from("/root/usr/bin/ls"));
	}
}
