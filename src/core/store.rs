//! State store (C4): a thread-safe, write-through cache over five
//! on-disk tables, persisted with `tmp + rename` (spec.md §4.4).
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::version::{Version, VIRTUAL};
use crate::util::fs::{read_lines, write_atomic, ensure_dir_exists};


#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreErr
{
	#[error("I/O error: {0}")]
	IO(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),

	#[error("malformed {table} line: {line}")]
	Malformed { table: &'static str, line: String },
}


#[derive(Debug, Clone)]
pub(crate) struct PkgRecord
{
	pub(crate) version: String,
	pub(crate) explicit: bool,
}


/// In-memory mirror of the five on-disk tables.  Lives behind one mutex
/// per spec.md §5 ("The state store is protected by one mutex guarding
/// all five tables").
struct Inner
{
	pkgs: HashMap<String, PkgRecord>,
	files: HashMap<PathBuf, HashSet<String>>,
	provides: HashMap<String, HashSet<String>>,
	reverse_deps: Option<HashMap<String, HashSet<String>>>,
	essentials: Option<HashSet<String>>,
	dirty: bool,
}

pub(crate) struct StateStore
{
	dir: PathBuf,
	inner: Mutex<Inner>,
}

fn pkgs_path(dir: &Path) -> PathBuf { dir.join("pkgs") }
fn holdpkgs_path(dir: &Path) -> PathBuf { dir.join("holdpkgs") }
fn files_db_path(dir: &Path) -> PathBuf { dir.join("files.db") }
fn provides_db_path(dir: &Path) -> PathBuf { dir.join("provides.db") }
fn deps_dir(dir: &Path) -> PathBuf { dir.join("deps") }

impl StateStore
{
	/// Load the five tables from `dir` (normally `<root>/var/lib/lpkg`).
	/// Essentials are loaded lazily, by path, through `essentials()`.
	pub(crate) fn open(dir: &Path) -> Result<Self, StoreErr>
	{
		ensure_dir_exists(dir)?;
		ensure_dir_exists(&deps_dir(dir))?;

		let mut pkgs = HashMap::new();
		for line in read_lines(&pkgs_path(dir))?
		{
			let (name, version) = line.split_once(':')
					.ok_or_else(|| StoreErr::Malformed { table: "pkgs", line: line.clone() })?;
			pkgs.insert(name.to_string(), PkgRecord { version: version.to_string(), explicit: false });
		}

		for line in read_lines(&holdpkgs_path(dir))?
		{
			if let Some(p) = pkgs.get_mut(&line) { p.explicit = true; }
		}

		let mut files: HashMap<PathBuf, HashSet<String>> = HashMap::new();
		for line in read_lines(&files_db_path(dir))?
		{
			let mut it = line.split_whitespace();
			let (path, owner) = match (it.next(), it.next())
			{
				(Some(p), Some(o)) => (p, o),
				_ => return Err(StoreErr::Malformed { table: "files.db", line }),
			};
			files.entry(PathBuf::from(path)).or_default().insert(owner.to_string());
		}

		let mut provides: HashMap<String, HashSet<String>> = HashMap::new();
		for line in read_lines(&provides_db_path(dir))?
		{
			let mut it = line.split_whitespace();
			let (cap, owner) = match (it.next(), it.next())
			{
				(Some(c), Some(o)) => (c, o),
				_ => return Err(StoreErr::Malformed { table: "provides.db", line }),
			};
			provides.entry(cap.to_string()).or_default().insert(owner.to_string());
		}

		Ok(StateStore {
			dir: dir.to_path_buf(),
			inner: Mutex::new(Inner {
				pkgs, files, provides,
				reverse_deps: None,
				essentials: None,
				dirty: false,
			}),
		})
	}

	pub(crate) fn dir(&self) -> &Path { &self.dir }
	pub(crate) fn deps_dir(&self) -> PathBuf { deps_dir(&self.dir) }

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner>
	{
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Returns the installed version string, `virtual` if absent but a
	/// provider exists, else an empty string (spec.md §4.4).
	pub(crate) fn get_installed_version(&self, name: &str) -> String
	{
		let inner = self.lock();
		if let Some(p) = inner.pkgs.get(name) { return p.version.clone(); }
		if inner.provides.get(name).map(|s| !s.is_empty()).unwrap_or(false)
		{
			return VIRTUAL.to_string();
		}
		String::new()
	}

	pub(crate) fn is_installed(&self, name: &str) -> bool
	{
		self.lock().pkgs.contains_key(name)
	}

	pub(crate) fn is_explicit(&self, name: &str) -> bool
	{
		self.lock().pkgs.get(name).map(|p| p.explicit).unwrap_or(false)
	}

	pub(crate) fn installed_names(&self) -> Vec<String>
	{
		self.lock().pkgs.keys().cloned().collect()
	}

	pub(crate) fn owners_of(&self, logical: &Path) -> HashSet<String>
	{
		self.lock().files.get(logical).cloned().unwrap_or_default()
	}

	pub(crate) fn provider_exists(&self, cap: &str) -> bool
	{
		self.lock().provides.get(cap).map(|s| !s.is_empty()).unwrap_or(false)
	}

	/// Lazily loaded reverse-dependency table: `depended_name ->
	/// set<dependent_package>`, built from `deps/<name>` files.
	pub(crate) fn reverse_deps_of(&self, depended: &str) -> HashSet<String>
	{
		let mut inner = self.lock();
		if inner.reverse_deps.is_none()
		{
			inner.reverse_deps = Some(self.build_reverse_deps(&inner.pkgs));
		}
		inner.reverse_deps.as_ref().unwrap().get(depended).cloned().unwrap_or_default()
	}

	fn build_reverse_deps(&self, pkgs: &HashMap<String, PkgRecord>) -> HashMap<String, HashSet<String>>
	{
		let mut rdeps: HashMap<String, HashSet<String>> = HashMap::new();
		for name in pkgs.keys()
		{
			let depfile = deps_dir(&self.dir).join(name);
			let lines = read_lines(&depfile).unwrap_or_default();
			for line in lines
			{
				let dname = line.split_whitespace().next().unwrap_or("");
				if dname.is_empty() { continue; }
				rdeps.entry(dname.to_string()).or_default().insert(name.clone());
			}
		}
		rdeps
	}

	pub(crate) fn essentials(&self, essential_file: &Path) -> HashSet<String>
	{
		let mut inner = self.lock();
		if inner.essentials.is_none()
		{
			let names = read_lines(essential_file).unwrap_or_default();
			inner.essentials = Some(names.into_iter().collect());
		}
		inner.essentials.clone().unwrap()
	}

	/// Add/replace a package record (install or upgrade).  Never
	/// demotes `explicit` within a single call (spec.md §3).
	pub(crate) fn set_package(&self, name: &str, version: &Version, explicit: bool)
	{
		let mut inner = self.lock();
		let entry = inner.pkgs.entry(name.to_string())
				.or_insert_with(|| PkgRecord { version: version.to_string(), explicit: false });
		entry.version = version.to_string();
		if explicit { entry.explicit = true; }
		inner.dirty = true;
		inner.reverse_deps = None;
	}

	pub(crate) fn remove_package(&self, name: &str)
	{
		let mut inner = self.lock();
		inner.pkgs.remove(name);
		inner.dirty = true;
		inner.reverse_deps = None;
	}

	pub(crate) fn add_file_owner(&self, logical: &Path, owner: &str)
	{
		let mut inner = self.lock();
		inner.files.entry(logical.to_path_buf()).or_default().insert(owner.to_string());
		inner.dirty = true;
	}

	/// Returns true if no owners remain (caller should physically
	/// delete the file).
	pub(crate) fn remove_file_owner(&self, logical: &Path, owner: &str) -> bool
	{
		let mut inner = self.lock();
		let empty = match inner.files.get_mut(logical)
		{
			Some(owners) => {
				owners.remove(owner);
				owners.is_empty()
			},
			None => true,
		};
		if empty { inner.files.remove(logical); }
		inner.dirty = true;
		empty
	}

	pub(crate) fn add_provider(&self, cap: &str, owner: &str)
	{
		let mut inner = self.lock();
		inner.provides.entry(cap.to_string()).or_default().insert(owner.to_string());
		inner.dirty = true;
	}

	pub(crate) fn remove_provider(&self, cap: &str, owner: &str)
	{
		let mut inner = self.lock();
		if let Some(owners) = inner.provides.get_mut(cap)
		{
			owners.remove(owner);
			if owners.is_empty() { inner.provides.remove(cap); }
		}
		inner.dirty = true;
	}

	/// Write the dependency record for `name`; also invalidates the
	/// cached reverse-deps table since it's derived from this file.
	pub(crate) fn write_deps(&self, name: &str, lines: &[String]) -> Result<(), StoreErr>
	{
		let path = deps_dir(&self.dir).join(name);
		let contents = lines.join("\n") + if lines.is_empty() { "" } else { "\n" };
		write_atomic(&path, contents.as_bytes())?;
		self.lock().reverse_deps = None;
		Ok(())
	}

	pub(crate) fn remove_deps(&self, name: &str)
	{
		let path = deps_dir(&self.dir).join(name);
		let _ = std::fs::remove_file(path);
		self.lock().reverse_deps = None;
	}

	/// No-op unless a mutation flagged the store dirty; then rewrites
	/// each table to `<path>.tmp` and renames (spec.md §4.4).
	pub(crate) fn flush(&self) -> Result<(), StoreErr>
	{
		let mut inner = self.lock();
		if !inner.dirty { return Ok(()); }

		let mut pkg_lines: Vec<String> = inner.pkgs.iter()
				.map(|(n, p)| format!("{n}:{}", p.version))
				.collect();
		pkg_lines.sort();
		write_atomic(&pkgs_path(&self.dir), (pkg_lines.join("\n") + "\n").as_bytes())?;

		let mut hold_lines: Vec<String> = inner.pkgs.iter()
				.filter(|(_, p)| p.explicit)
				.map(|(n, _)| n.clone())
				.collect();
		hold_lines.sort();
		write_atomic(&holdpkgs_path(&self.dir), (hold_lines.join("\n") + "\n").as_bytes())?;

		let mut file_lines = Vec::new();
		for (path, owners) in inner.files.iter()
		{
			for owner in owners
			{
				file_lines.push(format!("{} {owner}", path.display()));
			}
		}
		file_lines.sort();
		write_atomic(&files_db_path(&self.dir), (file_lines.join("\n") + "\n").as_bytes())?;

		let mut prov_lines = Vec::new();
		for (cap, owners) in inner.provides.iter()
		{
			for owner in owners
			{
				prov_lines.push(format!("{cap} {owner}"));
			}
		}
		prov_lines.sort();
		write_atomic(&provides_db_path(&self.dir), (prov_lines.join("\n") + "\n").as_bytes())?;

		inner.dirty = false;
		Ok(())
	}
}


#[cfg(test)]
mod tests
{
	use super::*;

	fn v(s: &str) -> Version { s.parse().unwrap() }

	#[test]
	fn roundtrip_install_and_flush()
	{
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::open(dir.path()).unwrap();

		store.set_package("foo", &v("1.0"), true);
		store.add_file_owner(Path::new("/usr/bin/foo"), "foo");
		store.add_provider("libfoo", "foo");
		store.flush().unwrap();

		assert!(!dir.path().join("pkgs.tmp").exists());

		let store2 = StateStore::open(dir.path()).unwrap();
		assert_eq!(store2.get_installed_version("foo"), "1.0");
		assert!(store2.owners_of(Path::new("/usr/bin/foo")).contains("foo"));
		assert_eq!(store2.get_installed_version("libfoo"), VIRTUAL);
	}

	#[test]
	fn explicit_never_demoted()
	{
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::open(dir.path()).unwrap();

		store.set_package("foo", &v("1.0"), true);
		store.set_package("foo", &v("1.1"), false);
		store.flush().unwrap();

		let store2 = StateStore::open(dir.path()).unwrap();
		assert_eq!(store2.get_installed_version("foo"), "1.1");
		let hold = read_lines(&holdpkgs_path(dir.path())).unwrap();
		assert!(hold.contains(&"foo".to_string()));
	}

	#[test]
	fn reverse_deps_built_lazily()
	{
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::open(dir.path()).unwrap();
		store.set_package("app", &v("1.0"), true);
		store.write_deps("app", &["libfoo >= 1.0".to_string()]).unwrap();

		assert!(store.reverse_deps_of("libfoo").contains("app"));
	}

	/// spec.md §8 invariant 4: `P` only shows up as a reverse-dependent of
	/// `D` when `deps/P` actually names `D`.
	#[test]
	fn reverse_deps_symmetric_with_deps_file()
	{
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::open(dir.path()).unwrap();
		store.set_package("app", &v("1.0"), true);
		store.set_package("other", &v("1.0"), true);
		store.write_deps("app", &["libfoo >= 1.0".to_string()]).unwrap();
		store.write_deps("other", &["libbar".to_string()]).unwrap();

		assert!(store.reverse_deps_of("libfoo").contains("app"));
		assert!(!store.reverse_deps_of("libfoo").contains("other"));
		assert!(store.reverse_deps_of("libbar").contains("other"));
		assert!(!store.reverse_deps_of("libbar").contains("app"));
	}
}
