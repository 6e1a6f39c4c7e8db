//! Resolver / planner (C7): walks the dependency DAG mixing local
//! archive files, repository entries and virtual-capability providers,
//! producing an ordered install plan (spec.md §4.7).
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use regex_lite::Regex;

use crate::core::archive::extract_single;
use crate::core::repo::RepoIndex;
use crate::core::store::StateStore;
use crate::core::version::{satisfies, Op, Version};
use crate::util::hash::Sha256Hash;
use crate::util::log;


#[derive(Debug, Clone)]
pub(crate) enum Source { LocalArchive(PathBuf), Remote }

#[derive(Debug, Clone)]
pub(crate) struct PlanItem
{
	pub(crate) name: String,
	pub(crate) desired_version: Version,
	pub(crate) is_explicit: bool,
	pub(crate) source: Source,
	pub(crate) expected_sha256: Option<Sha256Hash>,
	pub(crate) deps: Vec<(String, Option<Op>, Option<Version>)>,
	pub(crate) force_reinstall: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Plan
{
	pub(crate) order: Vec<String>,
	pub(crate) items: HashMap<String, PlanItem>,
}

impl Plan
{
	pub(crate) fn is_empty(&self) -> bool { self.order.is_empty() }
	pub(crate) fn in_order(&self) -> impl Iterator<Item = &PlanItem>
	{
		self.order.iter().map(move |n| &self.items[n])
	}
}


#[derive(Debug, Clone, Copy)]
pub(crate) enum VersionSpec<'a> { Latest, Exact(&'a Version), Constraint(Op, &'a Version) }


#[derive(Debug, thiserror::Error)]
pub(crate) enum ResolveErr
{
	#[error("can't resolve dependency {name} {op} {req}")]
	UnresolvableDependency { name: String, op: String, req: String },

	#[error(transparent)]
	Extract(#[from] crate::core::archive::ExtractErr),

	#[error(transparent)]
	Version(#[from] crate::core::version::VersionErr),
}


/// Parses a package archive filename `<NAME>-<VERSION>.lpkg` (or
/// `.tar.zst`), greedily taking everything up to the last
/// version-shaped tail as the name (spec.md §6.2).
pub(crate) fn parse_archive_filename(path: &Path) -> Option<(String, Version)>
{
	use std::sync::OnceLock;
	static RE: OnceLock<Regex> = OnceLock::new();
	let re = RE.get_or_init(|| {
		Regex::new(r"^(.+)-([0-9][0-9A-Za-z.\-+]*)\.(?:lpkg|tar\.zst)$").unwrap()
	});

	let fname = path.file_name()?.to_str()?;
	let caps = re.captures(fname)?;
	let name = caps.get(1)?.as_str().to_string();
	let version: Version = caps.get(2)?.as_str().parse().ok()?;
	Some((name, version))
}


struct Candidate
{
	version: Version,
	source: Source,
	hash: Option<Sha256Hash>,
	deps: Vec<(String, Option<Op>, Option<Version>)>,
}

pub(crate) struct Resolver<'a>
{
	repo: &'a RepoIndex,
	local_archives: &'a HashMap<String, PathBuf>,
	store: &'a StateStore,
	no_deps: bool,
	force_reinstall: bool,

	plan: Plan,
	visiting: Vec<String>,
	deps_cache: HashMap<PathBuf, Vec<(String, Option<Op>, Option<Version>)>>,
}

impl<'a> Resolver<'a>
{
	pub(crate) fn new(repo: &'a RepoIndex, local_archives: &'a HashMap<String, PathBuf>,
			store: &'a StateStore, no_deps: bool, force_reinstall: bool) -> Self
	{
		Resolver {
			repo, local_archives, store, no_deps, force_reinstall,
			plan: Plan::default(), visiting: Vec::new(), deps_cache: HashMap::new(),
		}
	}

	pub(crate) fn into_plan(self) -> Plan { self.plan }

	fn local_deps(&mut self, archive: &Path) -> Result<Vec<(String, Option<Op>, Option<Version>)>, ResolveErr>
	{
		if let Some(cached) = self.deps_cache.get(archive) { return Ok(cached.clone()); }

		let raw = extract_single(archive, "deps.txt")?;
		let text = String::from_utf8_lossy(&raw);
		let mut deps = Vec::new();
		for line in text.lines()
		{
			let line = line.trim();
			if line.is_empty() { continue; }
			let parts: Vec<&str> = line.split_whitespace().collect();
			match parts.len()
			{
				1 => deps.push((parts[0].to_string(), None, None)),
				3 => {
					let op: Op = parts[1].parse()?;
					let ver: Version = parts[2].parse()?;
					deps.push((parts[0].to_string(), Some(op), Some(ver)));
				},
				_ => continue,
			}
		}
		self.deps_cache.insert(archive.to_path_buf(), deps.clone());
		Ok(deps)
	}

	fn find_candidate(&mut self, name: &str, version_spec: VersionSpec) -> Result<Option<Candidate>, ResolveErr>
	{
		if let Some(archive) = self.local_archives.get(name)
		{
			let (_n, version) = parse_archive_filename(archive)
					.unwrap_or_else(|| (name.to_string(), "0".parse().unwrap()));
			let deps = self.local_deps(archive)?;
			return Ok(Some(Candidate {
				version, source: Source::LocalArchive(archive.clone()), hash: None, deps,
			}));
		}

		let repo_entry = match version_spec
		{
			VersionSpec::Latest => self.repo.find(name),
			VersionSpec::Exact(v) => self.repo.find_version(name, v),
			VersionSpec::Constraint(op, v) => self.repo.find_best(name, op, v),
		};

		if let Some(rv) = repo_entry
		{
			return Ok(Some(Candidate {
				version: rv.version.clone(), source: Source::Remote,
				hash: rv.hash, deps: rv.deps.clone(),
			}));
		}

		Ok(None)
	}

	/// Implements spec.md §4.7 step by step.
	pub(crate) fn resolve(&mut self, name: &str, version_spec: VersionSpec, is_explicit: bool)
			-> Result<(), ResolveErr>
	{
		// 1. circular dependency: already further up the visit stack.
		if self.visiting.iter().any(|n| n == name)
		{
			log::warning(&format!("circular dependency on {name}, deferring to earlier scheduling"));
			return Ok(());
		}

		// 2. already planned; just promote explicitness.
		if let Some(item) = self.plan.items.get_mut(name)
		{
			if is_explicit { item.is_explicit = true; }
			return Ok(());
		}

		// 3. find a candidate, falling back to a provider.
		let candidate = match self.find_candidate(name, version_spec)?
		{
			Some(c) => c,
			None => {
				if let Some(provider) = self.repo.find_provider(name)
				{
					let provider = provider.to_string();
					return self.resolve(&provider, VersionSpec::Latest, is_explicit);
				}
				if !self.store.is_installed(name)
				{
					log::warning(&format!("no candidate found for {name}"));
				}
				return Ok(());
			},
		};

		// 4/5. skip if no work needed.
		let installed = self.store.get_installed_version(name);
		let latest = candidate.version.clone();
		if !installed.is_empty() && installed != "virtual"
		{
			let installed_v: Version = installed.parse().unwrap_or_else(|_| latest.clone());
			if !is_explicit && installed_v.compare(&latest) != std::cmp::Ordering::Less
			{
				return Ok(());
			}
			if is_explicit && installed_v == latest && !self.force_reinstall
			{
				return Ok(());
			}
		}

		// 6. push, build the item, recurse over deps.
		self.visiting.push(name.to_string());

		let mut resolved_deps = Vec::new();
		if !self.no_deps
		{
			for (dname, op, req) in &candidate.deps
			{
				let idv = self.store.get_installed_version(dname);
				let needs_resolution = idv.is_empty()
						|| (op.is_some() && idv != "virtual"
							&& !satisfies(&idv.parse().unwrap_or_else(|_| "0".parse().unwrap()),
								op.unwrap(), req.as_ref().unwrap()));

				if needs_resolution
				{
					let spec = match (op, req)
					{
						(Some(o), Some(r)) => VersionSpec::Constraint(*o, r),
						_ => VersionSpec::Latest,
					};
					self.resolve(dname, spec, false)?;
				}

				let candidate_version = self.plan.items.get(dname)
						.map(|i| i.desired_version.clone())
						.or_else(|| {
							let v = self.store.get_installed_version(dname);
							if v.is_empty() { None } else { v.parse().ok() }
						});

				if let (Some(cv), Some(o), Some(r)) = (&candidate_version, op, req)
				{
					if !cv.is_virtual() && !satisfies(cv, *o, r)
					{
						self.visiting.pop();
						return Err(ResolveErr::UnresolvableDependency {
							name: dname.clone(), op: o.to_string(), req: r.to_string(),
						});
					}
				}

				resolved_deps.push((dname.clone(), *op, req.clone()));
			}
		}

		let item = PlanItem {
			name: name.to_string(),
			desired_version: candidate.version,
			is_explicit,
			source: candidate.source,
			expected_sha256: candidate.hash,
			deps: resolved_deps,
			force_reinstall: self.force_reinstall,
		};

		self.plan.items.insert(name.to_string(), item);
		self.plan.order.push(name.to_string());
		self.visiting.pop();

		Ok(())
	}
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn parses_dashed_name_and_version()
	{
		let (name, version) = parse_archive_filename(Path::new("some-pkg-1.2.3.lpkg")).unwrap();
		assert_eq!(name, "some-pkg");
		assert_eq!(version.to_string(), "1.2.3");
	}

	#[test]
	fn resolve_skips_already_satisfied_implicit()
	{
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::open(dir.path()).unwrap();
		store.set_package("foo", &"1.0".parse().unwrap(), false);

		let repo = RepoIndex::load("foo|1.0||\n").unwrap();
		let locals = HashMap::new();
		let mut resolver = Resolver::new(&repo, &locals, &store, false, false);

		resolver.resolve("foo", VersionSpec::Latest, false).unwrap();
		assert!(resolver.into_plan().is_empty());
	}

	#[test]
	fn resolve_plans_explicit_reinstall_when_forced()
	{
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::open(dir.path()).unwrap();
		store.set_package("foo", &"1.0".parse().unwrap(), true);

		let repo = RepoIndex::load("foo|1.0||\n").unwrap();
		let locals = HashMap::new();
		let mut resolver = Resolver::new(&repo, &locals, &store, false, true);

		resolver.resolve("foo", VersionSpec::Latest, true).unwrap();
		let plan = resolver.into_plan();
		assert!(plan.items.contains_key("foo"));
	}

	/// spec.md §4.7 step 6: a dependency with an operator/version
	/// constraint must resolve against the best *satisfying* version,
	/// not always the latest.
	#[test]
	fn resolve_honors_dependency_version_constraint()
	{
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::open(dir.path()).unwrap();

		let repo = RepoIndex::load("app|1.0|foo < 2.0|\nfoo|1.0,1.5,2.0,3.0||\n").unwrap();
		let locals = HashMap::new();
		let mut resolver = Resolver::new(&repo, &locals, &store, false, false);

		resolver.resolve("app", VersionSpec::Latest, true).unwrap();
		let plan = resolver.into_plan();
		assert_eq!(plan.items["foo"].desired_version.to_string(), "1.5");
	}
}
