//! Repository index (C5): parse the pipe-separated index text, look up
//! by name/version/constraint, find capability providers.
use std::collections::HashMap;

use crate::core::version::{Op, Version, VersionErr};
use crate::util::hash::Sha256Hash;


#[derive(Debug, Clone)]
pub(crate) struct RepoVersion
{
	pub(crate) version: Version,
	pub(crate) hash: Option<Sha256Hash>,
	pub(crate) deps: Vec<(String, Option<Op>, Option<Version>)>,
	pub(crate) provides: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct RepoIndex
{
	// Sorted ascending by version per name, per spec.md §4.5.
	packages: HashMap<String, Vec<RepoVersion>>,
	// First-insertion order, for find_provider's "deterministic by
	// file order" rule.
	provider_order: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoErr
{
	#[error("malformed index line: {0}")]
	Malformed(String),

	#[error(transparent)]
	Version(#[from] VersionErr),
}

impl RepoIndex
{
	pub(crate) fn load(text: &str) -> Result<Self, RepoErr>
	{
		let mut idx = RepoIndex::default();

		for line in text.lines()
		{
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') { continue; }

			let fields: Vec<&str> = line.splitn(4, '|').collect();
			let [name, verlist, deplist, provlist] = match fields[..]
			{
				[a, b, c, d] => [a, b, c, d],
				[a, b, c] => [a, b, c, ""],
				[a, b] => [a, b, "", ""],
				_ => return Err(RepoErr::Malformed(line.to_string())),
			};
			if name.is_empty() { return Err(RepoErr::Malformed(line.to_string())); }

			let deps = parse_deps(deplist)?;
			let provides: Vec<String> = provlist.split(',')
					.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();

			// Single insertion per (name, version); the legacy parser's
			// double-insert bug is explicitly not reproduced (spec.md §9).
			for ventry in verlist.split(',')
			{
				let ventry = ventry.trim();
				if ventry.is_empty() { continue; }
				let (vstr, hash) = match ventry.split_once(':')
				{
					Some((v, h)) => (v, Some(h.parse().map_err(|_| RepoErr::Malformed(line.to_string()))?)),
					None => (ventry, None),
				};
				let version: Version = vstr.parse()?;

				for cap in &provides
				{
					idx.provider_order.push((cap.clone(), name.to_string()));
				}

				idx.packages.entry(name.to_string()).or_default().push(RepoVersion {
					version, hash, deps: deps.clone(), provides: provides.clone(),
				});
			}
		}

		for versions in idx.packages.values_mut()
		{
			versions.sort_by(|a, b| a.version.compare(&b.version));
		}

		Ok(idx)
	}

	pub(crate) fn find(&self, name: &str) -> Option<&RepoVersion>
	{
		self.packages.get(name).and_then(|v| v.last())
	}

	pub(crate) fn find_version(&self, name: &str, version: &Version) -> Option<&RepoVersion>
	{
		self.packages.get(name)?.iter().find(|rv| &rv.version == version)
	}

	pub(crate) fn find_best(&self, name: &str, op: Op, req: &Version) -> Option<&RepoVersion>
	{
		self.packages.get(name)?.iter().rev()
				.find(|rv| crate::core::version::satisfies(&rv.version, op, req))
	}

	pub(crate) fn find_provider(&self, capability: &str) -> Option<&str>
	{
		self.provider_order.iter()
				.find(|(cap, _)| cap == capability)
				.map(|(_, name)| name.as_str())
	}
}

fn parse_deps(deplist: &str) -> Result<Vec<(String, Option<Op>, Option<Version>)>, RepoErr>
{
	let mut deps = Vec::new();
	for dep in deplist.split(',')
	{
		let dep = dep.trim();
		if dep.is_empty() { continue; }

		let parts: Vec<&str> = dep.split_whitespace().collect();
		match parts.len()
		{
			1 => deps.push((parts[0].to_string(), None, None)),
			3 => {
				let op: Op = parts[1].parse()?;
				let ver: Version = parts[2].parse()?;
				deps.push((parts[0].to_string(), Some(op), Some(ver)));
			},
			_ => return Err(RepoErr::Malformed(dep.to_string())),
		}
	}
	Ok(deps)
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn parses_and_sorts_versions()
	{
		let text = "foo|1.0,2.0:deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef|bar >= 1.0|libfoo\n";
		let idx = RepoIndex::load(text).unwrap();

		let latest = idx.find("foo").unwrap();
		assert_eq!(latest.version.to_string(), "2.0");
		assert!(latest.hash.is_some());
		assert_eq!(idx.find_provider("libfoo"), Some("foo"));
	}

	#[test]
	fn find_best_picks_highest_satisfying()
	{
		let text = "foo|1.0,1.5,2.0||\n";
		let idx = RepoIndex::load(text).unwrap();

		let op: Op = "<".parse().unwrap();
		let req: Version = "2.0".parse().unwrap();
		let best = idx.find_best("foo", op, &req).unwrap();
		assert_eq!(best.version.to_string(), "1.5");
	}

	#[test]
	fn single_insertion_per_version()
	{
		let text = "foo|1.0||\n";
		let idx = RepoIndex::load(text).unwrap();
		assert_eq!(idx.packages.get("foo").unwrap().len(), 1);
	}

	#[test]
	fn comments_and_blank_lines_skipped()
	{
		let text = "# comment\n\nfoo|1.0||\n";
		let idx = RepoIndex::load(text).unwrap();
		assert!(idx.find("foo").is_some());
	}
}
