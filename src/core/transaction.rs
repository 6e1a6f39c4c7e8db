//! Transaction engine (C9): lock → plan → consistency/conflict checks →
//! prompt → commit loop with rollback-on-failure → flush → triggers
//! (spec.md §4.9), plus the removal-side `remove`/`autoremove` entry
//! points that share its lock/flush bookkeeping.
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::collab::{Fetcher, IndexLoader, TriggerExec};
use crate::config::EngineContext;
use crate::core::archive::extract_single;
use crate::core::install::{self, RollbackState};
use crate::core::remove;
use crate::core::repo::RepoIndex;
use crate::core::resolver::{parse_archive_filename, Plan, PlanItem, Resolver, Source, VersionSpec};
use crate::core::version::{satisfies, Op, Version};
use crate::util::fs::read_lines;
use crate::util::hash::Sha256Hash;
use crate::util::log;


#[derive(Debug, thiserror::Error)]
pub(crate) enum TransactionErr
{
	#[error(transparent)]
	Resolve(#[from] crate::core::resolver::ResolveErr),

	#[error(transparent)]
	Install(#[from] install::InstallErr),

	#[error(transparent)]
	Extract(#[from] crate::core::archive::ExtractErr),

	#[error(transparent)]
	Lock(#[from] crate::core::lock::LockErr),

	#[error(transparent)]
	Store(#[from] crate::core::store::StoreErr),

	#[error("transaction-internal file conflicts:\n{}", .0.join("\n"))]
	InternalConflict(Vec<String>),

	#[error("transaction failed and was rolled back: {0}")]
	Failed(String),

	#[error(transparent)]
	IO(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}


/// A user-supplied install target, already distinguished between a
/// local archive file and a `name[:version]` remote request
/// (spec.md §4.9 step 2).
pub(crate) enum UserTarget
{
	Local(PathBuf, Option<Sha256Hash>),
	Named(String, Option<Version>),
}

pub(crate) struct TransactionOpts<'a>
{
	pub(crate) fetcher: &'a dyn Fetcher,
	pub(crate) index_loader: &'a dyn IndexLoader,
	pub(crate) triggers: &'a dyn TriggerExec,
	pub(crate) sink: &'a dyn log::ProgressSink,
	pub(crate) force_reinstall: bool,
	pub(crate) assume_yes: bool,
}


/// Entry point for `install`/`upgrade`/`reinstall` (they differ only in
/// how the caller builds `targets` and `opts.force_reinstall`).
pub(crate) fn run_install(ctx: &EngineContext, targets: &[UserTarget], opts: &TransactionOpts)
		-> Result<(), TransactionErr>
{
	let _lock = ctx.lock()?;
	let tmp_root = ctx.root.join("tmp");
	if let Err(e) = crate::util::fs::gc_tmp_dirs(&tmp_root, std::time::Duration::from_secs(24 * 3600))
	{
		log::warning(&format!("tmp dir GC failed: {e}"));
	}
	std::fs::create_dir_all(ctx.tmp_dir(std::process::id()))?;

	let index_text = opts.index_loader.load_index(&ctx.config.mirror, &ctx.config.arch)
			.unwrap_or_else(|e| {
				log::warning(&format!("couldn't load repository index: {e}"));
				String::new()
			});
	let repo = RepoIndex::load(&index_text).unwrap_or_default();

	let mut local_archives: HashMap<String, PathBuf> = HashMap::new();
	let mut wanted: Vec<(String, Option<Version>)> = Vec::new();
	let mut explicit_hashes: HashMap<String, Sha256Hash> = HashMap::new();

	for t in targets
	{
		match t
		{
			UserTarget::Local(path, hash) => {
				let (name, _v) = parse_archive_filename(path)
						.ok_or_else(|| anyhow::anyhow!("can't parse archive filename {}", path.display()))?;
				local_archives.insert(name.clone(), path.clone());
				if let Some(h) = hash { explicit_hashes.insert(name.clone(), *h); }
				wanted.push((name, None));
			},
			UserTarget::Named(name, version) => wanted.push((name.clone(), version.clone())),
		}
	}

	let plan = loop
	{
		let mut resolver = Resolver::new(&repo, &local_archives, &ctx.store, ctx.no_deps, opts.force_reinstall);
		for (name, version) in &wanted
		{
			let spec = match version { Some(v) => VersionSpec::Exact(v), None => VersionSpec::Latest };
			resolver.resolve(name, spec, true)?;
		}
		let mut plan = resolver.into_plan();

		for (name, hash) in &explicit_hashes
		{
			if let Some(item) = plan.items.get_mut(name) { item.expected_sha256 = Some(*hash); }
		}

		if plan.is_empty()
		{
			log::info("nothing to do, already installed");
			return Ok(());
		}

		let broken = find_broken_dependents(ctx, &plan);
		if broken.is_empty() { break plan; }

		log::error(&format!("installing this plan would break: {}", broken.join(", ")));
		if !opts.assume_yes && ctx.non_interactive != Some(true)
				&& !confirm("remove the broken packages and continue?")?
		{
			log::info("aborted");
			return Ok(());
		}

		for name in &broken { remove::remove(ctx, name, true).map_err(|e| TransactionErr::Failed(e.to_string()))?; }
		// restart resolution against the same targets now that the
		// broken dependents are gone (spec.md §4.7 "Consistency check").
	};

	check_internal_conflicts(&plan)?;

	if !opts.assume_yes && ctx.non_interactive != Some(true)
	{
		print_plan(&plan);
		if !confirm("proceed with this transaction?")?
		{
			log::info("aborted");
			return Ok(());
		}
	}

	let mut committed: Vec<String> = Vec::new();
	let result = (|| -> Result<(), TransactionErr> {
		for item in plan.in_order()
		{
			install_one(ctx, item, opts)?;
			committed.push(item.name.clone());
		}
		Ok(())
	})();

	if let Err(e) = result
	{
		for name in committed.iter().rev()
		{
			if let Err(re) = remove::remove(ctx, name, true)
			{
				log::warning(&format!("rollback: failed to remove {name}: {re}"));
			}
		}
		ctx.store.flush()?;
		return Err(TransactionErr::Failed(e.to_string()));
	}

	ctx.store.flush()?;
	run_triggers(ctx, &plan, opts.triggers);
	Ok(())
}


/// Dependency-installing an item's deps may invalidate an installed
/// package that's *not* in the plan.  Spec.md §4.7 "Consistency check".
fn find_broken_dependents(ctx: &EngineContext, plan: &Plan) -> Vec<String>
{
	let mut broken = Vec::new();
	for name in ctx.store.installed_names()
	{
		if plan.items.contains_key(&name) { continue; }

		let depfile = ctx.store.deps_dir().join(&name);
		for line in read_lines(&depfile).unwrap_or_default()
		{
			let parts: Vec<&str> = line.split_whitespace().collect();
			if parts.len() != 3 { continue; }
			let dep_name = parts[0];
			let (Ok(op), Ok(req)) = (parts[1].parse::<Op>(), parts[2].parse::<Version>()) else { continue };

			if let Some(item) = plan.items.get(dep_name)
			{
				if !item.desired_version.is_virtual() && !satisfies(&item.desired_version, op, &req)
				{
					broken.push(name.clone());
					break;
				}
			}
		}
	}
	broken
}


/// Transaction-internal conflict check (spec.md §4.7): two local
/// archives in the same plan can't claim the same logical path.
fn check_internal_conflicts(plan: &Plan) -> Result<(), TransactionErr>
{
	let mut owner_of: HashMap<PathBuf, String> = HashMap::new();
	let mut conflicts = Vec::new();

	for item in plan.in_order()
	{
		let Source::LocalArchive(path) = &item.source else { continue };

		let raw = extract_single(path, "files.txt")?;
		let text = String::from_utf8_lossy(&raw);
		for line in text.lines()
		{
			let line = line.trim_end_matches('\r');
			if line.is_empty() { continue; }
			let Some((src, dest_prefix)) = line.split_once('\t') else { continue };
			let logical = PathBuf::from(dest_prefix).join(src);

			match owner_of.get(&logical)
			{
				Some(existing) if existing != &item.name => {
					conflicts.push(format!("{}: {existing} vs {}", logical.display(), item.name));
				},
				_ => { owner_of.insert(logical, item.name.clone()); },
			}
		}
	}

	if !conflicts.is_empty() { return Err(TransactionErr::InternalConflict(conflicts)); }
	Ok(())
}


fn install_one(ctx: &EngineContext, item: &PlanItem, opts: &TransactionOpts) -> Result<(), TransactionErr>
{
	let is_upgrade = ctx.store.is_installed(&item.name);
	let old_logical: HashSet<PathBuf> = if is_upgrade
	{
		read_lines(&ctx.files_dir().join(format!("{}.txt", item.name))).unwrap_or_default()
				.into_iter().map(PathBuf::from).collect()
	}
	else { HashSet::new() };
	let old_dirs: HashSet<PathBuf> = if is_upgrade
	{
		read_lines(&ctx.files_dir().join(format!("{}.dirs", item.name))).unwrap_or_default()
				.into_iter().map(PathBuf::from).collect()
	}
	else { HashSet::new() };

	let archive = install::fetch_and_verify(ctx, item, opts.fetcher)?;
	let workdir = install::extract_and_validate(ctx, item, &archive, opts.sink)?;
	let entries = install::parse_files_txt(&workdir)?;

	let mut rollback = RollbackState::default();
	let outcome: Result<Vec<PathBuf>, install::InstallErr> = (|| {
		install::check_file_conflicts(ctx, item, &entries, is_upgrade)?;
		let installed = install::copy_files(ctx, item, &workdir, &entries, &mut rollback, opts.triggers)?;
		install::register(ctx, item, &workdir, &installed, &rollback, is_upgrade)?;
		Ok(installed)
	})();

	match outcome
	{
		Ok(installed_logical) => {
			if is_upgrade
			{
				let new_logical: HashSet<PathBuf> = installed_logical.into_iter().collect();
				let new_dirs: HashSet<PathBuf> = install::dir_logical_paths(ctx, &rollback).into_iter().collect();
				install::upgrade_cleanup(ctx, &item.name, &old_logical, &new_logical, &old_dirs, &new_dirs)?;
			}
			install::run_post_install_hook(ctx, item, &workdir)?;
			Ok(())
		},
		Err(e) => {
			rollback.rollback();
			Err(e.into())
		},
	}
}


fn print_plan(plan: &Plan)
{
	log::info("transaction plan:");
	for item in plan.in_order()
	{
		let marker = if item.is_explicit { "explicit" } else { "dependency" };
		log::info(&format!("  {} {} ({marker})", item.name, item.desired_version));
	}
}

fn confirm(prompt: &str) -> Result<bool, TransactionErr>
{
	use std::io::Write as _;
	print!("{prompt} [y/N] ");
	std::io::stdout().flush()?;
	let mut line = String::new();
	std::io::stdin().read_line(&mut line)?;
	Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Run queued trigger commands once, de-duplicated (spec.md §4.9 step
/// 7).  Matches each just-installed logical path against the
/// configured trigger patterns.
fn run_triggers(ctx: &EngineContext, plan: &Plan, triggers: &dyn TriggerExec)
{
	let mut seen = HashSet::new();
	let mut cmds = Vec::new();

	for item in plan.in_order()
	{
		let lines = read_lines(&ctx.files_dir().join(format!("{}.txt", item.name))).unwrap_or_default();
		for line in &lines
		{
			let path = line.trim_start_matches('/');
			for (re, cmd) in &ctx.config.triggers
			{
				if re.is_match(path) && seen.insert(cmd.clone())
				{
					cmds.push(cmd.clone());
				}
			}
		}
	}

	for cmd in cmds
	{
		log::info(&format!("running trigger: {cmd}"));
		if let Err(e) = triggers.run(&cmd)
		{
			log::warning(&format!("trigger '{cmd}' failed: {e}"));
		}
	}
}


/// `remove`/`autoremove` share the lock+flush bookkeeping with install,
/// so they live here rather than in `core::remove` itself.
pub(crate) fn run_remove(ctx: &EngineContext, names: &[String], force: bool) -> Result<(), TransactionErr>
{
	let _lock = ctx.lock()?;
	for name in names
	{
		remove::remove(ctx, name, force).map_err(|e| TransactionErr::Failed(e.to_string()))?;
	}
	ctx.store.flush()?;
	Ok(())
}

fn provides_has_reverse_dep(ctx: &EngineContext, name: &str) -> bool
{
	let provides_file = ctx.files_dir().join(format!("{name}.provides"));
	read_lines(&provides_file).unwrap_or_default()
			.iter().any(|cap| !ctx.store.reverse_deps_of(cap).is_empty())
}

/// Repeatedly remove implicit packages with no remaining reverse
/// dependency (ordinary or via a provided capability) until a fixpoint
/// is reached. Essentials are never touched.
pub(crate) fn run_autoremove(ctx: &EngineContext) -> Result<Vec<String>, TransactionErr>
{
	let _lock = ctx.lock()?;
	let essentials = ctx.essentials();
	let mut removed = Vec::new();

	loop
	{
		let victim = ctx.store.installed_names().into_iter().find(|name| {
			!essentials.contains(name)
					&& !ctx.store.is_explicit(name)
					&& ctx.store.reverse_deps_of(name).is_empty()
					&& !provides_has_reverse_dep(ctx, name)
		});

		match victim
		{
			Some(name) => {
				remove::remove(ctx, &name, false).map_err(|e| TransactionErr::Failed(e.to_string()))?;
				removed.push(name);
			},
			None => break,
		}
	}

	ctx.store.flush()?;
	Ok(removed)
}


#[cfg(test)]
mod tests
{
	use super::*;
	use std::fs::{self, File};
	use std::io::Write as _;
	use std::path::Path;

	use crate::collab::{IndexLoader, ShellTriggerExec};
	use crate::config::Config;
	use crate::core::install::InstallErr;
	use crate::core::store::StateStore;
	use crate::util::hash::Sha256Hash;
	use crate::util::log::SilentSink;

	struct EmptyIndex;
	impl IndexLoader for EmptyIndex
	{
		fn load_index(&self, _mirror: &str, _arch: &str) -> Result<String, anyhow::Error> { Ok(String::new()) }
		fn load_latest(&self, _mirror: &str, _arch: &str, _name: &str) -> Result<String, anyhow::Error> { Ok(String::new()) }
	}

	struct NoopFetcher;
	impl Fetcher for NoopFetcher
	{
		fn fetch(&self, url: &str, _dest: &std::path::Path) -> Result<(), anyhow::Error>
		{ anyhow::bail!("no network in tests: {url}") }
	}

	fn ctx_at(root: &std::path::Path) -> EngineContext
	{
		let store = StateStore::open(&root.join("var/lib/lpkg")).unwrap();
		EngineContext {
			root: root.to_path_buf(), config: Config::default(), store,
			force: false, force_overwrite: false, no_hooks: true, no_deps: false,
			non_interactive: Some(true),
		}
	}

	#[test]
	fn autoremove_clears_orphaned_implicit_package()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());

		ctx.store.set_package("libfoo", &"1.0".parse().unwrap(), false);
		let removed = run_autoremove(&ctx).unwrap();
		assert_eq!(removed, vec!["libfoo".to_string()]);
	}

	#[test]
	fn autoremove_preserves_explicit_package()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());

		ctx.store.set_package("app", &"1.0".parse().unwrap(), true);
		let removed = run_autoremove(&ctx).unwrap();
		assert!(removed.is_empty());
	}

	#[test]
	fn install_reports_nothing_to_do_when_already_satisfied()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		ctx.store.set_package("foo", &"1.0".parse().unwrap(), false);

		let opts = TransactionOpts {
			fetcher: &NoopFetcher, index_loader: &EmptyIndex, triggers: &ShellTriggerExec,
			sink: &SilentSink, force_reinstall: false, assume_yes: true,
		};
		let targets = vec![UserTarget::Named("foo".to_string(), None)];
		run_install(&ctx, &targets, &opts).unwrap();
	}


	fn append_entry<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, content: &[u8], mode: u32)
	{
		let mut header = tar::Header::new_gnu();
		header.set_size(content.len() as u64);
		header.set_mode(mode);
		header.set_cksum();
		builder.append_data(&mut header, name, content).unwrap();
	}

	/// Build a package archive with the layout `core::install` expects:
	/// `man.txt`/`deps.txt`/`files.txt` plus `content/`, and an optional
	/// `provides.txt`.  `stem` must already be `<name>-<version>` so
	/// `parse_archive_filename` can recover both.
	fn make_pkg_archive(dir: &Path, stem: &str, deps: &[&str], files: &[(&str, &[u8])],
			provides: Option<&[&str]>) -> PathBuf
	{
		let archive_path = dir.join(format!("{stem}.tar.zst"));
		let file = File::create(&archive_path).unwrap();
		let encoder = zstd::Encoder::new(file, 0).unwrap();
		let mut builder = tar::Builder::new(encoder);

		append_entry(&mut builder, "man.txt", format!("{stem}\n").as_bytes(), 0o644);

		let deps_text = if deps.is_empty() { String::new() } else { deps.join("\n") + "\n" };
		append_entry(&mut builder, "deps.txt", deps_text.as_bytes(), 0o644);

		let files_lines: Vec<String> = files.iter().map(|(p, _)| format!("{p}\t/")).collect();
		append_entry(&mut builder, "files.txt", (files_lines.join("\n") + "\n").as_bytes(), 0o644);

		for (path, content) in files
		{
			append_entry(&mut builder, &format!("content/{path}"), content, 0o644);
		}

		if let Some(caps) = provides
		{
			let text = caps.join("\n") + "\n";
			append_entry(&mut builder, "provides.txt", text.as_bytes(), 0o644);
		}

		let encoder = builder.into_inner().unwrap();
		encoder.finish().unwrap().flush().unwrap();
		archive_path
	}

	/// Install a batch of local archives non-interactively, with no
	/// network and no hooks, the way every scenario test below wants to.
	fn install_locals(ctx: &EngineContext, archives: &[PathBuf]) -> Result<(), TransactionErr>
	{
		let opts = TransactionOpts {
			fetcher: &NoopFetcher, index_loader: &EmptyIndex, triggers: &ShellTriggerExec,
			sink: &SilentSink, force_reinstall: false, assume_yes: true,
		};
		let targets: Vec<UserTarget> = archives.iter().map(|p| UserTarget::Local(p.clone(), None)).collect();
		run_install(ctx, &targets, &opts)
	}

	fn has_tmp_file(dir: &Path) -> bool
	{
		if !dir.is_dir() { return false; }
		fs::read_dir(dir).unwrap()
				.any(|e| e.unwrap().file_name().to_string_lossy().ends_with(".tmp"))
	}

	/// Like `make_pkg_archive`, but `dirs` ships directory entries
	/// (`content/<path>` is a tar directory, `files.txt` points at it
	/// with an empty dest prefix) alongside the regular `files`.
	fn make_pkg_archive_with_dirs(dir: &Path, stem: &str, files: &[(&str, &[u8])], dirs: &[&str]) -> PathBuf
	{
		let archive_path = dir.join(format!("{stem}.tar.zst"));
		let file = File::create(&archive_path).unwrap();
		let encoder = zstd::Encoder::new(file, 0).unwrap();
		let mut builder = tar::Builder::new(encoder);

		append_entry(&mut builder, "man.txt", format!("{stem}\n").as_bytes(), 0o644);
		append_entry(&mut builder, "deps.txt", b"", 0o644);

		let mut files_lines: Vec<String> = files.iter().map(|(p, _)| format!("{p}\t/")).collect();
		files_lines.extend(dirs.iter().map(|p| format!("{p}\t/")));
		append_entry(&mut builder, "files.txt", (files_lines.join("\n") + "\n").as_bytes(), 0o644);

		for (path, content) in files
		{
			append_entry(&mut builder, &format!("content/{path}"), content, 0o644);
		}
		for path in dirs
		{
			let mut header = tar::Header::new_gnu();
			header.set_entry_type(tar::EntryType::Directory);
			header.set_size(0);
			header.set_mode(0o755);
			header.set_cksum();
			builder.append_data(&mut header, format!("content/{path}"), &b""[..]).unwrap();
		}

		let encoder = builder.into_inner().unwrap();
		encoder.finish().unwrap().flush().unwrap();
		archive_path
	}


	/// spec.md §4.8: directory entries are shared, not owned — two
	/// packages shipping the same directory never conflict, and the
	/// directory only disappears once the last package to claim it drops
	/// it, tracked via each package's `<name>.dirs`.
	#[test]
	fn shared_directory_entries_dont_conflict_and_clean_up_via_dirs_manifest()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();

		let a = make_pkg_archive_with_dirs(&archives, "dirpkg_a-1.0",
				&[("var/cache/shared/a.txt", b"a")], &["var/cache/shared"]);
		let b = make_pkg_archive_with_dirs(&archives, "dirpkg_b-1.0",
				&[("var/cache/shared/b.txt", b"b")], &["var/cache/shared"]);
		install_locals(&ctx, &[a, b]).unwrap();

		assert!(ctx.root.join("var/cache/shared").is_dir());
		let a_dirs = fs::read_to_string(ctx.files_dir().join("dirpkg_a.dirs")).unwrap();
		assert!(a_dirs.lines().any(|l| l == "/var/cache/shared"));

		// The directory itself was never recorded as an owned file.
		assert!(ctx.store.owners_of(Path::new("/var/cache/shared")).is_empty());

		crate::core::remove::remove(&ctx, "dirpkg_a", false).unwrap();
		assert!(ctx.root.join("var/cache/shared").is_dir(), "still owned by dirpkg_b");

		crate::core::remove::remove(&ctx, "dirpkg_b", false).unwrap();
		assert!(!ctx.root.join("var/cache/shared").exists());
	}

	/// An upgrade that drops a directory entry the previous version
	/// created removes it once empty (spec.md §4.8 upgrade cleanup).
	#[test]
	fn upgrade_removes_dropped_directory_when_empty()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();

		let v1 = make_pkg_archive_with_dirs(&archives, "dirupg-1.0", &[], &["var/cache/dirupg"]);
		install_locals(&ctx, &[v1]).unwrap();
		assert!(ctx.root.join("var/cache/dirupg").is_dir());

		let v2 = make_pkg_archive_with_dirs(&archives, "dirupg-2.0", &[], &[]);
		install_locals(&ctx, &[v2]).unwrap();
		assert!(!ctx.root.join("var/cache/dirupg").exists());
	}

	/// spec.md §8 S1.
	#[test]
	fn s1_obsolete_file_cleanup_on_upgrade()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();

		let v1 = make_pkg_archive(&archives, "cleanup_test-1.0", &[],
				&[("usr/bin/file1", b"v1"), ("usr/bin/file2", b"v1")], None);
		install_locals(&ctx, &[v1]).unwrap();

		let v2 = make_pkg_archive(&archives, "cleanup_test-2.0", &[], &[("usr/bin/file1", b"v2")], None);
		install_locals(&ctx, &[v2]).unwrap();

		assert!(ctx.root.join("usr/bin/file1").exists());
		assert!(!ctx.root.join("usr/bin/file2").exists());
		assert_eq!(ctx.store.get_installed_version("cleanup_test"), "2.0");
	}

	/// spec.md §8 S2.
	#[test]
	fn s2_transaction_conflict_rolls_back()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();

		let a = make_pkg_archive(&archives, "pkga-1.0", &[], &[("etc/shared.conf", b"a")], None);
		let b = make_pkg_archive(&archives, "pkgb-1.0", &[], &[("etc/shared.conf", b"b")], None);

		let err = install_locals(&ctx, &[a, b]).unwrap_err();
		assert!(matches!(err, TransactionErr::InternalConflict(_)));
		assert!(!ctx.store.is_installed("pkga"));
		assert!(!ctx.store.is_installed("pkgb"));
		assert!(!ctx.root.join("etc/shared.conf").exists());
	}

	/// spec.md §8 S3: `openssl` is implicit and protected only through
	/// the capability it provides, not a literal dependency edge.
	#[test]
	fn s3_virtual_provider_autoremove_protection()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());

		ctx.store.set_package("openssl", &"1.0".parse().unwrap(), false);
		fs::create_dir_all(ctx.files_dir()).unwrap();
		fs::write(ctx.files_dir().join("openssl.provides"), "libssl\n").unwrap();
		ctx.store.add_provider("libssl", "openssl");

		ctx.store.set_package("curl", &"1.0".parse().unwrap(), true);
		ctx.store.write_deps("curl", &["libssl".to_string()]).unwrap();

		let removed = run_autoremove(&ctx).unwrap();
		assert!(removed.is_empty());
		assert!(ctx.store.is_installed("openssl"));
		assert!(ctx.store.is_installed("curl"));
	}

	/// spec.md §8 S4.
	#[test]
	fn s4_dependency_upgrade_breaks_existing_package()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());

		ctx.store.set_package("libtest", &"1.0".parse().unwrap(), false);
		ctx.store.set_package("oldapp", &"1.0".parse().unwrap(), true);
		ctx.store.write_deps("oldapp", &["libtest == 1.0".to_string()]).unwrap();

		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();
		let libtest2 = make_pkg_archive(&archives, "libtest-2.0", &[], &[("usr/lib/libtest.so.2", b"v2")], None);
		let newapp = make_pkg_archive(&archives, "newapp-1.0", &["libtest >= 2.0"], &[("usr/bin/newapp", b"x")], None);

		install_locals(&ctx, &[newapp, libtest2]).unwrap();

		assert!(!ctx.store.is_installed("oldapp"));
		assert!(ctx.store.is_installed("newapp"));
		assert_eq!(ctx.store.get_installed_version("libtest"), "2.0");
	}

	/// spec.md §8 S6.
	#[test]
	fn s6_config_file_protection()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		fs::create_dir_all(ctx.root.join("etc")).unwrap();
		fs::write(ctx.root.join("etc/my.conf"), "user content\n").unwrap();

		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();
		let pkg = make_pkg_archive(&archives, "myapp-1.0", &[], &[("etc/my.conf", b"upstream content\n")], None);
		install_locals(&ctx, &[pkg]).unwrap();

		assert_eq!(fs::read_to_string(ctx.root.join("etc/my.conf")).unwrap(), "user content\n");
		assert_eq!(fs::read_to_string(ctx.root.join("etc/my.conf.lpkgnew")).unwrap(), "upstream content\n");
	}

	/// spec.md §8 S7: resolving each other's dependency doesn't loop
	/// forever and both still end up installed.
	#[test]
	fn s7_circular_dependency()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();

		let a = make_pkg_archive(&archives, "A-1.0", &["B"], &[("usr/bin/a", b"a")], None);
		let b = make_pkg_archive(&archives, "B-1.0", &["A"], &[("usr/bin/b", b"b")], None);

		install_locals(&ctx, &[a, b]).unwrap();

		assert_eq!(ctx.store.get_installed_version("A"), "1.0");
		assert_eq!(ctx.store.get_installed_version("B"), "1.0");
	}

	/// spec.md §8 S8.
	#[test]
	fn s8_hash_enforcement()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();
		let pkg = make_pkg_archive(&archives, "hashtest-1.0", &[], &[("usr/bin/hashtest", b"x")], None);

		let bogus_hash: Sha256Hash = "0".repeat(64).parse().unwrap();
		let opts = TransactionOpts {
			fetcher: &NoopFetcher, index_loader: &EmptyIndex, triggers: &ShellTriggerExec,
			sink: &SilentSink, force_reinstall: false, assume_yes: true,
		};
		let targets = vec![UserTarget::Local(pkg, Some(bogus_hash))];

		let err = run_install(&ctx, &targets, &opts).unwrap_err();
		assert!(matches!(err, TransactionErr::Install(InstallErr::HashMismatch { .. })));
		assert!(!ctx.store.is_installed("hashtest"));
	}


	/// spec.md §8 invariants 2 and 3: every logical path an installed
	/// package claims in `files/<name>.txt` is reflected in the
	/// file-ownership table, and removing the package leaves no dangling
	/// entry behind.
	#[test]
	fn invariant_ownership_completeness_and_no_dangling_owners()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();
		let pkg = make_pkg_archive(&archives, "owntest-1.0", &[], &[("usr/bin/owntest", b"x")], None);
		install_locals(&ctx, &[pkg]).unwrap();

		let files_txt = fs::read_to_string(ctx.files_dir().join("owntest.txt")).unwrap();
		for line in files_txt.lines()
		{
			assert!(ctx.store.owners_of(Path::new(line)).contains("owntest"));
		}

		crate::core::remove::remove(&ctx, "owntest", false).unwrap();
		assert!(ctx.store.owners_of(Path::new("/usr/bin/owntest")).is_empty());
	}

	/// spec.md §8 invariant 1: no `.tmp` sibling survives a flush, and a
	/// fresh `StateStore::open` sees exactly what was just committed.
	#[test]
	fn invariant_state_store_durability_no_tmp_siblings()
	{
		let dir = tempfile::tempdir().unwrap();
		let ctx = ctx_at(dir.path());
		let archives = dir.path().join("archives");
		fs::create_dir_all(&archives).unwrap();
		let pkg = make_pkg_archive(&archives, "durable-1.0", &[], &[("usr/bin/durable", b"x")], None);
		install_locals(&ctx, &[pkg]).unwrap();

		assert!(!has_tmp_file(&ctx.var_dir()));
		assert!(!has_tmp_file(&ctx.files_dir()));
		assert!(!has_tmp_file(&ctx.store.deps_dir()));

		let reopened = StateStore::open(&ctx.var_dir()).unwrap();
		assert_eq!(reopened.get_installed_version("durable"), "1.0");
	}
}
