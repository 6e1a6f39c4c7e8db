//! Installation task (C8): per-package fetch+verify, extract+validate,
//! conflict-check, copy-with-backup, register, upgrade-cleanup and
//! post-install hook, with explicit rollback state (spec.md §4.8, §9 —
//! "do not rely on stack-unwinding for state reversion").
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::collab::{Fetcher, TriggerExec};
use crate::config::EngineContext;
use crate::core::archive::extract;
use crate::core::resolver::{PlanItem, Source};
use crate::util::fs::reroot;
use crate::util::hash::check_sha256_file;
use crate::util::log;


#[derive(Debug, thiserror::Error)]
pub(crate) enum InstallErr
{
	#[error("incomplete package {0}: missing {1}")]
	IncompletePackage(String, &'static str),

	#[error("bad hash for {name}: {source}")]
	HashMismatch { name: String, source: anyhow::Error },

	#[error("file conflicts installing {name}:\n{}", .conflicts.join("\n"))]
	FileConflict { name: String, conflicts: Vec<String> },

	#[error(transparent)]
	Extract(#[from] crate::core::archive::ExtractErr),

	#[error(transparent)]
	IO(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}


/// Explicit rollback state, per spec.md §9 ("the backup/restore lists
/// are explicit and must be processed by the rollback routine
/// regardless of how the failure was signalled").
#[derive(Debug, Default)]
pub(crate) struct RollbackState
{
	installed_files: Vec<PathBuf>,
	created_dirs: Vec<PathBuf>,
	backups: Vec<(PathBuf, PathBuf)>,
}

impl RollbackState
{
	/// Undo everything recorded so far.  Called on any failure between
	/// FETCHED and REGISTERED.
	pub(crate) fn rollback(&self)
	{
		for f in &self.installed_files { let _ = fs::remove_file(f); }
		for (backup, original) in self.backups.iter().rev()
		{
			let _ = fs::rename(backup, original);
		}
		for d in self.created_dirs.iter().rev()
		{
			if fs::read_dir(d).map(|mut it| it.next().is_none()).unwrap_or(false)
			{
				let _ = fs::remove_dir(d);
			}
		}
	}
}


/// Fetch (if remote) and verify the archive's hash.  Returns the local
/// path to the (possibly just-downloaded) archive file.
pub(crate) fn fetch_and_verify(ctx: &EngineContext, item: &PlanItem, fetcher: &dyn Fetcher)
		-> Result<PathBuf, InstallErr>
{
	match &item.source
	{
		Source::LocalArchive(path) => {
			if let Some(expect) = &item.expected_sha256
			{
				check_sha256_file(path, &expect.to_string())
						.map_err(|e| InstallErr::HashMismatch { name: item.name.clone(), source: e.into() })?;
			}
			Ok(path.clone())
		},
		Source::Remote => {
			let url = format!("{}/{}/{}/{}/app.tar.zst",
					ctx.config.mirror, ctx.config.arch, item.name, item.desired_version);
			let dest = ctx.tmp_dir(std::process::id()).join(format!("{}.tar.zst", item.name));
			if let Some(parent) = dest.parent() { fs::create_dir_all(parent)?; }
			fetcher.fetch(&url, &dest)?;

			if let Some(expect) = &item.expected_sha256
			{
				check_sha256_file(&dest, &expect.to_string())
						.map_err(|e| InstallErr::HashMismatch { name: item.name.clone(), source: e.into() })?;
			}
			Ok(dest)
		},
	}
}


/// Extract into `TMP/<pid>/<name>/`, then validate the required layout
/// is present (spec.md §4.8).
pub(crate) fn extract_and_validate(ctx: &EngineContext, item: &PlanItem, archive: &Path,
		sink: &dyn log::ProgressSink) -> Result<PathBuf, InstallErr>
{
	let workdir = ctx.tmp_dir(std::process::id()).join(&item.name);
	extract(archive, &workdir, sink)?;

	for required in ["man.txt", "deps.txt", "files.txt"]
	{
		if !workdir.join(required).is_file()
		{
			return Err(InstallErr::IncompletePackage(item.name.clone(), required));
		}
	}
	if !workdir.join("content").is_dir()
	{
		return Err(InstallErr::IncompletePackage(item.name.clone(), "content/"));
	}

	Ok(workdir)
}


pub(crate) struct FilesEntry { pub(crate) src: PathBuf, pub(crate) logical: PathBuf, pub(crate) is_dir: bool }

pub(crate) fn parse_files_txt(workdir: &Path) -> Result<Vec<FilesEntry>, InstallErr>
{
	let text = fs::read_to_string(workdir.join("files.txt"))?;
	let mut out = Vec::new();
	for line in text.lines()
	{
		let line = line.trim_end_matches('\r');
		if line.is_empty() { continue; }
		let (src, dest_prefix) = line.split_once('\t')
				.ok_or_else(|| anyhow::anyhow!("bad files.txt line: {line}"))?;
		let logical = PathBuf::from(dest_prefix).join(src);
		let src = PathBuf::from(src);
		let is_dir = fs::symlink_metadata(workdir.join("content").join(&src))
				.map(|m| m.is_dir()).unwrap_or(false);
		out.push(FilesEntry { src, logical, is_dir });
	}
	Ok(out)
}


/// File-conflict detection (spec.md §4.8): builds the set of conflicts
/// against already-owned paths and unexpected manual files.
pub(crate) fn check_file_conflicts(ctx: &EngineContext, item: &PlanItem, entries: &[FilesEntry],
		is_upgrade_of_self: bool) -> Result<(), InstallErr>
{
	let mut conflicts = Vec::new();

	for entry in entries
	{
		if entry.is_dir { continue; }

		let owners = ctx.store.owners_of(&entry.logical);
		if !owners.is_empty() && !owners.contains(&item.name)
		{
			conflicts.push(format!("{}: owned by {}", entry.logical.display(),
					owners.into_iter().collect::<Vec<_>>().join(",")));
			continue;
		}

		if owners.is_empty()
		{
			let logical_str = entry.logical.to_string_lossy();
			if logical_str.trim_start_matches('/').starts_with("etc/") { continue; }

			let physical = reroot(&entry.logical, &ctx.root);
			let exists = fs::symlink_metadata(&physical).is_ok();
			if exists && !is_upgrade_of_self && !ctx.force_overwrite
			{
				conflicts.push(format!("{}: unknown (manual file)", entry.logical.display()));
			}
		}
	}

	if !conflicts.is_empty()
	{
		return Err(InstallErr::FileConflict { name: item.name.clone(), conflicts });
	}
	Ok(())
}


/// Copy content into the target root, with config-file and backup
/// handling (spec.md §4.8 "Copy").
pub(crate) fn copy_files(ctx: &EngineContext, item: &PlanItem, workdir: &Path,
		entries: &[FilesEntry], rollback: &mut RollbackState, triggers: &dyn TriggerExec)
		-> Result<Vec<PathBuf>, InstallErr>
{
	let mut installed_logical = Vec::new();

	for entry in entries
	{
		let physical = reroot(&entry.logical, &ctx.root);
		if let Some(parent) = physical.parent()
		{
			let rel = parent.strip_prefix(&ctx.root).unwrap_or(parent);
			let mut cur = PathBuf::new();
			for comp in rel.components()
			{
				cur.push(comp);
				let full = ctx.root.join(&cur);
				if !full.exists()
				{
					fs::create_dir(&full).or_else(|e| if e.kind() == std::io::ErrorKind::NotFound
							{ fs::create_dir_all(&full) } else { Err(e) })?;
					rollback.created_dirs.push(full);
				}
			}
		}

		if entry.is_dir
		{
			if !physical.is_dir()
			{
				fs::create_dir_all(&physical)?;
				rollback.created_dirs.push(physical.clone());
			}
			continue;
		}

		let logical_str = entry.logical.to_string_lossy().into_owned();
		let exists_non_dir = fs::symlink_metadata(&physical)
				.map(|m| !m.is_dir()).unwrap_or(false);

		if logical_str.trim_start_matches('/').starts_with("etc/") && exists_non_dir
		{
			let target = PathBuf::from(format!("{}.lpkgnew", physical.display()));
			fs::copy(workdir.join("content").join(&entry.src), &target)?;
			log::warning(&format!("{}: config file preserved, new version at {}",
					physical.display(), target.display()));
		}
		else
		{
			if exists_non_dir
			{
				let backup = PathBuf::from(format!("{}.lpkg_bak_{}", physical.display(), item.name));
				fs::rename(&physical, &backup)?;
				rollback.backups.push((backup, physical.clone()));
			}

			let src = workdir.join("content").join(&entry.src);
			let meta = fs::symlink_metadata(&src)?;
			if meta.file_type().is_symlink()
			{
				let link_target = fs::read_link(&src)?;
				std::os::unix::fs::symlink(&link_target, &physical)?;
			}
			else if meta.is_dir()
			{
				fs::create_dir_all(&physical)?;
			}
			else
			{
				fs::copy(&src, &physical)?;
				let _ = fs::set_permissions(&physical, meta.permissions());
			}

			rollback.installed_files.push(physical.clone());
			installed_logical.push(entry.logical.clone());
			let _ = triggers; // trigger enqueue happens at the transaction level, keyed on logical path
		}
	}

	Ok(installed_logical)
}


/// Logical (root-relative) paths of every directory created for this
/// install, explicit directory entries and implicit parents alike,
/// deduped and sorted.
pub(crate) fn dir_logical_paths(ctx: &EngineContext, rollback: &RollbackState) -> Vec<PathBuf>
{
	let mut dirs: Vec<PathBuf> = rollback.created_dirs.iter()
			.map(|d| {
				let rel = d.strip_prefix(&ctx.root).unwrap_or(d);
				PathBuf::from(format!("/{}", rel.display()))
			})
			.collect();
	dirs.sort();
	dirs.dedup();
	dirs
}


/// Register the install in the state store (spec.md §4.8
/// "Register").
pub(crate) fn register(ctx: &EngineContext, item: &PlanItem, workdir: &Path,
		installed_logical: &[PathBuf], rollback: &RollbackState, is_upgrade: bool) -> Result<(), InstallErr>
{
	if is_upgrade
	{
		let old_provides = ctx.files_dir().join(format!("{}.provides", item.name));
		if let Ok(text) = fs::read_to_string(&old_provides)
		{
			for cap in text.lines().map(str::trim).filter(|l| !l.is_empty())
			{
				ctx.store.remove_provider(cap, &item.name);
			}
		}
	}

	let dep_lines: Vec<String> = item.deps.iter().map(|(n, op, v)| {
		match (op, v) {
			(Some(o), Some(ver)) => format!("{n} {o} {ver}"),
			_ => n.clone(),
		}
	}).collect();
	ctx.store.write_deps(&item.name, &dep_lines).map_err(anyhow::Error::from)?;

	fs::create_dir_all(ctx.files_dir())?;
	let files_txt = ctx.files_dir().join(format!("{}.txt", item.name));
	let lines: Vec<String> = installed_logical.iter().map(|p| p.display().to_string()).collect();
	crate::util::fs::write_atomic(&files_txt, (lines.join("\n") + "\n").as_bytes())?;
	for logical in installed_logical { ctx.store.add_file_owner(logical, &item.name); }

	let dirs_txt = ctx.files_dir().join(format!("{}.dirs", item.name));
	let dir_lines: Vec<String> = dir_logical_paths(ctx, rollback).iter().map(|p| p.display().to_string()).collect();
	crate::util::fs::write_atomic(&dirs_txt, (dir_lines.join("\n") + "\n").as_bytes())?;

	fs::create_dir_all(ctx.docs_dir())?;
	let man_src = workdir.join("man.txt");
	if man_src.is_file()
	{
		fs::copy(&man_src, ctx.docs_dir().join(format!("{}.man", item.name)))?;
	}

	let provides_src = workdir.join("provides.txt");
	if provides_src.is_file()
	{
		let text = fs::read_to_string(&provides_src)?;
		let dest = ctx.files_dir().join(format!("{}.provides", item.name));
		crate::util::fs::write_atomic(&dest, text.as_bytes())?;
		for cap in text.lines().map(str::trim).filter(|l| !l.is_empty())
		{
			ctx.store.add_provider(cap, &item.name);
		}
	}

	ctx.store.set_package(&item.name, &item.desired_version, item.is_explicit);
	Ok(())
}


/// Upgrade cleanup (spec.md §4.8): drop ownership/physically remove
/// files owned by the previous version's manifest that the new one
/// doesn't claim, unless under `/etc/`; then remove directories the
/// previous version created that the new one no longer lists, deepest
/// first, leaving any that are still non-empty.
pub(crate) fn upgrade_cleanup(ctx: &EngineContext, name: &str, old_logical: &HashSet<PathBuf>,
		new_logical: &HashSet<PathBuf>, old_dirs: &HashSet<PathBuf>, new_dirs: &HashSet<PathBuf>)
		-> Result<(), InstallErr>
{
	for old in old_logical.difference(new_logical)
	{
		let old_str = old.to_string_lossy();
		if old_str.trim_start_matches('/').starts_with("etc/") { continue; }

		let no_owners_left = ctx.store.remove_file_owner(old, name);
		if no_owners_left
		{
			let physical = reroot(old, &ctx.root);
			let _ = fs::remove_file(physical);
		}
	}

	let mut stale_dirs: Vec<&PathBuf> = old_dirs.difference(new_dirs).collect();
	stale_dirs.sort();
	for old in stale_dirs.into_iter().rev()
	{
		let physical = reroot(old, &ctx.root);
		let _ = fs::remove_dir(physical);
	}

	Ok(())
}


/// Post-install hook invocation (spec.md §4.8 / §4.11).
pub(crate) fn run_post_install_hook(ctx: &EngineContext, item: &PlanItem, workdir: &Path)
		-> Result<(), InstallErr>
{
	let hooks_src = workdir.join("hooks");
	if !hooks_src.is_dir() { return Ok(()); }

	let dest = ctx.hooks_dir().join(&item.name);
	fs::create_dir_all(&dest)?;
	for entry in fs::read_dir(&hooks_src)?
	{
		let entry = entry?;
		let target = dest.join(entry.file_name());
		fs::copy(entry.path(), &target)?;
		let mut perms = fs::metadata(&target)?.permissions();
		use std::os::unix::fs::PermissionsExt as _;
		perms.set_mode(perms.mode() | 0o111);
		fs::set_permissions(&target, perms)?;
	}

	if ctx.no_hooks { return Ok(()); }
	if let Err(e) = crate::core::hooks::run_hook(ctx, &item.name, "postinst.sh")
	{
		log::warning(&format!("postinst hook for {} failed: {e}", item.name));
	}
	Ok(())
}
