//! Removal engine (C10): essential/reverse-dependency guards, the
//! `prerm.sh` hook, shared-file-aware deletion and manifest cleanup
//! (spec.md §4.10).
use std::fs;
use std::path::PathBuf;

use crate::config::EngineContext;
use crate::core::hooks::run_hook;
use crate::util::fs::{read_lines, reroot};
use crate::util::log;


#[derive(Debug, thiserror::Error)]
pub(crate) enum RemoveErr
{
	#[error("{0} is essential, refusing to remove without force")]
	Essential(String),

	#[error("{0} is depended on by: {1}")]
	ReverseDep(String, String),

	#[error("{0}'s capability is depended on by: {1}")]
	ProviderReverseDep(String, String),

	#[error("shared files remain for {0}; use force to remove anyway")]
	SharedFile(String),

	#[error(transparent)]
	IO(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}


/// `remove(name, force)`, per spec.md §4.10.  No-op if `name` isn't
/// installed.
pub(crate) fn remove(ctx: &EngineContext, name: &str, force: bool) -> Result<(), RemoveErr>
{
	if !ctx.store.is_installed(name) { return Ok(()); }

	if !force
	{
		if ctx.essentials().contains(name)
		{
			return Err(RemoveErr::Essential(name.to_string()));
		}

		let rdeps = ctx.store.reverse_deps_of(name);
		if !rdeps.is_empty()
		{
			let mut v: Vec<_> = rdeps.into_iter().collect();
			v.sort();
			return Err(RemoveErr::ReverseDep(name.to_string(), v.join(", ")));
		}

		let provides_file = ctx.files_dir().join(format!("{name}.provides"));
		for cap in read_lines(&provides_file)?
		{
			let rdeps = ctx.store.reverse_deps_of(&cap);
			let rdeps: Vec<_> = rdeps.into_iter().filter(|n| n != name).collect();
			if !rdeps.is_empty()
			{
				let mut v = rdeps;
				v.sort();
				return Err(RemoveErr::ProviderReverseDep(name.to_string(), v.join(", ")));
			}
		}
	}

	if let Err(e) = run_hook(ctx, name, "prerm.sh")
	{
		log::warning(&format!("prerm hook for {name} failed: {e}"));
	}

	let files_txt = ctx.files_dir().join(format!("{name}.txt"));
	let mut owned_paths: Vec<PathBuf> = read_lines(&files_txt)?.into_iter().map(PathBuf::from).collect();
	owned_paths.sort();
	owned_paths.reverse();

	for logical in &owned_paths
	{
		let owners = ctx.store.owners_of(logical);
		if owners.len() > 1 && !force
		{
			log::warning(&format!("{}: shared with {}, leaving on disk",
					logical.display(), owners.iter().filter(|o| o.as_str() != name)
							.cloned().collect::<Vec<_>>().join(",")));
			ctx.store.remove_file_owner(logical, name);
			continue;
		}

		let no_owners_left = ctx.store.remove_file_owner(logical, name);
		if no_owners_left
		{
			let physical = reroot(logical, &ctx.root);
			let _ = fs::remove_file(&physical);
		}
	}

	let dirs_txt = ctx.files_dir().join(format!("{name}.dirs"));
	let mut dirs: Vec<PathBuf> = read_lines(&dirs_txt)?.into_iter().map(PathBuf::from).collect();
	dirs.sort();
	dirs.reverse();
	for logical in &dirs
	{
		let physical = reroot(logical, &ctx.root);
		let _ = fs::remove_dir(&physical);
	}

	let provides_file = ctx.files_dir().join(format!("{name}.provides"));
	for cap in read_lines(&provides_file)?
	{
		ctx.store.remove_provider(&cap, name);
	}

	ctx.store.remove_deps(name);
	ctx.store.remove_package(name);

	let _ = fs::remove_file(&files_txt);
	let _ = fs::remove_file(&dirs_txt);
	let _ = fs::remove_file(&provides_file);
	let _ = fs::remove_file(ctx.store.deps_dir().join(name));
	let _ = fs::remove_file(ctx.docs_dir().join(format!("{name}.man")));
	let _ = fs::remove_dir_all(ctx.hooks_dir().join(name));

	Ok(())
}
