//! `lpkg query <name|path>`
//!
//! Resolves both package names and filesystem paths (SPEC_FULL.md §B.2):
//! a bare name lists that package's owned files; anything containing a
//! `/` is tried as a path, first as given, then resolved against the
//! target root, then with a leading `/` prepended.
use std::path::{Path, PathBuf};

use crate::cmd;
use crate::command::CmdArg;
use crate::command::LpkgCmd;
use crate::config::EngineContext;
use crate::util::fs::read_lines;
use crate::util::log;

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let LpkgCmd::Query { arg } = &carg.clargs.command else {
		unreachable!("dispatched as query but args aren't");
	};

	let ctx = cmd::build_ctx(&carg.clargs)?;

	if !arg.contains('/')
	{
		return query_by_name(&ctx, arg);
	}

	query_by_path(&ctx, arg)
}

fn query_by_name(ctx: &EngineContext, name: &str) -> Result<(), anyhow::Error>
{
	if !ctx.store.is_installed(name)
	{
		anyhow::bail!("no such package: {name}");
	}

	let lines = read_lines(&ctx.files_dir().join(format!("{name}.txt")))?;
	for line in lines { println!("{line}"); }
	Ok(())
}

fn query_by_path(ctx: &EngineContext, arg: &str) -> Result<(), anyhow::Error>
{
	let given = Path::new(arg);
	let mut owners = ctx.store.owners_of(given);

	if owners.is_empty()
	{
		if let Ok(rel) = given.strip_prefix(&ctx.root)
		{
			let logical = Path::new("/").join(rel);
			owners = ctx.store.owners_of(&logical);
		}
	}

	if owners.is_empty()
	{
		let with_slash = PathBuf::from(format!("/{}", arg.trim_start_matches('/')));
		owners = ctx.store.owners_of(&with_slash);
	}

	if owners.is_empty()
	{
		log::info(&format!("{arg}: not owned by any installed package"));
		return Ok(());
	}

	let mut owners: Vec<_> = owners.into_iter().collect();
	owners.sort();
	for owner in owners { println!("{owner}"); }
	Ok(())
}
