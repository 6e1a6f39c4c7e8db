//! `lpkg man <name>`
//!
//! Prints `docs/<name>.man` verbatim, the one place a doc string is
//! copied through untouched rather than templated (SPEC_FULL.md §B.5).
use crate::cmd;
use crate::command::CmdArg;
use crate::command::LpkgCmd;

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let LpkgCmd::Man { name } = &carg.clargs.command else {
		unreachable!("dispatched as man but args aren't");
	};

	let ctx = cmd::build_ctx(&carg.clargs)?;
	let path = ctx.docs_dir().join(format!("{name}.man"));

	if !path.is_file()
	{
		anyhow::bail!("no man page recorded for {name}");
	}

	let text = std::fs::read_to_string(&path)?;
	print!("{text}");
	Ok(())
}
