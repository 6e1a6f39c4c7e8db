//! `lpkg remove <names>...`
use crate::cmd;
use crate::command::CmdArg;
use crate::command::LpkgCmd;
use crate::core::transaction::run_remove;

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let LpkgCmd::Remove { names } = &carg.clargs.command else {
		unreachable!("dispatched as remove but args aren't");
	};

	let ctx = cmd::build_ctx(&carg.clargs)?;
	run_remove(&ctx, names, carg.clargs.force)?;
	Ok(())
}
