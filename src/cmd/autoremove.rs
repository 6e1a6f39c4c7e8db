//! `lpkg autoremove`
use crate::cmd;
use crate::command::CmdArg;
use crate::core::transaction::run_autoremove;

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let ctx = cmd::build_ctx(&carg.clargs)?;
	let removed = run_autoremove(&ctx)?;

	if removed.is_empty()
	{
		crate::util::log::info("nothing to autoremove");
	}
	else
	{
		crate::util::log::info(&format!("removed: {}", removed.join(", ")));
	}
	Ok(())
}
