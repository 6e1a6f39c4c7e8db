//! `lpkg install <targets>...`
use crate::cmd::{self, Collaborators};
use crate::command::CmdArg;
use crate::command::LpkgCmd;
use crate::core::transaction::{run_install, TransactionOpts};

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let LpkgCmd::Install { targets } = &carg.clargs.command else {
		unreachable!("dispatched as install but args aren't");
	};

	let ctx = cmd::build_ctx(&carg.clargs)?;
	let collab = Collaborators::default();

	let targets: Vec<_> = targets.iter()
			.map(|t| cmd::parse_target(t, carg.clargs.hash))
			.collect();

	let opts = TransactionOpts {
		fetcher: &collab.fetcher,
		index_loader: &collab.index,
		triggers: &collab.triggers,
		sink: &collab.sink,
		force_reinstall: false,
		assume_yes: carg.clargs.non_interactive,
	};

	run_install(&ctx, &targets, &opts)?;
	Ok(())
}
