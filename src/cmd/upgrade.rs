//! `lpkg upgrade`
//!
//! Walks every installed package, not just explicitly installed ones,
//! and lets the resolver decide what's newer (SPEC_FULL.md §B.4).
use crate::cmd::{self, Collaborators};
use crate::command::CmdArg;
use crate::core::transaction::{run_install, TransactionOpts, UserTarget};

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let ctx = cmd::build_ctx(&carg.clargs)?;
	let collab = Collaborators::default();

	let targets: Vec<UserTarget> = ctx.store.installed_names().into_iter()
			.map(|name| UserTarget::Named(name, None))
			.collect();

	if targets.is_empty()
	{
		crate::util::log::info("nothing installed, nothing to upgrade");
		return Ok(());
	}

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
