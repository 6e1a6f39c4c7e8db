//! `lpkg reinstall <targets>...`
//!
//! Forces overwrite of the package's own files, scoped to this call
//! only (spec.md §9 open question, SPEC_FULL.md §B.1): the original
//! `reinstall_package` flips a process-wide flag for the duration of
//! the call and restores it afterward, including on error.  We keep
//! that behaviour but scope it with an RAII guard instead of a global.
use crate::cmd::{self, Collaborators};
use crate::command::CmdArg;
use crate::command::LpkgCmd;
use crate::config::EngineContext;
use crate::core::transaction::{run_install, TransactionOpts};

struct ForceOverwriteGuard<'a>
{
	ctx: &'a mut EngineContext,
	prev: bool,
}

impl<'a> ForceOverwriteGuard<'a>
{
	fn scope(ctx: &'a mut EngineContext) -> Self
	{
		let prev = ctx.force_overwrite;
		ctx.force_overwrite = true;
		ForceOverwriteGuard { ctx, prev }
	}
}

impl<'a> Drop for ForceOverwriteGuard<'a>
{
	fn drop(&mut self) { self.ctx.force_overwrite = self.prev; }
}

impl<'a> std::ops::Deref for ForceOverwriteGuard<'a>
{
	type Target = EngineContext;
	fn deref(&self) -> &EngineContext { self.ctx }
}

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let LpkgCmd::Reinstall { targets } = &carg.clargs.command else {
		unreachable!("dispatched as reinstall but args aren't");
	};

	let mut ctx = cmd::build_ctx(&carg.clargs)?;
	let collab = Collaborators::default();

	let targets: Vec<_> = targets.iter()
			.map(|t| cmd::parse_target(t, carg.clargs.hash))
			.collect();

	let opts = TransactionOpts {
		fetcher: &collab.fetcher,
		index_loader: &collab.index,
		triggers: &collab.triggers,
		sink: &collab.sink,
		force_reinstall: true,
		assume_yes: carg.clargs.non_interactive,
	};

	let guard = ForceOverwriteGuard::scope(&mut ctx);
	run_install(&guard, &targets, &opts)?;
	Ok(())
}
