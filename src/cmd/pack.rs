//! `lpkg pack <dir>`
//!
//! The packer tool is named as an out-of-scope external collaborator in
//! spec.md §1 (`collab::Packer`); this command exists so the surface is
//! complete, but does no packing.
use crate::command::CmdArg;
use crate::command::LpkgCmd;

pub(crate) fn run(carg: &CmdArg) -> Result<(), anyhow::Error>
{
	let LpkgCmd::Pack { dir } = &carg.clargs.command else {
		unreachable!("dispatched as pack but args aren't");
	};

	anyhow::bail!("pack not implemented in this build; see collab::Packer ({})", dir.display());
}
