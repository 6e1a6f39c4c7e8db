//! `lpkg scan`
//!
//! The orphan scanner is named as an out-of-scope external collaborator
//! in spec.md §1 (`collab::OrphanScanner`); this command exists so the
//! surface is complete, but does no scanning.
use crate::command::CmdArg;

pub(crate) fn run(_carg: &CmdArg) -> Result<(), anyhow::Error>
{
	anyhow::bail!("scan not implemented in this build; see collab::OrphanScanner");
}
