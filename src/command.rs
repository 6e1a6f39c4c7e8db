//! Central dispatch: parse args, build an `EngineContext`, hand off to
//! the per-command runner in `cmd::*`.

/// Command-line parsing and handling
mod line;
pub(crate) use line::LpkgArgs;
pub(crate) use line::LpkgCmd;
pub use line::parse;


use std::process::ExitCode;

#[derive(Debug)]
enum MyExit
{
	Ok,
	Code(u8),
}

impl From<()> for MyExit { fn from(_x: ()) -> Self { Self::Ok } }
impl From<u8> for MyExit { fn from(c: u8)  -> Self { Self::Code(c) } }

impl From<MyExit> for ExitCode
{
	fn from(my: MyExit) -> Self
	{
		use MyExit as M;
		match my {
			M::Ok      => Self::SUCCESS,
			M::Code(c) => c.into(),
		}
	}
}


/// Pass a bunch of info to the individual command runners as a block.
#[derive(Debug)]
pub(crate) struct CmdArg
{
	/// The command-line args.
	pub(crate) clargs: LpkgArgs,
}


/// Dispatch a command.
pub fn run(clargs: LpkgArgs) -> Result<ExitCode, anyhow::Error>
{
	init(&clargs)?;

	let carg = CmdArg { clargs };

	use line::LpkgCmd as LC;
	let myex: MyExit = match &carg.clargs.command {
		#[cfg(test)]
		LC::Dummy => unreachable!("not a real thing"),

		LC::Install { .. }   => crate::cmd::install::run(&carg)?.into(),
		LC::Reinstall { .. } => crate::cmd::reinstall::run(&carg)?.into(),
		LC::Upgrade          => crate::cmd::upgrade::run(&carg)?.into(),
		LC::Remove { .. }    => crate::cmd::remove::run(&carg)?.into(),
		LC::Autoremove       => crate::cmd::autoremove::run(&carg)?.into(),
		LC::Query { .. }     => crate::cmd::query::run(&carg)?.into(),
		LC::Man { .. }       => crate::cmd::man::run(&carg)?.into(),
		LC::Pack { .. }      => crate::cmd::pack::run(&carg)?.into(),
		LC::Scan             => crate::cmd::scan::run(&carg)?.into(),
	};
	Ok(myex.into())
}


/// Any early initialization we care about.  Unlike the teacher, lpkg
/// has no cached-euid or uid/gid comparison concept to set up (spec.md
/// §4.2: no uid/gid name lookups at all), so this is currently a no-op
/// kept for symmetry with the dispatch shape.
pub fn init(_clargs: &LpkgArgs) -> Result<(), anyhow::Error>
{
	Ok(())
}
