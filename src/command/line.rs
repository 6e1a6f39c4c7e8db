//! Command line handling
//!
//! General invocation:
//! $0 [global-opts] <command> [command-args]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::util::hash::Sha256Hash;


/// Main arg entry point
#[cfg_attr(test, derive(Default))]
#[derive(Debug)]
#[derive(Parser)]
#[command(about = "Cross-distro package manager for Linux-from-Scratch-style systems.")]
#[command(version)]
pub struct LpkgArgs
{
	#[command(subcommand)]
	pub(crate) command: LpkgCmd,

	/// Operate on a system rooted somewhere other than `/`.
	#[arg(long, default_value = "/")]
	pub(crate) root: PathBuf,

	/// Architecture to request from the mirror, overriding `mirror.conf`.
	#[arg(long)]
	pub(crate) arch: Option<String>,

	/// Ignore essential-package and reverse-dependency guards on removal.
	#[arg(long)]
	pub(crate) force: bool,

	/// Overwrite files already owned by another package instead of
	/// failing the transaction.
	#[arg(long)]
	pub(crate) force_overwrite: bool,

	/// Skip running `postinst.sh`/`prerm.sh` hooks.
	#[arg(long)]
	pub(crate) no_hooks: bool,

	/// Don't pull in dependencies; install only the named packages.
	#[arg(long)]
	pub(crate) no_deps: bool,

	/// Expected SHA256 of a local archive.  Only legal alongside a single
	/// filesystem-path install target.
	#[arg(long)]
	pub(crate) hash: Option<Sha256Hash>,

	/// Never prompt; answer every confirmation as if `-y` were given.
	#[arg(short = 'y', long)]
	pub(crate) non_interactive: bool,
}

#[cfg_attr(test, derive(Default))]
#[derive(Debug, Subcommand)]
pub(crate) enum LpkgCmd
{
	/// Dummy value (mostly to make derive(Default) happy in tests).
	#[cfg(test)]
	#[cfg_attr(test, default)]
	#[command(skip)]
	Dummy,

	/// Install one or more packages, by name or local archive path.
	Install
	{
		/// Package names (optionally `name:version`) or archive paths.
		targets: Vec<String>,
	},

	/// Remove one or more installed packages.
	Remove
	{
		names: Vec<String>,
	},

	/// Remove implicit packages that no longer have a reverse dependency.
	Autoremove,

	/// Upgrade every installed package (not just explicitly installed
	/// ones) to the repository's latest matching version.
	Upgrade,

	/// Reinstall a package, overwriting its own files for the duration
	/// of the call.
	Reinstall
	{
		targets: Vec<String>,
	},

	/// List a package's owned files, or the package(s) owning a path.
	Query
	{
		arg: String,
	},

	/// Print a package's man page, as recorded at install time.
	Man
	{
		name: String,
	},

	/// Build a package archive from a staged tree.  Not implemented in
	/// this build; see `collab::Packer`.
	Pack
	{
		dir: PathBuf,
	},

	/// Scan for orphaned files not owned by any installed package.  Not
	/// implemented in this build; see `collab::OrphanScanner`.
	Scan,
}

impl std::fmt::Display for LpkgCmd
{
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
	{
		let name = match self
		{
			LpkgCmd::Install { .. } => "install",
			LpkgCmd::Remove { .. } => "remove",
			LpkgCmd::Autoremove => "autoremove",
			LpkgCmd::Upgrade => "upgrade",
			LpkgCmd::Reinstall { .. } => "reinstall",
			LpkgCmd::Query { .. } => "query",
			LpkgCmd::Man { .. } => "man",
			LpkgCmd::Pack { .. } => "pack",
			LpkgCmd::Scan => "scan",
		};
		write!(f, "{name}")
	}
}

/// Parse `argv`, panicking on a usage error the way `clap` does by
/// default (prints usage to stderr and exits).
pub(crate) fn parse() -> LpkgArgs
{
	LpkgArgs::parse()
}
