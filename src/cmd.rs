//! Per-subcommand runners, one module each, dispatched from
//! `command::run`.
pub(crate) mod install;
pub(crate) mod reinstall;
pub(crate) mod upgrade;
pub(crate) mod remove;
pub(crate) mod autoremove;
pub(crate) mod query;
pub(crate) mod man;
pub(crate) mod pack;
pub(crate) mod scan;

use std::path::PathBuf;

use crate::collab::{Fetcher as _, HttpFetcher, PlainCatalog, ShellTriggerExec};
use crate::command::LpkgArgs;
use crate::config::{EngineContext, EngineFlags};
use crate::util::log::TermSink;


/// Build the `EngineContext` shared by every command runner from the
/// global CLI flags.
pub(crate) fn build_ctx(clargs: &LpkgArgs) -> Result<EngineContext, anyhow::Error>
{
	let flags = EngineFlags {
		force: clargs.force,
		force_overwrite: clargs.force_overwrite,
		no_hooks: clargs.no_hooks,
		no_deps: clargs.no_deps,
		non_interactive: if clargs.non_interactive { Some(true) } else { None },
	};

	let mut ctx = EngineContext::open(clargs.root.clone(), flags)?;
	if let Some(arch) = &clargs.arch { ctx.config.arch = arch.clone(); }
	Ok(ctx)
}

/// The real collaborator set the binary wires the transaction engine
/// against, as plain values rather than a shared singleton (spec.md §9
/// "no global statics").
pub(crate) struct Collaborators
{
	pub(crate) fetcher: HttpFetcher,
	pub(crate) index: HttpIndexLoader,
	pub(crate) triggers: ShellTriggerExec,
	pub(crate) sink: TermSink,
	#[allow(dead_code)]
	pub(crate) catalog: PlainCatalog,
}

impl Default for Collaborators
{
	fn default() -> Self
	{
		Collaborators {
			fetcher: HttpFetcher::default(),
			index: HttpIndexLoader,
			triggers: ShellTriggerExec,
			sink: TermSink,
			catalog: PlainCatalog,
		}
	}
}

/// Locates the repository index/latest-version text over HTTP, via the
/// mirror base URL in `Config`.  Parsing stays in `core::repo`; this is
/// just the fetch-or-local-read seam spec.md §1 calls out as external.
pub(crate) struct HttpIndexLoader;

impl crate::collab::IndexLoader for HttpIndexLoader
{
	fn load_index(&self, mirror: &str, arch: &str) -> Result<String, anyhow::Error>
	{
		fetch_text(&format!("{mirror}/{arch}/index.txt"))
	}

	fn load_latest(&self, mirror: &str, arch: &str, name: &str) -> Result<String, anyhow::Error>
	{
		fetch_text(&format!("{mirror}/{arch}/{name}/latest.txt"))
	}
}

fn fetch_text(url: &str) -> Result<String, anyhow::Error>
{
	let tmp = std::env::temp_dir().join(format!("lpkg-index-{}", std::process::id()));
	HttpFetcher::default().fetch(url, &tmp)?;
	let text = std::fs::read_to_string(&tmp)?;
	let _ = std::fs::remove_file(&tmp);
	Ok(text)
}

/// Parse a user-supplied install target (`name`, `name:version` or a
/// filesystem path to a local archive) into what the transaction engine
/// expects.
pub(crate) fn parse_target(raw: &str, hash: Option<crate::util::hash::Sha256Hash>)
		-> crate::core::transaction::UserTarget
{
	use crate::core::transaction::UserTarget;

	let path = PathBuf::from(raw);
	if raw.contains('/') || path.is_file()
	{
		return UserTarget::Local(path, hash);
	}

	match raw.split_once(':')
	{
		Some((name, ver)) => UserTarget::Named(name.to_string(), ver.parse().ok()),
		None => UserTarget::Named(raw.to_string(), None),
	}
}
