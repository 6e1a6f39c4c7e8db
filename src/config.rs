//! Loading `mirror.conf`/`essential`/`triggers.conf` and the runtime
//! `EngineContext` threaded through every component (spec.md §6.1, §9).
use std::path::{Path, PathBuf};
use std::collections::HashSet;

use regex_lite::Regex;
use thiserror::Error;

use crate::core::store::StateStore;
use crate::core::lock::ExclusiveLock;


#[derive(Debug)]
#[derive(derivative::Derivative)]
#[derivative(Default)]
pub struct Config
{
	/// Base URL of the mirror to fetch archives/index from.
	pub(crate) mirror: String,

	/// Architecture to request from the mirror (e.g. `x86_64`).
	#[derivative(Default(value="\"x86_64\".to_string()"))]
	pub(crate) arch: String,

	/// One compiled trigger pattern per `triggers.conf` line, plus the
	/// built-ins (ldconfig, service-manager reload, icon cache, schema
	/// compiler) appended at load time.
	pub(crate) triggers: Vec<(Regex, String)>,
}

#[derive(Debug, Error)]
pub(crate) enum ConfigErr
{
	#[error("config file I/O error: {0}")]
	IO(#[from] std::io::Error),

	#[error("config syntax error: {0}")]
	Syntax(String),
}


/// Built-in triggers, always present regardless of `triggers.conf`
/// (spec.md §6.1).
fn builtin_triggers() -> Vec<(Regex, String)>
{
	vec![
		(Regex::new(r"^usr/lib/.*\.so").unwrap(), "ldconfig".to_string()),
		(Regex::new(r"^usr/lib/systemd/system/").unwrap(), "systemctl daemon-reload".to_string()),
		(Regex::new(r"^usr/share/icons/").unwrap(), "gtk-update-icon-cache".to_string()),
		(Regex::new(r"^usr/share/glib-2\.0/schemas/").unwrap(), "glib-compile-schemas".to_string()),
	]
}


/// Load `mirror.conf` and `triggers.conf` under `etc_dir` (normally
/// `<root>/etc/lpkg`).
pub(crate) fn load(etc_dir: &Path) -> Result<Config, ConfigErr>
{
	let mut config = Config::default();

	let mirror_file = etc_dir.join("mirror.conf");
	if mirror_file.is_file()
	{
		let contents = std::fs::read_to_string(&mirror_file)?;
		let first = contents.lines().find(|l| !l.trim().is_empty())
				.ok_or_else(|| ConfigErr::Syntax("mirror.conf has no non-empty line".to_string()))?;
		config.mirror = first.trim().trim_end_matches('/').to_string();
	}

	config.triggers = builtin_triggers();
	let triggers_file = etc_dir.join("triggers.conf");
	if triggers_file.is_file()
	{
		let contents = std::fs::read_to_string(&triggers_file)?;
		for line in contents.lines()
		{
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') { continue; }

			let (pat, cmd) = line.split_once(char::is_whitespace)
					.ok_or_else(|| ConfigErr::Syntax(format!("bad triggers.conf line: {line}")))?;
			let re = Regex::new(pat).map_err(|e| ConfigErr::Syntax(format!("bad regex '{pat}': {e}")))?;
			config.triggers.push((re, cmd.trim().to_string()));
		}
	}

	Ok(config)
}


/// Explicit engine context threaded through every component instead of
/// the legacy global `Cache::instance()` singleton (spec.md §9).
pub(crate) struct EngineContext
{
	pub(crate) root: PathBuf,
	pub(crate) config: Config,
	pub(crate) store: StateStore,

	pub(crate) force: bool,
	pub(crate) force_overwrite: bool,
	pub(crate) no_hooks: bool,
	pub(crate) no_deps: bool,
	pub(crate) non_interactive: Option<bool>,
}

impl EngineContext
{
	pub(crate) fn etc_dir(&self) -> PathBuf { self.root.join("etc/lpkg") }
	pub(crate) fn var_dir(&self) -> PathBuf { self.root.join("var/lib/lpkg") }
	pub(crate) fn lock_path(&self) -> PathBuf { self.root.join("var/lpkg/db.lck") }
	pub(crate) fn tmp_dir(&self, pid: u32) -> PathBuf { self.root.join(format!("tmp/lpkg_{pid}")) }
	pub(crate) fn files_dir(&self) -> PathBuf { self.var_dir().join("files") }
	pub(crate) fn docs_dir(&self) -> PathBuf { self.var_dir().join("docs") }
	pub(crate) fn hooks_dir(&self) -> PathBuf { self.etc_dir().join("hooks") }
	pub(crate) fn essential_path(&self) -> PathBuf { self.etc_dir().join("essential") }

	pub(crate) fn open(root: PathBuf, flags: EngineFlags) -> Result<Self, anyhow::Error>
	{
		use anyhow::Context as _;

		let config = load(&root.join("etc/lpkg")).with_context(|| "loading config")?;
		let store = StateStore::open(&root.join("var/lib/lpkg")).with_context(|| "opening state store")?;

		Ok(EngineContext {
			root, config, store,
			force: flags.force,
			force_overwrite: flags.force_overwrite,
			no_hooks: flags.no_hooks,
			no_deps: flags.no_deps,
			non_interactive: flags.non_interactive,
		})
	}

	pub(crate) fn essentials(&self) -> HashSet<String>
	{
		self.store.essentials(&self.essential_path())
	}

	pub(crate) fn lock(&self) -> Result<ExclusiveLock, crate::core::lock::LockErr>
	{
		ExclusiveLock::acquire(&self.lock_path())
	}
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct EngineFlags
{
	pub(crate) force: bool,
	pub(crate) force_overwrite: bool,
	pub(crate) no_hooks: bool,
	pub(crate) no_deps: bool,
	pub(crate) non_interactive: Option<bool>,
}
