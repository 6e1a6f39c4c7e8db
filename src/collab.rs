//! Out-of-scope external collaborators (spec.md §1).  Core code is
//! written against these traits so it can be exercised against a fake
//! in tests; the binary wires up the real implementations.
use std::path::Path;
use std::process::ExitStatus;

pub(crate) use crate::util::log::ProgressSink;


/// `fetch(url, path)` with retry — the HTTP downloader is out of scope,
/// this is the seam core code calls through.
pub(crate) trait Fetcher: Send + Sync
{
	fn fetch(&self, url: &str, dest: &Path) -> Result<(), anyhow::Error>;
}

/// Real implementation, used by the binary.  Retries with jittered
/// backoff, matching the teacher's `core/pool/fetch.rs` retry style.
pub(crate) struct HttpFetcher
{
	pub(crate) max_retries: u32,
}

impl Default for HttpFetcher
{
	fn default() -> Self { HttpFetcher { max_retries: 3 } }
}

impl Fetcher for HttpFetcher
{
	fn fetch(&self, url: &str, dest: &Path) -> Result<(), anyhow::Error>
	{
		use anyhow::Context as _;
		use rand::Rng as _;

		let mut attempt = 0;
		loop
		{
			attempt += 1;
			match ureq_get(url, dest)
			{
				Ok(()) => return Ok(()),
				Err(e) if attempt > self.max_retries => {
					return Err(e).with_context(|| format!("fetching {url} after {attempt} attempts"));
				},
				Err(_) => {
					let jitter_ms = rand::thread_rng().gen_range(100..500);
					std::thread::sleep(std::time::Duration::from_millis(jitter_ms * attempt as u64));
				},
			}
		}
	}
}

// Mirrors a crate-wide ceiling on the teacher's fetch pool: don't let a
// broken or malicious mirror fill up the disk on a single file.
const FETCH_LIMIT: u64 = 1024 * 1024 * 1024;

fn ureq_get(url: &str, dest: &Path) -> Result<(), anyhow::Error>
{
	use anyhow::Context as _;
	use std::fs;
	use std::io::{self, Read as _};

	// Parsed up front purely to fail fast on a malformed mirror URL
	// before touching the network, matching the teacher's `baseurl.join`
	// validation in `core/pool/fetch.rs::scan_worker`.
	let _parsed: url::Url = url.parse()?;

	let resp = ureq::get(url).call().with_context(|| format!("GET {url}"))?;

	let outfile = fs::File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
	let mut outwrite = io::BufWriter::new(outfile);
	let mut rdr = resp.into_reader().take(FETCH_LIMIT);
	if let Err(e) = io::copy(&mut rdr, &mut outwrite)
	{
		let _ = fs::remove_file(dest);
		return Err(e).with_context(|| format!("downloading {url}"));
	}

	Ok(())
}


/// Trigger execution (enqueue is core, running the shell command is
/// not).  Default impl shells out via `/bin/sh -c`, matching
/// `execute_process` in the original.
pub(crate) trait TriggerExec: Send + Sync
{
	fn run(&self, cmd: &str) -> Result<ExitStatus, anyhow::Error>;
}

pub(crate) struct ShellTriggerExec;

impl TriggerExec for ShellTriggerExec
{
	fn run(&self, cmd: &str) -> Result<ExitStatus, anyhow::Error>
	{
		use anyhow::Context as _;
		std::process::Command::new("/bin/sh").arg("-c").arg(cmd)
				.status()
				.with_context(|| format!("running trigger '{cmd}'"))
	}
}


/// Locating (fetch-or-local-read) the repository index text; *parsing*
/// it is core (`core::repo`).
pub(crate) trait IndexLoader: Send + Sync
{
	fn load_index(&self, mirror: &str, arch: &str) -> Result<String, anyhow::Error>;
	fn load_latest(&self, mirror: &str, arch: &str, name: &str) -> Result<String, anyhow::Error>;
}


/// Message-catalog stand-in for localization (spec.md §6.5).  Core log
/// call sites look strings up by key instead of hardcoding English.
pub(crate) trait Catalog: Send + Sync
{
	fn get(&self, key: &str) -> &str;
}

pub(crate) struct PlainCatalog;

impl Catalog for PlainCatalog
{
	fn get(&self, key: &str) -> &str { key }
}


/// Marker traits for the packer tool and orphan scanner, both named as
/// out-of-scope external tools in spec.md §1.  No implementation ships;
/// `lpkg pack`/`lpkg scan` report that explicitly rather than silently
/// doing nothing.
pub(crate) trait Packer {}
pub(crate) trait OrphanScanner {}
