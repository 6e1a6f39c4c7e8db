//! Hook runner (C11): run `postinst.sh`/`prerm.sh` against the target
//! root, chrooting into a mount namespace when the root isn't `/`
//! (spec.md §4.11).
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::EngineContext;


#[derive(Debug, thiserror::Error)]
pub(crate) enum HookErr
{
	#[error("/bin/sh missing inside target root, skipping hook")]
	NoShell,

	#[error(transparent)]
	IO(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

fn hook_path(ctx: &EngineContext, pkg: &str, hook_name: &str) -> PathBuf
{
	ctx.hooks_dir().join(pkg).join(hook_name)
}

/// `run_hook(ctx, pkg, hook_name)`: no-op if hooks are disabled or the
/// hook isn't present, direct `/bin/sh -c` against a live root,
/// otherwise a chroot+mount-namespace child (spec.md §4.11).
pub(crate) fn run_hook(ctx: &EngineContext, pkg: &str, hook_name: &str) -> Result<(), HookErr>
{
	if ctx.no_hooks { return Ok(()); }

	let hook = hook_path(ctx, pkg, hook_name);
	if !hook.is_file() { return Ok(()); }

	if ctx.root == Path::new("/")
	{
		return run_live(&hook);
	}

	run_chrooted(ctx, &hook)
}

fn warn_on_nonzero(status: std::process::ExitStatus, hook: &Path)
{
	if !status.success()
	{
		crate::util::log::warning(&format!("hook {} exited with {status}", hook.display()));
	}
}

fn run_live(hook: &Path) -> Result<(), HookErr>
{
	let status = Command::new("/bin/sh").arg("-c").arg(hook.as_os_str())
			.status()?;
	warn_on_nonzero(status, hook);
	Ok(())
}

#[cfg(unix)]
fn run_chrooted(ctx: &EngineContext, hook: &Path) -> Result<(), HookErr>
{
	if !ctx.root.join("bin/sh").is_file()
	{
		crate::util::log::warning("/bin/sh missing inside target root, skipping hook");
		return Ok(());
	}

	// Path relative to the target root, as it will appear once chrooted.
	let rel_hook = hook.strip_prefix(&ctx.root).unwrap_or(hook);
	let rel_hook = Path::new("/").join(rel_hook);

	let root = ctx.root.clone();
	let mut mounts: Vec<PathBuf> = Vec::new();

	let pid = unsafe { libc::fork() };
	if pid < 0
	{
		return Err(std::io::Error::last_os_error().into());
	}
	if pid == 0
	{
		// Child: new mount namespace, private-recursive `/`, bind the
		// usual suspects under the target root, chroot, exec the hook.
		std::process::exit(match run_in_child(&root, &rel_hook, &mut mounts)
		{
			Ok(status) => status.code().unwrap_or(1),
			Err(_) => 127,
		});
	}

	let mut wstatus: libc::c_int = 0;
	unsafe { libc::waitpid(pid, &mut wstatus, 0); }
	let code = unsafe { libc::WEXITSTATUS(wstatus) };
	if code != 0
	{
		crate::util::log::warning(&format!("hook {} exited with status {code}", hook.display()));
	}
	Ok(())
}

#[cfg(unix)]
fn bind_mount(src: &Path, dest: &Path) -> std::io::Result<()>
{
	use std::ffi::CString;
	std::fs::create_dir_all(dest)?;

	let csrc = CString::new(src.as_os_str().as_encoded_bytes()).unwrap();
	let cdest = CString::new(dest.as_os_str().as_encoded_bytes()).unwrap();
	let rc = unsafe {
		libc::mount(csrc.as_ptr(), cdest.as_ptr(), std::ptr::null(),
				libc::MS_BIND | libc::MS_REC, std::ptr::null())
	};
	if rc != 0 { return Err(std::io::Error::last_os_error()); }
	Ok(())
}

#[cfg(unix)]
fn mount_fs(fstype: &str, dest: &Path) -> std::io::Result<()>
{
	use std::ffi::CString;
	std::fs::create_dir_all(dest)?;

	let source = CString::new(fstype).unwrap();
	let cfstype = CString::new(fstype).unwrap();
	let cdest = CString::new(dest.as_os_str().as_encoded_bytes()).unwrap();
	let rc = unsafe {
		libc::mount(source.as_ptr(), cdest.as_ptr(), cfstype.as_ptr(), 0, std::ptr::null())
	};
	if rc != 0 { return Err(std::io::Error::last_os_error()); }
	Ok(())
}

/// Runs entirely inside the forked child: unshare the mount namespace,
/// bind-mount the handful of paths a hook script typically needs,
/// chroot, and exec the hook via `/bin/sh -c`.  Mounts are torn down
/// (best-effort, reverse order) before returning, since the child's
/// mount namespace dies with it regardless — this just keeps behaviour
/// predictable if that assumption ever changes.
#[cfg(unix)]
fn run_in_child(root: &Path, rel_hook: &Path, mounts: &mut Vec<PathBuf>)
		-> Result<std::process::ExitStatus, anyhow::Error>
{
	use std::ffi::CString;

	let rc = unsafe { libc::unshare(libc::CLONE_NEWNS) };
	if rc != 0 { anyhow::bail!("unshare(CLONE_NEWNS): {}", std::io::Error::last_os_error()); }

	// Mark `/` private-recursive so our bind mounts don't leak to the
	// parent namespace.
	let root_cstr = CString::new("/").unwrap();
	unsafe {
		libc::mount(std::ptr::null(), root_cstr.as_ptr(), std::ptr::null(),
				libc::MS_PRIVATE | libc::MS_REC, std::ptr::null());
	}

	let dev = root.join("dev");
	if bind_mount(Path::new("/dev"), &dev).is_ok() { mounts.push(dev); }

	let run = root.join("run");
	if bind_mount(Path::new("/run"), &run).is_ok() { mounts.push(run); }

	let resolv_src = Path::new("/etc/resolv.conf");
	if resolv_src.is_file()
	{
		let resolv_dest = root.join("etc/resolv.conf");
		if let Some(parent) = resolv_dest.parent() { let _ = std::fs::create_dir_all(parent); }
		let _ = std::fs::write(&resolv_dest, std::fs::read(resolv_src).unwrap_or_default());
	}

	let proc_dir = root.join("proc");
	if mount_fs("proc", &proc_dir).is_ok() { mounts.push(proc_dir); }
	let sys_dir = root.join("sys");
	if mount_fs("sysfs", &sys_dir).is_ok() { mounts.push(sys_dir); }
	let pts_dir = root.join("dev/pts");
	if mount_fs("devpts", &pts_dir).is_ok() { mounts.push(pts_dir); }

	let croot = CString::new(root.as_os_str().as_encoded_bytes()).unwrap();
	if unsafe { libc::chroot(croot.as_ptr()) } != 0
	{
		anyhow::bail!("chroot({}): {}", root.display(), std::io::Error::last_os_error());
	}
	std::env::set_current_dir("/")?;

	let status = Command::new("/bin/sh").arg("-c").arg(rel_hook.as_os_str()).status()?;

	for m in mounts.iter().rev()
	{
		let cm = CString::new(m.as_os_str().as_encoded_bytes()).unwrap();
		unsafe { libc::umount2(cm.as_ptr(), libc::MNT_DETACH); }
	}

	Ok(status)
}

#[cfg(not(unix))]
fn run_chrooted(_ctx: &EngineContext, _hook: &Path) -> Result<(), HookErr>
{
	Err(HookErr::NoShell)
}
