//! Isolates the child process in its own network namespace and wires up
//! routing so that all of its IP traffic goes out through the TUN device
//! this process owns, rather than the host's real interfaces.
//!
//! This is glue around OS primitives, not datapath logic: `nix` gives us
//! `unshare`, everything else is `ip`(8) invocations, the same tool a
//! human operator would run by hand.

use std::io;
use std::net::Ipv4Addr;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use nix::sched::{unshare, CloneFlags};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("failed to unshare network namespace: {0}")]
    Unshare(#[from] nix::Error),
    #[error("failed to configure namespace networking: {0}")]
    Configure(io::Error),
    #[error("failed to spawn child process: {0}")]
    Spawn(io::Error),
}

/// Spawns `command` in a fresh network namespace whose only interface is
/// `tun_name`, addressed as `tun_address`/`tun_netmask` with a default
/// route through it. Returns the running child.
pub fn spawn_isolated(
    command: &[String],
    tun_name: &str,
    tun_address: Ipv4Addr,
    tun_netmask: Ipv4Addr,
) -> Result<Child, NamespaceError> {
    let (program, args) = command
        .split_first()
        .expect("clap enforces at least one command token");

    let tun_name = tun_name.to_string();
    let mut child = Command::new(program);
    child.args(args);

    // SAFETY: the closure runs in the forked child between fork() and
    // execve(), before any other threads exist there; it only calls
    // async-signal-safe syscalls (unshare).
    unsafe {
        child.pre_exec(move || {
            unshare(CloneFlags::CLONE_NEWNET).map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;
            configure_namespace_interfaces(&tun_name, tun_address, tun_netmask)
                .map_err(|error| io::Error::new(io::ErrorKind::Other, error.to_string()))?;
            Ok(())
        });
    }

    child.spawn().map_err(NamespaceError::Spawn)
}

fn configure_namespace_interfaces(
    tun_name: &str,
    tun_address: Ipv4Addr,
    tun_netmask: Ipv4Addr,
) -> Result<(), NamespaceError> {
    run_ip(&["link", "set", "lo", "up"])?;
    run_ip(&[
        "addr",
        "add",
        &format!("{tun_address}/{}", netmask_prefix_len(tun_netmask)),
        "dev",
        tun_name,
    ])?;
    run_ip(&["link", "set", tun_name, "up"])?;
    run_ip(&["route", "add", "default", "dev", tun_name])?;
    Ok(())
}

fn run_ip(args: &[&str]) -> Result<(), NamespaceError> {
    let status = Command::new("ip")
        .args(args)
        .status()
        .map_err(NamespaceError::Configure)?;
    if !status.success() {
        return Err(NamespaceError::Configure(io::Error::new(
            io::ErrorKind::Other,
            format!("`ip {}` exited with {status}", args.join(" ")),
        )));
    }
    Ok(())
}

fn netmask_prefix_len(mask: Ipv4Addr) -> u32 {
    u32::from(mask).count_ones()
}
