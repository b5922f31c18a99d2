use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::config::{EasiNoteConfig, TimeoutConfig, AUTO_PATH};
use crate::error::AttemptError;
use crate::sleep::Sleeper;

pub const INSTALL_KEY: &str = r"HKEY_LOCAL_MACHINE\SOFTWARE\WOW6432Node\Seewo\EasiNote5";
pub const INSTALL_VALUE: &str = "ExePath";
pub const DEFAULT_LAUNCHER: &str =
    r"C:\Program Files (x86)\Seewo\EasiNote5\swenlauncher\swenlauncher.exe";

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// OS process operations the restart step depends on.
pub trait Processes {
    /// Launcher path recorded by the installer, if any.
    fn install_path(&mut self) -> Option<PathBuf>;
    /// Force-terminates every process with this image name. `Ok(false)` means
    /// nothing was running.
    fn kill(&mut self, image_name: &str) -> io::Result<bool>;
    fn launch(&mut self, path: &Path, args: &[String]) -> io::Result<()>;
}

pub struct SystemProcesses;

impl Processes for SystemProcesses {
    fn install_path(&mut self) -> Option<PathBuf> {
        let mut cmd = Command::new("reg");
        cmd.args(["query", INSTALL_KEY, "/v", INSTALL_VALUE]);
        match run_bounded(&mut cmd, COMMAND_TIMEOUT) {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                parse_reg_value(&stdout, INSTALL_VALUE).map(PathBuf::from)
            }
            Ok(output) => {
                debug!(code = ?output.status.code(), "registry query found nothing");
                None
            }
            Err(err) => {
                debug!(error = %err, "registry query failed");
                None
            }
        }
    }

    fn kill(&mut self, image_name: &str) -> io::Result<bool> {
        let mut cmd = kill_command(image_name);
        let output = run_bounded(&mut cmd, COMMAND_TIMEOUT)?;
        Ok(output.status.success())
    }

    fn launch(&mut self, path: &Path, args: &[String]) -> io::Result<()> {
        let mut cmd = Command::new(path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);
        let child = cmd.spawn()?;
        debug!(pid = child.id(), "launched");
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn kill_command(image_name: &str) -> Command {
    let mut cmd = Command::new("taskkill");
    cmd.args(["/f", "/im", image_name]);
    cmd
}

#[cfg(not(target_os = "windows"))]
fn kill_command(image_name: &str) -> Command {
    let mut cmd = Command::new("pkill");
    cmd.args(["-x", image_name]);
    cmd
}

#[cfg(target_os = "windows")]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(target_os = "windows"))]
fn detach(_cmd: &mut Command) {}

pub fn run_bounded(cmd: &mut Command, timeout: Duration) -> io::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    match child.wait_timeout(timeout)? {
        Some(_) => child.wait_with_output(),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("command timed out after {}s", timeout.as_secs()),
            ))
        }
    }
}

/// Extracts `name`'s data from `reg query` output.
pub fn parse_reg_value(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix(name)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let rest = rest.trim_start();
        let data = rest
            .strip_prefix("REG_EXPAND_SZ")
            .or_else(|| rest.strip_prefix("REG_SZ"))?;
        let data = data.trim();
        (!data.is_empty()).then(|| data.to_string())
    })
}

/// Splits launch arguments on whitespace; double quotes group words.
pub fn split_args(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    out.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        out.push(current);
    }
    out
}

pub struct ProcessController {
    target: EasiNoteConfig,
    timeouts: TimeoutConfig,
    kill_agent: bool,
}

impl ProcessController {
    pub fn new(target: EasiNoteConfig, timeouts: TimeoutConfig, kill_agent: bool) -> Self {
        Self {
            target,
            timeouts,
            kill_agent,
        }
    }

    pub fn resolve_launch_path(&self, processes: &mut dyn Processes) -> PathBuf {
        if self.target.path != AUTO_PATH {
            return PathBuf::from(&self.target.path);
        }
        match processes.install_path() {
            Some(path) => {
                info!("resolved launcher path from registry");
                path
            }
            None => {
                warn!("could not read launcher path from registry, using default");
                PathBuf::from(DEFAULT_LAUNCHER)
            }
        }
    }

    /// Kills the whiteboard, optionally kills its helper agent, launches it
    /// again and waits for it to settle. Readiness is not checked.
    pub fn restart(
        &self,
        processes: &mut dyn Processes,
        sleeper: &dyn Sleeper,
    ) -> Result<(), AttemptError> {
        info!("restarting {}", self.target.process_name);
        let path = self.resolve_launch_path(processes);
        debug!(path = %path.display(), "launch path");

        let name = &self.target.process_name;
        match processes.kill(name) {
            Ok(true) => debug!("terminated {name}"),
            Ok(false) => debug!("{name} was not running"),
            Err(source) => {
                return Err(AttemptError::ProcessNotTerminated {
                    name: name.clone(),
                    source,
                })
            }
        }
        sleeper.sleep(self.timeouts.terminate());

        if self.kill_agent {
            let agent = &self.target.agent_process_name;
            if let Err(err) = processes.kill(agent) {
                warn!(error = %err, "failed to terminate {agent}, continuing");
            }
        }

        let args = split_args(&self.target.args);
        debug!(?args, "launch arguments");
        processes
            .launch(&path, &args)
            .map_err(|source| AttemptError::ProcessNotLaunched {
                path: path.clone(),
                source,
            })?;
        sleeper.sleep(self.timeouts.launch());
        Ok(())
    }
}
