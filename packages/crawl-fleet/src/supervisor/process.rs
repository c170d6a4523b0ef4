//! OS process seams: launching workers and signalling them by pid.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::coordination::StateLayout;
use crate::error::{FleetError, Result};
use crate::types::WorkRange;

/// Handle to a worker process spawned by this supervisor
pub trait WorkerProcess: Send {
    fn pid(&self) -> u32;

    /// Non-blocking exit check. `Some(code)` once the process has exited;
    /// death by signal is reported as `-1`.
    fn try_exit_code(&mut self) -> std::io::Result<Option<i32>>;
}

/// Spawns one worker process for a range
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, range: &WorkRange) -> Result<Box<dyn WorkerProcess>>;
}

/// Liveness check and termination by pid, for processes this supervisor
/// may not hold a handle to.
pub trait ProcessControl: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask (`graceful`) or force a process to exit. Terminating a process
    /// that is already gone is not an error.
    fn terminate(&self, pid: u32, graceful: bool) -> Result<()>;
}

// =============================================================================
// Command launcher
// =============================================================================

/// Launches workers by running `<program> [base args] worker --worker-id N
/// --start S --end E`, with output appended to the worker's log file.
pub struct CommandLauncher {
    program: PathBuf,
    base_args: Vec<String>,
    layout: StateLayout,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>, layout: StateLayout) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            layout,
        }
    }

    /// Re-execute the running binary.
    pub fn current_exe(layout: StateLayout) -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| FleetError::io("current_exe", e))?;
        Ok(Self::new(exe, layout))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.base_args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn worker_args(&self, range: &WorkRange) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend([
            "worker".to_string(),
            "--worker-id".to_string(),
            range.worker_id.to_string(),
            "--start".to_string(),
            range.start_index.to_string(),
            "--end".to_string(),
            range.end_index.to_string(),
        ]);
        args
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&self, range: &WorkRange) -> Result<Box<dyn WorkerProcess>> {
        let worker_id = range.worker_id;
        let log_path = self.layout.worker_log_path(worker_id);
        if let Some(dir) = log_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| FleetError::io(dir, e))?;
        }

        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| FleetError::io(&log_path, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| FleetError::io(&log_path, e))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.worker_args(range))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        detach_from_terminal(&mut cmd);

        let child = cmd
            .spawn()
            .map_err(|source| FleetError::Spawn { worker_id, source })?;

        tracing::info!(
            worker_id = %worker_id,
            pid = child.id(),
            range = %range,
            log = %log_path.display(),
            "Spawned worker process"
        );

        Ok(Box::new(ChildProcess(child)))
    }
}

/// Workers get their own process group so a Ctrl-C or hangup aimed at the
/// operator's command does not reach them; they stop only when signalled
/// by pid.
#[cfg(unix)]
fn detach_from_terminal(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach_from_terminal(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach_from_terminal(_cmd: &mut Command) {}

struct ChildProcess(Child);

impl WorkerProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.0.id()
    }

    fn try_exit_code(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.0.try_wait()?.map(|status| status.code().unwrap_or(-1)))
    }
}

// =============================================================================
// System process control
// =============================================================================

/// Signals processes through the platform's own tools
/// (`kill` on unix, `tasklist` / `taskkill` on windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessControl;

impl SystemProcessControl {
    fn quiet(program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl ProcessControl for SystemProcessControl {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        // pid 0 would address our own process group
        if pid == 0 {
            return false;
        }
        Self::quiet("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .stdin(Stdio::null())
            .output();
        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()),
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32, graceful: bool) -> Result<()> {
        if !self.is_alive(pid) {
            return Ok(());
        }

        #[cfg(unix)]
        let status = Self::quiet("kill")
            .args([if graceful { "-TERM" } else { "-KILL" }, &pid.to_string()])
            .status();

        #[cfg(windows)]
        let status = {
            let pid_arg = pid.to_string();
            let mut args = vec!["/PID", pid_arg.as_str(), "/T"];
            if !graceful {
                args.push("/F");
            }
            Self::quiet("taskkill").args(&args).status()
        };

        match status {
            Ok(status) if status.success() => Ok(()),
            // Lost the race with the process exiting on its own
            _ if !self.is_alive(pid) => Ok(()),
            Ok(status) => Err(FleetError::Process(format!(
                "signalling pid {} exited with code {:?}",
                pid,
                status.code()
            ))),
            Err(e) => Err(FleetError::Process(format!(
                "failed to signal pid {}: {}",
                pid, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkerId;

    #[test]
    fn test_worker_args_append_range() {
        let launcher = CommandLauncher::new("/usr/bin/fleet", StateLayout::new("/tmp/state"))
            .args(["--config", "fleet.toml"]);
        let args = launcher.worker_args(&WorkRange::new(WorkerId(2), 20, 30));
        assert_eq!(
            args,
            vec![
                "--config",
                "fleet.toml",
                "worker",
                "--worker-id",
                "2",
                "--start",
                "20",
                "--end",
                "30"
            ]
        );
    }

    #[test]
    fn test_pid_zero_is_never_alive() {
        assert!(!SystemProcessControl.is_alive(0));
        SystemProcessControl.terminate(0, false).unwrap();
    }

    #[cfg(unix)]
    fn process_group_of(pid: u32) -> String {
        let output = Command::new("ps")
            .args(["-o", "pgid=", "-p", &pid.to_string()])
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_launched_worker_runs_in_its_own_process_group() {
        let state = tempfile::tempdir().unwrap();
        // `sh -c 'sleep 30'` ignores the trailing worker arguments
        let launcher = CommandLauncher::new("sh", StateLayout::new(state.path()))
            .args(["-c", "sleep 30"]);

        let mut worker = launcher.launch(&WorkRange::new(WorkerId(0), 0, 5)).unwrap();
        let pid = worker.pid();

        let worker_group = process_group_of(pid);
        let own_group = process_group_of(std::process::id());
        assert_eq!(worker_group, pid.to_string());
        assert_ne!(worker_group, own_group);

        SystemProcessControl.terminate(pid, false).unwrap();
        for _ in 0..100 {
            if worker.try_exit_code().unwrap().is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(worker.try_exit_code().unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_running_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(SystemProcessControl.is_alive(pid));

        SystemProcessControl.terminate(pid, true).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());

        // Reaped: terminating again is a no-op
        SystemProcessControl.terminate(pid, false).unwrap();
    }
}
