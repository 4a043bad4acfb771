//! Subprocess execution of code units.

use std::path::{Component, Path};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hive_common::timeout::KILL_GRACE_MILLIS;

use crate::SandboxError;
use crate::capture::{self, Captured};
use crate::config::SandboxConfig;
use crate::env::build_child_env;
use crate::result::{LAUNCH_FAILURE_EXIT_CODE, SandboxResult};

/// How the wait on a child ended.
enum Finish {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs code units in throwaway subprocesses.
///
/// Every run gets a fresh temporary work directory holding only the script,
/// which is removed when the run ends. Runs share nothing but the immutable
/// configuration, so one runner can serve many concurrent callers and is cheap
/// to clone.
#[derive(Debug, Clone, Default)]
pub struct SandboxRunner {
    config: Arc<SandboxConfig>,
}

impl SandboxRunner {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `code` with the configured interpreter.
    ///
    /// Never fails: launch problems are reported as a result with
    /// `exit_code == -1` and the error text in `stderr`.
    pub async fn run(&self, code: &str) -> SandboxResult {
        self.run_named(code, &self.config.interpreter.file_name)
            .await
    }

    /// Run `code` saved under `file_name` instead of the configured name.
    pub async fn run_named(&self, code: &str, file_name: &str) -> SandboxResult {
        let never = CancellationToken::new();
        match self.execute(code, file_name, &never).await {
            Ok(result) => result,
            Err(e) => SandboxResult::launch_failure(e.to_string(), Duration::ZERO),
        }
    }

    /// Like [`run`](Self::run), but kills the process and returns
    /// [`SandboxError::Cancelled`] as soon as `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<SandboxResult, SandboxError> {
        self.execute(code, &self.config.interpreter.file_name, cancel)
            .await
    }

    async fn execute(
        &self,
        code: &str,
        file_name: &str,
        cancel: &CancellationToken,
    ) -> Result<SandboxResult, SandboxError> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        let start = Instant::now();

        if !is_bare_file_name(file_name) {
            return Ok(SandboxResult::launch_failure(
                format!("Invalid script file name: {file_name:?}"),
                start.elapsed(),
            ));
        }

        let work_dir = match self.prepare_work_dir(code, file_name).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "Failed to prepare sandbox work directory");
                return Ok(SandboxResult::launch_failure(
                    format!("Failed to prepare work directory: {e}"),
                    start.elapsed(),
                ));
            }
        };

        let program = &self.config.interpreter.program;
        let mut child = match self.build_command(work_dir.path(), file_name).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %program, error = %e, "Failed to spawn sandbox process");
                return Ok(SandboxResult::launch_failure(
                    format!("Failed to spawn {program}: {e}"),
                    start.elapsed(),
                ));
            }
        };

        let pid = child.id();
        // Declared after `child` so it drops first, while the leader is
        // still unreaped and its pid cannot name another group.
        let mut group = ProcessGroupGuard::new(pid);
        debug!(?pid, program = %program, "Sandbox process started");

        let limit = self.config.max_output_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(capture::read_limited(out, limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture::read_limited(err, limit)));

        let finish = tokio::select! {
            status = child.wait() => Finish::Exited(status),
            _ = tokio::time::sleep(self.config.timeout) => Finish::TimedOut,
            _ = cancel.cancelled() => Finish::Cancelled,
        };

        let status = match finish {
            Finish::Exited(status) => {
                // Kill anything the program left running in its group so the
                // pipes close and the capture tasks finish. The leader is
                // already reaped here: while any member survives the kernel
                // keeps the pgid reserved, and once the group is empty the
                // pid could in principle be reused by a new group leader
                // before this signal lands. tokio offers no wait that leaves
                // the zombie in place, so that window is accepted.
                group.kill();
                Some(status)
            }
            Finish::TimedOut => {
                warn!(?pid, timeout = ?self.config.timeout, "Sandbox process timed out");
                terminate(&mut child, &mut group).await;
                None
            }
            Finish::Cancelled => {
                debug!(?pid, "Sandbox run cancelled");
                terminate(&mut child, &mut group).await;
                abort(stdout_task);
                abort(stderr_task);
                cleanup(work_dir);
                return Err(SandboxError::Cancelled);
            }
        };

        let (stdout, stdout_truncated) = collect(stdout_task).await.into_text();
        let (mut stderr, stderr_truncated) = collect(stderr_task).await.into_text();
        let duration = start.elapsed();
        cleanup(work_dir);

        let (exit_code, timed_out) = match status {
            Some(Ok(status)) => (exit_code_of(status), false),
            Some(Err(e)) => {
                append_line(&mut stderr, &format!("Failed to wait for process: {e}"));
                (LAUNCH_FAILURE_EXIT_CODE, false)
            }
            None => {
                append_line(
                    &mut stderr,
                    &format!(
                        "Process timed out after {}s and was killed",
                        self.config.timeout.as_secs_f64()
                    ),
                );
                (LAUNCH_FAILURE_EXIT_CODE, true)
            }
        };

        debug!(exit_code, timed_out, ?duration, "Sandbox process finished");

        Ok(SandboxResult {
            exit_code,
            stdout,
            stderr,
            success: exit_code == 0 && !timed_out,
            timed_out,
            duration,
            stdout_truncated,
            stderr_truncated,
        })
    }

    async fn prepare_work_dir(&self, code: &str, file_name: &str) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hive-sandbox-");

        let dir = match &self.config.work_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        tokio::fs::write(dir.path().join(file_name), code).await?;
        Ok(dir)
    }

    fn build_command(&self, work_dir: &Path, file_name: &str) -> Command {
        let interpreter = &self.config.interpreter;

        let mut cmd = Command::new(&interpreter.program);
        cmd.args(&interpreter.args)
            .arg(file_name)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let parent = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        cmd.env_clear();
        cmd.envs(build_child_env(
            parent,
            self.config.scrub_env,
            &self.config.env,
        ));

        #[cfg(unix)]
        {
            // SAFETY: setpgid is async-signal-safe and only changes the
            // process group of the forked child.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setpgid(0, 0) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        cmd
    }
}

fn is_bare_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    LAUNCH_FAILURE_EXIT_CODE
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: kill(2) with a negative pid signals the group created by
        // setpgid in pre_exec; it touches no memory in this process.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Kills the child's process group when dropped, so a run that is abandoned
/// mid-flight (its future dropped by a timeout or `select!`) takes its
/// background processes down with it.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    /// Kill the group now. Later calls and the drop do nothing.
    fn kill(&mut self) {
        kill_process_group(self.pid.take());
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if self.pid.is_some() {
            debug!(pid = ?self.pid, "Killing abandoned sandbox process group");
        }
        self.kill();
    }
}

async fn terminate(child: &mut Child, group: &mut ProcessGroupGuard) {
    let pid = group.pid;
    // The group goes first, while the leader is still unreaped.
    group.kill();
    let _ = child.start_kill();
    let grace = Duration::from_millis(KILL_GRACE_MILLIS);
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        warn!(?pid, "Sandbox process still running after kill");
    }
}

async fn collect(task: Option<JoinHandle<Captured>>) -> Captured {
    let Some(mut task) = task else {
        return Captured::default();
    };
    let grace = Duration::from_millis(KILL_GRACE_MILLIS);
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            warn!(error = %e, "Output capture task failed");
            Captured::default()
        }
        Err(_) => {
            warn!("Output stream still open after process exit");
            task.abort();
            Captured::default()
        }
    }
}

fn abort(task: Option<JoinHandle<Captured>>) {
    if let Some(task) = task {
        task.abort();
    }
}

fn cleanup(work_dir: TempDir) {
    let path = work_dir.path().to_path_buf();
    if let Err(e) = work_dir.close() {
        warn!(path = %path.display(), error = %e, "Failed to remove sandbox work directory");
    }
}

fn append_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}
