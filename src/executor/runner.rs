use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{IntrospectError, Result};

const PATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// How long output is still read after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle events of a launched script, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Spawned { pid: Option<u32> },
    Stdout(String),
    Stderr(String),
    Exited(RunOutcome),
}

/// How a launched script finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub cancelled: bool,
    /// The completion sentinel for this session appeared on stdout.
    pub sentinel_seen: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    /// Turn an unsuccessful run into a `ProcessFailure`.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        let reason = if self.timed_out {
            format!("timed out after {} ms", self.elapsed_ms)
        } else if self.cancelled {
            "cancelled".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            }
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            Err(IntrospectError::ProcessFailure(reason))
        } else {
            Err(IntrospectError::ProcessFailure(format!("{reason}: {stderr}")))
        }
    }
}

/// Stops a running script from outside its `RunHandle`.
#[derive(Debug)]
pub struct Canceller(oneshot::Sender<()>);

impl Canceller {
    /// Returns false when the script had already finished.
    pub fn cancel(self) -> bool {
        self.0.send(()).is_ok()
    }
}

/// A launched script. Await `wait` for its outcome.
#[derive(Debug)]
pub struct RunHandle {
    pid: Option<u32>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<RunOutcome>>,
}

impl RunHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kill the script. Returns false if already cancelled or finished.
    pub fn cancel(&mut self) -> bool {
        self.cancel
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }

    /// Detach the cancel capability so another task can use it.
    pub fn canceller(&mut self) -> Option<Canceller> {
        self.cancel.take().map(Canceller)
    }

    pub async fn wait(self) -> Result<RunOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(IntrospectError::ProcessFailure(format!(
                "supervisor task failed: {e}"
            ))),
        }
    }
}

/// Launches transformed scripts as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    toolchain_path: String,
    interpreter: Option<Vec<String>>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(toolchain_path: impl Into<String>) -> Self {
        Self {
            toolchain_path: toolchain_path.into(),
            interpreter: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            toolchain_path: config.toolchain_path.clone(),
            interpreter: config.interpreter_argv()?,
            timeout: config.timeout(),
        })
    }

    pub fn with_interpreter(mut self, argv: Vec<String>) -> Self {
        self.interpreter = Some(argv).filter(|a| !a.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `PATH` value for the child: the toolchain path first, then `current`.
    pub fn search_path(&self, current: Option<&OsStr>) -> OsString {
        let mut path = OsString::from(&self.toolchain_path);
        if let Some(current) = current.filter(|c| !c.is_empty()) {
            path.push(PATH_SEPARATOR);
            path.push(current);
        }
        path
    }

    /// Copy of this process's environment with the toolchain prefixed onto `PATH`.
    pub fn child_environment(&self) -> Vec<(OsString, OsString)> {
        let current = std::env::var_os("PATH");
        std::env::vars_os()
            .filter(|(key, _)| key != "PATH")
            .chain(std::iter::once((
                OsString::from("PATH"),
                self.search_path(current.as_deref()),
            )))
            .collect()
    }

    /// Start `script` in `work_dir` without waiting for it.
    ///
    /// `sentinel` is the stdout line that marks a completed injected block;
    /// `events` receives output and exit notifications as they happen.
    pub fn spawn(
        &self,
        script: &Path,
        work_dir: &Path,
        sentinel: Option<String>,
        events: Option<mpsc::UnboundedSender<ProcessEvent>>,
    ) -> Result<RunHandle> {
        let script = absolute(script)?;

        let mut command = match &self.interpreter {
            Some(argv) => {
                let mut c = Command::new(&argv[0]);
                c.args(&argv[1..]).arg(&script);
                c
            }
            None => Command::new(&script),
        };
        command
            .current_dir(work_dir)
            .env_clear()
            .envs(self.child_environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            IntrospectError::ProcessFailure(format!(
                "failed to spawn '{}': {}",
                script.display(),
                e
            ))
        })?;

        let pid = child.id();
        info!(pid = ?pid, script = %script.display(), "Script process spawned");
        if let Some(tx) = &events {
            let _ = tx.send(ProcessEvent::Spawned { pid });
        }

        let pipes = child_take_pipes(&mut child)?;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let supervisor = Supervisor {
            timeout: self.timeout,
            sentinel,
            events,
            started,
        };
        let task = tokio::spawn(supervisor.run(pipes, child, cancel_rx));

        Ok(RunHandle {
            pid,
            cancel: Some(cancel_tx),
            task,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| IntrospectError::io(path, e))?;
    Ok(cwd.join(path))
}

type Pipes = (tokio::process::ChildStdout, tokio::process::ChildStderr);

fn child_take_pipes(child: &mut Child) -> Result<Pipes> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| IntrospectError::ProcessFailure("failed to capture stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| IntrospectError::ProcessFailure("failed to capture stderr".into()))?;
    Ok((stdout, stderr))
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Read a pipe to EOF, or until `stop` fires. Undecodable bytes are replaced,
/// never a reason to stop reading while the child may still be writing.
async fn collect_lines<R>(
    reader: R,
    stream: Stream,
    events: Option<mpsc::UnboundedSender<ProcessEvent>>,
    mut stop: watch::Receiver<bool>,
) -> String
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut stopped = false;
    while !stopped {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read,
            _ = stop.changed() => {
                stopped = true;
                Ok(0)
            }
        };
        match read {
            Ok(0) if buf.is_empty() => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Stopped reading script output");
                if buf.is_empty() {
                    break;
                }
            }
        }

        let line = decode_line(&buf);
        if let Some(tx) = &events {
            let event = match stream {
                Stream::Stdout => ProcessEvent::Stdout(line.clone()),
                Stream::Stderr => ProcessEvent::Stderr(line.clone()),
            };
            let _ = tx.send(event);
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

struct Supervisor {
    timeout: Option<Duration>,
    sentinel: Option<String>,
    events: Option<mpsc::UnboundedSender<ProcessEvent>>,
    started: Instant,
}

impl Supervisor {
    async fn run(
        self,
        (stdout, stderr): Pipes,
        mut child: Child,
        cancel_rx: oneshot::Receiver<()>,
    ) -> Result<RunOutcome> {
        let Supervisor {
            timeout,
            sentinel,
            events,
            started,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let stdout_task = tokio::spawn(collect_lines(
            stdout,
            Stream::Stdout,
            events.clone(),
            stop_rx.clone(),
        ));
        let stderr_task = tokio::spawn(collect_lines(
            stderr,
            Stream::Stderr,
            events.clone(),
            stop_rx,
        ));

        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let mut timed_out = false;
        let mut cancelled = false;
        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = deadline => {
                timed_out = true;
                None
            }
            Ok(()) = cancel_rx => {
                cancelled = true;
                None
            }
        };

        let status = match status {
            Some(status) => status,
            None => {
                warn!(timed_out, cancelled, "Killing script process");
                let _ = child.start_kill();
                child.wait().await
            }
        }
        .map_err(|e| IntrospectError::ProcessFailure(format!("failed to wait for script: {e}")))?;

        // Descendants that inherited the pipes can keep them open after the
        // child is gone.
        let readers = async { (stdout_task.await, stderr_task.await) };
        tokio::pin!(readers);
        let (stdout, stderr) = tokio::select! {
            joined = &mut readers => joined,
            _ = tokio::time::sleep(DRAIN_GRACE) => {
                warn!(
                    grace_secs = DRAIN_GRACE.as_secs(),
                    "Output pipes still open after exit, abandoning them"
                );
                let _ = stop_tx.send(true);
                readers.await
            }
        };
        let stdout = stdout.unwrap_or_default();
        let stderr = stderr.unwrap_or_default();
        let sentinel_seen = sentinel
            .as_deref()
            .is_some_and(|s| stdout.lines().any(|l| l.trim() == s));

        let outcome = RunOutcome {
            exit_code: status.code(),
            success: status.success() && !timed_out && !cancelled,
            timed_out,
            cancelled,
            sentinel_seen,
            stdout,
            stderr,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        debug!(
            exit_code = ?outcome.exit_code,
            elapsed_ms = outcome.elapsed_ms,
            sentinel_seen,
            "Script process exited"
        );

        if let Some(tx) = &events {
            let _ = tx.send(ProcessEvent::Exited(outcome.clone()));
        }
        Ok(outcome)
    }
}
