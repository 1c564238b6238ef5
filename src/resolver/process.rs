// Subprocess helpers for extractor and probe invocations
//
// Timeout, caller cancellation and drop all end in the same teardown: the
// child's whole process group is force-killed and the child is reaped.
// Extractors fork helpers (ffmpeg for HLS/DASH), so killing the leader alone
// would leave them writing.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::utils::tail;

const STDERR_TAIL_LIMIT: usize = 2048;
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to capture {pipe} from {program}")]
    Pipe { program: String, pipe: &'static str },

    #[error("{program} timed out after {:.1}s", .timeout.as_secs_f32())]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Program plus arguments, built up before spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Leader of a fresh group, so the group id is the child's pid
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn spawn(&self) -> Result<Child, ProcessError> {
        self.command().spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

/// Run to completion, collecting stdout/stderr, bounded by `timeout` and `cancel`.
pub async fn run_output(
    spec: &CommandSpec,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Output, ProcessError> {
    let program = spec.program.clone();
    let mut child = spec.spawn()?;
    let mut group = ProcessGroup::of(&child);

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| ProcessError::Pipe {
        program: program.clone(),
        pipe: "stdout",
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| ProcessError::Pipe {
        program: program.clone(),
        pipe: "stderr",
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = tokio::select! {
        status = child.wait() => Ok(status),
        _ = tokio::time::sleep(timeout) => Err(ProcessError::TimedOut {
            program: program.clone(),
            timeout,
        }),
        _ = cancel.cancelled() => Err(ProcessError::Cancelled {
            program: program.clone(),
        }),
    };

    match waited {
        Ok(status) => {
            let status = status.map_err(|source| ProcessError::Io {
                program: program.clone(),
                source,
            })?;
            // Strays still in the group would hold the pipes open
            group.kill();
            let stdout = collect_pipe(stdout_task, &program).await?;
            let stderr = collect_pipe(stderr_task, &program).await?;
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(err) => {
            terminate(&mut child, &mut group, &program).await;
            stdout_task.abort();
            stderr_task.abort();
            Err(err)
        }
    }
}

/// Like `run_output`, but a non-zero exit becomes `ProcessError::Failed`.
pub async fn run_checked(
    spec: &CommandSpec,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ProcessError> {
    let output = run_output(spec, timeout, cancel).await?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(ProcessError::Failed {
            program: spec.program.clone(),
            status: output.status.to_string(),
            stderr: tail(String::from_utf8_lossy(&output.stderr).trim(), STDERR_TAIL_LIMIT),
        })
    }
}

async fn collect_pipe(
    task: JoinHandle<io::Result<Vec<u8>>>,
    program: &str,
) -> Result<Vec<u8>, ProcessError> {
    // A grandchild can keep the pipe open after the child exits
    let joined = tokio::time::timeout(KILL_GRACE, task)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "pipe stayed open after exit"))
        .and_then(|joined| joined.map_err(io::Error::other))
        .and_then(|read| read);

    joined.map_err(|source| ProcessError::Io {
        program: program.to_string(),
        source,
    })
}

async fn terminate(child: &mut Child, group: &mut ProcessGroup, program: &str) {
    group.kill();
    if let Err(err) = child.start_kill() {
        tracing::debug!(program, error = %err, "kill skipped, child already gone");
    }
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(program, %status, "child terminated"),
        Ok(Err(err)) => tracing::warn!(program, error = %err, "failed to reap child"),
        Err(_) => tracing::warn!(program, "child did not exit after kill"),
    }
}

/// Process group led by a spawned child. Killed once, at the latest on drop.
#[derive(Debug)]
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => tracing::debug!(pgid, error = %err, "failed to kill process group"),
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Shared view of the last lines a streaming child wrote to stderr.
#[derive(Debug, Clone, Default)]
pub struct StderrTail(Arc<Mutex<String>>);

impl StderrTail {
    pub fn get(&self) -> String {
        self.0.lock().clone()
    }

    fn push_line(&self, line: &str) {
        let mut buf = self.0.lock();
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);
        if buf.len() > STDERR_TAIL_LIMIT {
            *buf = tail(&buf, STDERR_TAIL_LIMIT);
        }
    }
}

/// Child process whose stdout is consumed as a byte stream.
///
/// Dropping it kills the child and its process group. After stdout closes the
/// child is reaped, and a non-zero exit is surfaced as a final error item.
pub struct ChildStream {
    program: String,
    pid: Option<u32>,
    child: Option<Child>,
    stdout: ReaderStream<ChildStdout>,
    stderr: StderrTail,
    state: ChildState,
    group: ProcessGroup,
}

type ExitFuture = Pin<Box<dyn Future<Output = Option<io::Error>> + Send>>;

enum ChildState {
    Reading,
    Exiting(ExitFuture),
    Done,
}

impl ChildStream {
    pub fn spawn(spec: &CommandSpec) -> Result<Self, ProcessError> {
        let mut child = spec.spawn()?;
        let group = ProcessGroup::of(&child);
        let stdout = child.stdout.take().ok_or_else(|| ProcessError::Pipe {
            program: spec.program.clone(),
            pipe: "stdout",
        })?;
        let stderr_pipe = child.stderr.take().ok_or_else(|| ProcessError::Pipe {
            program: spec.program.clone(),
            pipe: "stderr",
        })?;

        // Drain stderr so the child never blocks on a full pipe
        let stderr = StderrTail::default();
        let sink = stderr.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr_pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                sink.push_line(&line);
            }
        });

        Ok(Self {
            program: spec.program.clone(),
            pid: child.id(),
            child: Some(child),
            stdout: ReaderStream::new(stdout),
            stderr,
            state: ChildState::Reading,
            group,
        })
    }

    pub fn stderr_tail(&self) -> StderrTail {
        self.stderr.clone()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

/// Reap a child whose stdout has closed. `None` means a clean exit.
async fn reap(child: Option<Child>, program: String, stderr: StderrTail) -> Option<io::Error> {
    let mut child = child?;
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) if status.success() => None,
        Ok(Ok(status)) => {
            let tail = stderr.get();
            let message = if tail.is_empty() {
                format!("{} exited with {}", program, status)
            } else {
                format!("{} exited with {}: {}", program, status, tail)
            };
            Some(io::Error::other(message))
        }
        Ok(Err(err)) => Some(err),
        Err(_) => Some(io::Error::other(format!(
            "{} kept running after closing stdout",
            program
        ))),
    }
}

impl Stream for ChildStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                ChildState::Reading => match Pin::new(&mut this.stdout).poll_next(cx) {
                    Poll::Ready(None) => {
                        let exit = reap(this.child.take(), this.program.clone(), this.stderr.clone());
                        this.state = ChildState::Exiting(Box::pin(exit));
                    }
                    other => return other,
                },
                ChildState::Exiting(exit) => {
                    let outcome = ready!(exit.as_mut().poll(cx));
                    this.state = ChildState::Done;
                    if outcome.is_none() {
                        // Clean exit; sweep anything the child left behind
                        this.group.kill();
                    }
                    return Poll::Ready(outcome.map(Err));
                }
                ChildState::Done => return Poll::Ready(None),
            }
        }
    }
}
