use std::{
    ffi::OsStr,
    process::{ExitStatus, Output, Stdio},
    time::Instant,
};

use tokio::process::{Child, Command};

use crate::error_code::ErrorCode;

struct MetricsGuard {
    start: Instant,
    armed: bool,
    command: String,
}

impl MetricsGuard {
    fn guard(command: String) -> Self {
        metrics::counter!("vidstash.process.start", "command" => command.clone()).increment(1);

        Self {
            start: Instant::now(),
            armed: true,
            command,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        metrics::histogram!(
            "vidstash.process.duration",
            "command" => self.command.clone(),
            "completed" => (!self.armed).to_string(),
        )
        .record(self.start.elapsed().as_secs_f64());

        metrics::counter!(
            "vidstash.process.end",
            "command" => self.command.clone(),
            "completed" => (!self.armed).to_string(),
        )
        .increment(1);
    }
}

pub(crate) struct Process {
    command: String,
    child: Child,
    guard: MetricsGuard,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("command", &self.command)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProcessError {
    #[error("Required command {0} not found, make sure it exists in vidstash's $PATH")]
    NotFound(String),

    #[error("Cannot run command {0} due to invalid permissions on binary, make sure the vidstash user has permission to run it")]
    PermissionDenied(String),

    #[error("{command} failed with {status}: {stderr}")]
    Status {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Unknown process error")]
    Other(#[source] std::io::Error),
}

impl ProcessError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::COMMAND_NOT_FOUND,
            Self::PermissionDenied(_) => ErrorCode::COMMAND_PERMISSION_DENIED,
            Self::Status { .. } => ErrorCode::COMMAND_FAILURE,
            Self::Other(_) => ErrorCode::COMMAND_ERROR,
        }
    }
}

impl Process {
    pub(crate) fn run<T>(command: &str, args: &[T]) -> Result<Self, ProcessError>
    where
        T: AsRef<OsStr>,
    {
        let res = tracing::trace_span!(parent: None, "Create command", %command)
            .in_scope(|| Self::spawn(command, Command::new(command).args(args)));

        match res {
            Ok(this) => Ok(this),
            Err(e) => match e.kind() {
                std::io::ErrorKind::NotFound => Err(ProcessError::NotFound(command.to_string())),
                std::io::ErrorKind::PermissionDenied => {
                    Err(ProcessError::PermissionDenied(command.to_string()))
                }
                _ => Err(ProcessError::Other(e)),
            },
        }
    }

    fn spawn(command: &str, cmd: &mut Command) -> std::io::Result<Self> {
        tracing::trace_span!(parent: None, "Spawn command", %command).in_scope(|| {
            let guard = MetricsGuard::guard(command.into());

            let cmd = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            cmd.spawn().map(|child| Process {
                child,
                command: String::from(command),
                guard,
            })
        })
    }

    /// Await process exit, capturing stdout and stderr separately.
    ///
    /// A non-zero exit becomes `ProcessError::Status` carrying the captured
    /// stderr for diagnostics.
    #[tracing::instrument(skip(self))]
    pub(crate) async fn output(self) -> Result<Output, ProcessError> {
        let Process {
            command,
            child,
            guard,
        } = self;

        let output = child
            .wait_with_output()
            .await
            .map_err(ProcessError::Other)?;

        if output.status.success() {
            guard.disarm();

            Ok(output)
        } else {
            Err(ProcessError::Status {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn wait(self) -> Result<(), ProcessError> {
        self.output().await.map(drop)
    }
}
