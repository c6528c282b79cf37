//! Supervision of the external script interpreter.
//!
//! When configured, the interpreter's built-in web server replaces the
//! engine's own legacy server on the legacy port. Its stdout and stderr are
//! forwarded line by line to the log, and it is killed on shutdown.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;

use crate::config::InterpreterConfig;
use crate::lifecycle::shutdown;
use crate::resolve::path::{normalize, Anchor};

/// A fully resolved interpreter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterCommand {
    program: PathBuf,
    working_dir: PathBuf,
    args: Vec<String>,
}

impl InterpreterCommand {
    /// `{program} -S 127.0.0.1:{port} {router_script}`, run inside
    /// `working_dir`. A relative program is looked up in the working dir.
    pub fn from_config(config: &InterpreterConfig, port: u16) -> Self {
        let working_dir = normalize("", &config.working_dir, Anchor::WorkingDir);
        let program = normalize(&working_dir.to_string_lossy(), &config.program, Anchor::WorkingDir);
        Self {
            program,
            working_dir,
            args: vec![
                "-S".to_string(),
                format!("127.0.0.1:{port}"),
                config.router_script.clone(),
            ],
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Run the interpreter until it exits or shutdown is signalled.
///
/// Returns the exit status when the process ended on its own, `None` when
/// it was killed for shutdown.
pub async fn supervise(
    command: InterpreterCommand,
    shutdown_rx: broadcast::Receiver<()>,
) -> std::io::Result<Option<ExitStatus>> {
    let mut child = command.spawn()?;
    tracing::info!(
        program = %command.program.display(),
        args = ?command.args,
        pid = child.id(),
        "Interpreter started"
    );

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, "stderr"));
    }

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            tracing::warn!(%status, "Interpreter exited");
            Ok(Some(status))
        }
        _ = shutdown::wait(shutdown_rx) => {
            child.kill().await?;
            tracing::info!("Interpreter stopped");
            Ok(None)
        }
    }
}

async fn forward_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "interpreter", stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(stream, error = %e, "Interpreter output closed");
                break;
            }
        }
    }
}
