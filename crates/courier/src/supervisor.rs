//! Process supervisor: one assistant invocation per channel, heartbeat
//! while running, outcome classification and chunked delivery on exit.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use courier_core::chunk::split_chunks;
use courier_core::config::ProjectConfig;
use courier_core::sanitize::strip_ansi;
use tokio::io::AsyncReadExt as _;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};

use crate::session::{ChannelId, ChannelSessions, RunningProcess};
use crate::transport::{ChatTransport, Marker, MessageRef};

/// Telegram allows 4096 UTF-16 units per message; a UTF-8 byte count is
/// always at least the UTF-16 unit count, so this cap can never exceed the
/// wire limit.
pub const MAX_MESSAGE_BYTES: usize = 3900;

/// How often the "still working" presence signal fires while Running.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How the assistant process is invoked.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Binary name or path, e.g. `claude`.
    pub bin: String,
}

/// Synchronous result of a dispatch attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    Launched,
    /// Another invocation already owns this channel's slot.
    Busy { project: String },
}

pub struct Supervisor {
    assistant: AssistantConfig,
    transport: Arc<dyn ChatTransport>,
    sessions: Mutex<ChannelSessions>,
}

impl Supervisor {
    pub fn new(assistant: AssistantConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            assistant,
            transport,
            sessions: Mutex::new(ChannelSessions::default()),
        }
    }

    pub fn assistant_bin(&self) -> &str {
        &self.assistant.bin
    }

    /// Mark the channel so the next dispatch starts a fresh conversation.
    pub async fn mark_fresh_start(&self, channel: &ChannelId) {
        self.sessions.lock().await.mark_fresh_start(channel);
    }

    /// Project name of the running invocation, if any.
    pub async fn running_project(&self, channel: &ChannelId) -> Option<String> {
        self.sessions
            .lock()
            .await
            .running_project(channel)
            .map(str::to_owned)
    }

    /// Launch one assistant invocation for `channel`, or reject if one is
    /// already running.
    ///
    /// The fresh-start flag is consumed on every attempt, including attempts
    /// rejected here for concurrency; see the session tests.
    pub async fn dispatch(
        self: &Arc<Self>,
        channel: ChannelId,
        origin: MessageRef,
        project_name: &str,
        project: &ProjectConfig,
        prompt: &str,
    ) -> Dispatch {
        let (fresh, abort_rx) = {
            let mut sessions = self.sessions.lock().await;
            let fresh = sessions.take_fresh_start(&channel);

            if let Some(occupant) = sessions.running_project(&channel) {
                return Dispatch::Busy {
                    project: occupant.to_owned(),
                };
            }

            let (abort_tx, abort_rx) = watch::channel(false);
            let registered = sessions.register(
                channel.clone(),
                RunningProcess {
                    project: project_name.to_owned(),
                    abort_tx,
                },
            );
            debug_assert!(registered.is_ok());
            (fresh, abort_rx)
        };

        let mut args = vec![
            "-p".to_owned(),
            prompt.to_owned(),
            "--output-format".to_owned(),
            "text".to_owned(),
        ];
        if !fresh {
            // Continue the assistant's prior session in this working dir.
            args.push("-c".to_owned());
        }

        tracing::info!(
            channel = %channel,
            project = project_name,
            fresh,
            "dispatching prompt to assistant"
        );

        let supervisor = Arc::clone(self);
        let workdir = project.path.clone();
        tokio::spawn(async move {
            supervisor
                .run_invocation(channel, origin, workdir, args, abort_rx)
                .await;
        });

        Dispatch::Launched
    }

    /// Kill the channel's running invocation, if any. Deregistration is
    /// immediate; any output the killed process produced is discarded.
    pub async fn stop(&self, channel: &ChannelId) -> Option<String> {
        let removed = self.sessions.lock().await.deregister(channel);
        removed.map(|process| {
            process.abort();
            process.project
        })
    }

    /// Abort every running invocation across all channels (shutdown path).
    pub async fn shutdown_all(&self) {
        let drained = self.sessions.lock().await.drain_all();
        for (channel, process) in drained {
            tracing::info!(%channel, project = %process.project, "killing assistant process");
            process.abort();
        }
    }

    async fn run_invocation(
        self: Arc<Self>,
        channel: ChannelId,
        origin: MessageRef,
        workdir: String,
        args: Vec<String>,
        mut abort_rx: watch::Receiver<bool>,
    ) {
        self.transport.set_marker(&origin, Marker::Working).await;

        let mut child = match self.spawn_assistant(&workdir, &args) {
            Ok(child) => child,
            Err(err) => {
                self.sessions.lock().await.deregister(&channel);
                self.transport.clear_marker(&origin).await;
                self.transport.set_marker(&origin, Marker::Failed).await;
                self.deliver(
                    &channel,
                    &format!("Failed to start {}: {err:#}", self.assistant.bin),
                )
                .await;
                return;
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_to_string(stdout));
        let stderr_task = tokio::spawn(read_to_string(stderr));

        // Heartbeat lives inside this select loop, so it stops on every
        // exit path with the loop itself. First tick fires immediately.
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = heartbeat.tick() => {
                    self.transport.typing(&channel).await;
                }
                _ = abort_rx.changed() => {
                    if *abort_rx.borrow() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return;
                    }
                }
            }
        };

        // An explicit stop may have raced the exit; the stop path already
        // deregistered and claimed the outcome, so drop it here.
        if self.sessions.lock().await.deregister(&channel).is_none() {
            return;
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let code = match status {
            Ok(status) => status.code().unwrap_or(-1),
            Err(err) => {
                tracing::warn!(error = %err, %channel, "failed to reap assistant process");
                -1
            }
        };

        self.transport.clear_marker(&origin).await;
        let marker = if code == 0 {
            Marker::Succeeded
        } else {
            Marker::Failed
        };
        self.transport.set_marker(&origin, marker).await;

        let response = classify_output(code, &stdout, &stderr);
        tracing::info!(%channel, code, bytes = response.len(), "assistant finished");
        self.deliver(&channel, &response).await;
    }

    fn spawn_assistant(&self, workdir: &str, args: &[String]) -> anyhow::Result<Child> {
        Command::new(&self.assistant.bin)
            .args(args)
            .current_dir(workdir)
            .env("NO_COLOR", "1")
            .env("FORCE_COLOR", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn {}", self.assistant.bin))
    }

    /// Send a response as ordered chunks. Only the final send is allowed to
    /// matter; failures are logged, not retried.
    async fn deliver(&self, channel: &ChannelId, text: &str) {
        for chunk in split_chunks(text, MAX_MESSAGE_BYTES) {
            if let Err(err) = self.transport.send_text(channel, &chunk).await {
                tracing::warn!(error = %err, %channel, "failed to deliver response chunk");
            }
        }
    }
}

/// Classify an exited invocation into the user-visible response.
fn classify_output(code: i32, stdout: &str, stderr: &str) -> String {
    let response = strip_ansi(stdout).trim().to_owned();
    if !response.is_empty() {
        return response;
    }

    let err = strip_ansi(stderr).trim().to_owned();
    if !err.is_empty() {
        return format!("Error:\n```\n{err}\n```");
    }

    if code == 0 {
        "*(completed with no output)*".to_owned()
    } else {
        format!("*(exited with code {code})*")
    }
}

async fn read_to_string<R>(reader: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
