//! Telegram event wiring: allow-list, command dispatch, prompt routing.

use std::sync::Arc;

use anyhow::Context as _;
use courier_core::command::{parse_message, Command, ParsedMessage};
use courier_core::config::{normalize_project_name, ConfigFile};
use courier_core::paths::CourierPaths;
use teloxide::dispatching::{Dispatcher, ShutdownToken, UpdateFilterExt as _};
use teloxide::dptree;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use tokio::sync::Mutex;

use crate::config_store;
use crate::session::ChannelId;
use crate::supervisor::{Dispatch, Supervisor};
use crate::transport::MessageRef;

const HELP_TEXT: &str = "\
Courier relays your prompts to the coding assistant on this machine.

/use <name> — set the active project for this chat
/projects — list all projects
/add <name> <path> [description] — add a project
/remove <name> — remove a project
/clear — start a fresh conversation (next message only)
/stop — kill the running assistant process
/status — show current state

Set a project with /use, then just type your prompts.";

pub struct App {
    pub paths: CourierPaths,
    pub config: Mutex<ConfigFile>,
    pub supervisor: Arc<Supervisor>,
}

impl App {
    /// Re-read the config from disk, mirroring the registry's
    /// refresh-before-read behavior for command handlers.
    async fn reload_config(&self) -> anyhow::Result<ConfigFile> {
        let fresh = config_store::load(&self.paths).await?;
        let mut config = self.config.lock().await;
        *config = fresh.clone();
        Ok(fresh)
    }

    async fn store_config(&self, next: ConfigFile) -> anyhow::Result<()> {
        config_store::save(&self.paths, &next).await?;
        *self.config.lock().await = next;
        Ok(())
    }
}

/// Run the long-polling dispatcher until shutdown.
pub async fn run_dispatcher(bot: Bot, app: Arc<App>) {
    let handler = Update::filter_message().endpoint(handle_message);

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app.clone()])
        .default_handler(|update| async move {
            tracing::debug!(?update, "unhandled update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text("message handler error"))
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(shutdown_signal_watcher(app, shutdown));

    dispatcher.dispatch().await;
}

async fn shutdown_signal_watcher(app: Arc<App>, token: ShutdownToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).ok();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async { if let Some(s) = sigterm.as_mut() { s.recv().await; } } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutting down");
    app.supervisor.shutdown_all().await;
    if let Ok(finished) = token.shutdown() {
        finished.await;
    }
}

async fn handle_message(bot: Bot, msg: Message, app: Arc<App>) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(from) = msg.from.clone() else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }

    // Direct conversations only.
    if !msg.chat.is_private() {
        return Ok(());
    }

    // Allow-list check: silently ignore everyone else.
    let allowed = app.config.lock().await.is_allowed(&from.id.to_string());
    if !allowed {
        tracing::debug!(user = %from.id, "ignoring message from non-allowed user");
        return Ok(());
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let channel = ChannelId::from(msg.chat.id.0);

    match parse_message(text) {
        ParsedMessage::Command(command) => {
            handle_command(&bot, &msg, &app, &channel, command).await
        }
        ParsedMessage::Malformed { usage } => {
            reply(&bot, &msg, &usage).await
        }
        ParsedMessage::Unknown { name } => {
            reply(&bot, &msg, &format!("Unknown command /{name}. Try /help.")).await
        }
        ParsedMessage::Prompt(prompt) => {
            handle_prompt(&bot, &msg, &app, &channel, &prompt).await
        }
    }
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    app: &Arc<App>,
    channel: &ChannelId,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Help => reply(bot, msg, HELP_TEXT).await,

        Command::Projects => {
            let config = app.reload_config().await?;
            if config.projects.is_empty() {
                return reply(bot, msg, "No projects yet. Use /add <name> <path> to add one.")
                    .await;
            }

            let bound = config.project_for_channel(channel.as_str());
            let mut text = String::from("Projects:\n");
            for (name, project) in &config.projects {
                let active = if bound == Some(name.as_str()) {
                    "  (active)"
                } else {
                    ""
                };
                text.push_str(&format!("\n{name}{active}\n"));
                if let Some(desc) = &project.description {
                    text.push_str(&format!("  {desc}\n"));
                }
                text.push_str(&format!("  {}\n", project.path));
            }
            reply(bot, msg, &text).await
        }

        Command::Add {
            name,
            path,
            description,
        } => {
            let config = app.reload_config().await?;
            match config.add_project(&name, &path, description.as_deref()) {
                Ok((next, added)) => {
                    app.store_config(next).await?;
                    reply(bot, msg, &format!("Added {added} -> {path}")).await
                }
                Err(err) => reply(bot, msg, &format!("Cannot add project: {err}")).await,
            }
        }

        Command::Remove { name } => {
            let config = app.reload_config().await?;
            let name = normalize_project_name(&name);
            match config.remove_project(&name) {
                Ok(next) => {
                    app.store_config(next).await?;
                    reply(bot, msg, &format!("Removed {name}")).await
                }
                Err(_) => reply(bot, msg, &format!("Project {name} not found.")).await,
            }
        }

        Command::Use { name: None } => {
            let config = app.reload_config().await?;
            let text = match config.project_for_channel(channel.as_str()) {
                Some(current) => format!("Active project: {current}"),
                None => "No active project. Use /use <name> to set one.".to_owned(),
            };
            reply(bot, msg, &text).await
        }

        Command::Use { name: Some(name) } => {
            let config = app.reload_config().await?;
            let name = normalize_project_name(&name);
            match config.bind_channel(channel.as_str(), &name) {
                Ok(next) => {
                    let path = next.project(&name).map(|p| p.path.clone()).unwrap_or_default();
                    app.store_config(next).await?;
                    reply(bot, msg, &format!("Switched to {name} -> {path}")).await
                }
                Err(_) => {
                    let available = project_names(&config);
                    reply(
                        bot,
                        msg,
                        &format!("Project {name} not found.\nAvailable: {available}"),
                    )
                    .await
                }
            }
        }

        Command::Clear => {
            app.supervisor.mark_fresh_start(channel).await;
            reply(bot, msg, "Next message starts a fresh conversation.").await
        }

        Command::Stop => {
            let text = match app.supervisor.stop(channel).await {
                Some(project) => format!(
                    "Stopped {} (was on {project}).",
                    app.supervisor.assistant_bin()
                ),
                None => "Nothing running right now.".to_owned(),
            };
            reply(bot, msg, &text).await
        }

        Command::Status => {
            let config = app.reload_config().await?;
            let project = config
                .project_for_channel(channel.as_str())
                .unwrap_or("none set");
            let assistant = match app.supervisor.running_project(channel).await {
                Some(running) => format!("working on {running}"),
                None => "idle".to_owned(),
            };
            reply(
                bot,
                msg,
                &format!(
                    "Project: {project}\nAssistant: {assistant}\nTotal projects: {}",
                    config.projects.len()
                ),
            )
            .await
        }
    }
}

async fn handle_prompt(
    bot: &Bot,
    msg: &Message,
    app: &Arc<App>,
    channel: &ChannelId,
    prompt: &str,
) -> anyhow::Result<()> {
    let config = app.config.lock().await.clone();

    let Some(project_name) = config.project_for_channel(channel.as_str()) else {
        let config = app.reload_config().await?;
        let text = if config.projects.is_empty() {
            "No projects configured yet. Use /add <name> <path> first.".to_owned()
        } else {
            format!(
                "Set a project first with /use <name>\nAvailable: {}",
                project_names(&config)
            )
        };
        return reply(bot, msg, &text).await;
    };
    let project_name = project_name.to_owned();

    let Some(project) = config.project(&project_name) else {
        return reply(bot, msg, &format!("Project {project_name} not found.")).await;
    };

    let origin = MessageRef {
        channel: channel.clone(),
        message_id: msg.id.0,
    };

    let outcome = app
        .supervisor
        .dispatch(channel.clone(), origin, &project_name, project, prompt)
        .await;

    match outcome {
        Dispatch::Launched => Ok(()),
        Dispatch::Busy { .. } => {
            reply(
                bot,
                msg,
                &format!(
                    "{} is still working. Use /stop to cancel, or wait.",
                    app.supervisor.assistant_bin()
                ),
            )
            .await
        }
    }
}

fn project_names(config: &ConfigFile) -> String {
    if config.projects.is_empty() {
        return "none".to_owned();
    }
    config
        .projects
        .keys()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

async fn reply(bot: &Bot, msg: &Message, text: &str) -> anyhow::Result<()> {
    bot.send_message(msg.chat.id, text)
        .await
        .context("send reply")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use courier_core::paths::{compute_paths, PathInputs};
    use serde_json::json;

    use crate::supervisor::AssistantConfig;
    use crate::transport::{ChatTransport, Marker};

    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatTransport for CountingTransport {
        async fn send_text(&self, _channel: &ChannelId, _text: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_marker(&self, _origin: &MessageRef, _marker: Marker) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn clear_marker(&self, _origin: &MessageRef) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn typing(&self, _channel: &ChannelId) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_app(dir: &tempfile::TempDir, config: ConfigFile) -> (Arc<App>, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            calls: AtomicUsize::new(0),
        });
        let supervisor = Arc::new(Supervisor::new(
            AssistantConfig {
                bin: "true".to_owned(),
            },
            transport.clone() as Arc<dyn ChatTransport>,
        ));
        let paths = compute_paths(PathInputs {
            home_dir: dir.path().to_path_buf(),
            courier_dir_override: Some(dir.path().join("courier")),
        });
        (
            Arc::new(App {
                paths,
                config: Mutex::new(config),
                supervisor,
            }),
            transport,
        )
    }

    fn message(chat: serde_json::Value, from: serde_json::Value, text: &str) -> Message {
        serde_json::from_value(json!({
            "message_id": 1,
            "date": 0,
            "chat": chat,
            "from": from,
            "text": text,
        }))
        .unwrap()
    }

    fn private_chat(id: i64) -> serde_json::Value {
        json!({ "id": id, "type": "private", "first_name": "U" })
    }

    fn user(id: u64, is_bot: bool) -> serde_json::Value {
        json!({ "id": id, "is_bot": is_bot, "first_name": "U" })
    }

    fn fake_bot() -> Bot {
        Bot::new("123456:TEST")
    }

    #[tokio::test]
    async fn non_allowed_user_is_dropped_without_dispatch() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ConfigFile {
            allowed_users: vec!["1".to_owned()],
            ..Default::default()
        };
        let (app, transport) = test_app(&dir, config);

        let msg = message(private_chat(10), user(99, false), "do something");
        handle_message(fake_bot(), msg, app.clone()).await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            app.supervisor.running_project(&ChannelId::from(10)).await,
            None
        );
    }

    #[tokio::test]
    async fn bot_authors_are_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let (app, transport) = test_app(&dir, ConfigFile::default());

        let msg = message(private_chat(10), user(99, true), "hello");
        handle_message(fake_bot(), msg, app).await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn group_chats_are_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let (app, transport) = test_app(&dir, ConfigFile::default());

        let chat = json!({ "id": -100, "type": "group", "title": "room" });
        let msg = message(chat, user(99, false), "hello");
        handle_message(fake_bot(), msg, app).await.unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}

