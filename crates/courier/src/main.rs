use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use courier::bot::{self, App};
use courier::config_store;
use courier::supervisor::{AssistantConfig, Supervisor};
use courier::transport::TelegramTransport;
use courier_core::paths::{compute_paths, CourierPaths, PathInputs};
use directories::BaseDirs;
use teloxide::prelude::*;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "courier",
    version,
    about = "Courier — chat relay for a local CLI coding assistant"
)]
struct Cli {
    #[arg(long, global = true, value_name = "DIR", env = "COURIER_DIR")]
    courier_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "COURIER_LOG", value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to Telegram and relay prompts to the assistant.
    Run(RunArgs),
    /// Generate shell completions.
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Telegram bot token.
    #[arg(long, env = "TELOXIDE_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Assistant binary to invoke for prompts.
    #[arg(long, env = "COURIER_ASSISTANT", default_value = "claude")]
    assistant: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Completion { shell } => {
            generate(shell, &mut Cli::command(), "courier", &mut io::stdout());
            Ok(())
        }
        Command::Run(args) => {
            let paths = resolve_paths(cli.courier_dir)?;
            init_logging(&paths, cli.log_level.as_deref())?;
            run_bot(paths, args).await
        }
    }
}

async fn run_bot(paths: CourierPaths, args: RunArgs) -> anyhow::Result<()> {
    // The only unrecoverable condition: no credentials, no event loop.
    let token = args.telegram_token.ok_or_else(|| {
        anyhow!("missing Telegram bot token: set TELOXIDE_TOKEN or pass --telegram-token")
    })?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "courier starting");

    let config = config_store::load(&paths).await?;

    if which::which(&args.assistant).is_err() {
        tracing::warn!(
            assistant = %args.assistant,
            "assistant binary not found on PATH; prompts will fail to start"
        );
    }

    let bot = Bot::new(token);
    let me = bot.get_me().await.context("telegram login")?;
    tracing::info!(
        bot = me.username(),
        projects = config.projects.len(),
        assistant = %args.assistant,
        "courier online; listening for direct messages"
    );

    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let supervisor = Arc::new(Supervisor::new(
        AssistantConfig {
            bin: args.assistant,
        },
        transport,
    ));
    let app = Arc::new(App {
        paths,
        config: tokio::sync::Mutex::new(config),
        supervisor,
    });

    bot::run_dispatcher(bot, app).await;
    Ok(())
}

fn resolve_paths(courier_dir_override: Option<PathBuf>) -> anyhow::Result<CourierPaths> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not determine home directory"))?;

    Ok(compute_paths(PathInputs {
        home_dir: base_dirs.home_dir().to_path_buf(),
        courier_dir_override,
    }))
}

fn init_logging(paths: &CourierPaths, log_level: Option<&str>) -> anyhow::Result<()> {
    let dir_ok = fs::create_dir_all(&paths.courier_dir).is_ok();

    let level = log_level
        .map(str::to_owned)
        .or_else(|| env::var("COURIER_LOG").ok())
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_owned());

    let filter = EnvFilter::try_new(level).context("parse log level")?;

    let file_layer = if dir_ok {
        tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::NEVER)
            .filename_prefix("courier")
            .filename_suffix("log")
            .build(&paths.courier_dir)
            .ok()
            .map(|file_appender| {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_appender)
            })
    } else {
        None
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}
