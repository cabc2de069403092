use clap::{Parser, Subcommand};
use lib::llm::{CompletionBackend, CompletionError};

#[derive(Parser)]
#[command(name = "replybot")]
#[command(about = "replybot: answer LINE messages with a completion model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json. Credentials stay unset; provide them via env or .env.
    Init {
        /// Config file path (default: REPLYBOT_CONFIG_PATH or ~/.replybot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the webhook gateway. Requires LINE_CHANNEL_SECRET (or channels.line.channelSecret).
    Gateway {
        /// Config file path (default: REPLYBOT_CONFIG_PATH or ~/.replybot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from PORT env, config, or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one message through the configured prompt template and print the completion. Nothing is sent to LINE.
    Ask {
        /// Config file path (default: REPLYBOT_CONFIG_PATH or ~/.replybot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Message text, as a user would type it in the chat.
        text: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {}", e);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("replybot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask { config, text }) => {
            if let Err(e) = run_ask(config, &text).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config).await
}

async fn run_ask(config_path: Option<std::path::PathBuf>, text: &str) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let client = lib::llm::OpenAiClient::new(
        Some(config.completion.base_url.clone()),
        lib::config::resolve_completion_api_key(&config),
        config.completion.model.clone(),
    );
    let policy = lib::dispatch::PromptPolicy::from(&config.completion);
    let prompt = policy.build_prompt(text);
    log::info!("ask: prompt {:?} with model {}", prompt, client.model());
    let completion = client.complete(&prompt, policy.max_tokens).await?;
    let reply = completion.first_text().ok_or(CompletionError::NoChoices)?;
    println!("{}", reply.trim());
    Ok(())
}
