use async_trait::async_trait;
use clap::{Parser, Subcommand};
use reportbot::dialogue::{DialogueController, Notifier, OutboundMessage};
use reportbot::storage::{ConversationKey, ConversationStore};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "reportbot")]
#[command(about = "Quarterly report bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config file and the local share directory.
    Init {
        /// Config file path (default: REPORTBOT_CONFIG_PATH or ~/.reportbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (Bot Framework /api/messages, health check).
    Gateway {
        /// Config file path (default: REPORTBOT_CONFIG_PATH or ~/.reportbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3978)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Talk to the dialogue from the terminal, using the configured file share and services.
    Chat {
        /// Config file path (default: REPORTBOT_CONFIG_PATH or ~/.reportbot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Conversation id; records are stored under "cli:<id>".
        #[arg(long, value_name = "ID", default_value = "local")]
        conversation: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("reportbot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            conversation,
        }) => {
            if let Err(e) = run_chat(config, conversation).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(reportbot::config::default_config_path);
    let dir = reportbot::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = reportbot::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    reportbot::gateway::run_gateway(config, path).await
}

/// Print one outbound message. Returns the quick-reply labels it offered.
fn render(message: &OutboundMessage) -> Vec<String> {
    match message {
        OutboundMessage::Text(text) => {
            println!("< {}", text);
            Vec::new()
        }
        OutboundMessage::SuggestedActions { text, actions } => {
            println!("< {}", text);
            for (i, action) in actions.iter().enumerate() {
                println!("    [{}] {}", i + 1, action.title);
            }
            actions.iter().map(|a| a.value.clone()).collect()
        }
        OutboundMessage::Card(card) => {
            println!("< {}\n  {}\n  {}: {}", card.title, card.subtitle, card.button_title, card.url);
            Vec::new()
        }
    }
}

/// Prints progress notices as soon as the dialogue produces them.
struct Console;

#[async_trait]
impl Notifier for Console {
    async fn notify(&self, message: OutboundMessage) {
        render(&message);
    }
}

/// A bare number picks the matching quick reply from the last prompt.
fn resolve_choice(input: &str, choices: &[String]) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| choices.get(i))
        .cloned()
        .unwrap_or_else(|| input.to_string())
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    conversation: String,
) -> anyhow::Result<()> {
    let (config, path) = reportbot::config::load_config(config_path)?;
    let store = reportbot::storage::from_config(&config, &path).await?;
    let controller: DialogueController = reportbot::gateway::build_controller(&config, &path);
    let key = ConversationKey::new("cli", conversation);

    let greeting = controller.start();
    store.set(&key, &greeting.state).await?;
    let mut choices = Vec::new();
    for message in &greeting.messages {
        choices = render(message);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        let text = resolve_choice(input, &choices);
        let state = store.get_or_default(&key).await?;
        let result = controller.handle_message_with(state, &text, &Console).await;
        store.set(&key, &result.state).await?;
        log::debug!("chat: now in {:?}", result.state.flow_state);
        choices.clear();
        for message in &result.messages {
            let offered = render(message);
            if !offered.is_empty() {
                choices = offered;
            }
        }
    }

    Ok(())
}
