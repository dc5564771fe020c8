//! Terminal chat client
//!
//! Runs one session against the chat service in-process. Plain lines are sent
//! as chat messages, lines starting with `{` as raw JSON frames.

use clap::Parser;
use financial_chat_relay::{
    config::AppConfig,
    gateway::{MarketDataProvider, MockMarketData, YahooMarketData},
    llm::{GeminiClient, LanguageModel, MockLanguageModel},
    protocol::InboundMessage,
    ChatService, OutboundMessage, RiskLevel, UserProfile,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(about = "Chat with the financial assistant from a terminal", long_about = None)]
struct CliArgs {
    /// Use the mock language model and market data
    #[arg(long)]
    offline: bool,

    /// Display name sent in the init frame
    #[arg(long, default_value = "User")]
    name: String,

    /// Risk profile: conservative, moderate or aggressive
    #[arg(long = "risk", default_value = "moderate")]
    risk_level: RiskLevel,
}

fn print_frame(frame: &OutboundMessage) {
    match frame {
        OutboundMessage::Message {
            content, action, ..
        } => match action {
            Some(action) => println!("\nFinBot [{}]: {}\n", action, content),
            None => println!("\nFinBot: {}\n", content),
        },
        OutboundMessage::Error { content, .. } => println!("\n[error] {}\n", content),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = CliArgs::parse();
    let config = AppConfig::from_env()?;
    let offline = args.offline || config.llm.api_key.is_empty();

    let (model, provider): (Arc<dyn LanguageModel>, Arc<dyn MarketDataProvider>) = if offline {
        (
            Arc::new(MockLanguageModel::new()),
            Arc::new(MockMarketData::new()),
        )
    } else {
        (
            Arc::new(GeminiClient::new(&config.llm)?),
            Arc::new(YahooMarketData::new(&config.market_data)?),
        )
    };

    info!(offline, model = model.name(), provider = provider.name(), "Starting chat");

    let chat = ChatService::from_config(&config, model, provider);
    let connection = chat.connect().await?;

    let welcome = chat
        .handle_inbound(
            connection,
            InboundMessage::Init {
                data: UserProfile {
                    name: args.name,
                    risk_level: args.risk_level,
                    ..UserProfile::default()
                },
            },
        )
        .await?;
    print_frame(&welcome);

    if offline {
        println!("(offline mode: mock model and market data)");
    }
    println!("Type a message, a JSON frame, or /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let frame = if line.starts_with('{') {
            chat.handle_frame(connection, line).await
        } else {
            let raw = serde_json::json!({ "type": "message", "content": line }).to_string();
            chat.handle_frame(connection, &raw).await
        };

        print_frame(&frame);
    }

    chat.disconnect(connection).await;
    Ok(())
}
