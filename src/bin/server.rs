use financial_chat_relay::{
    api::start_server, config::AppConfig, gateway::YahooMarketData, llm::GeminiClient,
    ChatService,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    if config.llm.api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; chat replies will fail until it is configured");
        warn!("See .env.example for setup instructions");
    }

    info!("Financial Chat Relay - WebSocket Server");
    info!(
        port = config.port,
        model = %config.llm.model,
        market_data = %config.market_data.base_url,
        window_size = config.memory.window_size,
        keep_recent = config.memory.keep_recent,
        "Configuration loaded"
    );

    // Create collaborators
    let model = Arc::new(GeminiClient::new(&config.llm)?);
    let provider = Arc::new(YahooMarketData::new(&config.market_data)?);

    let chat = Arc::new(ChatService::from_config(&config, model, provider));

    info!("Chat service initialized");

    start_server(chat, config.port).await?;

    Ok(())
}
