use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use chat_transport::{
    ChatClient, ChatTurn, ClientConfig, ClientUpdate, Connector, SseConnector, TransportKind,
    WsConnector,
};
use clap::Parser;
use stream_blocks::{BlockBody, ContentBlock};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chat-stream",
    version,
    about = "Send one prompt to a streaming chat backend and print the blocks as they arrive",
    long_about = "Send one prompt to a streaming chat backend and print the blocks as they arrive.\n\
                  \n\
                  Environment Variables:\n\
                    CHAT_STREAM_URL                  # Backend base URL (default http://localhost:3001)\n\
                    CHAT_STREAM_TRANSPORT            # websocket|sse\n\
                    CHAT_STREAM_TOKEN                # Bearer token sent on connect\n\
                    CHAT_STREAM_TIMEZONE             # IANA timezone attached to messages\n\
                    CHAT_STREAM_RECONNECT_DELAY_MS   # Delay between reconnect attempts\n\
                    CHAT_STREAM_MAX_RECONNECTS       # Reconnect attempts before giving up"
)]
struct Cli {
    /// Prompt to send
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Backend base URL (overrides CHAT_STREAM_URL)
    #[arg(long)]
    url: Option<String>,

    /// Transport to use (websocket|sse)
    #[arg(long)]
    transport: Option<String>,

    /// Ticker to attach to the turn; may be repeated
    #[arg(long = "ticker", short = 't')]
    tickers: Vec<String>,

    /// Print the finalized message as JSON after streaming
    #[arg(long)]
    json: bool,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.url.as_deref() {
        config.base_url = url.to_owned();
    }
    if let Some(name) = cli.transport.as_deref() {
        config.transport =
            TransportKind::parse(name).with_context(|| format!("unknown transport '{name}'"))?;
    }

    let turn = ChatTurn::new(cli.prompt.join(" ")).with_tickers(cli.tickers);
    match config.transport {
        TransportKind::WebSocket => {
            let connector = WsConnector::new(&config)?;
            info!(endpoint = connector.endpoint(), "using websocket transport");
            run(config, connector, turn, cli.json).await
        }
        TransportKind::Sse => {
            let connector = SseConnector::new(&config)?;
            info!(
                events = connector.events_endpoint(),
                chat = connector.chat_endpoint(),
                "using sse transport"
            );
            run(config, connector, turn, cli.json).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

async fn run<C: Connector>(
    config: ClientConfig,
    connector: C,
    turn: ChatTurn,
    json: bool,
) -> Result<()> {
    let base_url = config.base_url.clone();
    let (client, mut updates) = ChatClient::spawn(config, connector);
    client.connect();

    let mut stdout = io::stdout().lock();
    let mut sent = false;
    let mut outcome = Ok(());

    while let Some(update) = updates.recv().await {
        match update {
            ClientUpdate::Connectivity(true) if !sent => {
                client.send(turn.clone()).await?;
                sent = true;
            }
            ClientUpdate::Streaming(progress) => {
                for block in &progress.new_blocks {
                    print_block(&mut stdout, block)?;
                }
            }
            ClientUpdate::TurnFinished(message) => {
                writeln!(stdout)?;
                if let Some(error) = message.error.as_deref() {
                    eprintln!("server error: {error}");
                }
                if json {
                    writeln!(stdout, "{}", serde_json::to_string_pretty(&message)?)?;
                }
                break;
            }
            ClientUpdate::TurnAbandoned => {
                outcome = Err(anyhow::anyhow!("connection lost while the answer was streaming"));
                break;
            }
            ClientUpdate::ReconnectFailed => {
                outcome = Err(anyhow::anyhow!("could not reach {base_url}"));
                break;
            }
            ClientUpdate::Notice(notice) => eprintln!("{notice}"),
            ClientUpdate::Connectivity(_) | ClientUpdate::State(_) => {}
        }
    }

    client.shutdown();
    client.join().await;
    if !sent && outcome.is_ok() {
        bail!("client stopped before the prompt was sent");
    }
    outcome
}

fn print_block(out: &mut impl Write, block: &ContentBlock) -> io::Result<()> {
    match &block.body {
        BlockBody::Text { content } => write!(out, "{content}")?,
        BlockBody::Chart { data } => writeln!(out, "\n[chart {} {}]", data.symbol, data.time_range)?,
        BlockBody::HorizontalRule => writeln!(out, "\n----------")?,
        BlockBody::Article { data } | BlockBody::Image { data } | BlockBody::Event { data } => {
            let title = data
                .get("title")
                .and_then(|value| value.as_str())
                .unwrap_or("untitled");
            writeln!(out, "\n[{:?}: {title}]", block.kind())?;
        }
    }
    out.flush()
}
