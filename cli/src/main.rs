//! `collab-cli`: headless whiteboard client.
//!
//! `session` joins a room and drives the canvas core from a script;
//! `snapshot` joins, prints the room's elements as JSON and leaves.

mod error;
mod script;
mod session;
mod ws;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::error::CliError;
use crate::session::Driver;
use crate::ws::Backoff;

#[derive(Parser, Debug)]
#[command(name = "collab-cli", about = "Headless collaborative whiteboard client")]
struct Cli {
    /// Websocket endpoint of the room server.
    #[arg(long, env = "COLLAB_WS_URL", default_value = "ws://127.0.0.1:3000/api/ws")]
    url: String,

    #[arg(long, env = "COLLAB_ROOM")]
    room: String,

    /// Connection attempts before giving up (also per reconnect).
    #[arg(long, default_value_t = 8)]
    max_retries: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a session script against the room.
    Session(SessionArgs),
    /// Print the room's elements and leave.
    Snapshot,
}

#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long, default_value = "-", help = "Script path, or - for stdin")]
    script: String,

    /// Ask the server to persist the room when the script ends.
    #[arg(long, default_value_t = false)]
    persist_on_exit: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let backoff = Backoff::new(cli.max_retries.max(1));

    match cli.command {
        Command::Session(args) => run_session(&cli.url, &cli.room, backoff, args).await,
        Command::Snapshot => run_snapshot(&cli.url, &cli.room, backoff).await,
    }
}

async fn run_session(url: &str, room: &str, backoff: Backoff, args: SessionArgs) -> Result<(), CliError> {
    let steps = script::load(&args.script).await?;
    tracing::info!(%room, steps = steps.len(), "starting session");
    let mut driver = Driver::join(url, room, backoff).await?;
    driver.run(steps).await?;
    driver.finish(args.persist_on_exit).await
}

async fn run_snapshot(url: &str, room: &str, backoff: Backoff) -> Result<(), CliError> {
    let driver = Driver::join(url, room, backoff).await?;
    let rendered = serde_json::to_string_pretty(driver.session().doc().elements())?;
    println!("{rendered}");
    driver.finish(false).await
}
