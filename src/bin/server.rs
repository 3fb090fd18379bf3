use clap::{ArgAction, Parser};
use four_in_a_line_server::lobby::{self, Server};
use four_in_a_line_server::logger::Logger;
use std::sync::Arc;
use tokio::net::TcpListener;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name    = "server",
    version,
    about   = "Four in a Line — dedicated server",
    long_about = "Accepts TCP clients into a shared lobby, then runs authoritative\n\
                  four-in-a-row matches. Protocol is a fixed-size framed binary\n\
                  codec; see src/protocol.rs for the wire format."
)]
struct Args {
    /// Port to listen on (bound on 0.0.0.0)
    port: u16,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Maximum number of games that may be STARTED concurrently
    #[arg(short = 'g', long, default_value_t = 64)]
    max_games: u32,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let logger = Arc::new(Logger::new(args.verbose));

    let bind = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&bind).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {bind}: {e}");
        std::process::exit(1);
    });

    let server = Server::new(logger, args.max_games.max(1) as usize);
    lobby::run(listener, server).await;
}
