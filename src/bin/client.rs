use clap::{ArgAction, Parser};
use four_in_a_line_server::board::{NCOLS, NROWS};
use four_in_a_line_server::logger::Logger;
use four_in_a_line_server::protocol::{
    split_fields, split_records, ErrorCode, MessageType, Request, Response, FRAME_SIZE,
};
use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name    = "client",
    version,
    about   = "Four in a Line — terminal client",
    long_about = "Connects to a running game server and plays interactively.\n\
                  Type `help` once connected for the commands available in\n\
                  the lobby, and again once a match starts."
)]
struct Args {
    /// Server address to connect to
    #[arg(default_value = "127.0.0.1:7878")]
    addr: String,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

// ── CLIENT EVENTS (operational logging to stderr) ─────────────────────────────

enum ClientEvent<'a> {
    Connecting { addr: &'a str },
    Connected { addr: &'a str },
    Sending { msg_type: MessageType },
    Received { msg_type: MessageType, error: ErrorCode },
    Disconnected,
}

impl fmt::Display for ClientEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::Connecting { addr } => write!(f, "connecting to {addr}..."),
            ClientEvent::Connected { addr } => write!(f, "connected to {addr}"),
            ClientEvent::Sending { msg_type } => write!(f, "-> {msg_type:?}"),
            ClientEvent::Received { msg_type, error } => write!(f, "<- {msg_type:?} ({error})"),
            ClientEvent::Disconnected => write!(f, "connection closed by server"),
        }
    }
}

// ── CLIENT-SIDE MODE ──────────────────────────────────────────────────────────
//
// The server never pushes a "match started" notice to the player who created
// it (CONNECT_GAME_RSP goes only to the joiner, per the wire catalogue); a
// waiting creator discovers the match has started the way the reference
// protocol intends: by polling and getting WAIT_OPPONENT until it doesn't.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    LoggingIn,
    Lobby,
    InMatch { spectating: bool },
}

fn print_lobby_help() {
    println!("  players              list logged-in players");
    println!("  games                list open and running games");
    println!("  create <size>        create a game on an NxN board (4-20)");
    println!("  join <id>            join a game as the second player");
    println!("  spectate <id>        watch a game");
    println!("  quit                 disconnect");
}

fn print_match_help(spectating: bool) {
    if spectating {
        println!("  board                print the current board");
        println!("  back                 return to the lobby");
    } else {
        println!("  board                print the current board");
        println!("  turn                 check whose turn it is");
        println!("  move <x> <y>         play at (x, y), 1-indexed");
        println!("  msg <text>           send a message to your opponent");
        println!("  leave                give up / cancel a waiting game");
    }
    println!("  quit                 disconnect");
}

// ── RENDERING SERVER RESPONSES ────────────────────────────────────────────────

fn parse_board_payload(payload: &[u8]) -> Option<(i32, &[u8])> {
    let hash = payload.iter().position(|&b| b == b'#')?;
    let size: i32 = std::str::from_utf8(&payload[..hash]).ok()?.trim().parse().ok()?;
    let rest = &payload[hash + 1..];
    let end = rest.iter().position(|&b| b == b'#').unwrap_or(rest.len());
    Some((size, &rest[..end]))
}

fn render_board(size: i32, dump: &[u8]) -> String {
    let n = (size.max(0) as usize).min(NROWS).min(NCOLS);
    let mut out = String::new();
    for row in 0..n {
        for col in 0..n {
            let cell = dump.get(row * NCOLS + col).copied().unwrap_or(b'0');
            out.push(match cell {
                b'x' => 'X',
                b'o' => 'O',
                _ => '.',
            });
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

fn render_players_list(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let names = split_records(&text);
    if names.is_empty() {
        "  (nobody else is logged in)".to_string()
    } else {
        names.iter().map(|n| format!("  {n}")).collect::<Vec<_>>().join("\n")
    }
}

fn render_games_list(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let records = split_records(&text);
    if records.is_empty() {
        return "  (no games are open)".to_string();
    }
    let mut out = String::new();
    for record in records {
        let fields = split_fields(record);
        let (id, size, free_spectators, nicks) = match fields.as_slice() {
            [id, size, free, nicks @ ..] => (*id, *size, *free, nicks),
            _ => continue,
        };
        out.push_str(&format!(
            "  game {id}  {size}x{size}  players: {}  spectator slots free: {free_spectators}\n",
            nicks.join(", ")
        ));
    }
    out
}

/// Prints a response frame the way the reference client would react to it,
/// and returns the mode the client should move to afterwards.
fn handle_response(rsp: &Response, mode: Mode, game_id: &mut i32) -> Mode {
    match rsp.msg_type {
        MessageType::LoginRsp => {
            if rsp.error == ErrorCode::None {
                println!("Logged in.");
                print_lobby_help();
                Mode::Lobby
            } else {
                println!("Login rejected ({}); that nickname is already taken.", rsp.error);
                Mode::LoggingIn
            }
        }
        MessageType::PlayersListRsp => {
            println!("{}", render_players_list(&rsp.payload));
            mode
        }
        MessageType::GamesListRsp => {
            println!("{}", render_games_list(&rsp.payload));
            mode
        }
        MessageType::CreateGameRsp => {
            if rsp.error == ErrorCode::None {
                let id: i32 = String::from_utf8_lossy(&rsp.payload).trim().parse().unwrap_or(0);
                *game_id = id;
                println!("Game {id} created. Waiting for an opponent...");
                print_match_help(false);
                Mode::InMatch { spectating: false }
            } else {
                println!("Could not create game ({}).", rsp.error);
                mode
            }
        }
        MessageType::ConnectGameRsp => {
            if rsp.error == ErrorCode::None {
                println!("Joined game {game_id}. The match has started!");
                print_match_help(false);
                Mode::InMatch { spectating: false }
            } else {
                println!("Could not join game {game_id} ({}).", rsp.error);
                Mode::Lobby
            }
        }
        MessageType::ConnectSpectatorRsp => {
            if rsp.error == ErrorCode::None {
                println!("Spectating game {game_id}.");
                print_match_help(true);
                Mode::InMatch { spectating: true }
            } else {
                println!("Could not spectate game {game_id} ({}).", rsp.error);
                Mode::Lobby
            }
        }
        MessageType::BackToMenuRsp => {
            println!("Back in the lobby.");
            print_lobby_help();
            *game_id = 0;
            Mode::Lobby
        }
        MessageType::LeaveRsp => {
            println!("Left game {game_id}.");
            *game_id = 0;
            print_lobby_help();
            Mode::Lobby
        }
        MessageType::PrintBoardRsp | MessageType::PrintBoardSpcRsp => {
            if rsp.error == ErrorCode::WaitOpponent {
                println!("Still waiting for an opponent to join.");
            } else if let Some((size, dump)) = parse_board_payload(&rsp.payload) {
                print!("{}", render_board(size, dump));
            }
            mode
        }
        MessageType::CheckTurnRsp => {
            if rsp.error == ErrorCode::WaitOpponent {
                println!("Still waiting for an opponent to join.");
            } else {
                match rsp.payload.first() {
                    Some(b'0') => println!("It is your turn."),
                    Some(b'1') => println!("Waiting on your opponent's turn."),
                    _ => println!("Unexpected CHECK_TURN payload."),
                }
            }
            mode
        }
        MessageType::MakeMoveRsp => {
            match rsp.error {
                ErrorCode::None => println!("Move accepted."),
                ErrorCode::WrongTurn => println!("Not your turn."),
                ErrorCode::WrongMove => println!("Invalid move."),
                ErrorCode::WaitOpponent => println!("Still waiting for an opponent to join."),
                other => println!("Move rejected ({other})."),
            }
            mode
        }
        MessageType::LeaveMessageRsp => {
            println!("[opponent] {}", String::from_utf8_lossy(&rsp.payload));
            mode
        }
        MessageType::PrintResultSpcRsp => {
            println!("{}", String::from_utf8_lossy(&rsp.payload));
            mode
        }
        MessageType::PrintWinRsp => {
            println!("You won!");
            *game_id = 0;
            mode
        }
        MessageType::PrintLostRsp => {
            println!("You lost.");
            *game_id = 0;
            mode
        }
        MessageType::PrintDrawRsp => {
            println!("The game ended in a draw.");
            *game_id = 0;
            mode
        }
        MessageType::CleanupRsp => {
            println!("The match ended; back in the lobby.");
            *game_id = 0;
            print_lobby_help();
            Mode::Lobby
        }
        _ => mode,
    }
}

// ── SENDING REQUESTS ──────────────────────────────────────────────────────────

async fn send(
    writer: &mut OwnedWriteHalf,
    logger: &Logger,
    msg_type: MessageType,
    payload: impl Into<Vec<u8>>,
) -> bool {
    let req = Request::new(msg_type, payload);
    logger.verbose(ClientEvent::Sending { msg_type });
    writer.write_all(&req.encode()).await.is_ok()
}

/// Parses one line of interactive input into a request, given the client's
/// current mode; returns `None` for unrecognised or out-of-mode input.
fn parse_command(mode: Mode, line: &str) -> Option<(MessageType, Vec<u8>)> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next()?.to_ascii_lowercase();

    match (mode, keyword.as_str()) {
        (Mode::Lobby, "players") => Some((MessageType::PlayersList, Vec::new())),
        (Mode::Lobby, "games") => Some((MessageType::GamesList, Vec::new())),
        (Mode::Lobby, "create") => {
            let size = tokens.next()?;
            Some((MessageType::CreateGame, size.as_bytes().to_vec()))
        }
        (Mode::Lobby, "join") => {
            let id = tokens.next()?;
            Some((MessageType::ConnectGame, id.as_bytes().to_vec()))
        }
        (Mode::Lobby, "spectate") => {
            let id = tokens.next()?;
            Some((MessageType::ConnectSpectator, id.as_bytes().to_vec()))
        }
        (Mode::InMatch { spectating: false }, "board") => Some((MessageType::PrintBoard, Vec::new())),
        (Mode::InMatch { spectating: false }, "turn") => Some((MessageType::CheckTurn, Vec::new())),
        (Mode::InMatch { spectating: false }, "move") => {
            let x = tokens.next()?;
            let y = tokens.next()?;
            Some((MessageType::MakeMove, format!("{x}#{y}#").into_bytes()))
        }
        (Mode::InMatch { spectating: false }, "msg") => {
            let rest = line.splitn(2, char::is_whitespace).nth(1)?;
            Some((MessageType::LeaveMessage, rest.as_bytes().to_vec()))
        }
        (Mode::InMatch { spectating: false }, "leave") => Some((MessageType::Leave, Vec::new())),
        (Mode::InMatch { spectating: true }, "board") => Some((MessageType::PrintBoard, Vec::new())),
        (Mode::InMatch { spectating: true }, "back") => Some((MessageType::BackToMenu, Vec::new())),
        _ => None,
    }
}

// ── MAIN ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let logger = Logger::new(args.verbose);

    logger.info(ClientEvent::Connecting { addr: &args.addr });

    let stream = match TcpStream::connect(&args.addr).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect to {}: {e}", args.addr);
            std::process::exit(1);
        }
    };
    let _ = stream.set_nodelay(true);

    logger.info(ClientEvent::Connected { addr: &args.addr });

    let (mut read_half, mut writer) = stream.into_split();
    let (rsp_tx, mut rsp_rx) = mpsc::unbounded_channel::<Response>();

    tokio::spawn(async move {
        loop {
            let mut buf = [0u8; FRAME_SIZE];
            if read_half.read_exact(&mut buf).await.is_err() {
                break;
            }
            match Response::decode(&buf) {
                Ok(rsp) => {
                    if rsp_tx.send(rsp).is_err() {
                        break;
                    }
                }
                Err(_) => continue,
            }
        }
    });

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut mode = Mode::LoggingIn;
    let mut game_id: i32 = 0;

    println!("Enter a nickname to log in:");

    loop {
        tokio::select! {
            rsp = rsp_rx.recv() => {
                let Some(rsp) = rsp else {
                    logger.info(ClientEvent::Disconnected);
                    println!("\nDisconnected from server.");
                    break;
                };
                logger.verbose(ClientEvent::Received { msg_type: rsp.msg_type, error: rsp.error });
                mode = handle_response(&rsp, mode, &mut game_id);
            }
            line = stdin_lines.next_line() => {
                let Ok(Some(line)) = line else {
                    println!("\nInput closed.");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("quit") {
                    break;
                }
                if line.eq_ignore_ascii_case("help") {
                    match mode {
                        Mode::LoggingIn => println!("  <nickname>           log in"),
                        Mode::Lobby => print_lobby_help(),
                        Mode::InMatch { spectating } => print_match_help(spectating),
                    }
                    continue;
                }

                if mode == Mode::LoggingIn {
                    if !send(&mut writer, &logger, MessageType::Login, line.as_bytes().to_vec()).await {
                        eprintln!("Failed to send login.");
                        break;
                    }
                    continue;
                }

                match parse_command(mode, line) {
                    Some((msg_type, payload)) => {
                        if !send(&mut writer, &logger, msg_type, payload).await {
                            eprintln!("Failed to send command.");
                            break;
                        }
                    }
                    None => println!("Unrecognised command; type `help`."),
                }
            }
        }
    }
}
