//! The single accepting/dispatching task (§4.4).
//!
//! Owns every client connection not currently owned by a match worker.
//! Async replaces the reference server's `select`-over-file-descriptors
//! loop with `tokio::select!` over three event sources (new connections,
//! frames/disconnects from owned connections, and connection releases
//! handed back by workers) plus a shutdown signal; see `conn` and `worker`
//! for how ownership of a connection actually moves between this task and
//! one spawned per STARTED match.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::board::{MAX_BOARD_SIZE, MIN_BOARD_SIZE};
use crate::conn::{self, ConnEvent, ConnId, OutboundHandle, Route};
use crate::event::Event;
use crate::logger::Logger;
use crate::protocol::{ErrorCode, MessageType, Request, Response, MAX_NICK_LEN};
use crate::registry::{Game, GameRegistry, GameState, Player, PlayerRegistry, WorkerRegistry};
use crate::worker::{self, Occupant, ReleaseMsg, SpectatorJoin, StartMatch};

/// Shared state handed to every handler, replacing the reference server's
/// module-level globals (§9 "Global state → scoped registries").
pub struct Server {
    pub players: Arc<PlayerRegistry>,
    pub games: Arc<GameRegistry>,
    pub workers: Arc<WorkerRegistry>,
    pub logger: Arc<Logger>,
    pub max_games: usize,
    /// The lobby's own inbound sender, so a dispatch handler spawning a
    /// worker can hand it the address every occupant's route gets swapped
    /// back to on release. Set once, from inside `run`, before the accept
    /// loop starts processing any frame.
    lobby_inbound: std::sync::OnceLock<mpsc::UnboundedSender<ConnEvent>>,
}

impl Server {
    pub fn new(logger: Arc<Logger>, max_games: usize) -> Arc<Self> {
        Arc::new(Server {
            players: Arc::new(PlayerRegistry::new()),
            games: Arc::new(GameRegistry::new()),
            workers: Arc::new(WorkerRegistry::new()),
            logger,
            max_games: max_games.max(1),
            lobby_inbound: std::sync::OnceLock::new(),
        })
    }
}

/// Bookkeeping the lobby keeps for every connection it currently owns.
struct LobbyConn {
    outbound: OutboundHandle,
    route: Route,
}

/// Runs the lobby until an interrupt signal arrives (§4.6: the lobby stops
/// on SIGINT; workers do not and are torn down with the process).
pub async fn run(listener: TcpListener, server: Arc<Server>) {
    let (lobby_inbound_tx, mut lobby_inbound_rx) = mpsc::unbounded_channel::<ConnEvent>();
    let (release_tx, mut release_rx) = mpsc::unbounded_channel::<ReleaseMsg>();
    let mut owned: HashMap<ConnId, LobbyConn> = HashMap::new();
    let _ = server.lobby_inbound.set(lobby_inbound_tx.clone());

    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    server.logger.info(Event::Listening { addr });

    loop {
        tokio::select! {
            accept_res = listener.accept() => {
                match accept_res {
                    Ok((stream, _addr)) => {
                        let _ = stream.set_nodelay(true);
                        let (conn, outbound, route) =
                            conn::spawn_connection(stream, lobby_inbound_tx.clone());
                        owned.insert(conn, LobbyConn { outbound, route });
                    }
                    Err(e) => server.logger.warn(Event::AcceptError { reason: e.to_string() }),
                }
            }
            Some(event) = lobby_inbound_rx.recv() => {
                match event {
                    ConnEvent::Frame(frame) => {
                        let conn = frame.conn;
                        if owned.contains_key(&conn) {
                            if let Ok(req) = Request::decode(&frame.frame) {
                                dispatch(&server, &mut owned, &release_tx, conn, req).await;
                            }
                        }
                        let _ = frame.ack.send(());
                    }
                    ConnEvent::Closed(conn) => {
                        handle_closed(&server, &mut owned, conn);
                    }
                }
            }
            Some(release) = release_rx.recv() => {
                for rc in release.conns {
                    owned.insert(rc.conn, LobbyConn { outbound: rc.outbound, route: rc.route });
                }
            }
            _ = tokio::signal::ctrl_c() => {
                server.logger.info(Event::Shutdown);
                break;
            }
        }
    }
}

fn send(owned: &HashMap<ConnId, LobbyConn>, conn: ConnId, rsp: &Response) {
    if let Some(lc) = owned.get(&conn) {
        lc.outbound.send_frame(rsp.encode());
    }
}

/// Parses a decimal integer out of a payload that may carry trailing wire
/// punctuation (`#`, `;`) or NUL padding remnants.
fn parse_int_payload(payload: &[u8]) -> Option<i32> {
    let text = String::from_utf8_lossy(payload);
    let trimmed = text.trim_matches(|c: char| c == '#' || c == ';' || c == '\0' || c.is_whitespace());
    trimmed.parse::<i32>().ok()
}

async fn dispatch(
    server: &Arc<Server>,
    owned: &mut HashMap<ConnId, LobbyConn>,
    release_tx: &mpsc::UnboundedSender<ReleaseMsg>,
    conn: ConnId,
    req: Request,
) {
    let player = server.players.get(conn);

    match (&player, req.msg_type) {
        (None, MessageType::Login) => handle_login(server, owned, conn, &req.payload),
        (None, msg_type) => {
            server.logger.verbose(Event::DispatchNoOp { conn, msg_type: msg_type as i32 });
        }
        (Some(_), MessageType::Login) => {
            // Already logged in; a second LOGIN is a no-op.
        }
        (Some(_), MessageType::PlayersList) => handle_players_list(server, owned, conn),
        (Some(_), MessageType::GamesList) => handle_games_list(server, owned, conn),
        (Some(p), MessageType::CreateGame) => handle_create_game(server, owned, conn, p, &req.payload),
        (Some(p), MessageType::ConnectGame) => {
            handle_connect_game(server, owned, release_tx, conn, p, &req.payload).await
        }
        (Some(p), MessageType::ConnectSpectator) => {
            handle_connect_spectator(server, owned, conn, p, &req.payload).await
        }
        (Some(_), MessageType::BackToMenu) => handle_back_to_menu(server, owned, conn, &req.payload),
        (Some(p), MessageType::Leave) => handle_leave_waiting(server, owned, conn, p, &req.payload),
        (Some(p), MessageType::PrintBoard) => {
            wait_opponent_or_noop(server, owned, conn, p, MessageType::PrintBoardRsp)
        }
        (Some(p), MessageType::CheckTurn) => {
            wait_opponent_or_noop(server, owned, conn, p, MessageType::CheckTurnRsp)
        }
        (Some(p), MessageType::MakeMove) => {
            wait_opponent_or_noop(server, owned, conn, p, MessageType::MakeMoveRsp)
        }
        (Some(p), MessageType::LeaveMessage) => {
            wait_opponent_or_noop(server, owned, conn, p, MessageType::LeaveMessageRsp)
        }
        _ => {
            server.logger.verbose(Event::DispatchNoOp { conn, msg_type: req.msg_type as i32 });
        }
    }
}

fn handle_login(server: &Arc<Server>, owned: &HashMap<ConnId, LobbyConn>, conn: ConnId, payload: &[u8]) {
    let mut nick = String::from_utf8_lossy(payload).trim().to_string();
    nick.truncate(MAX_NICK_LEN);

    if nick.is_empty() || server.players.nick_exists(&nick) {
        server.logger.verbose(Event::LoginRejected { conn, nick: nick.clone() });
        let rsp = Response::new(MessageType::LoginRsp, ErrorCode::NickExists, Vec::new());
        send(owned, conn, &rsp);
        return;
    }

    server.players.insert(Player { conn, nick: nick.clone(), game_id: 0 });
    server.logger.info(Event::PlayerLoggedIn { conn, nick });
    let rsp = Response::new(MessageType::LoginRsp, ErrorCode::None, Vec::new());
    send(owned, conn, &rsp);
}

fn handle_players_list(server: &Arc<Server>, owned: &HashMap<ConnId, LobbyConn>, conn: ConnId) {
    let payload = server.players.nicks().join("#");
    let rsp = Response::new(MessageType::PlayersListRsp, ErrorCode::None, payload.into_bytes());
    send(owned, conn, &rsp);
}

fn handle_games_list(server: &Arc<Server>, owned: &HashMap<ConnId, LobbyConn>, conn: ConnId) {
    let mut payload = String::new();
    for (id, size, free_spectators, nicks) in server.games.list_snapshot() {
        payload.push_str(&format!("{id};{size};{free_spectators};{}#", nicks.join(";")));
    }
    let rsp = Response::new(MessageType::GamesListRsp, ErrorCode::None, payload.into_bytes());
    send(owned, conn, &rsp);
}

fn handle_create_game(
    server: &Arc<Server>,
    owned: &HashMap<ConnId, LobbyConn>,
    conn: ConnId,
    player: &Player,
    payload: &[u8],
) {
    if player.game_id != 0 {
        // Already attached to a match; creating another is not valid.
        return;
    }

    let Some(size) = parse_int_payload(payload) else {
        let rsp = Response::new(MessageType::CreateGameRsp, ErrorCode::WrongBoardSize, Vec::new());
        send(owned, conn, &rsp);
        return;
    };

    if size < MIN_BOARD_SIZE || size > MAX_BOARD_SIZE {
        let rsp = Response::new(MessageType::CreateGameRsp, ErrorCode::WrongBoardSize, Vec::new());
        send(owned, conn, &rsp);
        return;
    }

    let Some(id) = server.games.allocate_id() else {
        let rsp = Response::new(MessageType::CreateGameRsp, ErrorCode::InternalServerError, Vec::new());
        send(owned, conn, &rsp);
        return;
    };

    let mut game = Game::new(id, size);
    game.players[0] = Some(conn);
    game.nicks[0] = Some(player.nick.clone());
    game.no_connected_players = 1;
    server.games.insert(game);
    server.players.set_game_id(conn, id);

    server.logger.info(Event::GameCreated { game_id: id, size, creator: player.nick.clone() });
    let rsp = Response::new(MessageType::CreateGameRsp, ErrorCode::None, id.to_string().into_bytes());
    send(owned, conn, &rsp);
}

enum ConnectOutcome {
    WrongGameId,
    TooManyPlayers,
    Started {
        player0: ConnId,
        player1: ConnId,
        starting_slot: usize,
        spectators: Vec<ConnId>,
    },
}

async fn handle_connect_game(
    server: &Arc<Server>,
    owned: &mut HashMap<ConnId, LobbyConn>,
    release_tx: &mpsc::UnboundedSender<ReleaseMsg>,
    conn: ConnId,
    player: &Player,
    payload: &[u8],
) {
    if player.game_id != 0 {
        return;
    }

    let Some(id) = parse_int_payload(payload) else {
        let rsp = Response::new(MessageType::ConnectGameRsp, ErrorCode::WrongGameId, Vec::new());
        send(owned, conn, &rsp);
        return;
    };

    if server.games.started_count() >= server.max_games {
        let rsp = Response::new(MessageType::ConnectGameRsp, ErrorCode::InternalServerError, Vec::new());
        send(owned, conn, &rsp);
        return;
    }

    let nick = player.nick.clone();
    let outcome = server
        .games
        .with_mut(id, |g| {
            if g.state == GameState::Started || g.players[1].is_some() {
                return ConnectOutcome::TooManyPlayers;
            }
            let player0 = g.players[0].expect("a WAITING game always has slot 0 filled");
            g.players[1] = Some(conn);
            g.nicks[1] = Some(nick.clone());
            g.no_connected_players = 2;
            g.state = GameState::Started;
            let starting_slot = rand::thread_rng().gen_range(0..=1usize);
            g.current_player = g.players[starting_slot];
            let spectators = g.spectators.iter().flatten().copied().collect();
            ConnectOutcome::Started { player0, player1: conn, starting_slot, spectators }
        })
        .unwrap_or(ConnectOutcome::WrongGameId);

    match outcome {
        ConnectOutcome::WrongGameId => {
            let rsp = Response::new(MessageType::ConnectGameRsp, ErrorCode::WrongGameId, Vec::new());
            send(owned, conn, &rsp);
        }
        ConnectOutcome::TooManyPlayers => {
            let rsp = Response::new(MessageType::ConnectGameRsp, ErrorCode::TooManyPlayers, Vec::new());
            send(owned, conn, &rsp);
        }
        ConnectOutcome::Started { player0, player1, starting_slot, spectators } => {
            server.players.set_game_id(player1, id);

            let occ0 = take_occupant(server, owned, player0);
            let occ1 = take_occupant(server, owned, player1);
            let (Some(occ0), Some(occ1)) = (occ0, occ1) else {
                // A player disconnected in the narrow window between the
                // registry mutation above and this hand-off; give up on
                // starting the match rather than leaving half a worker.
                server.games.remove(id);
                let rsp = Response::new(MessageType::ConnectGameRsp, ErrorCode::InternalServerError, Vec::new());
                send(owned, conn, &rsp);
                return;
            };
            let spec_occs: Vec<Occupant> = spectators
                .into_iter()
                .filter_map(|s| take_occupant(server, owned, s))
                .collect();

            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            for occ in std::iter::once(&occ0).chain(std::iter::once(&occ1)).chain(spec_occs.iter()) {
                occ.route.set(inbound_tx.clone()).await;
            }

            let start = StartMatch {
                game_id: id,
                players: [occ0, occ1],
                spectators: spec_occs,
                starting_slot,
                inbound_tx: inbound_tx.clone(),
                inbound_rx,
                lobby_inbound: lobby_inbound_sender(server),
                player_registry: Arc::clone(&server.players),
                game_registry: Arc::clone(&server.games),
                worker_registry: Arc::clone(&server.workers),
                logger: Arc::clone(&server.logger),
            };
            worker::spawn(start, release_tx.clone());

            server.logger.info(Event::GameStarted { game_id: id });
            let rsp = Response::new(MessageType::ConnectGameRsp, ErrorCode::None, Vec::new());
            send(owned, player1, &rsp);
        }
    }
}

/// The channel a worker must repoint a departing occupant's route back to
/// so its frames resume flowing into the lobby's own `run` loop.
fn lobby_inbound_sender(server: &Arc<Server>) -> mpsc::UnboundedSender<ConnEvent> {
    server
        .lobby_inbound
        .get()
        .expect("lobby inbound sender set before the accept loop starts")
        .clone()
}

fn take_occupant(server: &Arc<Server>, owned: &mut HashMap<ConnId, LobbyConn>, conn: ConnId) -> Option<Occupant> {
    let lc = owned.remove(&conn)?;
    let nick = server.players.get(conn)?.nick;
    Some(Occupant { conn, outbound: lc.outbound, route: lc.route, nick })
}

async fn handle_connect_spectator(
    server: &Arc<Server>,
    owned: &mut HashMap<ConnId, LobbyConn>,
    conn: ConnId,
    player: &Player,
    payload: &[u8],
) {
    if player.game_id != 0 {
        return;
    }

    let Some(id) = parse_int_payload(payload) else {
        let rsp = Response::new(MessageType::ConnectSpectatorRsp, ErrorCode::WrongGameId, Vec::new());
        send(owned, conn, &rsp);
        return;
    };

    enum Outcome {
        TooMany,
        Ok(GameState),
    }

    let outcome = server.games.with_mut(id, |g| {
        if g.no_connected_spectators as usize >= crate::protocol::SPECTATORS_NO {
            return Outcome::TooMany;
        }
        match g.spectators.iter().position(|s| s.is_none()) {
            None => Outcome::TooMany,
            Some(slot) => {
                g.spectators[slot] = Some(conn);
                g.no_connected_spectators += 1;
                Outcome::Ok(g.state)
            }
        }
    });

    match outcome {
        None => {
            let rsp = Response::new(MessageType::ConnectSpectatorRsp, ErrorCode::WrongGameId, Vec::new());
            send(owned, conn, &rsp);
        }
        Some(Outcome::TooMany) => {
            let rsp = Response::new(MessageType::ConnectSpectatorRsp, ErrorCode::TooManySpectators, Vec::new());
            send(owned, conn, &rsp);
        }
        Some(Outcome::Ok(state)) => {
            server.players.set_game_id(conn, id);
            let rsp = Response::new(MessageType::ConnectSpectatorRsp, ErrorCode::None, Vec::new());
            send(owned, conn, &rsp);
            server.logger.verbose(Event::SpectatorJoined { game_id: id, conn });

            if state == GameState::Started {
                if let Some(occ) = take_occupant(server, owned, conn) {
                    if let Some(inbound_tx) = server.workers.inbound_sender(id) {
                        occ.route.set(inbound_tx).await;
                    }
                    if let Some(spectator_tx) = server.workers.spectator_sender(id) {
                        let _ = spectator_tx.send(SpectatorJoin { occupant: occ });
                    } else {
                        // Worker vanished between the registry update and
                        // this hand-off (match just ended); drop the
                        // connection back into limbo rather than lose it.
                        owned.insert(conn, LobbyConn { outbound: occ.outbound, route: occ.route });
                    }
                }
            }
        }
    }
}

fn handle_back_to_menu(server: &Arc<Server>, owned: &HashMap<ConnId, LobbyConn>, conn: ConnId, payload: &[u8]) {
    let Some(id) = parse_int_payload(payload) else {
        let rsp = Response::new(MessageType::BackToMenuRsp, ErrorCode::WrongGameId, Vec::new());
        send(owned, conn, &rsp);
        return;
    };

    let removed = server
        .games
        .with_mut(id, |g| {
            if let Some(pos) = g.spectators.iter().position(|s| *s == Some(conn)) {
                g.spectators[pos] = None;
                g.no_connected_spectators = g.no_connected_spectators.saturating_sub(1);
                true
            } else {
                false
            }
        })
        .unwrap_or(false);

    if removed {
        server.players.set_game_id(conn, 0);
        server.logger.verbose(Event::SpectatorLeft { game_id: id, conn });
        let rsp = Response::new(MessageType::BackToMenuRsp, ErrorCode::None, Vec::new());
        send(owned, conn, &rsp);
    } else {
        let rsp = Response::new(MessageType::BackToMenuRsp, ErrorCode::WrongGameId, Vec::new());
        send(owned, conn, &rsp);
    }
}

fn handle_leave_waiting(
    server: &Arc<Server>,
    owned: &HashMap<ConnId, LobbyConn>,
    conn: ConnId,
    player: &Player,
    payload: &[u8],
) {
    let id = parse_int_payload(payload).unwrap_or(player.game_id);

    let is_creator = server.games.with(id, |g| g.players[0] == Some(conn)).unwrap_or(false);
    if !is_creator {
        let rsp = Response::new(MessageType::LeaveRsp, ErrorCode::WrongGameId, Vec::new());
        send(owned, conn, &rsp);
        return;
    }

    server.games.remove(id);
    server.players.reset_game_id_for(id);
    server.logger.info(Event::GameEnded { game_id: id, reason: "creator left while waiting" });

    let rsp = Response::new(MessageType::LeaveRsp, ErrorCode::None, Vec::new());
    send(owned, conn, &rsp);
}

/// A still-WAITING match's occupants polling the in-match protocol get
/// WAIT_OPPONENT; logged-in clients with no match at all are a no-op,
/// matching the codec's rule for requests that make no sense in the
/// current mode (§4.2, §4.4).
fn wait_opponent_or_noop(
    server: &Arc<Server>,
    owned: &HashMap<ConnId, LobbyConn>,
    conn: ConnId,
    player: &Player,
    rsp_type: MessageType,
) {
    if player.game_id == 0 {
        server.logger.verbose(Event::DispatchNoOp { conn, msg_type: rsp_type as i32 });
        return;
    }
    let rsp = Response::new(rsp_type, ErrorCode::WaitOpponent, Vec::new());
    send(owned, conn, &rsp);
}

fn handle_closed(server: &Arc<Server>, owned: &mut HashMap<ConnId, LobbyConn>, conn: ConnId) {
    owned.remove(&conn);
    let Some(player) = server.players.remove(conn) else { return; };
    server.logger.info(Event::PlayerLoggedOut { conn });

    if player.game_id == 0 {
        return;
    }

    let was_creator = server.games.with(player.game_id, |g| g.players[0] == Some(conn)).unwrap_or(false);
    if was_creator {
        server.games.remove(player.game_id);
        server.players.reset_game_id_for(player.game_id);
        server.logger.info(Event::GameEnded { game_id: player.game_id, reason: "creator disconnected while waiting" });
    } else {
        server.games.with_mut(player.game_id, |g| {
            if let Some(pos) = g.spectators.iter().position(|s| *s == Some(conn)) {
                g.spectators[pos] = None;
                g.no_connected_spectators = g.no_connected_spectators.saturating_sub(1);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;
    use crate::protocol::FRAME_SIZE;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start_server(max_games: usize) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(Arc::new(Logger::new(0)), max_games);
        tokio::spawn(run(listener, server));
        addr
    }

    async fn roundtrip(stream: &mut TcpStream, msg_type: MessageType, payload: impl Into<Vec<u8>>) -> Response {
        let req = Request::new(msg_type, payload);
        stream.write_all(&req.encode()).await.unwrap();
        let mut buf = [0u8; FRAME_SIZE];
        stream.read_exact(&mut buf).await.unwrap();
        Response::decode(&buf).unwrap()
    }

    async fn login(stream: &mut TcpStream, nick: &str) -> Response {
        roundtrip(stream, MessageType::Login, nick.as_bytes().to_vec()).await
    }

    #[tokio::test]
    async fn duplicate_nickname_is_rejected() {
        let addr = start_server(8).await;
        let mut alice = TcpStream::connect(addr).await.unwrap();
        let mut bob = TcpStream::connect(addr).await.unwrap();

        assert_eq!(login(&mut alice, "alice").await.error, ErrorCode::None);
        assert_eq!(login(&mut bob, "alice").await.error, ErrorCode::NickExists);
    }

    #[tokio::test]
    async fn created_game_appears_in_games_list() {
        let addr = start_server(8).await;
        let mut alice = TcpStream::connect(addr).await.unwrap();
        login(&mut alice, "alice").await;

        let created = roundtrip(&mut alice, MessageType::CreateGame, b"4".to_vec()).await;
        assert_eq!(created.error, ErrorCode::None);
        let game_id: i32 = String::from_utf8_lossy(&created.payload).parse().unwrap();

        let mut bob = TcpStream::connect(addr).await.unwrap();
        login(&mut bob, "bob").await;
        let listing = roundtrip(&mut bob, MessageType::GamesList, Vec::new()).await;
        let text = String::from_utf8_lossy(&listing.payload);
        assert!(text.starts_with(&format!("{game_id};4;5;alice")));
    }

    #[tokio::test]
    async fn second_player_joining_starts_the_match() {
        let addr = start_server(8).await;
        let mut alice = TcpStream::connect(addr).await.unwrap();
        login(&mut alice, "alice").await;
        let created = roundtrip(&mut alice, MessageType::CreateGame, b"4".to_vec()).await;
        let game_id = created.payload.clone();

        // Waiting creator polling CHECK_TURN gets WAIT_OPPONENT before the
        // second player connects.
        let waiting = roundtrip(&mut alice, MessageType::CheckTurn, Vec::new()).await;
        assert_eq!(waiting.error, ErrorCode::WaitOpponent);

        let mut bob = TcpStream::connect(addr).await.unwrap();
        login(&mut bob, "bob").await;
        let joined = roundtrip(&mut bob, MessageType::ConnectGame, game_id).await;
        assert_eq!(joined.error, ErrorCode::None);

        let board = roundtrip(&mut alice, MessageType::PrintBoard, Vec::new()).await;
        assert_eq!(board.error, ErrorCode::None);
    }

    #[tokio::test]
    async fn connect_game_beyond_capacity_is_rejected() {
        let addr = start_server(1).await;

        let mut a1 = TcpStream::connect(addr).await.unwrap();
        login(&mut a1, "a1").await;
        let g1 = roundtrip(&mut a1, MessageType::CreateGame, b"4".to_vec()).await.payload;
        let mut a2 = TcpStream::connect(addr).await.unwrap();
        login(&mut a2, "a2").await;
        assert_eq!(roundtrip(&mut a2, MessageType::ConnectGame, g1).await.error, ErrorCode::None);

        let mut b1 = TcpStream::connect(addr).await.unwrap();
        login(&mut b1, "b1").await;
        let g2 = roundtrip(&mut b1, MessageType::CreateGame, b"4".to_vec()).await.payload;
        let mut b2 = TcpStream::connect(addr).await.unwrap();
        login(&mut b2, "b2").await;
        assert_eq!(
            roundtrip(&mut b2, MessageType::ConnectGame, g2).await.error,
            ErrorCode::InternalServerError
        );
    }

    #[tokio::test]
    async fn give_up_while_waiting_removes_the_game() {
        let addr = start_server(8).await;
        let mut alice = TcpStream::connect(addr).await.unwrap();
        login(&mut alice, "alice").await;
        let created = roundtrip(&mut alice, MessageType::CreateGame, b"4".to_vec()).await;
        let game_id = created.payload;

        let left = roundtrip(&mut alice, MessageType::Leave, game_id.clone()).await;
        assert_eq!(left.error, ErrorCode::None);

        let mut bob = TcpStream::connect(addr).await.unwrap();
        login(&mut bob, "bob").await;
        let rejoin = roundtrip(&mut bob, MessageType::ConnectGame, game_id).await;
        assert_eq!(rejoin.error, ErrorCode::WrongGameId);
    }
}
