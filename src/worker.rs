//! Per-match worker: one task per STARTED game, owning the two players'
//! and current spectators' connections until the match ends.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::board::{Move, MoveOutcome};
use crate::conn::{ConnEvent, ConnId, OutboundHandle, Route};
use crate::event::Event;
use crate::logger::Logger;
use crate::protocol::{ErrorCode, MessageType, Request, Response};
use crate::registry::{GameRegistry, PlayerRegistry, WorkerHandle, WorkerRegistry};

/// One occupant of a match: either a player or a spectator.
pub struct Occupant {
    pub conn: ConnId,
    pub outbound: OutboundHandle,
    pub route: Route,
    pub nick: String,
}

/// Carried from the lobby into a freshly spawned worker at CONNECT_GAME.
/// By the time this reaches [`spawn`], every occupant's route has already
/// been pointed at `inbound_tx` by the caller — the swap happens
/// synchronously in the lobby, before the worker task is even created, so
/// there is no window where a completed read has nowhere to go.
pub struct StartMatch {
    pub game_id: i32,
    pub players: [Occupant; 2],
    pub spectators: Vec<Occupant>,
    pub starting_slot: usize,
    pub inbound_tx: mpsc::UnboundedSender<ConnEvent>,
    pub inbound_rx: mpsc::UnboundedReceiver<ConnEvent>,
    pub lobby_inbound: mpsc::UnboundedSender<ConnEvent>,
    pub player_registry: Arc<PlayerRegistry>,
    pub game_registry: Arc<GameRegistry>,
    pub worker_registry: Arc<WorkerRegistry>,
    pub logger: Arc<Logger>,
}

/// Lobby→worker notice that a new spectator descriptor should be folded
/// into this worker's owned set.
pub struct SpectatorJoin {
    pub occupant: Occupant,
}

pub struct ReleasedConn {
    pub conn: ConnId,
    pub outbound: OutboundHandle,
    pub route: Route,
    pub nick: String,
}

/// Worker→lobby notice that these connections are being handed back. Sent
/// once immediately whenever a spectator backs out mid-match, and once
/// more (covering whatever remains) when the match itself ends.
pub struct ReleaseMsg {
    pub game_id: i32,
    pub conns: Vec<ReleasedConn>,
}

/// What handling one request did to the match, beyond sending a reply.
enum Effect {
    None,
    Terminate,
    SpectatorLeft(Occupant),
}

pub fn spawn(
    start: StartMatch,
    release_tx: mpsc::UnboundedSender<ReleaseMsg>,
) -> mpsc::UnboundedSender<SpectatorJoin> {
    let (spectator_tx, spectator_rx) = mpsc::unbounded_channel();

    start.worker_registry.insert(WorkerHandle {
        game_id: start.game_id,
        spectator_tx: spectator_tx.clone(),
        inbound_tx: start.inbound_tx.clone(),
    });

    let worker = Worker {
        game_id: start.game_id,
        players: start.players,
        spectators: start.spectators,
        current_player: start.starting_slot,
        decisive: false,
        disconnected_player: None,
        lobby_inbound: start.lobby_inbound,
        release_tx: release_tx.clone(),
        player_registry: start.player_registry,
        game_registry: start.game_registry,
        worker_registry: start.worker_registry,
        logger: start.logger,
    };

    tokio::spawn(run(worker, start.inbound_rx, spectator_rx));

    spectator_tx
}

struct Worker {
    game_id: i32,
    players: [Occupant; 2],
    spectators: Vec<Occupant>,
    current_player: usize,
    decisive: bool,
    disconnected_player: Option<ConnId>,
    lobby_inbound: mpsc::UnboundedSender<ConnEvent>,
    release_tx: mpsc::UnboundedSender<ReleaseMsg>,
    player_registry: Arc<PlayerRegistry>,
    game_registry: Arc<GameRegistry>,
    worker_registry: Arc<WorkerRegistry>,
    logger: Arc<Logger>,
}

async fn run(
    mut w: Worker,
    mut inbound_rx: mpsc::UnboundedReceiver<ConnEvent>,
    mut spectator_rx: mpsc::UnboundedReceiver<SpectatorJoin>,
) {
    // Every occupant's route was already pointed at `w.inbound_tx` by the
    // lobby before it called `spawn`, so there is nothing to swap here.
    w.logger.info(Event::GameStarted { game_id: w.game_id });

    let mut trigger: Option<ConnId> = None;

    'outer: loop {
        tokio::select! {
            event = inbound_rx.recv() => {
                match event {
                    Some(ConnEvent::Frame(frame)) => {
                        let conn = frame.conn;
                        let req = match Request::decode(&frame.frame) {
                            Ok(req) => req,
                            Err(_) => { let _ = frame.ack.send(()); continue; }
                        };
                        let effect = w.handle_request(conn, req);
                        let _ = frame.ack.send(());
                        match effect {
                            Effect::None => {}
                            Effect::Terminate => {
                                trigger = Some(conn);
                                break 'outer;
                            }
                            Effect::SpectatorLeft(occupant) => {
                                w.release_one(occupant).await;
                            }
                        }
                    }
                    Some(ConnEvent::Closed(conn)) => {
                        let was_player = w.handle_disconnect(conn);
                        if was_player {
                            trigger = Some(conn);
                            break 'outer;
                        }
                    }
                    None => break 'outer,
                }
            }
            join = spectator_rx.recv() => {
                if let Some(join) = join {
                    w.add_spectator(join.occupant);
                }
            }
        }
    }

    w.finish(trigger).await;
}

impl Worker {
    fn pawn_for_slot(slot: usize) -> u8 {
        if slot == 0 { b'x' } else { b'o' }
    }

    fn slot_of(&self, conn: ConnId) -> Option<usize> {
        self.players.iter().position(|p| p.conn == conn)
    }

    fn spectator_index(&self, conn: ConnId) -> Option<usize> {
        self.spectators.iter().position(|s| s.conn == conn)
    }

    fn send_to(&self, conn: ConnId, rsp: &Response) {
        if let Some(slot) = self.slot_of(conn) {
            self.players[slot].outbound.send_frame(rsp.encode());
        } else if let Some(idx) = self.spectator_index(conn) {
            self.spectators[idx].outbound.send_frame(rsp.encode());
        }
    }

    fn broadcast_to_spectators(&self, rsp: &Response) {
        for s in &self.spectators {
            s.outbound.send_frame(rsp.encode());
        }
    }

    fn handle_request(&mut self, conn: ConnId, req: Request) -> Effect {
        match req.msg_type {
            MessageType::PrintBoard => {
                self.handle_print_board(conn);
                Effect::None
            }
            MessageType::CheckTurn => {
                self.handle_check_turn(conn);
                Effect::None
            }
            MessageType::MakeMove => {
                if self.handle_make_move(conn, &req.payload) {
                    Effect::Terminate
                } else {
                    Effect::None
                }
            }
            MessageType::LeaveMessage => {
                self.handle_leave_message(conn, &req.payload);
                Effect::None
            }
            MessageType::Leave => {
                if self.slot_of(conn).is_some() {
                    let rsp = Response::new(MessageType::LeaveRsp, ErrorCode::None, Vec::new());
                    self.send_to(conn, &rsp);
                    self.logger.info(Event::GameEnded { game_id: self.game_id, reason: "give up" });
                    Effect::Terminate
                } else {
                    Effect::None
                }
            }
            MessageType::BackToMenu => {
                if let Some(idx) = self.spectator_index(conn) {
                    let rsp = Response::new(MessageType::BackToMenuRsp, ErrorCode::None, Vec::new());
                    self.send_to(conn, &rsp);
                    let occupant = self.spectators.remove(idx);
                    self.player_registry.set_game_id(conn, 0);
                    self.forget_spectator_in_registry(conn);
                    self.logger.verbose(Event::SpectatorLeft { game_id: self.game_id, conn });
                    Effect::SpectatorLeft(occupant)
                } else {
                    Effect::None
                }
            }
            // Any other request type is not part of the in-match protocol;
            // silently ignored, matching the codec's rule for unknown types.
            _ => Effect::None,
        }
    }

    fn handle_print_board(&self, conn: ConnId) {
        self.game_registry.with(self.game_id, |g| {
            let dump = g.board.dump();
            let mut payload = format!("{}#", g.board.size()).into_bytes();
            payload.extend_from_slice(&dump);
            payload.push(b'#');
            let rsp = Response::new(MessageType::PrintBoardRsp, ErrorCode::None, payload);
            self.send_to(conn, &rsp);
        });
    }

    fn handle_check_turn(&self, conn: ConnId) {
        let mine = self.slot_of(conn) == Some(self.current_player);
        let payload = if mine { "0" } else { "1" };
        let rsp = Response::new(MessageType::CheckTurnRsp, ErrorCode::None, payload.as_bytes().to_vec());
        self.send_to(conn, &rsp);
    }

    fn handle_make_move(&mut self, conn: ConnId, payload: &[u8]) -> bool {
        let Some(slot) = self.slot_of(conn) else { return false; };
        if slot != self.current_player {
            let rsp = Response::new(MessageType::MakeMoveRsp, ErrorCode::WrongTurn, Vec::new());
            self.send_to(conn, &rsp);
            return false;
        }

        let text = String::from_utf8_lossy(payload);
        let fields: Vec<&str> = text.split('#').filter(|s| !s.is_empty()).collect();
        let parsed = match (fields.first(), fields.get(1)) {
            (Some(xs), Some(ys)) => match (xs.trim().parse::<i32>(), ys.trim().parse::<i32>()) {
                (Ok(x), Ok(y)) => Some((x, y)),
                _ => None,
            },
            _ => None,
        };
        let Some((x1, y1)) = parsed else {
            let rsp = Response::new(MessageType::MakeMoveRsp, ErrorCode::WrongMove, Vec::new());
            self.send_to(conn, &rsp);
            return false;
        };
        let mv = Move { x: x1 - 1, y: y1 - 1, pawn: Self::pawn_for_slot(slot) };

        let outcome = self.game_registry.with_mut(self.game_id, |g| g.board.make_move(&mv));
        let Some(outcome) = outcome else { return false; };

        match outcome {
            Err("INTERNAL_SERVER_ERROR") => {
                self.logger.warn(Event::MoveRejected { game_id: self.game_id, conn, reason: "corrupted board" });
                let rsp = Response::new(MessageType::MakeMoveRsp, ErrorCode::InternalServerError, Vec::new());
                self.send_to(conn, &rsp);
                false
            }
            Err(_) => {
                self.logger.verbose(Event::MoveRejected { game_id: self.game_id, conn, reason: "invalid move" });
                let rsp = Response::new(MessageType::MakeMoveRsp, ErrorCode::WrongMove, Vec::new());
                self.send_to(conn, &rsp);
                false
            }
            Ok(MoveOutcome::Continue) => {
                self.logger.verbose(Event::MoveAccepted { game_id: self.game_id, conn, x: mv.x, y: mv.y });
                self.current_player = 1 - slot;
                let next_conn = self.players[self.current_player].conn;
                self.game_registry.with_mut(self.game_id, |g| g.current_player = Some(next_conn));
                let rsp = Response::new(MessageType::MakeMoveRsp, ErrorCode::None, Vec::new());
                self.send_to(conn, &rsp);
                self.broadcast_board(MessageType::PrintBoardSpcRsp);
                false
            }
            Ok(MoveOutcome::Win) => {
                self.logger.info(Event::GameEnded { game_id: self.game_id, reason: "win" });
                let win = Response::new(MessageType::PrintWinRsp, ErrorCode::None, Vec::new());
                self.send_to(conn, &win);
                let opponent = self.players[1 - slot].conn;
                let lost = Response::new(MessageType::PrintLostRsp, ErrorCode::None, Vec::new());
                self.send_to(opponent, &lost);
                let narrative = format!("Player {} won the game!", self.players[slot].nick);
                let spc = Response::new(MessageType::PrintResultSpcRsp, ErrorCode::None, narrative.into_bytes());
                self.broadcast_to_spectators(&spc);
                self.decisive = true;
                true
            }
            Ok(MoveOutcome::Draw) => {
                self.logger.info(Event::GameEnded { game_id: self.game_id, reason: "draw" });
                let draw = Response::new(MessageType::PrintDrawRsp, ErrorCode::None, Vec::new());
                for p in &self.players {
                    p.outbound.send_frame(draw.encode());
                }
                self.broadcast_to_spectators(&draw);
                self.decisive = true;
                true
            }
        }
    }

    fn broadcast_board(&self, msg_type: MessageType) {
        self.game_registry.with(self.game_id, |g| {
            let dump = g.board.dump();
            let mut payload = format!("{}#", g.board.size()).into_bytes();
            payload.extend_from_slice(&dump);
            payload.push(b'#');
            let rsp = Response::new(msg_type, ErrorCode::None, payload);
            self.broadcast_to_spectators(&rsp);
        });
    }

    fn handle_leave_message(&self, conn: ConnId, payload: &[u8]) {
        let Some(slot) = self.slot_of(conn) else { return; };
        let other = self.players[1 - slot].conn;
        let rsp = Response::new(MessageType::LeaveMessageRsp, ErrorCode::None, payload.to_vec());
        self.send_to(other, &rsp);
    }

    /// Returns `true` if the closed connection belonged to a player (which
    /// ends the match); spectator disconnects are handled in place and do
    /// not terminate the worker.
    fn handle_disconnect(&mut self, conn: ConnId) -> bool {
        if self.slot_of(conn).is_some() {
            self.player_registry.remove(conn);
            self.logger.info(Event::PlayerLoggedOut { conn });
            self.disconnected_player = Some(conn);
            true
        } else if let Some(idx) = self.spectator_index(conn) {
            self.player_registry.remove(conn);
            self.spectators.remove(idx);
            self.forget_spectator_in_registry(conn);
            false
        } else {
            false
        }
    }

    /// Clears this connection's slot in the match's registry-visible
    /// spectator array, keeping `no_connected_spectators` accurate for
    /// GAMES_LIST while the match is still in progress (the worker's own
    /// `self.spectators` is the source of truth for frame routing, but the
    /// lobby reads the registry copy for listing).
    fn forget_spectator_in_registry(&self, conn: ConnId) {
        self.game_registry.with_mut(self.game_id, |g| {
            if let Some(pos) = g.spectators.iter().position(|s| *s == Some(conn)) {
                g.spectators[pos] = None;
                g.no_connected_spectators = g.no_connected_spectators.saturating_sub(1);
            }
        });
    }

    /// Folds a spectator handed off by the lobby into this worker's own
    /// set. The lobby has already repointed the occupant's route at this
    /// worker's inbound channel (via the `inbound_tx` clone it keeps in the
    /// [`WorkerHandle`]) before ever sending the join, so there is nothing
    /// left to swap here.
    fn add_spectator(&mut self, occupant: Occupant) {
        self.logger.verbose(Event::SpectatorJoined { game_id: self.game_id, conn: occupant.conn });
        self.spectators.push(occupant);
    }

    /// Immediately hands one connection back to the lobby, independent of
    /// match end (used for mid-match BACK_TO_MENU).
    async fn release_one(&self, occupant: Occupant) {
        occupant.route.set(self.lobby_inbound.clone()).await;
        let _ = self.release_tx.send(ReleaseMsg {
            game_id: self.game_id,
            conns: vec![ReleasedConn {
                conn: occupant.conn,
                outbound: occupant.outbound,
                route: occupant.route,
                nick: occupant.nick,
            }],
        });
    }

    async fn finish(self, trigger: Option<ConnId>) {
        let mut returned = Vec::new();

        for p in self.players {
            let is_trigger = Some(p.conn) == trigger;
            let is_disconnected = Some(p.conn) == self.disconnected_player;
            if is_disconnected {
                continue;
            }
            if !self.decisive && !is_trigger {
                let rsp = Response::new(MessageType::CleanupRsp, ErrorCode::None, Vec::new());
                p.outbound.send_frame(rsp.encode());
            }
            self.player_registry.set_game_id(p.conn, 0);
            p.route.set(self.lobby_inbound.clone()).await;
            returned.push(ReleasedConn { conn: p.conn, outbound: p.outbound, route: p.route, nick: p.nick });
        }

        for s in self.spectators {
            if !self.decisive {
                let rsp = Response::new(MessageType::CleanupRsp, ErrorCode::None, Vec::new());
                s.outbound.send_frame(rsp.encode());
            }
            self.player_registry.set_game_id(s.conn, 0);
            s.route.set(self.lobby_inbound.clone()).await;
            returned.push(ReleasedConn { conn: s.conn, outbound: s.outbound, route: s.route, nick: s.nick });
        }

        let reason = if self.decisive { "decided" } else { "abandoned" };
        self.logger.verbose(Event::GameEnded { game_id: self.game_id, reason });

        self.worker_registry.remove(self.game_id);
        self.game_registry.remove(self.game_id);

        let _ = self.release_tx.send(ReleaseMsg { game_id: self.game_id, conns: returned });
    }
}
