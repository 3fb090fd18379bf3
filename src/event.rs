//! Loggable occurrences, one `Display` impl per variant, in the same style
//! used for the per-connection-pair events of the physics placement game
//! server this one grew out of.

use std::fmt;

use crate::conn::ConnId;

pub enum Event {
    Listening { addr: String },
    PlayerLoggedIn { conn: ConnId, nick: String },
    LoginRejected { conn: ConnId, nick: String },
    PlayerLoggedOut { conn: ConnId },
    GameCreated { game_id: i32, size: i32, creator: String },
    GameStarted { game_id: i32 },
    GameEnded { game_id: i32, reason: &'static str },
    MoveAccepted { game_id: i32, conn: ConnId, x: i32, y: i32 },
    MoveRejected { game_id: i32, conn: ConnId, reason: &'static str },
    SpectatorJoined { game_id: i32, conn: ConnId },
    SpectatorLeft { game_id: i32, conn: ConnId },
    DispatchNoOp { conn: ConnId, msg_type: i32 },
    AcceptError { reason: String },
    Shutdown,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Listening { addr } => write!(f, "listening on {addr}"),
            Event::PlayerLoggedIn { conn, nick } => write!(f, "{conn} logged in as {nick}"),
            Event::LoginRejected { conn, nick } =>
                write!(f, "{conn} login rejected, nick {nick:?} already taken"),
            Event::PlayerLoggedOut { conn } => write!(f, "{conn} disconnected"),
            Event::GameCreated { game_id, size, creator } =>
                write!(f, "game {game_id} created by {creator} (size {size})"),
            Event::GameStarted { game_id } => write!(f, "game {game_id} started"),
            Event::GameEnded { game_id, reason } => write!(f, "game {game_id} ended ({reason})"),
            Event::MoveAccepted { game_id, conn, x, y } =>
                write!(f, "game {game_id}: {conn} played ({x},{y})"),
            Event::MoveRejected { game_id, conn, reason } =>
                write!(f, "game {game_id}: {conn} move rejected ({reason})"),
            Event::SpectatorJoined { game_id, conn } =>
                write!(f, "game {game_id}: {conn} joined as spectator"),
            Event::SpectatorLeft { game_id, conn } =>
                write!(f, "game {game_id}: spectator {conn} left"),
            Event::DispatchNoOp { conn, msg_type } =>
                write!(f, "{conn} sent message type {msg_type} not valid in its current mode"),
            Event::AcceptError { reason } => write!(f, "accept error: {reason}"),
            Event::Shutdown => write!(f, "shutting down on interrupt"),
        }
    }
}
