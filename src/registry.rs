//! Thread-safe collections of players, games and per-match workers.
//!
//! Each registry is a plain `HashMap` behind its own `std::sync::Mutex`,
//! matching the reference server's three independently-locked linked lists
//! one lock per collection, operations keyed the same way (by nickname and
//! by connection id for players, by game id for games and workers).

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::board::Board;
use crate::conn::{ConnEvent, ConnId};
use crate::protocol::SPECTATORS_NO;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub conn: ConnId,
    pub nick: String,
    pub game_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Waiting,
    Started,
}

pub struct Game {
    pub id: i32,
    pub board: Board,
    pub state: GameState,
    pub players: [Option<ConnId>; 2],
    pub nicks: [Option<String>; 2],
    pub current_player: Option<ConnId>,
    pub spectators: [Option<ConnId>; SPECTATORS_NO],
    pub no_connected_players: u32,
    pub no_connected_spectators: u32,
}

impl Game {
    pub fn new(id: i32, size: i32) -> Self {
        Game {
            id,
            board: Board::new(size),
            state: GameState::Waiting,
            players: [None, None],
            nicks: [None, None],
            current_player: None,
            spectators: [None; SPECTATORS_NO],
            no_connected_players: 0,
            no_connected_spectators: 0,
        }
    }

    pub fn free_spectator_slots(&self) -> u32 {
        SPECTATORS_NO as u32 - self.no_connected_spectators
    }
}

/// A live worker's control handle, kept by the lobby so CONNECT_SPECTATOR
/// against a STARTED match can reach the worker that owns it. `inbound_tx`
/// lets the lobby repoint a joining spectator's route at the worker
/// synchronously, before the `SpectatorJoin` message is even sent, so the
/// hand-off has no window where a completed read has nowhere to go.
pub struct WorkerHandle {
    pub game_id: i32,
    pub spectator_tx: UnboundedSender<super::worker::SpectatorJoin>,
    pub inbound_tx: UnboundedSender<ConnEvent>,
}

#[derive(Default)]
pub struct PlayerRegistry {
    inner: Mutex<HashMap<ConnId, Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nick_exists(&self, nick: &str) -> bool {
        self.inner.lock().unwrap().values().any(|p| p.nick == nick)
    }

    pub fn insert(&self, player: Player) {
        self.inner.lock().unwrap().insert(player.conn, player);
    }

    pub fn get(&self, conn: ConnId) -> Option<Player> {
        self.inner.lock().unwrap().get(&conn).cloned()
    }

    pub fn set_game_id(&self, conn: ConnId, game_id: i32) {
        if let Some(p) = self.inner.lock().unwrap().get_mut(&conn) {
            p.game_id = game_id;
        }
    }

    pub fn remove(&self, conn: ConnId) -> Option<Player> {
        self.inner.lock().unwrap().remove(&conn)
    }

    pub fn nicks(&self) -> Vec<String> {
        self.inner.lock().unwrap().values().map(|p| p.nick.clone()).collect()
    }

    /// Resets `game_id` back to 0 for every player/spectator still
    /// associated with a game that just disappeared (its WAITING creator
    /// left, or it was otherwise torn down before starting).
    pub fn reset_game_id_for(&self, game_id: i32) {
        for p in self.inner.lock().unwrap().values_mut() {
            if p.game_id == game_id {
                p.game_id = 0;
            }
        }
    }
}

#[derive(Default)]
pub struct GameRegistry {
    inner: Mutex<HashMap<i32, Game>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.inner.lock().unwrap().contains_key(&id)
    }

    pub fn insert(&self, game: Game) {
        self.inner.lock().unwrap().insert(game.id, game);
    }

    pub fn remove(&self, id: i32) -> Option<Game> {
        self.inner.lock().unwrap().remove(&id)
    }

    pub fn with<R>(&self, id: i32, f: impl FnOnce(&Game) -> R) -> Option<R> {
        self.inner.lock().unwrap().get(&id).map(f)
    }

    pub fn with_mut<R>(&self, id: i32, f: impl FnOnce(&mut Game) -> R) -> Option<R> {
        self.inner.lock().unwrap().get_mut(&id).map(f)
    }

    /// Snapshot of `(id, size, free_spectators, nicks)` for GAMES_LIST.
    pub fn list_snapshot(&self) -> Vec<(i32, i32, u32, Vec<String>)> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .map(|g| {
                let nicks = g.nicks.iter().flatten().cloned().collect();
                (g.id, g.board.size(), g.free_spectator_slots(), nicks)
            })
            .collect()
    }

    /// Count of games currently STARTED, used to enforce the `--max-games`
    /// capacity hint against concurrently running matches.
    pub fn started_count(&self) -> usize {
        self.inner.lock().unwrap().values().filter(|g| g.state == GameState::Started).count()
    }

    /// Picks a pseudo-random id in `[1, 100]` that is not already live,
    /// retrying until one is found (see the coordination-plane design notes
    /// on why a single draw is not enough).
    pub fn allocate_id(&self) -> Option<i32> {
        use rand::Rng;
        let guard = self.inner.lock().unwrap();
        if guard.len() >= 100 {
            return None;
        }
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(1..=100);
            if !guard.contains_key(&candidate) {
                return Some(candidate);
            }
        }
    }
}

#[derive(Default)]
pub struct WorkerRegistry {
    inner: Mutex<HashMap<i32, WorkerHandle>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: WorkerHandle) {
        self.inner.lock().unwrap().insert(handle.game_id, handle);
    }

    pub fn remove(&self, id: i32) -> Option<WorkerHandle> {
        self.inner.lock().unwrap().remove(&id)
    }

    pub fn spectator_sender(
        &self,
        id: i32,
    ) -> Option<UnboundedSender<super::worker::SpectatorJoin>> {
        self.inner.lock().unwrap().get(&id).map(|h| h.spectator_tx.clone())
    }

    /// The worker's inbound channel, for the lobby to repoint a joining
    /// spectator's route at before handing it off.
    pub fn inbound_sender(&self, id: i32) -> Option<UnboundedSender<ConnEvent>> {
        self.inner.lock().unwrap().get(&id).map(|h| h.inbound_tx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(n: u64) -> ConnId {
        ConnId::for_test(n)
    }

    #[test]
    fn nickname_uniqueness_is_enforced_by_lookup() {
        let reg = PlayerRegistry::new();
        reg.insert(Player { conn: conn(1), nick: "alice".into(), game_id: 0 });
        assert!(reg.nick_exists("alice"));
        assert!(!reg.nick_exists("bob"));
    }

    #[test]
    fn game_id_allocation_avoids_collisions() {
        let reg = GameRegistry::new();
        for _ in 0..5 {
            let id = reg.allocate_id().unwrap();
            assert!(!reg.contains(id));
            reg.insert(Game::new(id, 4));
        }
        assert_eq!(reg.list_snapshot().len(), 5);
    }

    #[test]
    fn player_removal_forgets_them() {
        let reg = PlayerRegistry::new();
        reg.insert(Player { conn: conn(1), nick: "alice".into(), game_id: 0 });
        assert!(reg.remove(conn(1)).is_some());
        assert!(reg.get(conn(1)).is_none());
    }
}
