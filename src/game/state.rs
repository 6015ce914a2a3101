//! Game state: players, items, mutation primitives and the tick loop

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::bomb::Bomb;
use super::bullet::Bullet;
use super::item::{Collider, GameOps, Item};
use super::player::Player;
use super::{Direction, ItemId, PlayerId, PlayerStatus, Position, UpdateEvent};
use crate::stats;

/// Default board size
pub const DEFAULT_GRID_WIDTH: i32 = 30;
pub const DEFAULT_GRID_HEIGHT: i32 = 30;

/// Simulation cadence: 60 Hz
pub const TICK_PERIOD: Duration = Duration::from_micros(16_700);

/// What changed during one tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub items_updated: bool,
    pub players_updated: bool,
}

/// Authoritative state of one running game.
///
/// Every mutator takes the lock for the duration of that one operation, so
/// inbound packet handlers interleave with the tick loop at operation
/// granularity.
pub struct GameState {
    width: i32,
    height: i32,
    inner: RwLock<StateInner>,
}

struct StateInner {
    players: HashMap<PlayerId, Arc<Player>>,
    items: HashMap<ItemId, Arc<dyn Item>>,
    /// Items that left the live set but whose removal has not yet been
    /// broadcast; purged via clear_removed_item once fanout succeeds
    removed_items: HashMap<ItemId, Arc<dyn Item>>,
}

impl GameState {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            inner: RwLock::new(StateInner {
                players: HashMap::new(),
                items: HashMap::new(),
                removed_items: HashMap::new(),
            }),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Register a player with default state, replacing any previous entry
    pub fn add_player(&self, id: PlayerId) {
        let player = Arc::new(Player::new(id.clone()));
        self.inner.write().players.insert(id, player);
    }

    /// Drop a player; no-op when absent
    pub fn remove_player(&self, id: &PlayerId) {
        self.inner.write().players.remove(id);
    }

    /// Apply a move request. Returns the player for fanout, or `None` when
    /// unknown. Dead players keep their state but are still returned.
    pub fn move_player(
        &self,
        id: &PlayerId,
        position: Position,
        direction: Direction,
    ) -> Option<Arc<Player>> {
        let player = self.inner.read().players.get(id).cloned()?;
        player.move_to(position, direction);
        Some(player)
    }

    /// Monotonic status transition; returns whether anything changed
    pub fn update_player_status(&self, id: &PlayerId, status: PlayerStatus) -> bool {
        let Some(player) = self.inner.read().players.get(id).cloned() else {
            return false;
        };
        player.set_status(status)
    }

    /// Spawn a bullet one cell ahead of the player. No-op for unknown or
    /// dead players. The spawn cell is not bounds-checked; the tick loop
    /// removes bullets that leave the board.
    pub fn shoot_bullet(&self, id: &PlayerId) -> Option<ItemId> {
        let player = self.inner.read().players.get(id).cloned()?;
        if player.status() == PlayerStatus::Dead {
            return None;
        }
        Some(self.add_bullet(player.forward_position(), player.direction()))
    }

    /// Place a bomb on the player's cell. No-op for unknown or dead players.
    pub fn place_bomb(&self, id: &PlayerId) -> Option<ItemId> {
        let player = self.inner.read().players.get(id).cloned()?;
        if player.status() == PlayerStatus::Dead {
            return None;
        }
        let bomb = Arc::new(Bomb::new(ItemId::random(), player.position()));
        let bomb_id = bomb.id().clone();
        self.inner.write().items.insert(bomb_id.clone(), bomb);
        Some(bomb_id)
    }

    /// Insert a bullet directly at a cell
    pub fn add_bullet(&self, position: Position, direction: Direction) -> ItemId {
        let bullet = Arc::new(Bullet::new(ItemId::random(), position, direction));
        let bullet_id = bullet.id().clone();
        self.inner.write().items.insert(bullet_id.clone(), bullet);
        bullet_id
    }

    /// Purge a removed item once its removal has been broadcast
    pub fn clear_removed_item(&self, id: &ItemId) {
        self.inner.write().removed_items.remove(id);
    }

    pub fn get_players(&self) -> HashMap<PlayerId, Arc<Player>> {
        self.inner.read().players.clone()
    }

    pub fn get_items(&self) -> HashMap<ItemId, Arc<dyn Item>> {
        self.inner.read().items.clone()
    }

    pub fn get_removed_items(&self) -> HashMap<ItemId, Arc<dyn Item>> {
        self.inner.read().removed_items.clone()
    }

    pub fn is_within_bounds(&self, position: Position) -> bool {
        position.x >= 0 && position.x < self.width && position.y >= 0 && position.y < self.height
    }

    /// One simulation step: advance items, drop the ones that left the
    /// board, then resolve player/item collisions.
    pub fn tick_once(&self) -> TickReport {
        let items = self.get_items();

        let mut updated_items: HashMap<ItemId, Arc<dyn Item>> = HashMap::new();
        for (id, item) in &items {
            if item.tick(self) {
                updated_items.insert(id.clone(), item.clone());
            }
        }

        for (id, item) in &updated_items {
            if !self.is_within_bounds(item.position()) {
                self.remove_item(id);
            }
        }

        let mut players_updated = false;
        let live_items = self.get_items();
        let mut items_by_position: HashMap<Position, Vec<Arc<dyn Item>>> = HashMap::new();
        for item in live_items.values() {
            items_by_position
                .entry(item.position())
                .or_default()
                .push(item.clone());
        }

        for player in self.get_players().values() {
            let Some(colliding) = items_by_position.get(&player.position()) else {
                continue;
            };
            for item in colliding {
                if player.on_collide_with(&Collider::Item(item.as_ref()), self) {
                    players_updated = true;
                }
                if item.on_collide_with(&Collider::Player(player.as_ref()), self) {
                    updated_items.insert(item.id().clone(), item.clone());
                }
            }
        }

        TickReport {
            items_updated: !updated_items.is_empty(),
            players_updated,
        }
    }

    /// Run the fixed-cadence tick loop until `shutdown` fires or the event
    /// receiver goes away. Dropping the sender on exit closes the channel
    /// so the publish loop observes a clean end.
    pub async fn run_update_loop(
        self: Arc<Self>,
        events: mpsc::Sender<UpdateEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let timer = stats::metrics().game_loop_duration.start_timer();
                    let report = self.tick_once();
                    timer.observe_duration();

                    if report.items_updated
                        && events.send(UpdateEvent::ItemsUpdated).await.is_err()
                    {
                        break;
                    }
                    if report.players_updated
                        && events.send(UpdateEvent::PlayersUpdated).await.is_err()
                    {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    debug!("game loop stopping");
                    break;
                }
            }
        }
    }
}

impl GameOps for GameState {
    fn add_item(&self, item: Arc<dyn Item>) {
        let position = item.position();
        if !self.is_within_bounds(position) {
            return;
        }
        self.inner.write().items.insert(item.id().clone(), item);
    }

    fn remove_item(&self, id: &ItemId) {
        let mut inner = self.inner.write();
        if let Some(item) = inner.items.remove(id) {
            inner.removed_items.insert(id.clone(), item);
        }
    }

    fn update_player_status(&self, id: &PlayerId, status: PlayerStatus) -> bool {
        GameState::update_player_status(self, id, status)
    }
}
