//! Item capability set and the narrow state surface entities act through

use std::sync::Arc;

use super::player::Player;
use super::{ItemId, PlayerId, PlayerStatus, Position};
use crate::proto;

/// Kind tag for the concrete item implementations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Bullet,
    Bomb,
    BombFire,
}

impl ItemKind {
    pub fn to_proto(self) -> proto::ItemType {
        match self {
            ItemKind::Bullet => proto::ItemType::Bullet,
            ItemKind::Bomb => proto::ItemType::Bomb,
            ItemKind::BombFire => proto::ItemType::BombFire,
        }
    }
}

/// The only game-state operations entities may perform from `tick` and
/// `on_collide_with`. Keeping this surface narrow breaks the cycle between
/// state and entities and lets entities be tested against a recorder.
pub trait GameOps: Send + Sync {
    /// Insert a freshly spawned item; out-of-bounds positions are dropped
    fn add_item(&self, item: Arc<dyn Item>);

    /// Move an item from the live set to the removed set
    fn remove_item(&self, id: &ItemId);

    /// Transition a player's status; returns whether anything changed
    fn update_player_status(&self, id: &PlayerId, status: PlayerStatus) -> bool;
}

/// One side of a collision pair
pub enum Collider<'a> {
    Player(&'a Player),
    Item(&'a dyn Item),
}

/// A live object on the board: bullets, bombs, bomb fires.
///
/// Items are shared between the live map, the removed map and the collision
/// pass, so each implementation guards its mutable state internally.
pub trait Item: Send + Sync {
    fn id(&self) -> &ItemId;

    fn kind(&self) -> ItemKind;

    fn position(&self) -> Position;

    /// Advance one simulation step. Returns whether externally visible
    /// state changed (moved, exploded, expired).
    fn tick(&self, ops: &dyn GameOps) -> bool;

    /// React to contact with `other`. Returns whether this item changed.
    fn on_collide_with(&self, other: &Collider<'_>, ops: &dyn GameOps) -> bool;
}
