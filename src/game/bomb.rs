//! Bomb and the fire cross it leaves behind

use std::sync::Arc;

use parking_lot::Mutex;

use super::item::{Collider, GameOps, Item, ItemKind};
use super::{Direction, ItemId, Position};

/// Ticks until a placed bomb explodes (3 s at 60 Hz)
pub const BOMB_EXPLODE_TICKS: u32 = 180;
/// Ticks a fire cell stays on the board (1 s at 60 Hz)
pub const BOMB_FIRE_TICKS: u32 = 60;
/// Length of each fire arm in cells
pub const BOMB_FIRE_RANGE: i32 = 4;

pub struct Bomb {
    id: ItemId,
    position: Position,
    tick: Mutex<u32>,
}

impl Bomb {
    pub fn new(id: ItemId, position: Position) -> Self {
        Self {
            id,
            position,
            tick: Mutex::new(0),
        }
    }
}

impl Item for Bomb {
    fn id(&self) -> &ItemId {
        &self.id
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Bomb
    }

    fn position(&self) -> Position {
        self.position
    }

    fn tick(&self, ops: &dyn GameOps) -> bool {
        let mut tick = self.tick.lock();
        *tick += 1;
        if *tick < BOMB_EXPLODE_TICKS {
            return false;
        }

        // Explode: one fire on the bomb cell plus four arms. Fires landing
        // outside the grid are dropped by add_item.
        ops.add_item(Arc::new(BombFire::new(ItemId::random(), self.position)));
        for step in 1..=BOMB_FIRE_RANGE {
            for direction in [
                Direction::Up,
                Direction::Down,
                Direction::Left,
                Direction::Right,
            ] {
                let (dx, dy) = direction.to_vector();
                let position = Position::new(
                    self.position.x + dx * step,
                    self.position.y + dy * step,
                );
                ops.add_item(Arc::new(BombFire::new(ItemId::random(), position)));
            }
        }

        ops.remove_item(&self.id);
        true
    }

    fn on_collide_with(&self, _other: &Collider<'_>, _ops: &dyn GameOps) -> bool {
        false
    }
}

pub struct BombFire {
    id: ItemId,
    position: Position,
    tick: Mutex<u32>,
}

impl BombFire {
    pub fn new(id: ItemId, position: Position) -> Self {
        Self {
            id,
            position,
            tick: Mutex::new(0),
        }
    }
}

impl Item for BombFire {
    fn id(&self) -> &ItemId {
        &self.id
    }

    fn kind(&self) -> ItemKind {
        ItemKind::BombFire
    }

    fn position(&self) -> Position {
        self.position
    }

    fn tick(&self, ops: &dyn GameOps) -> bool {
        let mut tick = self.tick.lock();
        *tick += 1;
        if *tick >= BOMB_FIRE_TICKS {
            ops.remove_item(&self.id);
            return true;
        }
        false
    }

    fn on_collide_with(&self, _other: &Collider<'_>, _ops: &dyn GameOps) -> bool {
        // Fire persists through contact; it only expires
        false
    }
}
