//! Bullet: the moving projectile

use parking_lot::Mutex;

use super::item::{Collider, GameOps, Item, ItemKind};
use super::{Direction, ItemId, Position};

/// Ticks between bullet steps: one cell every half second at 60 Hz
pub const BULLET_MOVE_TICKS: u32 = 30;

pub struct Bullet {
    id: ItemId,
    direction: Direction,
    inner: Mutex<BulletInner>,
}

struct BulletInner {
    position: Position,
    tick: u32,
}

impl Bullet {
    pub fn new(id: ItemId, position: Position, direction: Direction) -> Self {
        Self {
            id,
            direction,
            inner: Mutex::new(BulletInner { position, tick: 0 }),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Item for Bullet {
    fn id(&self) -> &ItemId {
        &self.id
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Bullet
    }

    fn position(&self) -> Position {
        self.inner.lock().position
    }

    fn tick(&self, _ops: &dyn GameOps) -> bool {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        if inner.tick >= BULLET_MOVE_TICKS {
            inner.tick = 0;
            inner.position = inner.position.step(self.direction);
            return true;
        }
        false
    }

    fn on_collide_with(&self, other: &Collider<'_>, ops: &dyn GameOps) -> bool {
        match other {
            // Hitting a player spends the bullet
            Collider::Player(_) => {
                ops.remove_item(&self.id);
                true
            }
            Collider::Item(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::item::test_support::RecordingOps;
    use crate::game::player::Player;
    use crate::game::PlayerId;

    #[test]
    fn bullet_moves_after_thirty_ticks() {
        let bullet = Bullet::new(ItemId::from("b1"), Position::new(3, 8), Direction::Right);
        let ops = RecordingOps::default();

        for _ in 0..BULLET_MOVE_TICKS - 1 {
            assert!(!bullet.tick(&ops));
        }
        assert_eq!(bullet.position(), Position::new(3, 8));

        assert!(bullet.tick(&ops));
        assert_eq!(bullet.position(), Position::new(4, 8));

        // The counter resets, so the next step is another thirty ticks out
        for _ in 0..BULLET_MOVE_TICKS - 1 {
            assert!(!bullet.tick(&ops));
        }
        assert!(bullet.tick(&ops));
        assert_eq!(bullet.position(), Position::new(5, 8));
    }

    #[test]
    fn bullet_moves_along_its_direction() {
        let cases = [
            (Direction::Up, Position::new(5, 4)),
            (Direction::Down, Position::new(5, 6)),
            (Direction::Left, Position::new(4, 5)),
            (Direction::Right, Position::new(6, 5)),
        ];
        for (direction, expected) in cases {
            let bullet = Bullet::new(ItemId::random(), Position::new(5, 5), direction);
            let ops = RecordingOps::default();
            for _ in 0..BULLET_MOVE_TICKS {
                bullet.tick(&ops);
            }
            assert_eq!(bullet.position(), expected);
        }
    }

    #[test]
    fn bullet_removes_itself_on_player_contact() {
        let bullet = Bullet::new(ItemId::from("b1"), Position::new(2, 3), Direction::Right);
        let player = Player::new(PlayerId::from("player1"));
        let ops = RecordingOps::default();

        let changed = bullet.on_collide_with(&Collider::Player(&player), &ops);
        assert!(changed);
        assert_eq!(ops.removed.lock().as_slice(), &[ItemId::from("b1")]);
    }

    #[test]
    fn bullet_ignores_item_contact() {
        let bullet = Bullet::new(ItemId::from("b1"), Position::new(2, 3), Direction::Right);
        let other = Bullet::new(ItemId::from("b2"), Position::new(2, 3), Direction::Left);
        let ops = RecordingOps::default();

        assert!(!bullet.on_collide_with(&Collider::Item(&other), &ops));
        assert!(ops.removed.lock().is_empty());
    }
}
