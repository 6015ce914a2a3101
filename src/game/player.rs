//! Player entity and its collision behavior

use parking_lot::RwLock;

use super::item::{Collider, GameOps, ItemKind};
use super::{Direction, PlayerId, PlayerStatus, Position};
use crate::proto;

/// One connected player on the board.
///
/// The mutable fields sit behind their own lock so the collision pass can
/// transition status while a move request is being applied.
#[derive(Debug)]
pub struct Player {
    id: PlayerId,
    inner: RwLock<PlayerInner>,
}

#[derive(Debug)]
struct PlayerInner {
    position: Position,
    direction: Direction,
    status: PlayerStatus,
}

impl Player {
    /// New players spawn at the origin, facing up, alive
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            inner: RwLock::new(PlayerInner {
                position: Position::default(),
                direction: Direction::Up,
                status: PlayerStatus::Alive,
            }),
        }
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn position(&self) -> Position {
        self.inner.read().position
    }

    pub fn direction(&self) -> Direction {
        self.inner.read().direction
    }

    pub fn status(&self) -> PlayerStatus {
        self.inner.read().status
    }

    /// The cell one step ahead of the player's facing direction
    pub fn forward_position(&self) -> Position {
        let inner = self.inner.read();
        inner.position.step(inner.direction)
    }

    /// Apply a move request. Dead players do not move; returns whether the
    /// fields were updated.
    pub fn move_to(&self, position: Position, direction: Direction) -> bool {
        let mut inner = self.inner.write();
        if inner.status == PlayerStatus::Dead {
            return false;
        }
        inner.position = position;
        inner.direction = direction;
        true
    }

    /// Monotonic status transition: Alive -> Dead only. Returns whether the
    /// status changed.
    pub fn set_status(&self, status: PlayerStatus) -> bool {
        let mut inner = self.inner.write();
        if inner.status == PlayerStatus::Dead {
            return false;
        }
        if inner.status == status {
            return false;
        }
        inner.status = status;
        true
    }

    /// React to contact with an item. Bullets and bomb fire are lethal.
    pub fn on_collide_with(&self, other: &Collider<'_>, ops: &dyn GameOps) -> bool {
        match other {
            Collider::Item(item) => match item.kind() {
                ItemKind::Bullet | ItemKind::BombFire => {
                    ops.update_player_status(&self.id, PlayerStatus::Dead)
                }
                ItemKind::Bomb => false,
            },
            Collider::Player(_) => false,
        }
    }

    /// Wire representation. The wire status only distinguishes connected
    /// from disconnected; death is conveyed by the player ceasing to move.
    pub fn to_proto(&self) -> proto::PlayerState {
        let inner = self.inner.read();
        proto::PlayerState {
            player_id: self.id.as_str().to_string(),
            position: Some(inner.position.to_proto()),
            direction: inner.direction.to_proto() as i32,
            status: proto::Status::Alive as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::bomb::{Bomb, BombFire};
    use crate::game::bullet::Bullet;
    use crate::game::item::test_support::RecordingOps;
    use crate::game::ItemId;

    #[test]
    fn new_player_spawns_at_origin_facing_up() {
        let player = Player::new(PlayerId::from("player1"));
        assert_eq!(player.position(), Position::new(0, 0));
        assert_eq!(player.direction(), Direction::Up);
        assert_eq!(player.status(), PlayerStatus::Alive);
    }

    #[test]
    fn forward_position_tracks_direction() {
        let player = Player::new(PlayerId::from("player1"));
        player.move_to(Position::new(5, 10), Direction::Right);
        assert_eq!(player.forward_position(), Position::new(6, 10));

        player.move_to(Position::new(5, 10), Direction::Up);
        assert_eq!(player.forward_position(), Position::new(5, 9));
    }

    #[test]
    fn dead_players_do_not_move() {
        let player = Player::new(PlayerId::from("player1"));
        player.move_to(Position::new(2, 3), Direction::Right);
        assert!(player.set_status(PlayerStatus::Dead));

        assert!(!player.move_to(Position::new(9, 9), Direction::Left));
        assert_eq!(player.position(), Position::new(2, 3));
        assert_eq!(player.direction(), Direction::Right);
    }

    #[test]
    fn death_is_monotonic() {
        let player = Player::new(PlayerId::from("player1"));
        assert!(player.set_status(PlayerStatus::Dead));
        assert!(!player.set_status(PlayerStatus::Dead));
        assert!(!player.set_status(PlayerStatus::Alive));
        assert_eq!(player.status(), PlayerStatus::Dead);
    }

    #[test]
    fn bullet_contact_kills() {
        let player = Player::new(PlayerId::from("player1"));
        let bullet = Bullet::new(ItemId::from("b1"), Position::new(0, 0), Direction::Up);
        let ops = RecordingOps::default();

        let changed = player.on_collide_with(&Collider::Item(&bullet), &ops);
        assert!(changed);
        assert_eq!(
            ops.status_updates.lock().as_slice(),
            &[(PlayerId::from("player1"), PlayerStatus::Dead)]
        );
    }

    #[test]
    fn bomb_fire_contact_kills_but_bomb_does_not() {
        let player = Player::new(PlayerId::from("player1"));
        let ops = RecordingOps::default();

        let bomb = Bomb::new(ItemId::from("bomb1"), Position::new(0, 0));
        assert!(!player.on_collide_with(&Collider::Item(&bomb), &ops));
        assert!(ops.status_updates.lock().is_empty());

        let fire = BombFire::new(ItemId::from("fire1"), Position::new(0, 0));
        assert!(player.on_collide_with(&Collider::Item(&fire), &ops));
        assert_eq!(ops.status_updates.lock().len(), 1);
    }

    #[test]
    fn wire_state_carries_position_and_direction() {
        let player = Player::new(PlayerId::from("player1"));
        player.move_to(Position::new(10, 20), Direction::Right);

        let state = player.to_proto();
        assert_eq!(state.player_id, "player1");
        assert_eq!(state.position, Some(crate::proto::Position { x: 10, y: 20 }));
        assert_eq!(state.direction(), crate::proto::Direction::Right);
        assert_eq!(state.status(), crate::proto::Status::Alive);
    }
}
