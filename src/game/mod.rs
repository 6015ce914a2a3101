//! Authoritative game simulation: entities, state and the tick loop

pub mod bomb;
pub mod bullet;
pub mod item;
pub mod player;
pub mod state;

pub use item::{Collider, GameOps, Item, ItemKind};
pub use player::Player;
pub use state::GameState;

use std::fmt;

use crate::proto;

/// Identifier of a connected player (the MQTT client identifier)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of an item on the board
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id for a newly spawned item
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Grid coordinates, half-open on `[0, width) x [0, height)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighboring cell one step in `direction`
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.to_vector();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn to_proto(self) -> proto::Position {
        proto::Position {
            x: self.x,
            y: self.y,
        }
    }
}

/// Facing direction of a player or bullet
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit vector as `(dx, dy)`; the y axis grows downwards
    pub fn to_vector(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn to_proto(self) -> proto::Direction {
        match self {
            Direction::Up => proto::Direction::Up,
            Direction::Down => proto::Direction::Down,
            Direction::Left => proto::Direction::Left,
            Direction::Right => proto::Direction::Right,
        }
    }

    /// Map a raw wire value; `None` for values outside the enum
    pub fn from_wire(value: i32) -> Option<Self> {
        match proto::Direction::try_from(value).ok()? {
            proto::Direction::Up => Some(Direction::Up),
            proto::Direction::Down => Some(Direction::Down),
            proto::Direction::Left => Some(Direction::Left),
            proto::Direction::Right => Some(Direction::Right),
        }
    }
}

/// Liveness of a player inside the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerStatus {
    #[default]
    Alive,
    Dead,
}

/// Token emitted by the tick loop when externally visible state changed.
/// Consumers re-read the game state; the token carries no payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateEvent {
    ItemsUpdated,
    PlayersUpdated,
}
