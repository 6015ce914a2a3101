//! Protobuf wire messages exchanged over the game topics
//! Field numbers are a fixed contract with the terminal client

/// Grid coordinates of a player or item
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Position {
    #[prost(int32, tag = "1")]
    pub x: i32,
    #[prost(int32, tag = "2")]
    pub y: i32,
}

/// Facing direction of a player or bullet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

/// Connection-level liveness of a player
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Alive = 0,
    Disconnected = 1,
}

/// Authoritative state of one player, published on `player_state`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlayerState {
    #[prost(string, tag = "1")]
    pub player_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub position: ::core::option::Option<Position>,
    #[prost(enumeration = "Status", tag = "3")]
    pub status: i32,
    #[prost(enumeration = "Direction", tag = "4")]
    pub direction: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ItemType {
    Bullet = 0,
    Bomb = 1,
    BombFire = 2,
}

/// Whether an item is live on the board or has been removed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ItemStatus {
    Active = 0,
    Removed = 1,
}

/// State of one item, published on `item_state`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ItemState {
    #[prost(string, tag = "1")]
    pub item_id: ::prost::alloc::string::String,
    #[prost(enumeration = "ItemType", tag = "2")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub position: ::core::option::Option<Position>,
    #[prost(enumeration = "ItemStatus", tag = "4")]
    pub status: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ActionType {
    ShootBullet = 0,
    PlaceBomb = 1,
}

/// A player intent (shoot, place bomb), received on `player_action`
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PlayerActionRequest {
    #[prost(enumeration = "ActionType", tag = "1")]
    pub r#type: i32,
}
