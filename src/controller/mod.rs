//! Glue between the protocol front-end and the game simulation.
//!
//! Inbound packets become game mutations; simulation update events become
//! broadcast publishes of the authoritative state.

use std::sync::Arc;

use prost::Message;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::game::{Direction, GameState, PlayerId, Position, UpdateEvent};
use crate::mqtt::codec::{ConnectPacket, PublishPacket, SubscribePacket};
use crate::mqtt::{Broker, BrokerError, Hooks, Session};
use crate::proto;
use crate::stats;

/// Topic carrying player positions, both directions
pub const TOPIC_PLAYER_STATE: &str = "player_state";
/// Topic carrying player intents, client to server
pub const TOPIC_PLAYER_ACTION: &str = "player_action";
/// Topic carrying item lifecycles, server to client
pub const TOPIC_ITEM_STATE: &str = "item_state";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to decode {topic} payload: {source}")]
    DecodePayload {
        topic: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    #[error("invalid topic name: {0}")]
    InvalidTopic(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Reflects client packets into the game state and fans state changes back
/// out to every session
pub struct Controller {
    broker: Arc<Broker>,
    game: Arc<GameState>,
}

impl Controller {
    pub fn new(broker: Arc<Broker>, game: Arc<GameState>) -> Self {
        Self { broker, game }
    }

    /// Consume simulation update events until the channel closes or
    /// shutdown fires
    pub async fn run_publish_loop(
        self: Arc<Self>,
        mut events: mpsc::Receiver<UpdateEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.publish_states(event).await,
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        debug!("publish loop stopped");
    }

    async fn publish_states(&self, event: UpdateEvent) {
        let timer = stats::metrics().publish_states_duration.start_timer();
        match event {
            UpdateEvent::ItemsUpdated => self.publish_item_states().await,
            UpdateEvent::PlayersUpdated => self.publish_player_states().await,
        }
        timer.observe_duration();
    }

    async fn publish_item_states(&self) {
        for (item_id, item) in self.game.get_items() {
            let state = proto::ItemState {
                item_id: item_id.to_string(),
                r#type: item.kind().to_proto() as i32,
                position: Some(item.position().to_proto()),
                status: proto::ItemStatus::Active as i32,
            };
            if let Err(err) = self
                .broker
                .broadcast(TOPIC_ITEM_STATE, state.encode_to_vec())
                .await
            {
                error!(error = %err, "failed to broadcast item state");
            }
        }

        for (item_id, _) in self.game.get_removed_items() {
            let state = proto::ItemState {
                item_id: item_id.to_string(),
                r#type: 0,
                position: None,
                status: proto::ItemStatus::Removed as i32,
            };
            match self
                .broker
                .broadcast(TOPIC_ITEM_STATE, state.encode_to_vec())
                .await
            {
                // Only a delivered removal may be forgotten; failures leave
                // the item queued for the next round
                Ok(()) => self.game.clear_removed_item(&item_id),
                Err(err) => error!(error = %err, "failed to broadcast removed item state"),
            }
        }
    }

    async fn publish_player_states(&self) {
        for player in self.game.get_players().values() {
            if let Err(err) = self
                .broker
                .broadcast(TOPIC_PLAYER_STATE, player.to_proto().encode_to_vec())
                .await
            {
                error!(error = %err, "failed to broadcast player state");
            }
        }
    }

    async fn handle_player_state(
        &self,
        session: &Arc<Session>,
        packet: &PublishPacket,
    ) -> Result<(), ControllerError> {
        let state = proto::PlayerState::decode(packet.payload.as_slice()).map_err(|source| {
            ControllerError::DecodePayload {
                topic: TOPIC_PLAYER_STATE,
                source,
            }
        })?;

        // A direction outside the enum drops the packet without an error
        let Some(direction) = Direction::from_wire(state.direction) else {
            return Ok(());
        };

        let position = state.position.unwrap_or_default();
        let player_id = PlayerId::new(session.id());
        let Some(player) = self.game.move_player(
            &player_id,
            Position::new(position.x, position.y),
            direction,
        ) else {
            return Ok(());
        };

        self.broker
            .broadcast(TOPIC_PLAYER_STATE, player.to_proto().encode_to_vec())
            .await?;

        debug!(players = self.game.get_players().len(), "player state applied");
        Ok(())
    }

    async fn handle_player_action(
        &self,
        session: &Arc<Session>,
        packet: &PublishPacket,
    ) -> Result<(), ControllerError> {
        let request =
            proto::PlayerActionRequest::decode(packet.payload.as_slice()).map_err(|source| {
                ControllerError::DecodePayload {
                    topic: TOPIC_PLAYER_ACTION,
                    source,
                }
            })?;

        let player_id = PlayerId::new(session.id());
        match proto::ActionType::try_from(request.r#type) {
            Ok(proto::ActionType::ShootBullet) => {
                self.game.shoot_bullet(&player_id);
            }
            Ok(proto::ActionType::PlaceBomb) => {
                self.game.place_bomb(&player_id);
            }
            Err(_) => {}
        }
        Ok(())
    }
}

impl Hooks for Controller {
    async fn on_connected(
        &self,
        session: &Arc<Session>,
        _packet: &ConnectPacket,
    ) -> anyhow::Result<()> {
        self.broker.add(session.clone()).await;
        self.game.add_player(PlayerId::new(session.id()));

        stats::metrics().active_clients.inc();

        debug!(
            session_id = %session.id(),
            players = self.game.get_players().len(),
            "player joined"
        );
        Ok(())
    }

    async fn on_subscribed(
        &self,
        session: &Arc<Session>,
        _packet: &SubscribePacket,
    ) -> anyhow::Result<()> {
        // Late-join sync: the new subscriber gets every other player's
        // current state as unicasts
        for (player_id, player) in self.game.get_players() {
            if player_id.as_str() == session.id() {
                continue;
            }

            self.broker
                .send(
                    session.id(),
                    TOPIC_PLAYER_STATE,
                    player.to_proto().encode_to_vec(),
                )
                .await?;
        }
        Ok(())
    }

    async fn on_published(
        &self,
        session: &Arc<Session>,
        packet: &PublishPacket,
    ) -> anyhow::Result<()> {
        match packet.topic.as_str() {
            TOPIC_PLAYER_STATE => self.handle_player_state(session, packet).await?,
            TOPIC_PLAYER_ACTION => self.handle_player_action(session, packet).await?,
            other => return Err(ControllerError::InvalidTopic(other.to_string()).into()),
        }
        Ok(())
    }

    async fn on_disconnected(&self, session: &Arc<Session>) -> anyhow::Result<()> {
        self.broker.remove(session.id()).await;
        stats::metrics().active_clients.dec();

        let player_id = PlayerId::new(session.id());
        self.game.remove_player(&player_id);

        let state = proto::PlayerState {
            player_id: session.id().to_string(),
            position: None,
            direction: 0,
            status: proto::Status::Disconnected as i32,
        };
        self.broker
            .broadcast(TOPIC_PLAYER_STATE, state.encode_to_vec())
            .await?;

        debug!(session_id = %session.id(), "player left");
        Ok(())
    }
}
