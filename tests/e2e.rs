//! End-to-end tests: a real server on ephemeral ports, driven by a minimal
//! MQTT test client over TCP.

use std::net::SocketAddr;
use std::time::Duration;

use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use terminal_shooter_server::config::Config;
use terminal_shooter_server::controller::{TOPIC_ITEM_STATE, TOPIC_PLAYER_ACTION, TOPIC_PLAYER_STATE};
use terminal_shooter_server::mqtt::codec::{
    read_packet, ConnectPacket, Packet, PublishPacket, SubscribePacket,
};
use terminal_shooter_server::proto;
use terminal_shooter_server::run;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<anyhow::Result<()>>,
    mqtt_addr: SocketAddr,
    metrics_addr: SocketAddr,
}

impl TestServer {
    async fn start() -> Self {
        let mqtt_addr = free_addr().await;
        let metrics_addr = free_addr().await;
        let config = Config {
            mqtt_addr,
            metrics_addr,
            log_level: "info".to_string(),
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(config, shutdown_rx));

        Self {
            shutdown,
            task,
            mqtt_addr,
            metrics_addr,
        }
    }

    /// Signal shutdown and wait for the server to return cleanly
    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not shut down in time")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    /// Connect and complete the CONNECT/CONNACK handshake, retrying while
    /// the server is still coming up
    async fn connect(addr: SocketAddr, client_id: &str) -> Self {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            match Self::try_connect(addr, client_id).await {
                Ok(client) => return client,
                Err(err) => {
                    if tokio::time::Instant::now() > deadline {
                        panic!("could not connect to {addr}: {err}");
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        }
    }

    async fn try_connect(addr: SocketAddr, client_id: &str) -> anyhow::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;

        let connect = Packet::Connect(ConnectPacket {
            client_id: client_id.to_string(),
            clean_session: true,
            keep_alive: 60,
        });
        stream.write_all(&connect.encode()?).await?;

        match read_packet(&mut stream).await? {
            Packet::Connack(connack) if connack.return_code == 0 => Ok(Self { stream }),
            other => anyhow::bail!("expected CONNACK accepted, got {other:?}"),
        }
    }

    async fn subscribe(&mut self) {
        let subscribe = Packet::Subscribe(SubscribePacket {
            packet_id: 1,
            topics: vec![
                (TOPIC_PLAYER_STATE.to_string(), 0),
                (TOPIC_ITEM_STATE.to_string(), 0),
            ],
        });
        self.stream
            .write_all(&subscribe.encode().unwrap())
            .await
            .unwrap();

        // Broadcasts may interleave ahead of the SUBACK
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            match self.read_packet(deadline).await {
                Packet::Suback(suback) => {
                    assert!(suback.return_codes.iter().all(|code| *code == 0));
                    return;
                }
                Packet::Publish(_) => continue,
                other => panic!("expected SUBACK, got {other:?}"),
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) {
        let publish = Packet::Publish(PublishPacket::qos0(topic, payload));
        self.stream
            .write_all(&publish.encode().unwrap())
            .await
            .unwrap();
    }

    async fn publish_state(&mut self, x: i32, y: i32, direction: proto::Direction) {
        let state = proto::PlayerState {
            player_id: String::new(),
            position: Some(proto::Position { x, y }),
            direction: direction as i32,
            status: proto::Status::Alive as i32,
        };
        self.publish(TOPIC_PLAYER_STATE, state.encode_to_vec()).await;
    }

    async fn publish_action(&mut self, action: proto::ActionType) {
        let request = proto::PlayerActionRequest {
            r#type: action as i32,
        };
        self.publish(TOPIC_PLAYER_ACTION, request.encode_to_vec()).await;
    }

    async fn disconnect(mut self) {
        self.stream
            .write_all(&Packet::Disconnect.encode().unwrap())
            .await
            .unwrap();
    }

    async fn read_packet(&mut self, deadline: tokio::time::Instant) -> Packet {
        timeout(
            deadline.saturating_duration_since(tokio::time::Instant::now()),
            read_packet(&mut self.stream),
        )
        .await
        .expect("timed out waiting for a packet")
        .expect("read failed")
    }

    /// Read publishes until one satisfies the predicate
    async fn wait_player_state<F>(&mut self, predicate: F) -> proto::PlayerState
    where
        F: Fn(&proto::PlayerState) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Packet::Publish(publish) = self.read_packet(deadline).await {
                if publish.topic != TOPIC_PLAYER_STATE {
                    continue;
                }
                if let Ok(state) = proto::PlayerState::decode(publish.payload.as_slice()) {
                    if predicate(&state) {
                        return state;
                    }
                }
            }
        }
    }

    async fn wait_item_state<F>(&mut self, predicate: F) -> proto::ItemState
    where
        F: Fn(&proto::ItemState) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Packet::Publish(publish) = self.read_packet(deadline).await {
                if publish.topic != TOPIC_ITEM_STATE {
                    continue;
                }
                if let Ok(state) = proto::ItemState::decode(publish.payload.as_slice()) {
                    if predicate(&state) {
                        return state;
                    }
                }
            }
        }
    }
}

#[tokio::test]
async fn clients_connect_and_the_server_shuts_down_cleanly() {
    let server = TestServer::start().await;

    let _client1 = TestClient::connect(server.mqtt_addr, "connect1").await;
    let _client2 = TestClient::connect(server.mqtt_addr, "connect2").await;

    server.stop().await;
}

#[tokio::test]
async fn movement_fans_out_to_other_clients() {
    let server = TestServer::start().await;

    let mut player1 = TestClient::connect(server.mqtt_addr, "player1").await;
    player1.subscribe().await;
    let mut player2 = TestClient::connect(server.mqtt_addr, "player2").await;
    player2.subscribe().await;

    player1
        .publish_state(10, 20, proto::Direction::Right)
        .await;

    let state = player2
        .wait_player_state(|state| {
            state.player_id == "player1" && state.position == Some(proto::Position { x: 10, y: 20 })
        })
        .await;
    assert_eq!(state.direction(), proto::Direction::Right);
    assert_eq!(state.status(), proto::Status::Alive);

    server.stop().await;
}

#[tokio::test]
async fn late_subscriber_receives_existing_player_states() {
    let server = TestServer::start().await;

    let mut player1 = TestClient::connect(server.mqtt_addr, "player1").await;
    player1.subscribe().await;
    player1.publish_state(7, 8, proto::Direction::Down).await;

    // The second client joins after player1 has moved
    let mut player2 = TestClient::connect(server.mqtt_addr, "player2").await;
    player2.subscribe().await;

    let state = player2
        .wait_player_state(|state| state.player_id == "player1")
        .await;
    assert_eq!(state.position, Some(proto::Position { x: 7, y: 8 }));
    assert_eq!(state.direction(), proto::Direction::Down);

    server.stop().await;
}

#[tokio::test]
async fn shooting_spawns_a_bullet_that_advances() {
    let server = TestServer::start().await;

    let mut shooter = TestClient::connect(server.mqtt_addr, "shoot-player1").await;
    shooter.subscribe().await;
    let mut observer = TestClient::connect(server.mqtt_addr, "shoot-player2").await;
    observer.subscribe().await;

    shooter.publish_state(10, 20, proto::Direction::Right).await;
    shooter.publish_action(proto::ActionType::ShootBullet).await;

    // The bullet spawns at (11, 20) and first reports once it reaches (12, 20)
    for client in [&mut shooter, &mut observer] {
        let state = client
            .wait_item_state(|state| {
                state.position == Some(proto::Position { x: 12, y: 20 })
            })
            .await;
        assert_eq!(state.r#type(), proto::ItemType::Bullet);
        assert_eq!(state.status(), proto::ItemStatus::Active);
    }

    // Half a second later it has advanced one more cell
    for client in [&mut shooter, &mut observer] {
        client
            .wait_item_state(|state| state.position == Some(proto::Position { x: 13, y: 20 }))
            .await;
    }

    server.stop().await;
}

#[tokio::test]
async fn a_bullet_reaching_a_player_is_removed() {
    let server = TestServer::start().await;

    let mut shooter = TestClient::connect(server.mqtt_addr, "gunner").await;
    shooter.subscribe().await;
    let mut victim = TestClient::connect(server.mqtt_addr, "victim").await;
    victim.subscribe().await;

    // Victim stands one cell ahead of the bullet spawn point
    victim.publish_state(3, 3, proto::Direction::Up).await;
    shooter.publish_state(1, 3, proto::Direction::Right).await;
    shooter.publish_action(proto::ActionType::ShootBullet).await;

    // The bullet spawns at (2, 3); on its first step it lands on the victim
    // and the collision removes it
    let removed = shooter
        .wait_item_state(|state| state.status() == proto::ItemStatus::Removed)
        .await;
    assert!(!removed.item_id.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn a_placed_bomb_explodes_into_fire() {
    let server = TestServer::start().await;

    let mut bomber = TestClient::connect(server.mqtt_addr, "bomber").await;
    bomber.subscribe().await;

    bomber.publish_state(5, 8, proto::Direction::Up).await;
    bomber.publish_action(proto::ActionType::PlaceBomb).await;

    // Fires appear once the bomb explodes, three seconds after placement
    let fire = bomber
        .wait_item_state(|state| {
            state.r#type() == proto::ItemType::BombFire
                && state.status() == proto::ItemStatus::Active
        })
        .await;
    assert!(fire.position.is_some());

    // The bomb itself is reported as removed
    bomber
        .wait_item_state(|state| state.status() == proto::ItemStatus::Removed)
        .await;

    server.stop().await;
}

#[tokio::test]
async fn disconnects_fan_out_to_remaining_clients() {
    let server = TestServer::start().await;

    let client_a = TestClient::connect(server.mqtt_addr, "client-a").await;
    let mut client_b = TestClient::connect(server.mqtt_addr, "client-b").await;
    client_b.subscribe().await;
    let mut client_c = TestClient::connect(server.mqtt_addr, "client-c").await;
    client_c.subscribe().await;

    client_a.disconnect().await;

    for client in [&mut client_b, &mut client_c] {
        let state = client
            .wait_player_state(|state| state.player_id == "client-a")
            .await;
        assert_eq!(state.status(), proto::Status::Disconnected);
    }

    server.stop().await;
}

#[tokio::test]
async fn metrics_endpoint_serves_the_exposition_format() {
    let server = TestServer::start().await;

    // Give the metrics listener a moment and ask for the page
    let _client = TestClient::connect(server.mqtt_addr, "metrics-probe").await;

    let mut stream = TcpStream::connect(server.metrics_addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("terminal_shooter_active_clients"));

    server.stop().await;
}
