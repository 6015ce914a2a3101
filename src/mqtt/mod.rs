//! MQTT 3.1.1 subset transport: codec, sessions, broker and server

pub mod broker;
pub mod codec;
pub mod server;
pub mod session;

pub use broker::{Broker, BrokerError};
pub use codec::{CodecError, Packet};
pub use server::{Hooks, MqttServer, ServerError, ServerHandle};
pub use session::{Session, SessionError};
