//! Codec for the MQTT 3.1.1 subset the game speaks
//!
//! Only the packets the game needs are supported: CONNECT/CONNACK,
//! PUBLISH (QoS 0), SUBSCRIBE/SUBACK, the PING pair and DISCONNECT.
//! Anything else is a decode error and the caller closes the connection.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest value the 4-byte remaining-length field can carry
const MAX_REMAINING_LENGTH: usize = 268_435_455;

const TYPE_CONNECT: u8 = 1;
const TYPE_CONNACK: u8 = 2;
const TYPE_PUBLISH: u8 = 3;
const TYPE_SUBSCRIBE: u8 = 8;
const TYPE_SUBACK: u8 = 9;
const TYPE_PINGREQ: u8 = 12;
const TYPE_PINGRESP: u8 = 13;
const TYPE_DISCONNECT: u8 = 14;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the stream at a packet boundary
    #[error("connection closed")]
    ConnectionClosed,

    #[error("malformed remaining length")]
    MalformedRemainingLength,

    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    #[error("malformed {packet} packet: {detail}")]
    MalformedPacket {
        packet: &'static str,
        detail: &'static str,
    },

    #[error("string field is not valid utf-8")]
    InvalidString,

    #[error("packet payload too large")]
    PayloadTooLarge,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnackPacket {
    pub session_present: bool,
    pub return_code: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    /// Present only when qos > 0
    pub packet_id: Option<u16>,
}

impl PublishPacket {
    /// The QoS 0 publish the server actually sends
    pub fn qos0(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos: 0,
            packet_id: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    /// Topic filters with their requested QoS; everything is granted QoS 0
    pub topics: Vec<(String, u8)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubackPacket {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

/// A decoded control packet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Publish(PublishPacket),
    Subscribe(SubscribePacket),
    Suback(SubackPacket),
    Pingreq,
    Pingresp,
    Disconnect,
}

impl Packet {
    /// Serialize into the on-wire byte layout
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let (type_byte, body) = match self {
            Packet::Connect(p) => (TYPE_CONNECT << 4, encode_connect(p)),
            Packet::Connack(p) => (
                TYPE_CONNACK << 4,
                vec![u8::from(p.session_present), p.return_code],
            ),
            Packet::Publish(p) => {
                let flags = (p.qos & 0x03) << 1;
                ((TYPE_PUBLISH << 4) | flags, encode_publish(p))
            }
            // SUBSCRIBE carries fixed flags 0b0010 per the standard
            Packet::Subscribe(p) => ((TYPE_SUBSCRIBE << 4) | 0x02, encode_subscribe(p)),
            Packet::Suback(p) => {
                let mut body = p.packet_id.to_be_bytes().to_vec();
                body.extend_from_slice(&p.return_codes);
                (TYPE_SUBACK << 4, body)
            }
            Packet::Pingreq => (TYPE_PINGREQ << 4, Vec::new()),
            Packet::Pingresp => (TYPE_PINGRESP << 4, Vec::new()),
            Packet::Disconnect => (TYPE_DISCONNECT << 4, Vec::new()),
        };

        if body.len() > MAX_REMAINING_LENGTH {
            return Err(CodecError::PayloadTooLarge);
        }

        let mut out = Vec::with_capacity(body.len() + 5);
        out.push(type_byte);
        encode_remaining_length(&mut out, body.len());
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Read one packet from the stream. `ConnectionClosed` is returned only for
/// EOF at a packet boundary; EOF mid-packet is a truncation error.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut first = [0u8; 1];
    if reader.read(&mut first).await? == 0 {
        return Err(CodecError::ConnectionClosed);
    }

    let packet_type = first[0] >> 4;
    let flags = first[0] & 0x0F;

    let remaining = read_remaining_length(reader).await?;
    let mut body = vec![0u8; remaining];
    reader.read_exact(&mut body).await?;

    decode_body(packet_type, flags, &body)
}

/// Decode the variable-length remaining-length field: 1-4 bytes, 7 bits
/// each, most significant bit as continuation.
async fn read_remaining_length<R>(reader: &mut R) -> Result<usize, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut value: usize = 0;
    let mut shift = 0u32;
    for _ in 0..4 {
        let byte = reader.read_u8().await?;
        value |= ((byte & 0x7F) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    // The fourth byte may not carry a continuation bit
    Err(CodecError::MalformedRemainingLength)
}

fn encode_remaining_length(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_body(packet_type: u8, flags: u8, body: &[u8]) -> Result<Packet, CodecError> {
    let mut cursor = Cursor::new(body);
    match packet_type {
        TYPE_CONNECT => decode_connect(&mut cursor),
        TYPE_CONNACK => {
            let ack_flags = cursor.read_u8("CONNACK")?;
            let return_code = cursor.read_u8("CONNACK")?;
            Ok(Packet::Connack(ConnackPacket {
                session_present: ack_flags & 0x01 != 0,
                return_code,
            }))
        }
        TYPE_PUBLISH => decode_publish(&mut cursor, flags),
        TYPE_SUBSCRIBE => decode_subscribe(&mut cursor),
        TYPE_SUBACK => {
            let packet_id = cursor.read_u16("SUBACK")?;
            Ok(Packet::Suback(SubackPacket {
                packet_id,
                return_codes: cursor.rest().to_vec(),
            }))
        }
        TYPE_PINGREQ => Ok(Packet::Pingreq),
        TYPE_PINGRESP => Ok(Packet::Pingresp),
        TYPE_DISCONNECT => Ok(Packet::Disconnect),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

fn decode_connect(cursor: &mut Cursor<'_>) -> Result<Packet, CodecError> {
    // Protocol name ("MQTT"), level, flags, keep-alive. Will, username and
    // password flags are parsed but their payload fields are ignored.
    let _protocol = cursor.read_string("CONNECT")?;
    let _level = cursor.read_u8("CONNECT")?;
    let connect_flags = cursor.read_u8("CONNECT")?;
    let keep_alive = cursor.read_u16("CONNECT")?;

    let client_id = cursor.read_string("CONNECT")?;

    Ok(Packet::Connect(ConnectPacket {
        client_id,
        clean_session: connect_flags & 0x02 != 0,
        keep_alive,
    }))
}

fn encode_connect(packet: &ConnectPacket) -> Vec<u8> {
    let mut body = Vec::new();
    write_string(&mut body, "MQTT");
    body.push(4); // protocol level 3.1.1
    body.push(if packet.clean_session { 0x02 } else { 0x00 });
    body.extend_from_slice(&packet.keep_alive.to_be_bytes());
    write_string(&mut body, &packet.client_id);
    body
}

fn decode_publish(cursor: &mut Cursor<'_>, flags: u8) -> Result<Packet, CodecError> {
    let qos = (flags >> 1) & 0x03;
    if qos > 2 {
        return Err(CodecError::MalformedPacket {
            packet: "PUBLISH",
            detail: "invalid qos",
        });
    }

    let topic = cursor.read_string("PUBLISH")?;
    let packet_id = if qos > 0 {
        Some(cursor.read_u16("PUBLISH")?)
    } else {
        None
    };

    Ok(Packet::Publish(PublishPacket {
        topic,
        payload: cursor.rest().to_vec(),
        qos,
        packet_id,
    }))
}

fn encode_publish(packet: &PublishPacket) -> Vec<u8> {
    let mut body = Vec::new();
    write_string(&mut body, &packet.topic);
    if let Some(packet_id) = packet.packet_id {
        body.extend_from_slice(&packet_id.to_be_bytes());
    }
    body.extend_from_slice(&packet.payload);
    body
}

fn decode_subscribe(cursor: &mut Cursor<'_>) -> Result<Packet, CodecError> {
    let packet_id = cursor.read_u16("SUBSCRIBE")?;

    let mut topics = Vec::new();
    while !cursor.is_empty() {
        let topic = cursor.read_string("SUBSCRIBE")?;
        let qos = cursor.read_u8("SUBSCRIBE")?;
        topics.push((topic, qos));
    }

    if topics.is_empty() {
        return Err(CodecError::MalformedPacket {
            packet: "SUBSCRIBE",
            detail: "no topic filters",
        });
    }

    Ok(Packet::Subscribe(SubscribePacket { packet_id, topics }))
}

fn encode_subscribe(packet: &SubscribePacket) -> Vec<u8> {
    let mut body = packet.packet_id.to_be_bytes().to_vec();
    for (topic, qos) in &packet.topics {
        write_string(&mut body, topic);
        body.push(*qos);
    }
    body
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Bounds-checked reader over a packet body
struct Cursor<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { body, offset: 0 }
    }

    fn is_empty(&self) -> bool {
        self.offset >= self.body.len()
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.body[self.offset..];
        self.offset = self.body.len();
        rest
    }

    fn read_u8(&mut self, packet: &'static str) -> Result<u8, CodecError> {
        let byte = *self
            .body
            .get(self.offset)
            .ok_or(CodecError::MalformedPacket {
                packet,
                detail: "truncated",
            })?;
        self.offset += 1;
        Ok(byte)
    }

    fn read_u16(&mut self, packet: &'static str) -> Result<u16, CodecError> {
        let high = self.read_u8(packet)?;
        let low = self.read_u8(packet)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    fn read_string(&mut self, packet: &'static str) -> Result<String, CodecError> {
        let len = self.read_u16(packet)? as usize;
        let end = self.offset + len;
        let bytes = self
            .body
            .get(self.offset..end)
            .ok_or(CodecError::MalformedPacket {
                packet,
                detail: "truncated string",
            })?;
        self.offset = end;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidString)
    }
}
