use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current wire protocol version this crate produces and accepts.
pub const PROTOCOL_VERSION: u32 = 1;

/// Broadcast addressing token understood by `to`/`from` fields.
pub const BROADCAST: &str = "*";

/// A single protocol message exchanged with a project daemon.
///
/// Framed by [`crate::codec`] as a 4-byte big-endian length prefix followed
/// by the JSON encoding of this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub v: u32,
    pub id: String,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

impl Envelope {
    /// Builds an envelope stamped with the current protocol version, a fresh
    /// id, and the supplied timestamp (callers pass the timestamp in rather
    /// than this crate reaching for a clock, since connection code is the
    /// only caller that needs wall time and already has it).
    pub fn new(ts_millis: i64, body: EnvelopeBody) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: Uuid::new_v4().to_string(),
            ts: ts_millis,
            to: None,
            from: None,
            body,
        }
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum EnvelopeBody {
    #[serde(rename = "HELLO")]
    Hello(HelloPayload),
    #[serde(rename = "WELCOME")]
    Welcome(WelcomePayload),
    #[serde(rename = "SEND")]
    Send(SendPayload),
    #[serde(rename = "DELIVER")]
    Deliver(DeliverPayload),
    #[serde(rename = "ACK")]
    Ack(AckPayload),
    #[serde(rename = "PING")]
    Ping(PingPayload),
    #[serde(rename = "PONG")]
    Pong(PongPayload),
    #[serde(rename = "BYE")]
    Bye(ByePayload),
}

impl EnvelopeBody {
    pub fn type_name(&self) -> &'static str {
        match self {
            EnvelopeBody::Hello(_) => "HELLO",
            EnvelopeBody::Welcome(_) => "WELCOME",
            EnvelopeBody::Send(_) => "SEND",
            EnvelopeBody::Deliver(_) => "DELIVER",
            EnvelopeBody::Ack(_) => "ACK",
            EnvelopeBody::Ping(_) => "PING",
            EnvelopeBody::Pong(_) => "PONG",
            EnvelopeBody::Bye(_) => "BYE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    pub ack: bool,
    pub resume: bool,
    pub max_inflight: u32,
    pub supports_topics: bool,
}

impl Default for Capabilities {
    /// The capability set this crate's bridge client advertises in HELLO.
    fn default() -> Self {
        Self {
            ack: true,
            resume: false,
            max_inflight: 256,
            supports_topics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelloPayload {
    pub agent: String,
    pub cli: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WelcomePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendPayload {
    #[serde(default = "default_send_kind")]
    pub kind: String,
    pub body: String,
}

impl SendPayload {
    pub fn message(body: impl Into<String>) -> Self {
        Self {
            kind: default_send_kind(),
            body: body.into(),
        }
    }
}

fn default_send_kind() -> String {
    "message".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryInfo {
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliverPayload {
    pub id: String,
    pub delivery: DeliveryInfo,
    pub payload: SendPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckPayload {
    pub ack_id: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PongPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ByePayload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_serializes_with_uppercase_type_tag() {
        let env = Envelope::new(
            1_700_000_000_000,
            EnvelopeBody::Hello(HelloPayload {
                agent: "__BridgeClient".into(),
                cli: "bridge".into(),
                capabilities: Capabilities::default(),
            }),
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "HELLO");
        assert_eq!(json["payload"]["agent"], "__BridgeClient");
        assert!(json.get("to").is_none());
    }

    #[test]
    fn deliver_round_trips() {
        let env = Envelope::new(
            0,
            EnvelopeBody::Deliver(DeliverPayload {
                id: "msg-1".into(),
                delivery: DeliveryInfo { seq: 7 },
                payload: SendPayload::message("hi"),
            }),
        )
        .to("worker-a")
        .from("lead");
        let bytes = serde_json::to_vec(&env).unwrap();
        let back: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.body.type_name(), "DELIVER");
    }

    #[test]
    fn send_payload_defaults_kind_to_message() {
        let parsed: SendPayload = serde_json::from_str(r#"{"body":"hi"}"#).unwrap();
        assert_eq!(parsed.kind, "message");
    }
}
