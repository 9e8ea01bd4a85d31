//! Sans-I/O codec for MQTT-SN v1.2 and the v2.0 integrity envelope.
//!
//! Frames are length-prefixed (1 byte, or 3 bytes `0x01 HI LO` above 255
//! total). [`Message::decode`] turns a datagram into a typed value,
//! [`Message::encode`] does the reverse, and [`MessageFactory`] builds
//! outbound messages without callers touching byte offsets.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod error;
pub mod factory;
pub mod flags;
pub mod message;
pub mod wire;

pub use error::{CodecError, Result};
pub use factory::{MessageFactory, ProtocolVersion};
pub use flags::{Flags, QoS, ReturnCode, TopicIdType};
pub use message::{
    Advertise, ConnAck, Connect, Disconnect, Encapsulated, GwInfo, Integrity, Message, PingReq,
    PingResp, ProtectionScheme, PubAck, PubComp, PubRec, PubRel, Publish, RegAck, Register,
    SearchGw, SubAck, Subscribe, TopicSpec, UnsubAck, Unsubscribe, WillMsg, WillMsgReq,
    WillMsgResp, WillMsgUpd, WillTopic, WillTopicReq, WillTopicResp, WillTopicUpd,
};
pub use wire::FrameHeader;
