//! Message construction without byte-offset knowledge.

use crate::constants;
use crate::error::{CodecError, Result};
use crate::flags::{QoS, ReturnCode, TopicIdType};
use crate::message::{
    Advertise, ConnAck, Disconnect, GwInfo, Integrity, Message, PingResp, ProtectionScheme,
    PubAck, Publish, RegAck, Register, SubAck, WillMsgReq, WillTopicReq,
};

/// Which wire dialect a factory speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    #[default]
    V1_2,
    V2_0,
}

/// Builds outbound messages for the gateway side of the conversation. The
/// factory owns no I/O; it only assembles typed values the codec can encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFactory {
    version: ProtocolVersion,
}

impl MessageFactory {
    #[must_use]
    pub fn new(version: ProtocolVersion) -> Self {
        Self { version }
    }

    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    #[must_use]
    pub fn advertise(&self, gateway_id: u8, duration: u16) -> Message {
        Message::Advertise(Advertise {
            gateway_id,
            duration,
        })
    }

    #[must_use]
    pub fn gwinfo(&self, gateway_id: u8) -> Message {
        Message::GwInfo(GwInfo {
            gateway_id,
            gateway_address: Vec::new(),
        })
    }

    #[must_use]
    pub fn connack(&self, return_code: ReturnCode) -> Message {
        Message::ConnAck(ConnAck { return_code })
    }

    #[must_use]
    pub fn will_topic_req(&self) -> Message {
        Message::WillTopicReq(WillTopicReq)
    }

    #[must_use]
    pub fn will_msg_req(&self) -> Message {
        Message::WillMsgReq(WillMsgReq)
    }

    #[must_use]
    pub fn register(&self, topic_id: u16, msg_id: u16, topic_name: &str) -> Message {
        Message::Register(Register {
            topic_id,
            msg_id,
            topic_name: topic_name.to_string(),
        })
    }

    #[must_use]
    pub fn regack(&self, topic_id: u16, msg_id: u16, return_code: ReturnCode) -> Message {
        Message::RegAck(RegAck {
            topic_id,
            msg_id,
            return_code,
        })
    }

    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn publish(
        &self,
        dup: bool,
        qos: QoS,
        retain: bool,
        topic_id_type: TopicIdType,
        topic_id: u16,
        msg_id: u16,
        payload: Vec<u8>,
    ) -> Message {
        Message::Publish(Publish {
            dup,
            qos,
            retain,
            topic_id_type,
            topic_id,
            msg_id,
            payload,
        })
    }

    #[must_use]
    pub fn puback(&self, topic_id: u16, msg_id: u16, return_code: ReturnCode) -> Message {
        Message::PubAck(PubAck {
            topic_id,
            msg_id,
            return_code,
        })
    }

    #[must_use]
    pub fn suback(&self, qos: QoS, topic_id: u16, msg_id: u16, return_code: ReturnCode) -> Message {
        Message::SubAck(SubAck {
            qos,
            topic_id,
            msg_id,
            return_code,
        })
    }

    #[must_use]
    pub fn pingresp(&self) -> Message {
        Message::PingResp(PingResp)
    }

    #[must_use]
    pub fn disconnect(&self, duration: Option<u16>) -> Message {
        Message::Disconnect(Disconnect { duration })
    }

    /// Wraps an already-encoded frame in an integrity envelope. The auth tag
    /// is supplied by the caller; the factory computes no MACs.
    ///
    /// # Errors
    /// Rejects v1.2 factories, values above `u32::MAX`, and tag/scheme
    /// combinations the envelope cannot carry.
    #[allow(clippy::too_many_arguments)]
    pub fn integrity(
        &self,
        scheme: ProtectionScheme,
        sender_id: &[u8],
        nonce: u32,
        key_material: u64,
        counter: u64,
        encapsulated: Vec<u8>,
        auth_tag: Vec<u8>,
    ) -> Result<Message> {
        if self.version != ProtocolVersion::V2_0 {
            return Err(CodecError::InvalidIntegrityLayout(
                "integrity requires protocol v2.0",
            ));
        }
        if sender_id.len() > 8 {
            return Err(CodecError::FieldOutOfRange("sender id"));
        }
        if key_material > constants::UNSIGNED_MAX_32 {
            return Err(CodecError::FieldOutOfRange("key material"));
        }
        if counter > constants::UNSIGNED_MAX_32 {
            return Err(CodecError::FieldOutOfRange("counter"));
        }

        let mut padded = [0u8; 8];
        padded[..sender_id.len()].copy_from_slice(sender_id);

        #[allow(clippy::cast_possible_truncation)]
        Ok(Message::Integrity(Integrity {
            scheme,
            sender_id: padded,
            nonce,
            key_material: key_material as u32,
            counter: counter as u32,
            encapsulated,
            auth_tag,
        }))
    }
}
