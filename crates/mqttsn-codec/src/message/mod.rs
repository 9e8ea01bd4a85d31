//! Typed MQTT-SN messages and the frame-level decode/encode dispatch.

mod advertise;
mod connect;
mod integrity;
mod publish;
mod register;
mod subscribe;
mod will;

pub use advertise::{Advertise, Encapsulated, GwInfo, SearchGw};
pub use connect::{ConnAck, Connect, Disconnect, PingReq, PingResp};
pub use integrity::{Integrity, ProtectionScheme};
pub use publish::{PubAck, PubComp, PubRec, PubRel, Publish};
pub use register::{RegAck, Register};
pub use subscribe::{SubAck, Subscribe, TopicSpec, UnsubAck, Unsubscribe};
pub use will::{
    WillMsg, WillMsgReq, WillMsgResp, WillMsgUpd, WillTopic, WillTopicReq, WillTopicResp,
    WillTopicUpd,
};

use bytes::BytesMut;

use crate::constants;
use crate::error::{CodecError, Result};
use crate::wire::{write_frame, FrameHeader};

/// A decoded MQTT-SN frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Advertise(Advertise),
    SearchGw(SearchGw),
    GwInfo(GwInfo),
    Connect(Connect),
    ConnAck(ConnAck),
    WillTopicReq(WillTopicReq),
    WillTopic(WillTopic),
    WillMsgReq(WillMsgReq),
    WillMsg(WillMsg),
    Register(Register),
    RegAck(RegAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq(PingReq),
    PingResp(PingResp),
    Disconnect(Disconnect),
    WillTopicUpd(WillTopicUpd),
    WillTopicResp(WillTopicResp),
    WillMsgUpd(WillMsgUpd),
    WillMsgResp(WillMsgResp),
    Integrity(Integrity),
    Encapsulated(Encapsulated),
}

impl Message {
    #[must_use]
    pub fn message_type(&self) -> u8 {
        match self {
            Message::Advertise(_) => constants::ADVERTISE,
            Message::SearchGw(_) => constants::SEARCHGW,
            Message::GwInfo(_) => constants::GWINFO,
            Message::Connect(_) => constants::CONNECT,
            Message::ConnAck(_) => constants::CONNACK,
            Message::WillTopicReq(_) => constants::WILLTOPICREQ,
            Message::WillTopic(_) => constants::WILLTOPIC,
            Message::WillMsgReq(_) => constants::WILLMSGREQ,
            Message::WillMsg(_) => constants::WILLMSG,
            Message::Register(_) => constants::REGISTER,
            Message::RegAck(_) => constants::REGACK,
            Message::Publish(_) => constants::PUBLISH,
            Message::PubAck(_) => constants::PUBACK,
            Message::PubRec(_) => constants::PUBREC,
            Message::PubRel(_) => constants::PUBREL,
            Message::PubComp(_) => constants::PUBCOMP,
            Message::Subscribe(_) => constants::SUBSCRIBE,
            Message::SubAck(_) => constants::SUBACK,
            Message::Unsubscribe(_) => constants::UNSUBSCRIBE,
            Message::UnsubAck(_) => constants::UNSUBACK,
            Message::PingReq(_) => constants::PINGREQ,
            Message::PingResp(_) => constants::PINGRESP,
            Message::Disconnect(_) => constants::DISCONNECT,
            Message::WillTopicUpd(_) => constants::WILLTOPICUPD,
            Message::WillTopicResp(_) => constants::WILLTOPICRESP,
            Message::WillMsgUpd(_) => constants::WILLMSGUPD,
            Message::WillMsgResp(_) => constants::WILLMSGRESP,
            Message::Integrity(_) => constants::INTEGRITY,
            Message::Encapsulated(_) => constants::ENCAPSULATED,
        }
    }

    /// Decodes one frame from the head of `buf`. Bytes beyond the declared
    /// frame length are ignored, except for forwarder encapsulation where
    /// they carry the inner frame.
    ///
    /// # Errors
    /// A typed [`CodecError`] for any malformed input.
    pub fn decode(buf: &[u8]) -> Result<Message> {
        let header = FrameHeader::parse(buf)?;
        let body = header.body(buf);

        let message = match header.message_type {
            constants::ADVERTISE => Message::Advertise(Advertise::decode_body(body)?),
            constants::SEARCHGW => Message::SearchGw(SearchGw::decode_body(body)?),
            constants::GWINFO => Message::GwInfo(GwInfo::decode_body(body)?),
            constants::CONNECT => Message::Connect(Connect::decode_body(body)?),
            constants::CONNACK => Message::ConnAck(ConnAck::decode_body(body)?),
            constants::WILLTOPICREQ => Message::WillTopicReq(WillTopicReq),
            constants::WILLTOPIC => Message::WillTopic(WillTopic::decode_body(body)?),
            constants::WILLMSGREQ => Message::WillMsgReq(WillMsgReq),
            constants::WILLMSG => Message::WillMsg(WillMsg::decode_body(body)?),
            constants::REGISTER => Message::Register(Register::decode_body(body)?),
            constants::REGACK => Message::RegAck(RegAck::decode_body(body)?),
            constants::PUBLISH => Message::Publish(Publish::decode_body(body)?),
            constants::PUBACK => Message::PubAck(PubAck::decode_body(body)?),
            constants::PUBREC => Message::PubRec(PubRec::decode_body(body)?),
            constants::PUBREL => Message::PubRel(PubRel::decode_body(body)?),
            constants::PUBCOMP => Message::PubComp(PubComp::decode_body(body)?),
            constants::SUBSCRIBE => Message::Subscribe(Subscribe::decode_body(body)?),
            constants::SUBACK => Message::SubAck(SubAck::decode_body(body)?),
            constants::UNSUBSCRIBE => Message::Unsubscribe(Unsubscribe::decode_body(body)?),
            constants::UNSUBACK => Message::UnsubAck(UnsubAck::decode_body(body)?),
            constants::PINGREQ => Message::PingReq(PingReq::decode_body(body)?),
            constants::PINGRESP => Message::PingResp(PingResp),
            constants::DISCONNECT => Message::Disconnect(Disconnect::decode_body(body)?),
            constants::WILLTOPICUPD => Message::WillTopicUpd(WillTopicUpd::decode_body(body)?),
            constants::WILLTOPICRESP => Message::WillTopicResp(WillTopicResp::decode_body(body)?),
            constants::WILLMSGUPD => Message::WillMsgUpd(WillMsgUpd::decode_body(body)?),
            constants::WILLMSGRESP => Message::WillMsgResp(WillMsgResp::decode_body(body)?),
            constants::INTEGRITY => Message::Integrity(Integrity::decode_body(body)?),
            constants::ENCAPSULATED => {
                let tail = &buf[header.total_length..];
                Message::Encapsulated(Encapsulated::decode_body(body, tail)?)
            }
            other => return Err(CodecError::UnknownType(other)),
        };
        Ok(message)
    }

    /// Encodes the full frame including the length prefix.
    ///
    /// # Errors
    /// A typed [`CodecError`] when a field cannot be represented on the wire.
    pub fn encode(&self) -> Result<BytesMut> {
        match self {
            Message::Advertise(m) => m.encode(),
            Message::SearchGw(m) => m.encode(),
            Message::GwInfo(m) => m.encode(),
            Message::Connect(m) => m.encode(),
            Message::ConnAck(m) => m.encode(),
            Message::WillTopicReq(_) => write_frame(constants::WILLTOPICREQ, 0, |_| ()),
            Message::WillTopic(m) => m.encode(),
            Message::WillMsgReq(_) => write_frame(constants::WILLMSGREQ, 0, |_| ()),
            Message::WillMsg(m) => m.encode(),
            Message::Register(m) => m.encode(),
            Message::RegAck(m) => m.encode(),
            Message::Publish(m) => m.encode(),
            Message::PubAck(m) => m.encode(),
            Message::PubRec(m) => m.encode(),
            Message::PubRel(m) => m.encode(),
            Message::PubComp(m) => m.encode(),
            Message::Subscribe(m) => m.encode(),
            Message::SubAck(m) => m.encode(),
            Message::Unsubscribe(m) => m.encode(),
            Message::UnsubAck(m) => m.encode(),
            Message::PingReq(m) => m.encode(),
            Message::PingResp(_) => write_frame(constants::PINGRESP, 0, |_| ()),
            Message::Disconnect(m) => m.encode(),
            Message::WillTopicUpd(m) => m.encode(),
            Message::WillTopicResp(m) => m.encode(),
            Message::WillMsgUpd(m) => m.encode(),
            Message::WillMsgResp(m) => m.encode(),
            Message::Integrity(m) => m.encode(),
            Message::Encapsulated(m) => m.encode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{QoS, ReturnCode, TopicIdType};

    #[test]
    fn unknown_type_rejected() {
        let frame = [0x02, 0x3F];
        assert!(matches!(
            Message::decode(&frame),
            Err(CodecError::UnknownType(0x3F))
        ));
    }

    #[test]
    fn trailing_bytes_ignored() {
        // PINGRESP followed by datagram padding
        let frame = [0x02, 0x17, 0xDE, 0xAD];
        assert_eq!(Message::decode(&frame).unwrap(), Message::PingResp(PingResp));
    }

    #[test]
    fn decode_dispatches_every_type() {
        let samples: Vec<Message> = vec![
            Message::Advertise(Advertise {
                gateway_id: 1,
                duration: 900,
            }),
            Message::SearchGw(SearchGw { radius: 2 }),
            Message::GwInfo(GwInfo {
                gateway_id: 1,
                gateway_address: vec![10, 0, 0, 1],
            }),
            Message::Connect(Connect {
                will: false,
                clean_session: true,
                duration: 60,
                client_id: "device-1".into(),
            }),
            Message::ConnAck(ConnAck {
                return_code: ReturnCode::Accepted,
            }),
            Message::WillTopicReq(WillTopicReq),
            Message::WillTopic(WillTopic {
                qos: QoS::AtLeastOnce,
                retain: false,
                topic: Some("will/topic".into()),
            }),
            Message::WillMsgReq(WillMsgReq),
            Message::WillMsg(WillMsg {
                payload: vec![1, 2, 3],
            }),
            Message::Register(Register {
                topic_id: 7,
                msg_id: 9,
                topic_name: "sensors/temp".into(),
            }),
            Message::RegAck(RegAck {
                topic_id: 7,
                msg_id: 9,
                return_code: ReturnCode::Accepted,
            }),
            Message::Publish(Publish {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: false,
                topic_id_type: TopicIdType::Normal,
                topic_id: 1,
                msg_id: 7,
                payload: vec![0x41, 0x42],
            }),
            Message::PubAck(PubAck {
                topic_id: 1,
                msg_id: 7,
                return_code: ReturnCode::Accepted,
            }),
            Message::PubRec(PubRec { msg_id: 7 }),
            Message::PubRel(PubRel { msg_id: 7 }),
            Message::PubComp(PubComp { msg_id: 7 }),
            Message::Subscribe(Subscribe {
                dup: false,
                qos: QoS::AtLeastOnce,
                msg_id: 3,
                topic: TopicSpec::Name("sensors/+".into()),
            }),
            Message::SubAck(SubAck {
                qos: QoS::AtLeastOnce,
                topic_id: 0,
                msg_id: 3,
                return_code: ReturnCode::Accepted,
            }),
            Message::Unsubscribe(Unsubscribe {
                msg_id: 4,
                topic: TopicSpec::Name("sensors/+".into()),
            }),
            Message::UnsubAck(UnsubAck { msg_id: 4 }),
            Message::PingReq(PingReq { client_id: None }),
            Message::PingResp(PingResp),
            Message::Disconnect(Disconnect { duration: Some(30) }),
            Message::WillTopicUpd(WillTopicUpd {
                qos: QoS::AtMostOnce,
                retain: true,
                topic: Some("will/upd".into()),
            }),
            Message::WillTopicResp(WillTopicResp {
                return_code: ReturnCode::Accepted,
            }),
            Message::WillMsgUpd(WillMsgUpd {
                payload: vec![9, 9],
            }),
            Message::WillMsgResp(WillMsgResp {
                return_code: ReturnCode::Accepted,
            }),
        ];

        for message in samples {
            let encoded = message.encode().unwrap();
            let decoded = Message::decode(&encoded).unwrap();
            assert_eq!(decoded, message);
        }
    }
}
