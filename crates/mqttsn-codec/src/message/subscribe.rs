//! Subscribe / unsubscribe messages.

use bytes::{BufMut, BytesMut};

use crate::constants;
use crate::error::{CodecError, Result};
use crate::flags::{Flags, QoS, ReturnCode, TopicIdType};
use crate::wire::{write_frame, Reader};

/// The topic field of SUBSCRIBE/UNSUBSCRIBE: a filter string, a predefined
/// alias, or a short topic carried in the 16-bit field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSpec {
    Name(String),
    Predefined(u16),
    Short([u8; 2]),
}

impl TopicSpec {
    fn topic_id_type(&self) -> TopicIdType {
        match self {
            TopicSpec::Name(_) => TopicIdType::Normal,
            TopicSpec::Predefined(_) => TopicIdType::Predefined,
            TopicSpec::Short(_) => TopicIdType::Short,
        }
    }

    fn wire_len(&self) -> usize {
        match self {
            TopicSpec::Name(name) => name.len(),
            TopicSpec::Predefined(_) | TopicSpec::Short(_) => 2,
        }
    }

    fn decode(topic_id_type: TopicIdType, r: &mut Reader<'_>) -> Result<Self> {
        match topic_id_type {
            TopicIdType::Normal => {
                let name = r.read_rest_utf8("topic filter")?;
                if name.is_empty() {
                    return Err(CodecError::FieldOutOfRange("topic filter"));
                }
                Ok(TopicSpec::Name(name))
            }
            TopicIdType::Predefined => Ok(TopicSpec::Predefined(r.read_u16()?)),
            TopicIdType::Short => {
                let bytes = r.read_bytes(2)?;
                Ok(TopicSpec::Short([bytes[0], bytes[1]]))
            }
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            TopicSpec::Name(name) => buf.put_slice(name.as_bytes()),
            TopicSpec::Predefined(id) => buf.put_u16(*id),
            TopicSpec::Short(chars) => buf.put_slice(chars),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub dup: bool,
    /// Requested maximum QoS.
    pub qos: QoS,
    pub msg_id: u16,
    pub topic: TopicSpec,
}

impl Subscribe {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let flags = Flags::decode(r.read_u8()?)?;
        let msg_id = r.read_u16()?;
        let topic = TopicSpec::decode(flags.topic_id_type, &mut r)?;
        Ok(Self {
            dup: flags.dup,
            qos: flags.qos,
            msg_id,
            topic,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        let flags = Flags {
            dup: self.dup,
            qos: self.qos,
            topic_id_type: self.topic.topic_id_type(),
            ..Flags::default()
        };
        write_frame(constants::SUBSCRIBE, 3 + self.topic.wire_len(), |buf| {
            buf.put_u8(flags.encode());
            buf.put_u16(self.msg_id);
            self.topic.encode(buf);
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubAck {
    /// Granted QoS.
    pub qos: QoS,
    /// Alias assigned when the filter was a plain topic name; 0x0000
    /// otherwise (wildcard filters get no alias).
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

impl SubAck {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let flags = Flags::decode(r.read_u8()?)?;
        Ok(Self {
            qos: flags.qos,
            topic_id: r.read_u16()?,
            msg_id: r.read_u16()?,
            return_code: ReturnCode::try_from_byte(r.read_u8()?)?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        let flags = Flags {
            qos: self.qos,
            ..Flags::default()
        };
        write_frame(constants::SUBACK, 6, |buf| {
            buf.put_u8(flags.encode());
            buf.put_u16(self.topic_id);
            buf.put_u16(self.msg_id);
            buf.put_u8(self.return_code as u8);
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub msg_id: u16,
    pub topic: TopicSpec,
}

impl Unsubscribe {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let flags = Flags::decode(r.read_u8()?)?;
        let msg_id = r.read_u16()?;
        let topic = TopicSpec::decode(flags.topic_id_type, &mut r)?;
        Ok(Self { msg_id, topic })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        let flags = Flags {
            topic_id_type: self.topic.topic_id_type(),
            ..Flags::default()
        };
        write_frame(constants::UNSUBSCRIBE, 3 + self.topic.wire_len(), |buf| {
            buf.put_u8(flags.encode());
            buf.put_u16(self.msg_id);
            self.topic.encode(buf);
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAck {
    pub msg_id: u16,
}

impl UnsubAck {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            msg_id: r.read_u16()?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::UNSUBACK, 2, |buf| {
            buf.put_u16(self.msg_id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn subscribe_filter_round_trip() {
        let subscribe = Subscribe {
            dup: false,
            qos: QoS::AtLeastOnce,
            msg_id: 3,
            topic: TopicSpec::Name("sensors/+".into()),
        };
        let frame = subscribe.encode().unwrap();
        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::Subscribe(subscribe)
        );
    }

    #[test]
    fn subscribe_predefined_and_short() {
        for topic in [TopicSpec::Predefined(0x0042), TopicSpec::Short(*b"ab")] {
            let subscribe = Subscribe {
                dup: false,
                qos: QoS::AtMostOnce,
                msg_id: 5,
                topic: topic.clone(),
            };
            let frame = subscribe.encode().unwrap();
            match Message::decode(&frame).unwrap() {
                Message::Subscribe(decoded) => assert_eq!(decoded.topic, topic),
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[test]
    fn suback_wire_layout() {
        let frame = SubAck {
            qos: QoS::AtLeastOnce,
            topic_id: 0,
            msg_id: 3,
            return_code: ReturnCode::Accepted,
        }
        .encode()
        .unwrap();
        assert_eq!(
            &frame[..],
            &[0x08, 0x13, 0x20, 0x00, 0x00, 0x00, 0x03, 0x00]
        );
    }

    #[test]
    fn unsubscribe_round_trip() {
        let unsubscribe = Unsubscribe {
            msg_id: 4,
            topic: TopicSpec::Name("sensors/#".into()),
        };
        let frame = unsubscribe.encode().unwrap();
        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::Unsubscribe(unsubscribe)
        );
    }

    #[test]
    fn subscribe_truncated_short_topic() {
        // declares a short topic but carries one byte
        let frame = [0x05, 0x12, 0x02, 0x00, 0x05];
        assert!(Message::decode(&frame).is_err());
    }
}
