//! Publish and its acknowledgement family.

use bytes::{BufMut, BytesMut};

use crate::constants;
use crate::error::Result;
use crate::flags::{Flags, QoS, ReturnCode, TopicIdType};
use crate::wire::{write_frame, Reader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic_id_type: TopicIdType,
    pub topic_id: u16,
    /// 0x0000 for QoS 0.
    pub msg_id: u16,
    pub payload: Vec<u8>,
}

impl Publish {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let flags = Flags::decode(r.read_u8()?)?;
        Ok(Self {
            dup: flags.dup,
            qos: flags.qos,
            retain: flags.retain,
            topic_id_type: flags.topic_id_type,
            topic_id: r.read_u16()?,
            msg_id: r.read_u16()?,
            payload: r.read_rest().to_vec(),
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        let flags = Flags {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
            topic_id_type: self.topic_id_type,
            ..Flags::default()
        };
        write_frame(constants::PUBLISH, 5 + self.payload.len(), |buf| {
            buf.put_u8(flags.encode());
            buf.put_u16(self.topic_id);
            buf.put_u16(self.msg_id);
            buf.put_slice(&self.payload);
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

impl PubAck {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            topic_id: r.read_u16()?,
            msg_id: r.read_u16()?,
            return_code: ReturnCode::try_from_byte(r.read_u8()?)?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::PUBACK, 5, |buf| {
            buf.put_u16(self.topic_id);
            buf.put_u16(self.msg_id);
            buf.put_u8(self.return_code as u8);
        })
    }
}

macro_rules! msg_id_only {
    ($(#[$meta:meta])* $name:ident, $message_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub msg_id: u16,
        }

        impl $name {
            pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
                let mut r = Reader::new(body);
                Ok(Self {
                    msg_id: r.read_u16()?,
                })
            }

            pub(crate) fn encode(&self) -> Result<BytesMut> {
                write_frame($message_type, 2, |buf| {
                    buf.put_u16(self.msg_id);
                })
            }
        }
    };
}

msg_id_only!(PubRec, constants::PUBREC);
msg_id_only!(PubRel, constants::PUBREL);
msg_id_only!(PubComp, constants::PUBCOMP);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn publish_wire_layout() {
        let frame = Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic_id_type: TopicIdType::Normal,
            topic_id: 0x0001,
            msg_id: 7,
            payload: vec![0x41, 0x42],
        }
        .encode()
        .unwrap();
        assert_eq!(
            &frame[..],
            &[0x09, 0x0C, 0x20, 0x00, 0x01, 0x00, 0x07, 0x41, 0x42]
        );
    }

    #[test]
    fn publish_empty_payload() {
        let publish = Publish {
            dup: true,
            qos: QoS::AtMostOnce,
            retain: true,
            topic_id_type: TopicIdType::Short,
            topic_id: u16::from_be_bytes(*b"ab"),
            msg_id: 0,
            payload: vec![],
        };
        let frame = publish.encode().unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), Message::Publish(publish));
    }

    #[test]
    fn puback_round_trip() {
        let ack = PubAck {
            topic_id: 0x0001,
            msg_id: 7,
            return_code: ReturnCode::Accepted,
        };
        let frame = ack.encode().unwrap();
        assert_eq!(&frame[..], &[0x07, 0x0D, 0x00, 0x01, 0x00, 0x07, 0x00]);
        assert_eq!(Message::decode(&frame).unwrap(), Message::PubAck(ack));
    }

    #[test]
    fn qos2_acks() {
        for (frame_type, message) in [
            (0x0F, Message::PubRec(PubRec { msg_id: 9 })),
            (0x10, Message::PubRel(PubRel { msg_id: 9 })),
            (0x0E, Message::PubComp(PubComp { msg_id: 9 })),
        ] {
            let frame = message.encode().unwrap();
            assert_eq!(&frame[..], &[0x04, frame_type, 0x00, 0x09]);
            assert_eq!(Message::decode(&frame).unwrap(), message);
        }
    }
}
