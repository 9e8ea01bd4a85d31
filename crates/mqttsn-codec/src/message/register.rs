//! Topic registration.

use bytes::{BufMut, BytesMut};

use crate::constants;
use crate::error::{CodecError, Result};
use crate::flags::ReturnCode;
use crate::wire::{write_frame, Reader};

/// Sent by either side to bind a topic string to a normal alias. When the
/// client registers, `topic_id` is 0x0000 and the gateway allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub topic_id: u16,
    pub msg_id: u16,
    pub topic_name: String,
}

impl Register {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let topic_id = r.read_u16()?;
        let msg_id = r.read_u16()?;
        let topic_name = r.read_rest_utf8("topic name")?;
        if topic_name.is_empty() {
            return Err(CodecError::FieldOutOfRange("topic name"));
        }
        Ok(Self {
            topic_id,
            msg_id,
            topic_name,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        if self.topic_name.is_empty() {
            return Err(CodecError::FieldOutOfRange("topic name"));
        }
        write_frame(constants::REGISTER, 4 + self.topic_name.len(), |buf| {
            buf.put_u16(self.topic_id);
            buf.put_u16(self.msg_id);
            buf.put_slice(self.topic_name.as_bytes());
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegAck {
    pub topic_id: u16,
    pub msg_id: u16,
    pub return_code: ReturnCode,
}

impl RegAck {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            topic_id: r.read_u16()?,
            msg_id: r.read_u16()?,
            return_code: ReturnCode::try_from_byte(r.read_u8()?)?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::REGACK, 5, |buf| {
            buf.put_u16(self.topic_id);
            buf.put_u16(self.msg_id);
            buf.put_u8(self.return_code as u8);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn register_wire_layout() {
        let frame = Register {
            topic_id: 0,
            msg_id: 1,
            topic_name: "t".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(&frame[..], &[0x07, 0x0A, 0x00, 0x00, 0x00, 0x01, 0x74]);
    }

    #[test]
    fn regack_round_trip() {
        let ack = RegAck {
            topic_id: 0x0001,
            msg_id: 42,
            return_code: ReturnCode::InvalidTopicId,
        };
        let frame = ack.encode().unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), Message::RegAck(ack));
    }

    #[test]
    fn register_empty_topic_rejected() {
        let frame = [0x06, 0x0A, 0x00, 0x00, 0x00, 0x01];
        assert!(Message::decode(&frame).is_err());
    }
}
