//! Will negotiation and update messages.

use bytes::{BufMut, BytesMut};

use crate::constants;
use crate::error::Result;
use crate::flags::{Flags, QoS, ReturnCode};
use crate::wire::{write_frame, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WillTopicReq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WillMsgReq;

/// An empty body deletes the will.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillTopic {
    pub qos: QoS,
    pub retain: bool,
    pub topic: Option<String>,
}

fn decode_will_topic(body: &[u8]) -> Result<(QoS, bool, Option<String>)> {
    if body.is_empty() {
        return Ok((QoS::AtMostOnce, false, None));
    }
    let mut r = Reader::new(body);
    let flags = Flags::decode(r.read_u8()?)?;
    let topic = r.read_rest_utf8("will topic")?;
    Ok((flags.qos, flags.retain, Some(topic)))
}

fn encode_will_topic(
    message_type: u8,
    qos: QoS,
    retain: bool,
    topic: Option<&str>,
) -> Result<BytesMut> {
    match topic {
        None => write_frame(message_type, 0, |_| ()),
        Some(topic) => {
            let flags = Flags {
                qos,
                retain,
                ..Flags::default()
            };
            write_frame(message_type, 1 + topic.len(), |buf| {
                buf.put_u8(flags.encode());
                buf.put_slice(topic.as_bytes());
            })
        }
    }
}

impl WillTopic {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let (qos, retain, topic) = decode_will_topic(body)?;
        Ok(Self { qos, retain, topic })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        encode_will_topic(constants::WILLTOPIC, self.qos, self.retain, self.topic.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillTopicUpd {
    pub qos: QoS,
    pub retain: bool,
    pub topic: Option<String>,
}

impl WillTopicUpd {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let (qos, retain, topic) = decode_will_topic(body)?;
        Ok(Self { qos, retain, topic })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        encode_will_topic(
            constants::WILLTOPICUPD,
            self.qos,
            self.retain,
            self.topic.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillMsg {
    pub payload: Vec<u8>,
}

impl WillMsg {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        Ok(Self {
            payload: body.to_vec(),
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::WILLMSG, self.payload.len(), |buf| {
            buf.put_slice(&self.payload);
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillMsgUpd {
    pub payload: Vec<u8>,
}

impl WillMsgUpd {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        Ok(Self {
            payload: body.to_vec(),
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::WILLMSGUPD, self.payload.len(), |buf| {
            buf.put_slice(&self.payload);
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WillTopicResp {
    pub return_code: ReturnCode,
}

impl WillTopicResp {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            return_code: ReturnCode::try_from_byte(r.read_u8()?)?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::WILLTOPICRESP, 1, |buf| {
            buf.put_u8(self.return_code as u8);
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WillMsgResp {
    pub return_code: ReturnCode,
}

impl WillMsgResp {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            return_code: ReturnCode::try_from_byte(r.read_u8()?)?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::WILLMSGRESP, 1, |buf| {
            buf.put_u8(self.return_code as u8);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn will_topic_delete_form() {
        let frame = WillTopic {
            qos: QoS::AtMostOnce,
            retain: false,
            topic: None,
        }
        .encode()
        .unwrap();
        assert_eq!(&frame[..], &[0x02, 0x07]);
        assert_eq!(
            Message::decode(&frame).unwrap(),
            Message::WillTopic(WillTopic {
                qos: QoS::AtMostOnce,
                retain: false,
                topic: None,
            })
        );
    }

    #[test]
    fn will_topic_flags_carried() {
        let topic = WillTopic {
            qos: QoS::ExactlyOnce,
            retain: true,
            topic: Some("alarm/offline".into()),
        };
        let frame = topic.encode().unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), Message::WillTopic(topic));
    }

    #[test]
    fn will_msg_round_trip() {
        let msg = WillMsg {
            payload: vec![0xCA, 0xFE],
        };
        let frame = msg.encode().unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), Message::WillMsg(msg));
    }
}
