//! Connection lifecycle messages.

use bytes::{BufMut, BytesMut};

use crate::constants;
use crate::error::{CodecError, Result};
use crate::flags::Flags;
use crate::wire::{write_frame, Reader};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Client wants the will exchange (WILLTOPICREQ / WILLMSGREQ) to follow.
    pub will: bool,
    pub clean_session: bool,
    /// Keepalive in seconds.
    pub duration: u16,
    pub client_id: String,
}

impl Connect {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let flags = Flags::decode(r.read_u8()?)?;
        let protocol_id = r.read_u8()?;
        if protocol_id != constants::PROTOCOL_ID {
            return Err(CodecError::FieldOutOfRange("protocol id"));
        }
        let duration = r.read_u16()?;
        let client_id = r.read_rest_utf8("client id")?;
        if client_id.is_empty() {
            return Err(CodecError::FieldOutOfRange("client id"));
        }
        Ok(Self {
            will: flags.will,
            clean_session: flags.clean_session,
            duration,
            client_id,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        if self.client_id.is_empty() {
            return Err(CodecError::FieldOutOfRange("client id"));
        }
        let flags = Flags {
            will: self.will,
            clean_session: self.clean_session,
            ..Flags::default()
        };
        write_frame(constants::CONNECT, 4 + self.client_id.len(), |buf| {
            buf.put_u8(flags.encode());
            buf.put_u8(constants::PROTOCOL_ID);
            buf.put_u16(self.duration);
            buf.put_slice(self.client_id.as_bytes());
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub return_code: crate::flags::ReturnCode,
}

impl ConnAck {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            return_code: crate::flags::ReturnCode::try_from_byte(r.read_u8()?)?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::CONNACK, 1, |buf| {
            buf.put_u8(self.return_code as u8);
        })
    }
}

/// An empty body is a terminal disconnect; a duration requests sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    pub duration: Option<u16>,
}

impl Disconnect {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Ok(Self { duration: None });
        }
        let mut r = Reader::new(body);
        Ok(Self {
            duration: Some(r.read_u16()?),
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        match self.duration {
            None => write_frame(constants::DISCONNECT, 0, |_| ()),
            Some(duration) => write_frame(constants::DISCONNECT, 2, |buf| {
                buf.put_u16(duration);
            }),
        }
    }
}

/// A client id is present when a sleeping device polls for queued traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReq {
    pub client_id: Option<String>,
}

impl PingReq {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Ok(Self { client_id: None });
        }
        let mut r = Reader::new(body);
        Ok(Self {
            client_id: Some(r.read_rest_utf8("client id")?),
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        let len = self.client_id.as_ref().map_or(0, String::len);
        write_frame(constants::PINGREQ, len, |buf| {
            if let Some(client_id) = &self.client_id {
                buf.put_slice(client_id.as_bytes());
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResp;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ReturnCode;
    use crate::message::Message;

    #[test]
    fn connect_wire_layout() {
        let frame = Connect {
            will: true,
            clean_session: true,
            duration: 60,
            client_id: "A".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(&frame[..], &[0x07, 0x04, 0x0C, 0x01, 0x00, 0x3C, 0x41]);
    }

    #[test]
    fn connect_rejects_bad_protocol_id() {
        let frame = [0x07, 0x04, 0x00, 0x02, 0x00, 0x3C, 0x41];
        assert!(matches!(
            Message::decode(&frame),
            Err(CodecError::FieldOutOfRange("protocol id"))
        ));
    }

    #[test]
    fn connect_rejects_empty_client_id() {
        let frame = [0x06, 0x04, 0x00, 0x01, 0x00, 0x3C];
        assert!(matches!(
            Message::decode(&frame),
            Err(CodecError::FieldOutOfRange("client id"))
        ));
    }

    #[test]
    fn disconnect_forms() {
        let terminal = Disconnect { duration: None }.encode().unwrap();
        assert_eq!(&terminal[..], &[0x02, 0x18]);

        let sleeping = Disconnect { duration: Some(300) }.encode().unwrap();
        assert_eq!(&sleeping[..], &[0x04, 0x18, 0x01, 0x2C]);
        assert_eq!(
            Message::decode(&sleeping).unwrap(),
            Message::Disconnect(Disconnect { duration: Some(300) })
        );
    }

    #[test]
    fn pingreq_with_client_id() {
        let frame = PingReq {
            client_id: Some("sleepy".into()),
        }
        .encode()
        .unwrap();
        let decoded = Message::decode(&frame).unwrap();
        assert_eq!(
            decoded,
            Message::PingReq(PingReq {
                client_id: Some("sleepy".into())
            })
        );
    }

    #[test]
    fn connack_return_code() {
        let frame = ConnAck {
            return_code: ReturnCode::Congestion,
        }
        .encode()
        .unwrap();
        assert_eq!(&frame[..], &[0x03, 0x05, 0x01]);
    }
}
