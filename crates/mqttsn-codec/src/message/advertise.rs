//! Gateway discovery messages and forwarder encapsulation.

use bytes::{BufMut, BytesMut};

use crate::constants;
use crate::error::{CodecError, Result};
use crate::wire::{write_frame, Reader};

use super::Message;

/// Periodic gateway beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertise {
    pub gateway_id: u8,
    /// Seconds until the next beacon.
    pub duration: u16,
}

impl Advertise {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            gateway_id: r.read_u8()?,
            duration: r.read_u16()?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::ADVERTISE, 3, |buf| {
            buf.put_u8(self.gateway_id);
            buf.put_u16(self.duration);
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchGw {
    /// Broadcast radius in hops.
    pub radius: u8,
}

impl SearchGw {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            radius: r.read_u8()?,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::SEARCHGW, 1, |buf| {
            buf.put_u8(self.radius);
        })
    }
}

/// Answer to SEARCHGW. The address is present only when a client answers on
/// behalf of a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GwInfo {
    pub gateway_id: u8,
    pub gateway_address: Vec<u8>,
}

impl GwInfo {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        Ok(Self {
            gateway_id: r.read_u8()?,
            gateway_address: r.read_rest().to_vec(),
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        write_frame(constants::GWINFO, 1 + self.gateway_address.len(), |buf| {
            buf.put_u8(self.gateway_id);
            buf.put_slice(&self.gateway_address);
        })
    }
}

/// Forwarder encapsulation: the declared frame length covers only the
/// control byte and wireless node id, the inner frame follows on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encapsulated {
    /// Low two bits carry the remaining broadcast radius.
    pub radius: u8,
    pub wireless_node_id: Vec<u8>,
    pub message: Box<Message>,
}

impl Encapsulated {
    pub(crate) fn decode_body(body: &[u8], tail: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let ctrl = r.read_u8()?;
        let wireless_node_id = r.read_rest().to_vec();
        if tail.is_empty() {
            return Err(CodecError::ShortBuffer {
                needed: 2,
                available: 0,
            });
        }
        let message = Message::decode(tail)?;
        Ok(Self {
            radius: ctrl & 0x03,
            wireless_node_id,
            message: Box::new(message),
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        let mut frame = write_frame(
            constants::ENCAPSULATED,
            1 + self.wireless_node_id.len(),
            |buf| {
                buf.put_u8(self.radius & 0x03);
                buf.put_slice(&self.wireless_node_id);
            },
        )?;
        let inner = self.message.encode()?;
        frame.extend_from_slice(&inner);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertise_wire_layout() {
        let frame = Advertise {
            gateway_id: 0x2A,
            duration: 900,
        }
        .encode()
        .unwrap();
        assert_eq!(&frame[..], &[0x05, 0x00, 0x2A, 0x03, 0x84]);
    }

    #[test]
    fn encapsulated_round_trip() {
        let inner = Message::PingReq(super::super::PingReq { client_id: None });
        let encapsulated = Encapsulated {
            radius: 1,
            wireless_node_id: vec![0xAA, 0xBB],
            message: Box::new(inner),
        };
        let frame = encapsulated.encode().unwrap();
        let decoded = Message::decode(&frame).unwrap();
        assert_eq!(decoded, Message::Encapsulated(encapsulated));
    }

    #[test]
    fn encapsulated_missing_inner_frame() {
        // ctrl + node id but nothing after the envelope
        let frame = [0x04, 0xFE, 0x01, 0xAA];
        assert!(Message::decode(&frame).is_err());
    }
}
