//! Wire-level constants for MQTT-SN v1.2 and v2.0.

pub const ADVERTISE: u8 = 0x00;
pub const SEARCHGW: u8 = 0x01;
pub const GWINFO: u8 = 0x02;
pub const CONNECT: u8 = 0x04;
pub const CONNACK: u8 = 0x05;
pub const WILLTOPICREQ: u8 = 0x06;
pub const WILLTOPIC: u8 = 0x07;
pub const WILLMSGREQ: u8 = 0x08;
pub const WILLMSG: u8 = 0x09;
pub const REGISTER: u8 = 0x0A;
pub const REGACK: u8 = 0x0B;
pub const PUBLISH: u8 = 0x0C;
pub const PUBACK: u8 = 0x0D;
pub const PUBCOMP: u8 = 0x0E;
pub const PUBREC: u8 = 0x0F;
pub const PUBREL: u8 = 0x10;
pub const SUBSCRIBE: u8 = 0x12;
pub const SUBACK: u8 = 0x13;
pub const UNSUBSCRIBE: u8 = 0x14;
pub const UNSUBACK: u8 = 0x15;
pub const PINGREQ: u8 = 0x16;
pub const PINGRESP: u8 = 0x17;
pub const DISCONNECT: u8 = 0x18;
pub const WILLTOPICUPD: u8 = 0x1A;
pub const WILLTOPICRESP: u8 = 0x1B;
pub const WILLMSGUPD: u8 = 0x1C;
pub const WILLMSGRESP: u8 = 0x1D;
/// v2.0 integrity envelope wrapping an encapsulated inner frame.
pub const INTEGRITY: u8 = 0x1E;
/// Forwarder encapsulation.
pub const ENCAPSULATED: u8 = 0xFE;

/// Protocol id carried in CONNECT.
pub const PROTOCOL_ID: u8 = 0x01;

pub const UNSIGNED_MAX_8: u32 = 0xFF;
pub const UNSIGNED_MAX_16: u32 = 0xFFFF;
pub const UNSIGNED_MAX_32: u64 = 0xFFFF_FFFF;

/// Normal topic aliases are allocated from this range; 0x0000 and 0xFFFF
/// are reserved by the specification.
pub const ALIAS_MIN: u16 = 0x0001;
pub const ALIAS_MAX: u16 = 0xFFFE;

/// Total frame length above which the 3-byte extended length prefix
/// (`0x01 HI LO`) is used.
pub const EXTENDED_LENGTH_THRESHOLD: usize = 0xFF;

/// Largest frame the codec will produce or accept.
pub const MAX_FRAME_LENGTH: usize = 0xFFFF;
