//! The v2.0 integrity envelope: an authenticated wrapper around an
//! encapsulated inner frame.
//!
//! Body layout:
//!
//! ```text
//! [flags][scheme][sender id x8][nonce x4][key material][counter][inner...][auth tag]
//! ```
//!
//! The flags byte packs `AAAA KK CC`: the auth-tag length index (4 bits,
//! tag length = index x 4 bytes), the key-material length index and the
//! counter length index (2 bits each; 0 -> absent, 1 -> u16, 2 -> u32).
//! The inner frame length is derived from the total length, so the tag must
//! account for exactly the remaining bytes.

use bytes::{BufMut, BytesMut};

use crate::constants;
use crate::error::{CodecError, Result};
use crate::wire::{write_frame, Reader};

use super::Message;

const FIXED_BODY_LEN: usize = 1 + 1 + 8 + 4;
const MAX_AUTH_TAG_LEN: usize = 15 * 4;

/// MAC/AEAD algorithm protecting an integrity envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtectionScheme {
    /// Recognized on the wire but rejected by validation.
    HmacSha256 = 0x00,
    HmacSha3_256 = 0x01,
    Cmac128 = 0x02,
    Cmac192 = 0x03,
    Cmac256 = 0x04,
    AesCcm64_128 = 0x40,
    AesCcm64_192 = 0x41,
    AesCcm64_256 = 0x42,
    AesCcm128_128 = 0x43,
    AesCcm128_192 = 0x44,
    AesCcm128_256 = 0x45,
    AesGcm128_128 = 0x46,
    AesGcm192_128 = 0x47,
    AesGcm256_128 = 0x48,
    ChaCha20Poly1305 = 0x49,
}

impl ProtectionScheme {
    /// # Errors
    /// `InvalidProtectionScheme` for bytes outside the defined set.
    pub fn try_from_byte(value: u8) -> Result<Self> {
        let scheme = match value {
            0x00 => ProtectionScheme::HmacSha256,
            0x01 => ProtectionScheme::HmacSha3_256,
            0x02 => ProtectionScheme::Cmac128,
            0x03 => ProtectionScheme::Cmac192,
            0x04 => ProtectionScheme::Cmac256,
            0x40 => ProtectionScheme::AesCcm64_128,
            0x41 => ProtectionScheme::AesCcm64_192,
            0x42 => ProtectionScheme::AesCcm64_256,
            0x43 => ProtectionScheme::AesCcm128_128,
            0x44 => ProtectionScheme::AesCcm128_192,
            0x45 => ProtectionScheme::AesCcm128_256,
            0x46 => ProtectionScheme::AesGcm128_128,
            0x47 => ProtectionScheme::AesGcm192_128,
            0x48 => ProtectionScheme::AesGcm256_128,
            0x49 => ProtectionScheme::ChaCha20Poly1305,
            other => return Err(CodecError::InvalidProtectionScheme(other)),
        };
        Ok(scheme)
    }

    /// HMAC-SHA256 is retained for wire compatibility only.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        !matches!(self, ProtectionScheme::HmacSha256)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integrity {
    pub scheme: ProtectionScheme,
    /// Zero-padded to 8 bytes.
    pub sender_id: [u8; 8],
    pub nonce: u32,
    /// 0 encodes as absent.
    pub key_material: u32,
    /// 0 encodes as absent.
    pub counter: u32,
    /// The wrapped frame, bytes as seen on the wire.
    pub encapsulated: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

/// Smallest of 0/2/4 bytes that holds `value`.
fn optional_field_len(value: u32) -> usize {
    if value == 0 {
        0
    } else if value <= constants::UNSIGNED_MAX_16 {
        2
    } else {
        4
    }
}

fn read_optional_field(r: &mut Reader<'_>, len: usize) -> Result<u32> {
    match len {
        0 => Ok(0),
        2 => Ok(u32::from(r.read_u16()?)),
        4 => r.read_u32(),
        _ => Err(CodecError::InvalidIntegrityLayout("optional field length")),
    }
}

fn write_optional_field(buf: &mut BytesMut, value: u32, len: usize) {
    match len {
        2 => {
            #[allow(clippy::cast_possible_truncation)]
            buf.put_u16(value as u16);
        }
        4 => buf.put_u32(value),
        _ => {}
    }
}

/// Maps an optional-field length to its 2-bit index.
fn length_index(len: usize) -> u8 {
    match len {
        2 => 1,
        4 => 2,
        _ => 0,
    }
}

/// Maps a 2-bit index back to the field length in bytes.
fn index_length(index: u8) -> Result<usize> {
    match index {
        0 => Ok(0),
        1 => Ok(2),
        2 => Ok(4),
        _ => Err(CodecError::InvalidIntegrityLayout("optional field index")),
    }
}

impl Integrity {
    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);

        let flags = r.read_u8()?;
        let auth_tag_len = usize::from((flags & 0xF0) >> 4) * 4;
        let key_material_len = index_length((flags & 0x0C) >> 2)?;
        let counter_len = index_length(flags & 0x03)?;

        let scheme = ProtectionScheme::try_from_byte(r.read_u8()?)?;
        if !scheme.is_allowed() {
            return Err(CodecError::InvalidProtectionScheme(scheme as u8));
        }

        let sender_bytes = r.read_bytes(8)?;
        let mut sender_id = [0u8; 8];
        sender_id.copy_from_slice(sender_bytes);
        let nonce = r.read_u32()?;

        let key_material = read_optional_field(&mut r, key_material_len)?;
        let counter = read_optional_field(&mut r, counter_len)?;

        let encapsulated_len = r
            .remaining()
            .checked_sub(auth_tag_len)
            .ok_or(CodecError::InvalidIntegrityLayout("auth tag overruns frame"))?;
        if encapsulated_len < 2 {
            return Err(CodecError::InvalidIntegrityLayout(
                "encapsulated frame too small",
            ));
        }
        let encapsulated = r.read_bytes(encapsulated_len)?.to_vec();

        let auth_tag = r.read_rest().to_vec();
        if auth_tag.len() != auth_tag_len {
            return Err(CodecError::InvalidIntegrityLayout("auth tag length"));
        }

        Ok(Self {
            scheme,
            sender_id,
            nonce,
            key_material,
            counter,
            encapsulated,
            auth_tag,
        })
    }

    pub(crate) fn encode(&self) -> Result<BytesMut> {
        if !self.scheme.is_allowed() {
            return Err(CodecError::InvalidProtectionScheme(self.scheme as u8));
        }
        if self.encapsulated.len() < 2 {
            return Err(CodecError::InvalidIntegrityLayout(
                "encapsulated frame too small",
            ));
        }
        if self.auth_tag.len() > MAX_AUTH_TAG_LEN || self.auth_tag.len() % 4 != 0 {
            return Err(CodecError::InvalidIntegrityLayout("auth tag length"));
        }

        let key_material_len = optional_field_len(self.key_material);
        let counter_len = optional_field_len(self.counter);

        #[allow(clippy::cast_possible_truncation)]
        let flags = ((self.auth_tag.len() / 4) as u8) << 4
            | length_index(key_material_len) << 2
            | length_index(counter_len);

        let body_len = FIXED_BODY_LEN
            + key_material_len
            + counter_len
            + self.encapsulated.len()
            + self.auth_tag.len();

        write_frame(constants::INTEGRITY, body_len, |buf| {
            buf.put_u8(flags);
            buf.put_u8(self.scheme as u8);
            buf.put_slice(&self.sender_id);
            buf.put_u32(self.nonce);
            write_optional_field(buf, self.key_material, key_material_len);
            write_optional_field(buf, self.counter, counter_len);
            buf.put_slice(&self.encapsulated);
            buf.put_slice(&self.auth_tag);
        })
    }

    /// Decodes the wrapped frame.
    ///
    /// # Errors
    /// Any codec error from the inner frame.
    pub fn inner(&self) -> Result<Message> {
        Message::decode(&self.encapsulated)
    }
}
