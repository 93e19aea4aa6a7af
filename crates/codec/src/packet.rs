use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{Error, attributes::{Attributes, MAX_VALUE_SIZE}};

/// The largest datagram RFC 2865 permits.
pub const MAX_PACKET_SIZE: usize = 4096;

/// Size of the fixed packet header.
pub const HEADER_SIZE: usize = 20;

/// RADIUS packet codes used by the authentication core.
#[repr(u8)]
#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum Code {
    AccessRequest = 1,
    AccessAccept = 2,
    AccessReject = 3,
    AccessChallenge = 11,
}

/// A RADIUS datagram.
///
/// The layout is `code:u8 | identifier:u8 | length:u16-be |
/// authenticator:16 | attributes`.  For an Access-Request the
/// authenticator field carries the freshly generated random request
/// authenticator; for responses it carries the response authenticator
/// computed by [`crate::crypto::seal_response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: Code,
    pub identifier: u8,
    pub authenticator: [u8; 16],
    pub attributes: Attributes,
}

impl Packet {
    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Self {
            code,
            identifier,
            authenticator,
            attributes: Attributes::default(),
        }
    }

    /// Serializes the packet into `bytes`, replacing its contents.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use radius_codec::attributes::USER_NAME;
    /// use radius_codec::packet::{Code, Packet};
    ///
    /// let mut packet = Packet::new(Code::AccessRequest, 0x0f, [0u8; 16]);
    /// packet.attributes.append_text(USER_NAME, "nemo");
    ///
    /// let mut bytes = BytesMut::new();
    /// packet.encode(&mut bytes).unwrap();
    ///
    /// assert_eq!(bytes.len(), 26);
    /// assert_eq!(&bytes[..4], &[0x01, 0x0f, 0x00, 0x1a]);
    /// assert_eq!(&bytes[20..], &[0x01, 0x06, 0x6e, 0x65, 0x6d, 0x6f]);
    /// ```
    pub fn encode(&self, bytes: &mut BytesMut) -> Result<(), Error> {
        let size = HEADER_SIZE + self.attributes.wire_size();
        if size > MAX_PACKET_SIZE {
            return Err(Error::PacketTooLong);
        }

        bytes.clear();
        bytes.put_u8(self.code.into());
        bytes.put_u8(self.identifier);
        bytes.put_u16(size as u16);
        bytes.put(self.authenticator.as_slice());

        for (kind, value) in self.attributes.iter() {
            if value.len() > MAX_VALUE_SIZE {
                return Err(Error::BadAttribute);
            }

            bytes.put_u8(kind);
            bytes.put_u8((value.len() + 2) as u8);
            bytes.put(value);
        }

        Ok(())
    }

    /// Parses one datagram.
    ///
    /// The declared length must match the datagram length exactly and
    /// stay within [`MAX_PACKET_SIZE`]; attributes are parsed strictly
    /// and an attribute that overruns the buffer or declares a length
    /// below its own header rejects the whole datagram.  Attribute
    /// types the decoder does not know are preserved as raw bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let len = bytes.len();

        // There must be at least a complete header.
        if len < HEADER_SIZE {
            return Err(Error::PacketTooShort);
        }

        let code = Code::try_from(bytes[0]).map_err(|_| Error::UnknownCode)?;
        let identifier = bytes[1];

        let size = u16::from_be_bytes(bytes[2..4].try_into()?) as usize;
        if size != len || size > MAX_PACKET_SIZE {
            return Err(Error::LengthMismatch);
        }

        let authenticator: [u8; 16] = bytes[4..HEADER_SIZE].try_into()?;

        let mut attributes = Attributes::default();
        let mut offset = HEADER_SIZE;

        while offset < size {
            // Every attribute needs its two header bytes, and its
            // declared length covers them.
            if size - offset < 2 {
                return Err(Error::BadAttribute);
            }

            let kind = bytes[offset];
            let attribute_size = bytes[offset + 1] as usize;
            if attribute_size < 2 || attribute_size > size - offset {
                return Err(Error::BadAttribute);
            }

            attributes.append(kind, bytes[offset + 2..offset + attribute_size].to_vec());
            offset += attribute_size;
        }

        Ok(Self {
            code,
            identifier,
            authenticator,
            attributes,
        })
    }
}
