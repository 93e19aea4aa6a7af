//! ## Remote Authentication Dial In User Service (RADIUS)
//!
//! [RFC2865]: https://tools.ietf.org/html/rfc2865
//!
//! RADIUS carries authentication requests from a Network Access Server
//! (NAS) to an authentication server, and the matching accept or
//! reject back again, over connectionless UDP datagrams.  A request
//! and its response are correlated by an 8-bit identifier and bound
//! together by a 16-byte authenticator and a shared secret that never
//! appears on the wire.  This crate implements the wire format of
//! [RFC2865]: the packet header, the attribute TLV list, the MD5-based
//! User-Password obfuscation of section 5.2 and the response
//! authenticator of section 3, plus the `user@realm` / `realm/user`
//! username conventions used to route accounts to administrative
//! realms.

pub mod attributes;
pub mod crypto;
pub mod packet;
pub mod realm;

use std::{array::TryFromSliceError, str::Utf8Error};

#[derive(Debug)]
pub enum Error {
    InvalidInput,
    PacketTooShort,
    PacketTooLong,
    LengthMismatch,
    UnknownCode,
    BadAttribute,
    BadPasswordBlock,
    Utf8Error(Utf8Error),
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}
