use std::net::Ipv4Addr;

/// User-Name, UTF-8 with no terminator.
pub const USER_NAME: u8 = 1;

/// User-Password, obfuscated per RFC 2865 section 5.2.
pub const USER_PASSWORD: u8 = 2;

/// NAS-IP-Address, 4 bytes big-endian.
pub const NAS_IP_ADDRESS: u8 = 4;

/// NAS-Port, 32-bit big-endian unsigned integer.
pub const NAS_PORT: u8 = 5;

/// Service-Type, 32-bit big-endian unsigned integer.
pub const SERVICE_TYPE: u8 = 6;

/// Login-IP-Host, 4 bytes big-endian.
pub const LOGIN_IP_HOST: u8 = 14;

/// Login-Service, 32-bit big-endian unsigned integer.
pub const LOGIN_SERVICE: u8 = 15;

/// The longest value a single attribute can carry, 255 bytes of TLV
/// minus the two header bytes.
pub const MAX_VALUE_SIZE: usize = 253;

/// An ordered list of attribute TLVs.
///
/// Attributes keep their wire order, and a type may occur more than
/// once.  Values are owned byte sequences so that a decoded packet can
/// outlive the receive buffer it was parsed from; types the decoder
/// does not know are preserved untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(u8, Vec<u8>)>);

impl Attributes {
    /// Adds a raw attribute to the end of the list.
    pub fn append(&mut self, kind: u8, value: Vec<u8>) {
        self.0.push((kind, value));
    }

    /// Adds a UTF-8 text attribute, no terminator.
    pub fn append_text(&mut self, kind: u8, value: &str) {
        self.append(kind, value.as_bytes().to_vec());
    }

    /// Adds a 32-bit big-endian integer attribute.
    pub fn append_u32(&mut self, kind: u8, value: u32) {
        self.append(kind, value.to_be_bytes().to_vec());
    }

    /// Adds an IPv4 address attribute, 4 bytes big-endian.
    pub fn append_ipv4(&mut self, kind: u8, value: Ipv4Addr) {
        self.append(kind, value.octets().to_vec());
    }

    /// Gets an attribute value from the list.
    ///
    /// Note: This function will only look for the first matching
    /// attribute in the list and return it.
    pub fn get(&self, kind: u8) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_slice())
    }

    /// Gets the first matching attribute as UTF-8 text.
    pub fn get_text(&self, kind: u8) -> Option<&str> {
        std::str::from_utf8(self.get(kind)?).ok()
    }

    /// Gets the first matching attribute as a 32-bit big-endian
    /// integer.
    pub fn get_u32(&self, kind: u8) -> Option<u32> {
        Some(u32::from_be_bytes(self.get(kind)?.try_into().ok()?))
    }

    /// Gets the first matching attribute as an IPv4 address.
    pub fn get_ipv4(&self, kind: u8) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = self.get(kind)?.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire size of the attribute list, two header bytes per TLV.
    pub fn wire_size(&self) -> usize {
        self.0.iter().map(|(_, v)| 2 + v.len()).sum()
    }
}
