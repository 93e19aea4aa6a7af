use md5::{Digest, Md5};

use crate::Error;

/// Obfuscated User-Password values are padded to a whole number of
/// MD5 blocks and capped at 128 bytes on the wire.
pub const MAX_PASSWORD_SIZE: usize = 128;

const BLOCK_SIZE: usize = 16;

/// Obfuscates a user password per RFC 2865 section 5.2.
///
/// The password is zero-padded to a multiple of 16 bytes (at least
/// one block) and XORed block by block against the MD5 key stream
/// `b[0] = MD5(secret || authenticator)`,
/// `b[i] = MD5(secret || c[i-1])` where `c[i]` is the previous
/// ciphertext block.  Passwords longer than 128 UTF-8 bytes cannot be
/// carried and fail up front.
///
/// # Test
///
/// ```
/// let authenticator = [
///     0x0fu8, 0x40, 0x3f, 0x94, 0x73, 0x97, 0x80, 0x57, 0xbd, 0x83,
///     0xd5, 0xcb, 0x98, 0xf4, 0x22, 0x7a,
/// ];
///
/// let hidden = radius_codec::crypto::encrypt_password(
///     "arctangent",
///     "xyzzy5461",
///     &authenticator,
/// )
/// .unwrap();
///
/// assert_eq!(
///     hidden,
///     [
///         0x0du8, 0xbe, 0x70, 0x8d, 0x93, 0xd4, 0x13, 0xce, 0x31, 0x96,
///         0xe4, 0x3f, 0x78, 0x2a, 0x0a, 0xee,
///     ]
/// );
/// ```
pub fn encrypt_password(
    password: &str,
    secret: &str,
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, Error> {
    let data = password.as_bytes();
    if data.len() > MAX_PASSWORD_SIZE {
        return Err(Error::InvalidInput);
    }

    let blocks = (data.len() / BLOCK_SIZE + usize::from(data.len() % BLOCK_SIZE != 0)).max(1);
    let mut buf = vec![0u8; blocks * BLOCK_SIZE];
    buf[..data.len()].copy_from_slice(data);

    let mut prev = *authenticator;
    for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
        let key = key_block(secret, &prev);
        for (byte, key) in chunk.iter_mut().zip(key) {
            *byte ^= key;
        }

        prev.copy_from_slice(chunk);
    }

    Ok(buf)
}

/// Recovers the plaintext password from an obfuscated User-Password
/// value, stripping the zero padding.
///
/// The value must be a nonzero multiple of 16 bytes no longer than
/// 128; anything else was mangled in transit.  A wrong shared secret
/// surfaces as garbage plaintext, which usually fails the UTF-8
/// check here and always fails credential validation.
pub fn decrypt_password(
    hidden: &[u8],
    secret: &str,
    authenticator: &[u8; 16],
) -> Result<String, Error> {
    if hidden.is_empty() || hidden.len() % BLOCK_SIZE != 0 || hidden.len() > MAX_PASSWORD_SIZE {
        return Err(Error::BadPasswordBlock);
    }

    let mut buf = hidden.to_vec();
    let mut prev = *authenticator;
    for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
        let key = key_block(secret, &prev);

        // The key for the next block is chained off the ciphertext,
        // so record it before XORing in place.
        prev.copy_from_slice(chunk);
        for (byte, key) in chunk.iter_mut().zip(key) {
            *byte ^= key;
        }
    }

    while buf.last() == Some(&0) {
        buf.pop();
    }

    String::from_utf8(buf).map_err(|e| Error::Utf8Error(e.utf8_error()))
}

/// Computes the response authenticator of RFC 2865 section 3 and
/// writes it into the authenticator slot of a serialized response.
///
/// The hash covers the response bytes with the *request*
/// authenticator occupying the authenticator slot, followed by the
/// shared secret; the digest then overwrites the slot.
pub fn seal_response(bytes: &mut [u8], request_authenticator: &[u8; 16], secret: &str) {
    bytes[4..20].copy_from_slice(request_authenticator);
    let digest = response_digest(bytes, secret);
    bytes[4..20].copy_from_slice(&digest);
}

/// Verifies the response authenticator of a received response against
/// the request authenticator recorded when the request was sent.
///
/// # Test
///
/// ```
/// let request_authenticator = [
///     0x0fu8, 0x40, 0x3f, 0x94, 0x73, 0x97, 0x80, 0x57, 0xbd, 0x83,
///     0xd5, 0xcb, 0x98, 0xf4, 0x22, 0x7a,
/// ];
///
/// let response = [
///     0x02u8, 0x00, 0x00, 0x26, 0x86, 0xfe, 0x22, 0x0e, 0x76, 0x24,
///     0xba, 0x2a, 0x10, 0x05, 0xf6, 0xbf, 0x9b, 0x55, 0xe0, 0xb2,
///     0x06, 0x06, 0x00, 0x00, 0x00, 0x01, 0x0f, 0x06, 0x00, 0x00,
///     0x00, 0x00, 0x0e, 0x06, 0xc0, 0xa8, 0x01, 0x03,
/// ];
///
/// assert!(radius_codec::crypto::verify_response(
///     &response,
///     &request_authenticator,
///     "xyzzy5461",
/// ));
/// ```
pub fn verify_response(bytes: &[u8], request_authenticator: &[u8; 16], secret: &str) -> bool {
    if bytes.len() < 20 {
        return false;
    }

    let mut copy = bytes.to_vec();
    copy[4..20].copy_from_slice(request_authenticator);
    response_digest(&copy, secret).as_slice() == &bytes[4..20]
}

fn response_digest(bytes: &[u8], secret: &str) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

fn key_block(secret: &str, chain: &[u8; 16]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    hasher.update(chain);
    hasher.finalize().into()
}
