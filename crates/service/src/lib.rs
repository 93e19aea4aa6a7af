//! Server-side RADIUS authentication service.
//!
//! [`Service`] turns raw datagrams into authentication decisions: it
//! parses the request, resolves the sending device to its shared
//! secret, recovers the user password, asks the [`ServiceHandler`]
//! whether the credentials are valid and produces the sealed
//! Access-Accept or Access-Reject to send back.  The transport that
//! feeds it is someone else's problem, which keeps the whole exchange
//! testable without a socket.

pub mod accounts;
pub mod events;
pub mod nas;

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use bytes::BytesMut;

use codec::{
    attributes::{USER_NAME, USER_PASSWORD},
    crypto::{decrypt_password, seal_response},
    packet::{Code, Packet},
    realm::{RealmFormat, split_username},
};

use crate::{
    events::{EntryKind, LogEntry},
    nas::NasRegistry,
};

#[derive(Debug)]
pub enum Error {
    /// A NAS entry needs a static address or a host name.
    EmptyNasEntry,
    /// An `address;secret` device specification could not be parsed.
    BadDeviceSpec(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Validate a set of user credentials.
    ///
    /// The realm and account arrive already split out of the
    /// qualified username and the password already recovered from its
    /// wire obfuscation.  The call may block on external storage; the
    /// dispatcher runs it on a worker so the receive path never
    /// stalls on it.
    async fn authenticate(&self, realm: &str, account: &str, password: &str) -> bool;

    /// Structured event sink.
    ///
    /// Called from multiple tasks; implementations must be
    /// thread-safe and should not block.
    #[allow(unused_variables)]
    fn on_event(&self, entry: &LogEntry) {}
}

pub struct ServiceOptions<T> {
    pub realm_format: RealmFormat,
    pub nas: NasRegistry,
    pub handler: T,
}

/// RADIUS authentication service.
#[derive(Clone)]
pub struct Service<T> {
    nas: Arc<NasRegistry>,
    realm_format: RealmFormat,
    handler: T,
}

impl<T> Service<T>
where
    T: ServiceHandler + Clone + 'static,
{
    pub fn new(options: ServiceOptions<T>) -> Self {
        Self {
            nas: Arc::new(options.nas),
            realm_format: options.realm_format,
            handler: options.handler,
        }
    }

    pub fn nas(&self) -> &Arc<NasRegistry> {
        &self.nas
    }

    pub fn handler(&self) -> &T {
        &self.handler
    }

    /// Processes one received datagram and returns the response bytes
    /// to send back to the source, if any.
    ///
    /// Anything that fails before a device secret is known is dropped
    /// without a response: an unknown device must not learn anything,
    /// and a malformed datagram has no identifier worth answering.
    /// Once the request is readable, bad credentials produce a
    /// regular Access-Reject.
    pub async fn process(&self, bytes: &[u8], source: SocketAddr) -> Option<Vec<u8>> {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                self.emit(
                    LogEntry::new(EntryKind::MalformedPacket, false, source)
                        .with_detail(format!("dropped {} byte datagram: {}", bytes.len(), e)),
                );
                return None;
            }
        };

        if packet.code != Code::AccessRequest {
            self.emit(
                LogEntry::new(EntryKind::MalformedPacket, false, source)
                    .with_detail(format!("unexpected code {:?}", packet.code)),
            );
            return None;
        }

        let Some(secret) = self.nas.lookup(source.ip()) else {
            self.emit(
                LogEntry::new(EntryKind::UnknownNas, false, source)
                    .with_detail("no device entry for source"),
            );
            return None;
        };

        // From here on the request is answerable; everything that
        // goes wrong is a reject, not a silent drop.
        let username = packet.attributes.get_text(USER_NAME);
        let hidden = packet.attributes.get(USER_PASSWORD);

        let (realm, account) = split_username(username.unwrap_or(""), self.realm_format);

        let (success, detail) = match (username, hidden) {
            (Some(_), Some(hidden)) => {
                match decrypt_password(hidden, &secret, &packet.authenticator) {
                    Ok(password) => match self.invoke(realm, account, password).await {
                        Ok(success) => (success, ""),
                        Err(_) => (false, "authentication callback panicked"),
                    },
                    // A wrong shared secret decrypts to garbage; the
                    // datagram itself was fine, so answer with a
                    // reject rather than staying silent.
                    Err(_) => (false, "password did not decrypt"),
                }
            }
            _ => (false, "missing user credentials"),
        };

        let response = self.respond(&packet, success, &secret, source)?;

        self.emit(
            LogEntry::new(EntryKind::Authentication, success, source)
                .with_user(realm, account)
                .with_detail(detail),
        );

        Some(response)
    }

    /// Runs the authentication callback on its own task.
    ///
    /// A handler that panics must not tear down the dispatch task
    /// with no response sent; the join error funnels into the same
    /// reject path as failed credentials.
    async fn invoke(
        &self,
        realm: &str,
        account: &str,
        password: String,
    ) -> Result<bool, tokio::task::JoinError> {
        let handler = self.handler.clone();
        let realm = realm.to_string();
        let account = account.to_string();

        tokio::spawn(async move { handler.authenticate(&realm, &account, &password).await }).await
    }

    fn respond(
        &self,
        request: &Packet,
        success: bool,
        secret: &str,
        source: SocketAddr,
    ) -> Option<Vec<u8>> {
        let code = if success {
            Code::AccessAccept
        } else {
            Code::AccessReject
        };

        let response = Packet::new(code, request.identifier, request.authenticator);
        let mut bytes = BytesMut::with_capacity(64);
        if let Err(e) = response.encode(&mut bytes) {
            self.emit(
                LogEntry::new(EntryKind::Internal, false, source)
                    .with_detail(format!("response encode failed: {}", e)),
            );
            return None;
        }

        seal_response(&mut bytes, &request.authenticator, secret);
        Some(bytes.to_vec())
    }

    fn emit(&self, entry: LogEntry) {
        self.handler.on_event(&entry);
    }
}
