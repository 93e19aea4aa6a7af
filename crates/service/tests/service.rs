use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::BytesMut;

use codec::{
    attributes::{USER_NAME, USER_PASSWORD},
    crypto::{encrypt_password, verify_response},
    packet::{Code, Packet},
    realm::RealmFormat,
};
use radius_service::{
    Service, ServiceHandler, ServiceOptions,
    accounts::AccountStore,
    events::{EntryKind, LogEntry},
    nas::{NasEntry, NasRegistry},
};

const SECRET: &str = "shared-secret";

#[derive(Clone, Default)]
struct Handler {
    events: Arc<Mutex<Vec<LogEntry>>>,
}

#[async_trait]
impl ServiceHandler for Handler {
    async fn authenticate(&self, realm: &str, account: &str, password: &str) -> bool {
        realm == "r1" && account == "jeff" && password == "open-sesame"
    }

    fn on_event(&self, entry: &LogEntry) {
        self.events.lock().unwrap().push(entry.clone());
    }
}

fn make_service(default_secret: Option<&str>) -> (Service<Handler>, Handler) {
    let nas = NasRegistry::new(default_secret.map(str::to_string));
    nas.register(NasEntry::parse(&format!("127.0.0.1;{}", SECRET)).unwrap())
        .unwrap();

    let handler = Handler::default();
    let service = Service::new(ServiceOptions {
        realm_format: RealmFormat::Email,
        nas,
        handler: handler.clone(),
    });

    (service, handler)
}

fn make_request(identifier: u8, username: &str, password: &str, secret: &str) -> ([u8; 16], Vec<u8>) {
    let authenticator = [0x42u8; 16];
    let mut packet = Packet::new(Code::AccessRequest, identifier, authenticator);
    packet.attributes.append_text(USER_NAME, username);
    packet.attributes.append(
        USER_PASSWORD,
        encrypt_password(password, secret, &authenticator).unwrap(),
    );

    let mut bytes = BytesMut::new();
    packet.encode(&mut bytes).unwrap();
    (authenticator, bytes.to_vec())
}

fn source() -> SocketAddr {
    "127.0.0.1:49152".parse().unwrap()
}

#[tokio::test]
async fn accepts_valid_credentials() {
    let (service, handler) = make_service(None);
    let (authenticator, request) = make_request(0x17, "jeff@r1", "open-sesame", SECRET);

    let response = service.process(&request, source()).await.unwrap();
    let packet = Packet::decode(&response).unwrap();

    assert_eq!(packet.code, Code::AccessAccept);
    assert_eq!(packet.identifier, 0x17);
    assert!(packet.attributes.is_empty());
    assert!(verify_response(&response, &authenticator, SECRET));

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EntryKind::Authentication);
    assert!(events[0].success);
    assert_eq!(events[0].realm, "r1");
    assert_eq!(events[0].account, "jeff");
}

#[tokio::test]
async fn rejects_bad_password() {
    let (service, handler) = make_service(None);
    let (authenticator, request) = make_request(3, "jeff@r1", "wrong", SECRET);

    let response = service.process(&request, source()).await.unwrap();
    let packet = Packet::decode(&response).unwrap();

    assert_eq!(packet.code, Code::AccessReject);
    assert!(verify_response(&response, &authenticator, SECRET));

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
}

#[tokio::test]
async fn rejects_missing_credentials() {
    let (service, handler) = make_service(None);

    let mut packet = Packet::new(Code::AccessRequest, 9, [0x42u8; 16]);
    packet.attributes.append_text(USER_NAME, "jeff@r1");
    let mut bytes = BytesMut::new();
    packet.encode(&mut bytes).unwrap();

    let response = service.process(&bytes, source()).await.unwrap();
    assert_eq!(Packet::decode(&response).unwrap().code, Code::AccessReject);

    let events = handler.events.lock().unwrap();
    assert_eq!(events[0].detail, "missing user credentials");
}

#[tokio::test]
async fn rejects_password_under_wrong_secret() {
    let (service, handler) = make_service(None);
    let (_, request) = make_request(4, "jeff@r1", "open-sesame", "not-the-secret");

    let response = service.process(&request, source()).await.unwrap();
    assert_eq!(Packet::decode(&response).unwrap().code, Code::AccessReject);

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
}

#[derive(Clone, Default)]
struct Panicking {
    events: Arc<Mutex<Vec<LogEntry>>>,
}

#[async_trait]
impl ServiceHandler for Panicking {
    async fn authenticate(&self, _realm: &str, _account: &str, _password: &str) -> bool {
        panic!("credential backend exploded");
    }

    fn on_event(&self, entry: &LogEntry) {
        self.events.lock().unwrap().push(entry.clone());
    }
}

#[tokio::test]
async fn panicking_callback_rejects() {
    let nas = NasRegistry::new(None);
    nas.register(NasEntry::parse(&format!("127.0.0.1;{}", SECRET)).unwrap())
        .unwrap();

    let handler = Panicking::default();
    let service = Service::new(ServiceOptions {
        realm_format: RealmFormat::Email,
        nas,
        handler: handler.clone(),
    });

    let (authenticator, request) = make_request(5, "jeff@r1", "open-sesame", SECRET);
    let response = service.process(&request, source()).await.unwrap();
    let packet = Packet::decode(&response).unwrap();

    assert_eq!(packet.code, Code::AccessReject);
    assert!(verify_response(&response, &authenticator, SECRET));

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EntryKind::Authentication);
    assert!(!events[0].success);
    assert_eq!(events[0].detail, "authentication callback panicked");
}

#[tokio::test]
async fn drops_unknown_nas_without_response() {
    let (service, handler) = make_service(None);
    let (_, request) = make_request(1, "jeff@r1", "open-sesame", SECRET);

    let stranger: SocketAddr = "10.9.8.7:1000".parse().unwrap();
    assert!(service.process(&request, stranger).await.is_none());

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EntryKind::UnknownNas);
    assert!(!events[0].success);
}

#[tokio::test]
async fn default_secret_covers_unknown_nas() {
    let (service, _) = make_service(Some(SECRET));
    let (_, request) = make_request(1, "jeff@r1", "open-sesame", SECRET);

    let stranger: SocketAddr = "10.9.8.7:1000".parse().unwrap();
    let response = service.process(&request, stranger).await.unwrap();
    assert_eq!(Packet::decode(&response).unwrap().code, Code::AccessAccept);
}

#[tokio::test]
async fn drops_malformed_datagram() {
    let (service, handler) = make_service(None);

    assert!(service.process(&[0x01, 0x00, 0x00], source()).await.is_none());

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EntryKind::MalformedPacket);
}

#[tokio::test]
async fn drops_non_request_codes() {
    let (service, handler) = make_service(None);

    let packet = Packet::new(Code::AccessAccept, 0, [0u8; 16]);
    let mut bytes = BytesMut::new();
    packet.encode(&mut bytes).unwrap();

    assert!(service.process(&bytes, source()).await.is_none());
    assert_eq!(
        handler.events.lock().unwrap()[0].kind,
        EntryKind::MalformedPacket
    );
}

#[test]
fn device_spec_parsing() {
    let fixed = NasEntry::parse("192.168.1.1;s3cr3t").unwrap();
    assert_eq!(fixed.static_address, Some("192.168.1.1".parse().unwrap()));
    assert_eq!(fixed.host_name, None);
    assert_eq!(fixed.secret, "s3cr3t");

    let named = NasEntry::parse(" nas1.example.com ; s3cr3t ").unwrap();
    assert_eq!(named.static_address, None);
    assert_eq!(named.host_name.as_deref(), Some("nas1.example.com"));

    assert!(NasEntry::parse("no-secret").is_err());
    assert!(NasEntry::parse(";secret").is_err());
    assert!(NasEntry::parse("host;").is_err());
}

#[test]
fn first_matching_device_wins() {
    let nas = NasRegistry::new(None);
    nas.register(NasEntry::parse("10.0.0.1;first").unwrap()).unwrap();
    nas.register(NasEntry::parse("10.0.0.1;second").unwrap()).unwrap();

    assert_eq!(nas.lookup("10.0.0.1".parse().unwrap()).as_deref(), Some("first"));
    assert_eq!(nas.lookup("10.0.0.2".parse().unwrap()), None);
}

#[test]
fn localhost_refresh_resolves() {
    let nas = NasRegistry::new(None);
    nas.register(NasEntry::parse("localhost;loop-secret").unwrap())
        .unwrap();

    // Host-name entries only match once their names have been
    // resolved.
    assert_eq!(nas.lookup("127.0.0.1".parse().unwrap()), None);

    nas.refresh();
    assert_eq!(
        nas.lookup("127.0.0.1".parse().unwrap()).as_deref(),
        Some("loop-secret")
    );
}

#[test]
fn account_file_format() {
    let store = AccountStore::default();
    let count = store.load_from_text(
        "\n\
         // comment line\n\
         r1;jeff;foo\n\
         r1 ; jane ; with spaces \n\
         ;norealm;pw\n\
         broken-line\n\
         r2;dup;old\n\
         r2;dup;new\n",
    );

    assert_eq!(count, 5);
    assert_eq!(store.len(), 4);

    assert!(store.check("r1", "jeff", "foo"));
    assert!(store.check("R1", "JEFF", "foo"));
    assert!(!store.check("r1", "jeff", "bar"));
    assert!(store.check("r1", "jane", "with spaces"));
    assert!(store.check("", "norealm", "pw"));
    assert!(store.check("r2", "dup", "new"));
    assert_eq!(store.lookup("r3", "nobody"), None);
}
