//! RADIUS client transport pool.
//!
//! A [`Client`] spreads authentication requests over a pool of UDP
//! sockets, each with its own 8-bit identifier space, and over an
//! ordered list of upstream servers.  Requests that go unanswered are
//! re-sent byte for byte to the next server in the rotation until the
//! transmission budget runs out; responses are verified against the
//! recorded request authenticator before they resolve the caller.
//!
//! ```no_run
//! use radius_client::{Client, ClientOptions};
//!
//! # async fn example() -> Result<(), radius_client::ClientError> {
//! let client = Client::open(ClientOptions {
//!     servers: vec!["192.168.1.1:1812".parse().unwrap()],
//!     secret: "xyzzy5461".to_string(),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let status = client.authenticate("r1", "jeff", "open-sesame").await?;
//! println!("authenticated: {:?}", status);
//!
//! client.close();
//! # Ok(())
//! # }
//! ```

mod pending;

use std::{
    io,
    io::ErrorKind::ConnectionReset,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::BytesMut;
use parking_lot::Mutex;
use rand::RngCore;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::UdpSocket, sync::oneshot, task::JoinHandle, time};

use codec::{
    attributes::{NAS_IP_ADDRESS, NAS_PORT, USER_NAME, USER_PASSWORD},
    crypto::{encrypt_password, verify_response},
    packet::{Code, MAX_PACKET_SIZE, Packet},
    realm::{RealmFormat, join_username},
};

use crate::pending::{Completion, PendingRequest, PendingTable};

/// Outcome of a completed authentication exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Accept,
    Reject,
}

#[derive(Debug)]
pub enum ClientError {
    /// Caller-supplied data failed a precondition.
    InvalidInput(&'static str),
    /// Every identifier slot on every socket is in use.  Surfaced
    /// immediately so callers can tell contention from a network
    /// timeout.
    Exhausted,
    /// No acceptable response after the full failover rotation.
    Timeout,
    /// The client was closed while the request was pending.
    Cancelled,
    /// The client is already closed.
    Closed,
    Io(io::Error),
}

impl std::error::Error for ClientError {}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Ordered upstream server list; new requests rotate through it
    /// and retransmissions fail over along it.
    pub servers: Vec<SocketAddr>,
    /// The shared secret, applied to every server in the list.
    pub secret: String,
    /// Local bind endpoint; port 0 lets the OS pick a distinct source
    /// port per socket.
    pub bind: SocketAddr,
    /// Number of parallel sockets, each with its own 256-entry
    /// identifier space.
    pub port_count: usize,
    /// Total send attempts per request, including the first.
    pub max_transmissions: usize,
    /// Wait between attempts; also the tail wait before a request
    /// times out.
    pub retry_interval: Duration,
    /// Tick period of the retry/timeout sweep.  Must not exceed
    /// `retry_interval`, it is the sampling resolution of that timer.
    pub sweep_interval: Duration,
    pub realm_format: RealmFormat,
    /// SO_RCVBUF / SO_SNDBUF size for each socket.
    pub socket_buffer: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            secret: String::new(),
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            port_count: 4,
            max_transmissions: 4,
            retry_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(1),
            realm_format: RealmFormat::Email,
            socket_buffer: 32768,
        }
    }
}

struct Port {
    socket: Arc<UdpSocket>,
    table: Mutex<PendingTable>,
    local: SocketAddr,
}

struct ClientInner {
    options: ClientOptions,
    ports: Vec<Port>,
    next_port: AtomicUsize,
    next_server: AtomicUsize,
    closed: AtomicBool,
}

/// RADIUS authentication client.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
/// Dropping the client closes it.
pub struct Client {
    inner: Arc<ClientInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Binds the socket pool and starts the receive and sweep tasks.
    pub async fn open(options: ClientOptions) -> Result<Self, ClientError> {
        if options.servers.is_empty() {
            return Err(ClientError::InvalidInput("server list is empty"));
        }

        if options.port_count == 0 {
            return Err(ClientError::InvalidInput("port count must be at least 1"));
        }

        if options.max_transmissions == 0 {
            return Err(ClientError::InvalidInput(
                "max transmissions must be at least 1",
            ));
        }

        if options.sweep_interval.is_zero() || options.sweep_interval > options.retry_interval {
            return Err(ClientError::InvalidInput(
                "sweep interval must be nonzero and no longer than the retry interval",
            ));
        }

        let mut ports = Vec::with_capacity(options.port_count);
        for _ in 0..options.port_count {
            let socket = UdpSocket::from_std(bind_socket(options.bind, options.socket_buffer)?)?;
            let local = socket.local_addr()?;
            ports.push(Port {
                socket: Arc::new(socket),
                table: Mutex::new(PendingTable::default()),
                local,
            });
        }

        let inner = Arc::new(ClientInner {
            options,
            ports,
            next_port: AtomicUsize::new(0),
            next_server: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });

        let mut tasks = Vec::with_capacity(inner.ports.len() + 1);
        for index in 0..inner.ports.len() {
            tasks.push(tokio::spawn(recv_loop(inner.clone(), index)));
        }

        tasks.push(tokio::spawn(sweep_loop(inner.clone())));

        Ok(Self {
            inner,
            tasks: Mutex::new(tasks),
        })
    }

    /// Authenticates one set of credentials against the server pool.
    ///
    /// The identifier slot is claimed, the request encoded and the
    /// first transmission sent before the first await on the
    /// response, so [`ClientError::Exhausted`] and
    /// [`ClientError::InvalidInput`] surface without touching the
    /// retry machinery.
    pub async fn authenticate(
        &self,
        realm: &str,
        account: &str,
        password: &str,
    ) -> Result<AuthStatus, ClientError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }

        let username = join_username(realm, account, inner.options.realm_format);

        let mut authenticator = [0u8; 16];
        rand::rng().fill_bytes(&mut authenticator);

        let hidden = encrypt_password(password, &inner.options.secret, &authenticator)
            .map_err(|_| ClientError::InvalidInput("password exceeds 128 bytes"))?;

        let first_server =
            inner.next_server.fetch_add(1, Ordering::Relaxed) % inner.options.servers.len();
        let start_port = inner.next_port.fetch_add(1, Ordering::Relaxed) % inner.ports.len();

        let (tx, rx) = oneshot::channel();
        let mut completion = Some(tx);
        let mut claimed = None;

        // Round-robin over the pool, spilling to the next socket when
        // one identifier space is full.
        for offset in 0..inner.ports.len() {
            let index = (start_port + offset) % inner.ports.len();
            let port = &inner.ports[index];

            let mut datagram =
                encode_request(port.local, &username, hidden.clone(), authenticator)?;

            let mut table = port.table.lock();
            if let Some(id) = table.reserve() {
                // The identifier is only known now; it lives in the
                // header, outside everything the authenticator binds.
                datagram[1] = id;
                table.occupy(
                    id,
                    PendingRequest {
                        first_server,
                        sent: 1,
                        attempts_remaining: inner.options.max_transmissions - 1,
                        next_send_at: Instant::now() + inner.options.retry_interval,
                        authenticator,
                        datagram: datagram.clone(),
                        completion: completion.take().unwrap(),
                    },
                );

                claimed = Some((index, id, datagram));
                break;
            }
        }

        let Some((index, id, datagram)) = claimed else {
            return Err(ClientError::Exhausted);
        };

        let port = &inner.ports[index];
        let target = inner.options.servers[first_server];
        if let Err(e) = port.socket.send_to(&datagram, target).await {
            // Leave the entry in place; the sweep retries it against
            // the next server.
            log::warn!("request send failed: target={}, err={}", target, e);
        } else {
            log::trace!(
                "request sent: target={}, socket={}, id={}",
                target,
                index,
                id
            );
        }

        match rx.await {
            Ok(Completion::Accept) => Ok(AuthStatus::Accept),
            Ok(Completion::Reject) => Ok(AuthStatus::Reject),
            Ok(Completion::Timeout) => Err(ClientError::Timeout),
            Ok(Completion::Cancelled) | Err(_) => Err(ClientError::Cancelled),
        }
    }

    /// Number of requests currently in flight, across all sockets.
    pub fn in_flight(&self) -> usize {
        self.inner
            .ports
            .iter()
            .map(|port| port.table.lock().in_use())
            .sum()
    }

    /// Resolves every pending request with `Cancelled`, stops the
    /// background tasks and closes the sockets.  Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        for port in &self.inner.ports {
            let drained = port.table.lock().drain();
            for request in drained {
                let _ = request.completion.send(Completion::Cancelled);
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl ClientInner {
    /// Correlates one received datagram with its pending request.
    ///
    /// Never awaits, so holding the table lock here is fine.
    fn handle_response(&self, index: usize, bytes: &[u8], source: SocketAddr) {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                log::trace!("malformed response dropped: source={}, err={}", source, e);
                return;
            }
        };

        let port = &self.ports[index];
        let mut table = port.table.lock();
        let Some(request) = table.get_mut(packet.identifier) else {
            return;
        };

        // Only servers this request was actually sent to may answer
        // it.
        let servers = &self.options.servers;
        let answered = (0..request.sent)
            .any(|i| servers[(request.first_server + i) % servers.len()] == source);
        if !answered {
            return;
        }

        if !verify_response(bytes, &request.authenticator, &self.options.secret) {
            // Not necessarily fatal for the request; a retransmission
            // can still be answered correctly.
            log::warn!(
                "response authenticator mismatch: source={}, id={}",
                source,
                packet.identifier
            );
            return;
        }

        let completion = match packet.code {
            Code::AccessAccept => Completion::Accept,
            Code::AccessReject => Completion::Reject,
            _ => return,
        };

        if let Some(request) = table.take(packet.identifier) {
            drop(table);
            let _ = request.completion.send(completion);
        }
    }

    /// One pass of the retry/timeout sweep.
    ///
    /// Table locks are released before any datagram is re-sent; the
    /// sends are returned to the caller instead.
    fn sweep(&self) -> Vec<(usize, Vec<u8>, SocketAddr)> {
        let now = Instant::now();
        let servers = &self.options.servers;
        let mut sends = Vec::new();

        for (index, port) in self.ports.iter().enumerate() {
            let mut expired = Vec::new();

            {
                let mut table = port.table.lock();
                for id in 0..=255u8 {
                    let retry = match table.get_mut(id) {
                        Some(request) if request.next_send_at <= now => {
                            if request.attempts_remaining == 0 {
                                None
                            } else {
                                request.attempts_remaining -= 1;
                                let target =
                                    servers[(request.first_server + request.sent) % servers.len()];
                                request.sent += 1;
                                request.next_send_at = now + self.options.retry_interval;
                                Some((request.datagram.clone(), target))
                            }
                        }
                        _ => continue,
                    };

                    match retry {
                        Some((datagram, target)) => sends.push((index, datagram, target)),
                        None => {
                            if let Some(request) = table.take(id) {
                                expired.push(request);
                            }
                        }
                    }
                }
            }

            for request in expired {
                let _ = request.completion.send(Completion::Timeout);
            }
        }

        sends
    }
}

async fn recv_loop(inner: Arc<ClientInner>, index: usize) {
    let socket = inner.ports[index].socket.clone();
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        let (size, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // A previous send to a dead endpoint can surface here
                // as a connection reset; the pending request is still
                // live and will be retried.
                if e.kind() == ConnectionReset {
                    continue;
                }

                log::error!("udp socket receive failed: socket={}, err={}", index, e);
                break;
            }
        };

        log::trace!(
            "udp socket receive: size={}, addr={:?}, socket={}",
            size,
            source,
            index
        );

        inner.handle_response(index, &buf[..size], source);
    }
}

async fn sweep_loop(inner: Arc<ClientInner>) {
    let mut ticker = time::interval(inner.options.sweep_interval);

    loop {
        ticker.tick().await;

        for (index, datagram, target) in inner.sweep() {
            if let Err(e) = inner.ports[index].socket.send_to(&datagram, target).await {
                log::warn!("retransmit failed: target={}, err={}", target, e);
            } else {
                log::trace!("retransmit sent: target={}, socket={}", target, index);
            }
        }
    }
}

fn encode_request(
    local: SocketAddr,
    username: &str,
    hidden: Vec<u8>,
    authenticator: [u8; 16],
) -> Result<Vec<u8>, ClientError> {
    let mut packet = Packet::new(Code::AccessRequest, 0, authenticator);
    packet.attributes.append_text(USER_NAME, username);
    packet.attributes.append(USER_PASSWORD, hidden);

    if let IpAddr::V4(ip) = local.ip() {
        packet.attributes.append_ipv4(NAS_IP_ADDRESS, ip);
    }

    packet.attributes.append_u32(NAS_PORT, local.port() as u32);

    let mut bytes = BytesMut::with_capacity(128);
    packet
        .encode(&mut bytes)
        .map_err(|_| ClientError::InvalidInput("request does not fit a datagram"))?;

    Ok(bytes.to_vec())
}

fn bind_socket(bind: SocketAddr, buffer: usize) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_recv_buffer_size(buffer)?;
    socket.set_send_buffer_size(buffer)?;
    socket.set_nonblocking(true)?;
    socket.bind(&bind.into())?;
    Ok(socket.into())
}
