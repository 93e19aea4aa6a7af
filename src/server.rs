use std::{
    io,
    io::ErrorKind::ConnectionReset,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::UdpSocket, task::JoinHandle};

use codec::packet::MAX_PACKET_SIZE;
use service::{Service, ServiceHandler};

use crate::config::Config;

/// A running server; dropping it (or calling [`Server::stop`]) tears
/// the receive loop and the housekeeping task down.
pub struct Server {
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// The address the listen socket actually bound, which matters
    /// when the configuration asked for an ephemeral port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Binds the listen socket and starts the receive loop and the
/// background housekeeping task.
pub async fn start<T>(config: &Config, service: &Service<T>) -> anyhow::Result<Server>
where
    T: ServiceHandler + Clone + 'static,
{
    let socket = UdpSocket::from_std(bind_socket(
        config.server.bind,
        config.server.socket_buffer,
    )?)?;
    let local_addr = socket.local_addr()?;

    let tasks = vec![
        tokio::spawn(recv_loop(Arc::new(socket), service.clone())),
        tokio::spawn(bk_task(
            service.clone(),
            Duration::from_secs(config.server.bk_task_interval),
            Duration::from_secs(config.server.dns_refresh_interval),
        )),
    ];

    log::info!("radius server listening: addr={}", local_addr);
    Ok(Server { local_addr, tasks })
}

/// udp socket process loop.
///
/// Each datagram is copied off the receive buffer and handed to its
/// own task; the authentication callback may block on external
/// storage and must never stall the socket.
async fn recv_loop<T>(socket: Arc<UdpSocket>, service: Service<T>)
where
    T: ServiceHandler + Clone + 'static,
{
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        // An ICMP error for a previously sent response surfaces here
        // as a connection reset; it concerns a peer, not the socket.
        let (size, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                if e.kind() == ConnectionReset {
                    continue;
                }

                log::error!("udp socket receive failed: err={}", e);
                break;
            }
        };

        log::trace!("udp socket receive: size={}, addr={:?}", size, source);

        let datagram = buf[..size].to_vec();
        let socket = socket.clone();
        let service = service.clone();
        tokio::spawn(async move {
            if let Some(response) = service.process(&datagram, source).await {
                match socket.send_to(&response, source).await {
                    Ok(_) => {
                        log::trace!("udp socket send: size={}, addr={:?}", response.len(), source)
                    }
                    Err(e) => {
                        if e.kind() != ConnectionReset {
                            log::error!("udp socket send failed: addr={}, err={}", source, e);
                        }
                    }
                }
            }
        });
    }
}

/// Background housekeeping.
///
/// Ticks at the configured interval and re-resolves host-name device
/// entries whenever the DNS refresh period has elapsed; the first
/// resolution runs immediately so named devices work as soon as the
/// server is up.
async fn bk_task<T>(service: Service<T>, tick: Duration, dns_period: Duration)
where
    T: ServiceHandler + Clone + 'static,
{
    let mut ticker = tokio::time::interval(tick);
    let mut refreshed: Option<Instant> = None;

    loop {
        ticker.tick().await;

        if refreshed.is_some_and(|at| at.elapsed() < dns_period) {
            continue;
        }

        refreshed = Some(Instant::now());

        let nas = service.nas().clone();
        if let Err(e) = tokio::task::spawn_blocking(move || nas.refresh()).await {
            log::error!("nas refresh task failed: err={}", e);
        }
    }
}

fn bind_socket(bind: SocketAddr, buffer: usize) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_recv_buffer_size(buffer)?;
    socket.set_send_buffer_size(buffer)?;
    socket.set_nonblocking(true)?;
    socket.bind(&bind.into())?;
    Ok(socket.into())
}
