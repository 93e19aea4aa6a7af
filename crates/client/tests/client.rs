use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use bytes::BytesMut;
use tokio::net::UdpSocket;

use codec::{
    crypto::seal_response,
    packet::{Code, Packet},
};
use radius_client::{AuthStatus, Client, ClientError, ClientOptions};

const SECRET: &str = "xyzzy5461";

/// What the mock upstream does with each request.
#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    Accept,
    Reject,
    /// Swallow the first packet seen for each identifier, accept
    /// retransmissions.
    DropFirst,
    /// Never answer, but keep receiving.
    Hold,
    /// Answer with a response sealed under the wrong secret.
    WrongSecret,
}

/// Starts a scripted RADIUS upstream; every received `(identifier,
/// authenticator)` pair is recorded.
async fn upstream(
    behavior: Behavior,
    seen: Arc<Mutex<Vec<(u8, [u8; 16])>>>,
) -> Result<SocketAddr> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let address = socket.local_addr()?;

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let mut first_seen = HashSet::new();

        loop {
            let Ok((size, source)) = socket.recv_from(&mut buf).await else {
                break;
            };

            let Ok(request) = Packet::decode(&buf[..size]) else {
                continue;
            };

            seen.lock()
                .unwrap()
                .push((request.identifier, request.authenticator));

            let code = match behavior {
                Behavior::Hold => continue,
                Behavior::DropFirst if first_seen.insert(request.identifier) => continue,
                Behavior::Reject => Code::AccessReject,
                _ => Code::AccessAccept,
            };

            let response = Packet::new(code, request.identifier, request.authenticator);
            let mut bytes = BytesMut::new();
            response.encode(&mut bytes).unwrap();

            let secret = match behavior {
                Behavior::WrongSecret => "not-the-secret",
                _ => SECRET,
            };
            seal_response(&mut bytes, &request.authenticator, secret);

            if socket.send_to(&bytes, source).await.is_err() {
                break;
            }
        }
    });

    Ok(address)
}

fn options(servers: Vec<SocketAddr>) -> ClientOptions {
    ClientOptions {
        servers,
        secret: SECRET.to_string(),
        retry_interval: Duration::from_millis(200),
        sweep_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

#[tokio::test]
async fn accept_and_reject() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let good = upstream(Behavior::Accept, seen.clone()).await?;
    let client = Client::open(options(vec![good])).await?;

    assert_eq!(
        client.authenticate("r1", "jeff", "open-sesame").await?,
        AuthStatus::Accept
    );

    client.close();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let bad = upstream(Behavior::Reject, seen.clone()).await?;
    let client = Client::open(options(vec![bad])).await?;

    assert_eq!(
        client.authenticate("r1", "jeff", "nope").await?,
        AuthStatus::Reject
    );

    Ok(())
}

#[tokio::test]
async fn identifiers_wrap_across_sequential_requests() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = upstream(Behavior::Accept, seen.clone()).await?;

    let client = Client::open(ClientOptions {
        port_count: 1,
        max_transmissions: 1,
        ..options(vec![server])
    })
    .await?;

    for _ in 0..555 {
        assert_eq!(
            client.authenticate("r1", "jeff", "pw").await?,
            AuthStatus::Accept
        );
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 555);
    for (i, (identifier, _)) in seen.iter().enumerate() {
        assert_eq!(*identifier, (i % 256) as u8);
    }

    Ok(())
}

#[tokio::test]
async fn retransmission_reuses_identifier_and_authenticator() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = upstream(Behavior::DropFirst, seen.clone()).await?;

    let client = Client::open(ClientOptions {
        port_count: 1,
        max_transmissions: 2,
        ..options(vec![server])
    })
    .await?;

    assert_eq!(
        client.authenticate("r1", "jeff", "pw").await?,
        AuthStatus::Accept
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, seen[1].0);
    assert_eq!(seen[0].1, seen[1].1);

    Ok(())
}

#[tokio::test]
async fn failover_reaches_second_server() -> Result<()> {
    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let dead = upstream(Behavior::Hold, seen_a.clone()).await?;
    let live = upstream(Behavior::Accept, seen_b.clone()).await?;

    let retry_interval = Duration::from_millis(300);
    let client = Client::open(ClientOptions {
        port_count: 1,
        max_transmissions: 2,
        retry_interval,
        sweep_interval: Duration::from_millis(50),
        ..options(vec![dead, live])
    })
    .await?;

    let started = Instant::now();
    let status = client.authenticate("r1", "jeff", "pw").await?;
    let elapsed = started.elapsed();

    assert_eq!(status, AuthStatus::Accept);
    assert!(elapsed >= Duration::from_millis(250), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1200), "elapsed {elapsed:?}");

    let a = seen_a.lock().unwrap();
    let b = seen_b.lock().unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);

    // Failover re-sends the identical request, not a new one.
    assert_eq!(a[0], b[0]);

    Ok(())
}

#[tokio::test]
async fn unanswered_request_times_out() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dead = upstream(Behavior::Hold, seen.clone()).await?;

    let client = Client::open(ClientOptions {
        max_transmissions: 2,
        retry_interval: Duration::from_millis(150),
        sweep_interval: Duration::from_millis(50),
        ..options(vec![dead])
    })
    .await?;

    let started = Instant::now();
    let result = client.authenticate("r1", "jeff", "pw").await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(ClientError::Timeout)));
    assert!(elapsed >= Duration::from_millis(280), "elapsed {elapsed:?}");

    // The identifier slot was released on timeout.
    assert_eq!(client.in_flight(), 0);

    Ok(())
}

#[tokio::test]
async fn mismatched_response_authenticator_is_ignored() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let forged = upstream(Behavior::WrongSecret, seen.clone()).await?;

    let client = Client::open(ClientOptions {
        max_transmissions: 1,
        ..options(vec![forged])
    })
    .await?;

    assert!(matches!(
        client.authenticate("r1", "jeff", "pw").await,
        Err(ClientError::Timeout)
    ));

    Ok(())
}

#[tokio::test]
async fn exhaustion_is_immediate() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let holding = upstream(Behavior::Hold, seen.clone()).await?;

    let client = Arc::new(
        Client::open(ClientOptions {
            port_count: 1,
            max_transmissions: 1,
            retry_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            ..options(vec![holding])
        })
        .await?,
    );

    let mut handles = Vec::new();
    for i in 0..256 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .authenticate("r1", &format!("user{}", i), "pw")
                .await
        }));
    }

    // Let every spawned call claim its identifier slot.
    while client.in_flight() < 256 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let started = Instant::now();
    let result = client.authenticate("r1", "one-too-many", "pw").await;
    assert!(matches!(result, Err(ClientError::Exhausted)));
    assert!(started.elapsed() < Duration::from_millis(100));

    // Closing the pool resolves every parked call with Cancelled.
    client.close();
    for handle in handles {
        assert!(matches!(handle.await?, Err(ClientError::Cancelled)));
    }

    Ok(())
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let server: SocketAddr = "127.0.0.1:1812".parse().unwrap();

    assert!(matches!(
        Client::open(options(Vec::new())).await,
        Err(ClientError::InvalidInput(_))
    ));

    assert!(matches!(
        Client::open(ClientOptions {
            port_count: 0,
            ..options(vec![server])
        })
        .await,
        Err(ClientError::InvalidInput(_))
    ));

    assert!(matches!(
        Client::open(ClientOptions {
            sweep_interval: Duration::from_secs(5),
            retry_interval: Duration::from_secs(1),
            ..options(vec![server])
        })
        .await,
        Err(ClientError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn oversized_password_fails_up_front() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = upstream(Behavior::Accept, seen.clone()).await?;
    let client = Client::open(options(vec![server])).await?;

    let long = "a".repeat(200);
    assert!(matches!(
        client.authenticate("r1", "jeff", &long).await,
        Err(ClientError::InvalidInput(_))
    ));

    assert_eq!(client.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn close_cancels_pending_requests() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let holding = upstream(Behavior::Hold, seen.clone()).await?;

    let client = Arc::new(
        Client::open(ClientOptions {
            retry_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            ..options(vec![holding])
        })
        .await?,
    );

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.authenticate("r1", "jeff", "pw").await })
    };

    while client.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.close();
    assert!(matches!(pending.await?, Err(ClientError::Cancelled)));

    // A closed client refuses new work.
    assert!(matches!(
        client.authenticate("r1", "jeff", "pw").await,
        Err(ClientError::Closed)
    ));

    Ok(())
}
