//! Local-network device discovery.
//!
//! Tries the well-known device hostnames first. When none resolve, probes
//! every address of the local /24 concurrently on the two service ports the
//! device exposes (ssh and smb), each probe bounded by a short connect
//! timeout. All probes are awaited before concluding and the responders are
//! sorted, so the winner is deterministic: lowest address. Individual probe
//! failures are silent.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Hostnames the device firmware announces by default.
const WELL_KNOWN_HOSTS: &[&str] = &["ROCKNIX", "ROCKNIX.local", "JELOS", "JELOS.local"];

/// Ports probed on each candidate address: ssh and smb.
const PROBE_PORTS: [u16; 2] = [22, 445];

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Ordered notifications from a discovery sweep.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    Log(String),
    /// The accepted device address (lowest responder).
    Found(Ipv4Addr),
    /// All responders, sorted ascending. Empty when nothing answered.
    Done { responders: Vec<Ipv4Addr> },
}

/// Sweep for a device, reporting over the channel.
pub async fn discover(tx: tokio::sync::mpsc::Sender<DiscoveryEvent>, cancel: CancellationToken) {
    let _ = tx.send(DiscoveryEvent::Log("searching for device".into())).await;

    // Resolution of a well-known hostname short-circuits the subnet sweep.
    for &host in WELL_KNOWN_HOSTS {
        if let Some(addr) = resolve_v4(host).await {
            info!(host, addr = %addr, "device resolved by hostname");
            let _ = tx.send(DiscoveryEvent::Found(addr)).await;
            let _ = tx
                .send(DiscoveryEvent::Done {
                    responders: vec![addr],
                })
                .await;
            return;
        }
    }

    let Some(local) = local_ipv4().await else {
        let _ = tx
            .send(DiscoveryEvent::Log("cannot determine local address".into()))
            .await;
        let _ = tx
            .send(DiscoveryEvent::Done {
                responders: Vec::new(),
            })
            .await;
        return;
    };

    let octets = local.octets();
    let _ = tx
        .send(DiscoveryEvent::Log(format!(
            "probing {}.{}.{}.1-254",
            octets[0], octets[1], octets[2]
        )))
        .await;

    let mut probes = JoinSet::new();
    for host in 1..=254u8 {
        let candidate = Ipv4Addr::new(octets[0], octets[1], octets[2], host);
        probes.spawn(async move {
            for port in PROBE_PORTS {
                let addr = SocketAddr::new(IpAddr::V4(candidate), port);
                match timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
                    Ok(Ok(_)) => return Some(candidate),
                    // Refused/timed-out probes say nothing about other hosts.
                    Ok(Err(err)) => debug!(addr = %addr, error = %err, "probe failed"),
                    Err(_) => {}
                }
            }
            None
        });
    }

    let mut responders = Vec::new();
    loop {
        tokio::select! {
            joined = probes.join_next() => match joined {
                Some(Ok(Some(addr))) => responders.push(addr),
                Some(_) => {}
                None => break,
            },
            _ = cancel.cancelled() => {
                probes.abort_all();
                let _ = tx.send(DiscoveryEvent::Log("discovery cancelled".into())).await;
                break;
            }
        }
    }

    responders.sort();
    if let Some(&winner) = responders.first() {
        let _ = tx.send(DiscoveryEvent::Found(winner)).await;
    } else {
        let _ = tx.send(DiscoveryEvent::Log("no device answered".into())).await;
    }
    let _ = tx.send(DiscoveryEvent::Done { responders }).await;
}

async fn resolve_v4(host: &str) -> Option<Ipv4Addr> {
    let addrs = lookup_host((host, 22)).await.ok()?;
    addrs.filter_map(|addr| match addr.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    })
    .next()
}

/// Local address as the default route sees it. The datagram is never sent;
/// connecting just binds a route.
async fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("10.255.255.255:1").await.ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    }
}
