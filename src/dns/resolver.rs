//! The resolver state machine: build, send, retry, parse, cache.

use std::cell::Cell;
use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::cache::DnsCache;
use super::wire::{self, RecordType, WireError, RCODE_NXDOMAIN};
use crate::error::{Error, Result};
use crate::net::UdpSocket;
use crate::reactor::Poller;

/// Nameservers and per-attempt timing.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Servers tried in order; never empty.
    pub nameservers: Vec<SocketAddr>,
    /// Budget for one send-and-wait against one server.
    pub attempt_timeout: Duration,
    /// Fallback TTL when an answer carries none.
    pub min_ttl: Duration,
}

const DEFAULT_SERVER: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 53);

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            nameservers: vec![DEFAULT_SERVER],
            attempt_timeout: Duration::from_secs(2),
            min_ttl: Duration::from_secs(30),
        }
    }
}

impl ResolverConfig {
    /// Parses resolv.conf-style text: every line starting with
    /// `nameserver` contributes one server. No usable line means the
    /// default `127.0.0.1:53`.
    pub fn from_resolv_conf(reader: impl BufRead) -> Self {
        let mut nameservers = Vec::new();
        for line in reader.lines().map_while(std::io::Result::ok) {
            let mut parts = line.split_whitespace();
            if parts.next() != Some("nameserver") {
                continue;
            }
            if let Some(addr) = parts.next().and_then(|host| host.parse::<IpAddr>().ok()) {
                nameservers.push(SocketAddr::new(addr, 53));
            }
        }
        if nameservers.is_empty() {
            nameservers.push(DEFAULT_SERVER);
        }
        Self {
            nameservers,
            ..Self::default()
        }
    }

    /// Reads the system resolv.conf, falling back to the default server.
    #[must_use]
    pub fn system() -> Self {
        match std::fs::File::open("/etc/resolv.conf") {
            Ok(file) => Self::from_resolv_conf(std::io::BufReader::new(file)),
            Err(_) => Self::default(),
        }
    }
}

/// Caching A/AAAA resolver over the poller's UDP socket.
pub struct Resolver<P: Poller> {
    poller: Rc<P>,
    config: ResolverConfig,
    cache: DnsCache,
    next_id: Cell<u16>,
}

/// One server's verdict on one query.
enum Attempt {
    Answers(Vec<(IpAddr, u32)>),
    /// Timeout, truncation, or garbage: ask the next server.
    NextServer,
    /// NXDOMAIN: no server will change the answer.
    NoSuchName,
}

impl<P: Poller> Resolver<P> {
    /// A resolver using the system nameserver configuration.
    pub fn new(poller: &Rc<P>) -> Self {
        Self::with_config(poller, ResolverConfig::system())
    }

    /// A resolver with explicit configuration.
    pub fn with_config(poller: &Rc<P>, config: ResolverConfig) -> Self {
        Self {
            poller: Rc::clone(poller),
            config,
            cache: DnsCache::new(),
            next_id: Cell::new(1),
        }
    }

    /// Resolves `name` to its A and AAAA addresses.
    ///
    /// Cache hits return immediately. Otherwise both record types are
    /// queried; each query walks the server list, moving on after a
    /// timeout or truncated reply and giving up at once on NXDOMAIN.
    /// [`Error::ResolveFailed`] reports a name no server answered for.
    pub async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = name.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached);
        }

        let mut addrs = Vec::new();
        let mut min_ttl = u32::MAX;
        for rtype in [RecordType::A, RecordType::Aaaa] {
            if let Attempt::Answers(answers) = self.query(name, rtype).await? {
                for (addr, ttl) in answers {
                    min_ttl = min_ttl.min(ttl);
                    addrs.push(addr);
                }
            }
        }

        if addrs.is_empty() {
            return Err(Error::ResolveFailed(name.to_string()));
        }
        let ttl = Duration::from_secs(u64::from(min_ttl)).max(self.config.min_ttl);
        self.cache.put(name, addrs.clone(), ttl);
        Ok(addrs)
    }

    /// Live cache entries, mostly for diagnostics.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// One record-type query across the server list.
    async fn query(&self, name: &str, rtype: RecordType) -> Result<Attempt> {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1).max(1));
        let packet = wire::encode_query(id, name, rtype)
            .map_err(|_| Error::ResolveFailed(name.to_string()))?;

        for server in &self.config.nameservers {
            match self.ask_server(&packet, id, *server).await {
                Attempt::NextServer => {
                    debug!(%server, name, "no usable answer, trying next server");
                }
                verdict => return Ok(verdict),
            }
        }
        Ok(Attempt::NextServer)
    }

    /// Sends one query to one server and waits out the attempt budget.
    async fn ask_server(&self, packet: &[u8], id: u16, server: SocketAddr) -> Attempt {
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let Ok(socket) = UdpSocket::bind(&self.poller, local) else {
            return Attempt::NextServer;
        };

        let deadline = Some(Instant::now() + self.config.attempt_timeout);
        if socket.send_to(packet, server, deadline).await.is_err() {
            return Attempt::NextServer;
        }

        let mut buf = [0u8; 2048];
        loop {
            let (n, from) = match socket.recv_from(&mut buf, deadline).await {
                Ok(received) => received,
                Err(_) => return Attempt::NextServer,
            };
            if from.ip() != server.ip() {
                continue;
            }
            match wire::parse_response(&buf[..n], id) {
                Ok(response) if response.truncated => return Attempt::NextServer,
                Ok(response) if response.rcode == RCODE_NXDOMAIN => return Attempt::NoSuchName,
                Ok(response) if response.rcode != 0 => return Attempt::NextServer,
                Ok(response) => return Attempt::Answers(response.answers),
                // Late reply to an older query; keep listening.
                Err(WireError::IdMismatch) => continue,
                Err(_) => return Attempt::NextServer,
            }
        }
    }
}

impl<P: Poller> std::fmt::Debug for Resolver<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("nameservers", &self.config.nameservers)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
