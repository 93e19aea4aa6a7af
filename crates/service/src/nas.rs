use std::net::{IpAddr, ToSocketAddrs};

use ahash::{HashMap, HashMapExt};
use parking_lot::RwLock;

use crate::Error;

/// A known network access server and the shared secret it signs with.
///
/// An entry is keyed either by a fixed address or by a host name
/// whose addresses are re-resolved periodically; at least one of the
/// two must be present.
#[derive(Debug, Clone)]
pub struct NasEntry {
    pub static_address: Option<IpAddr>,
    pub host_name: Option<String>,
    pub secret: String,
}

impl NasEntry {
    /// Parses a `host;secret` device specification, where `host` is
    /// either an IP address or a DNS name.
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let (host, secret) = spec
            .split_once(';')
            .ok_or_else(|| Error::BadDeviceSpec(spec.to_string()))?;

        let host = host.trim();
        let secret = secret.trim();
        if host.is_empty() || secret.is_empty() {
            return Err(Error::BadDeviceSpec(spec.to_string()));
        }

        Ok(match host.parse::<IpAddr>() {
            Ok(address) => Self {
                static_address: Some(address),
                host_name: None,
                secret: secret.to_string(),
            },
            Err(_) => Self {
                static_address: None,
                host_name: Some(host.to_string()),
                secret: secret.to_string(),
            },
        })
    }
}

struct Table {
    entries: Vec<NasEntry>,
    // Addresses resolved for each entry's host name, parallel to
    // `entries`.
    resolved: Vec<Vec<IpAddr>>,
    // Derived address index; values index into `entries`.
    index: HashMap<IpAddr, usize>,
}

impl Table {
    // Static addresses win over resolved ones, and within each group
    // the first registered entry wins.  `or_insert` keeps whatever
    // got there first.
    fn rebuild_index(&mut self) {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(address) = entry.static_address {
                index.entry(address).or_insert(i);
            }
        }

        for (i, addresses) in self.resolved.iter().enumerate() {
            for address in addresses {
                index.entry(*address).or_insert(i);
            }
        }

        self.index = index;
    }
}

/// The server's registry of devices allowed to talk to it.
///
/// Lookups run on the receive path and only ever take the read lock;
/// the DNS refresher resolves host names without holding any lock and
/// swaps the derived index in atomically, so readers always see a
/// consistent snapshot.
pub struct NasRegistry {
    table: RwLock<Table>,
    default_secret: Option<String>,
}

impl NasRegistry {
    pub fn new(default_secret: Option<String>) -> Self {
        Self {
            table: RwLock::new(Table {
                entries: Vec::new(),
                resolved: Vec::new(),
                index: HashMap::new(),
            }),
            default_secret,
        }
    }

    pub fn register(&self, entry: NasEntry) -> Result<(), Error> {
        if entry.static_address.is_none() && entry.host_name.is_none() {
            return Err(Error::EmptyNasEntry);
        }

        let mut table = self.table.write();
        table.entries.push(entry);
        table.resolved.push(Vec::new());
        table.rebuild_index();
        Ok(())
    }

    /// Resolves the sending device to its shared secret.
    ///
    /// An unknown source falls back to the default secret when one is
    /// configured; otherwise the caller must drop the datagram.
    pub fn lookup(&self, address: IpAddr) -> Option<String> {
        let table = self.table.read();
        match table.index.get(&address) {
            Some(i) => Some(table.entries[*i].secret.clone()),
            None => self.default_secret.clone(),
        }
    }

    /// Re-resolves every host-name entry and rebuilds the address
    /// index.
    ///
    /// DNS resolution blocks, so this runs on a blocking worker; the
    /// write lock is only taken for the final swap.
    pub fn refresh(&self) {
        let hosts: Vec<(usize, String)> = {
            let table = self.table.read();
            table
                .entries
                .iter()
                .enumerate()
                .filter_map(|(i, e)| e.host_name.clone().map(|h| (i, h)))
                .collect()
        };

        if hosts.is_empty() {
            return;
        }

        let mut updates = Vec::with_capacity(hosts.len());
        for (i, host) in hosts {
            match (host.as_str(), 0u16).to_socket_addrs() {
                Ok(addresses) => {
                    updates.push((i, addresses.map(|a| a.ip()).collect::<Vec<_>>()));
                }
                Err(e) => {
                    // Keep the previous addresses; a transient DNS
                    // failure must not drop a known device.
                    log::warn!("nas resolve failed: host={:?}, err={}", host, e);
                }
            }
        }

        let mut table = self.table.write();
        for (i, addresses) in updates {
            if i < table.resolved.len() {
                table.resolved[i] = addresses;
            }
        }

        table.rebuild_index();
    }

    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
