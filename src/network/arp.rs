use log::debug;
use pnet::datalink::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const ARP_ENTRY_TIMEOUT: Duration = Duration::from_secs(15);
pub const ARP_RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const ARP_MAX_ATTEMPTS: u32 = 5;

/// A frame waiting for its next hop to resolve. The Ethernet source is
/// already set; only the destination is filled in on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub frame: Vec<u8>,
    pub interface: String,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub ip: Ipv4Addr,
    /// Interface the request goes out on, the one of the first queued frame.
    pub interface: String,
    pub frames: Vec<QueuedFrame>,
    pub attempts: u32,
    pub last_sent: Instant,
}

/// Outcome of one sweep: requests to send again and requests given up on.
#[derive(Debug, Default)]
pub struct ArpSweep {
    pub retry: Vec<(Ipv4Addr, String)>,
    pub expired: Vec<PendingRequest>,
}

#[derive(Debug, Default)]
struct ArpTables {
    entries: HashMap<Ipv4Addr, (MacAddr, Instant)>,
    requests: HashMap<Ipv4Addr, PendingRequest>,
}

#[derive(Debug)]
pub struct ArpCache {
    tables: Mutex<ArpTables>,
    entry_timeout: Duration,
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new(ARP_ENTRY_TIMEOUT)
    }
}

impl ArpCache {
    pub fn new(entry_timeout: Duration) -> Self {
        Self {
            tables: Mutex::new(ArpTables::default()),
            entry_timeout,
        }
    }

    pub async fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        let tables = self.tables.lock().await;
        tables
            .entries
            .get(&ip)
            .filter(|(_, added)| added.elapsed() < self.entry_timeout)
            .map(|(mac, _)| *mac)
    }

    /// Stores a mapping and hands back the request it satisfies, if any.
    pub async fn insert(&self, ip: Ipv4Addr, mac: MacAddr) -> Option<PendingRequest> {
        let mut tables = self.tables.lock().await;
        tables.entries.insert(ip, (mac, Instant::now()));
        tables.requests.remove(&ip)
    }

    /// Queues `frame` behind a resolution of `ip`. Returns true when this
    /// created the request, meaning the caller should send the first ARP.
    pub async fn enqueue(&self, ip: Ipv4Addr, frame: Vec<u8>, interface: &str) -> bool {
        let mut tables = self.tables.lock().await;
        let queued = QueuedFrame {
            frame,
            interface: interface.to_string(),
        };

        match tables.requests.get_mut(&ip) {
            Some(request) => {
                request.frames.push(queued);
                false
            }
            None => {
                tables.requests.insert(
                    ip,
                    PendingRequest {
                        ip,
                        interface: interface.to_string(),
                        frames: vec![queued],
                        attempts: 1,
                        last_sent: Instant::now(),
                    },
                );
                true
            }
        }
    }

    /// Purges stale entries, schedules retries and gives up on requests that
    /// were sent `ARP_MAX_ATTEMPTS` times without an answer.
    pub async fn sweep(&self, now: Instant) -> ArpSweep {
        let mut tables = self.tables.lock().await;
        let timeout = self.entry_timeout;
        tables
            .entries
            .retain(|_, (_, added)| now.saturating_duration_since(*added) < timeout);

        let mut outcome = ArpSweep::default();
        let due: Vec<Ipv4Addr> = tables
            .requests
            .values()
            .filter(|request| now.saturating_duration_since(request.last_sent) >= ARP_RETRY_INTERVAL)
            .map(|request| request.ip)
            .collect();

        for ip in due {
            let exhausted = tables
                .requests
                .get(&ip)
                .is_some_and(|request| request.attempts >= ARP_MAX_ATTEMPTS);

            if exhausted {
                if let Some(request) = tables.requests.remove(&ip) {
                    debug!("ARP for {} unanswered after {} attempts", ip, request.attempts);
                    outcome.expired.push(request);
                }
            } else if let Some(request) = tables.requests.get_mut(&ip) {
                request.attempts += 1;
                request.last_sent = now;
                outcome.retry.push((ip, request.interface.clone()));
            }
        }

        outcome
    }

    pub async fn pending_frames(&self, ip: Ipv4Addr) -> usize {
        let tables = self.tables.lock().await;
        tables.requests.get(&ip).map_or(0, |request| request.frames.len())
    }
}
