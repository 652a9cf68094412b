//! Double-buffered RIB: LPM route table + ARP table + per-worker FIB cache
//! (spec §4.6). Same `ArcSwap` double-buffering approach as
//! [`crate::mac::MacTable`]; route lookup here is a linear longest-prefix
//! scan rather than a patricia trie or DIR-24-8 structure, which the spec
//! explicitly allows ("the spec requires only longest-prefix-match
//! semantics").

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::RibConfig;
use crate::mac::{LocalWorkerData as MacLocalWorkerData, MacLookup, MacTable};
use crate::netlink::{NotificationEntry, NotificationSource};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scope {
    Link,
    Global,
}

#[derive(Clone, Copy, Debug)]
pub struct RouteEntry {
    pub dest: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
    pub ifindex: u32,
    pub scope: Scope,
    pub src_mac: [u8; 6],
}

impl RouteEntry {
    fn matches(&self, addr: Ipv4Addr) -> bool {
        if self.prefix_len == 0 {
            return true;
        }
        let prefix_len = self.prefix_len.min(32);
        let mask: u32 = if prefix_len == 32 {
            u32::MAX
        } else {
            !0u32 << (32 - prefix_len)
        };
        (u32::from(addr) & mask) == (u32::from(self.dest) & mask)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ArpEntry {
    pub ifindex: u32,
    pub mac: [u8; 6],
}

#[derive(Clone, Debug)]
pub struct FibEntry {
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub output_port: u32,
}

#[derive(Clone, Debug, Default)]
struct RibSide {
    routes: Vec<RouteEntry>,
    arp: HashMap<Ipv4Addr, ArpEntry>,
}

#[derive(Default)]
struct WorkerShared {
    referred_side: AtomicUsize,
    referring: AtomicBool,
}

pub struct RibLocalWorkerData {
    shared: Arc<WorkerShared>,
    fib_cache: HashMap<Ipv4Addr, FibEntry>,
}

pub struct Rib {
    sides: [arc_swap::ArcSwap<RibSide>; 2],
    read_index: AtomicUsize,
    workers: Mutex<Vec<Arc<WorkerShared>>>,
    config: RibConfig,
}

impl Rib {
    pub fn new(config: RibConfig) -> Self {
        Self {
            sides: [
                arc_swap::ArcSwap::from_pointee(RibSide::default()),
                arc_swap::ArcSwap::from_pointee(RibSide::default()),
            ],
            read_index: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn register_worker(&self) -> RibLocalWorkerData {
        let shared = Arc::new(WorkerShared::default());
        self.workers.lock().unwrap().push(shared.clone());
        RibLocalWorkerData {
            shared,
            fib_cache: HashMap::new(),
        }
    }

    fn reconcile(&self, local: &mut RibLocalWorkerData) {
        let current = self.read_index.load(Ordering::Acquire);
        if local.shared.referred_side.load(Ordering::Acquire) != current {
            local.fib_cache.clear();
            local.shared.referred_side.store(current, Ordering::Release);
        }
    }

    fn longest_match(side: &RibSide, addr: Ipv4Addr) -> Option<RouteEntry> {
        side.routes
            .iter()
            .filter(|r| r.matches(addr))
            .max_by_key(|r| r.prefix_len)
            .copied()
    }

    /// spec §4.6 "Updater cycle".
    pub fn update(
        &self,
        notifications: &dyn NotificationSource,
    ) -> Result<(), crate::error::ForwardingError> {
        let read_idx = self.read_index.load(Ordering::Acquire);
        let write_idx = read_idx ^ 1;

        {
            let workers = self.workers.lock().unwrap();
            for (worker_id, worker) in workers.iter().enumerate() {
                let stale = worker.referred_side.load(Ordering::Acquire) != read_idx;
                if stale && worker.referring.load(Ordering::Acquire) {
                    return Err(crate::error::ForwardingError::UpdaterCycleAborted { worker_id });
                }
            }
        }

        let read_side = self.sides[read_idx].load();
        let mut write_side = (**read_side).clone();

        while let Some(entry) = notifications.try_recv() {
            apply_notification(&mut write_side, entry);
        }

        if write_side.routes.len() > self.config.max_routes {
            debug!(max_routes = self.config.max_routes, "route table truncated");
            write_side.routes.truncate(self.config.max_routes);
        }

        self.sides[write_idx].store(Arc::new(write_side));
        self.read_index.store(write_idx, Ordering::Release);
        Ok(())
    }

    /// Bounded snapshot of every route rule, for the datastore's route
    /// iteration API.
    pub fn for_each_route(&self, limit: usize) -> Vec<RouteEntry> {
        let read_idx = self.read_index.load(Ordering::Acquire);
        let snapshot = self.sides[read_idx].load();
        snapshot.routes.iter().take(limit).copied().collect()
    }
}

fn apply_notification(side: &mut RibSide, entry: NotificationEntry) {
    match entry {
        NotificationEntry::IfaddrAdd { ifindex, mac } => {
            for route in side.routes.iter_mut().filter(|r| r.ifindex == ifindex) {
                route.src_mac = mac;
            }
        }
        NotificationEntry::IfaddrDel { ifindex: _ } => {
            // No-op: the original's `update_tables` only acts on
            // NOTIFICATION_ACTION_TYPE_ADD for ifaddr notifications, so a
            // deletion leaves any route's cached src_mac untouched.
        }
        NotificationEntry::ArpAdd { ifindex, ip, mac } => {
            side.arp.insert(ip, ArpEntry { ifindex, mac });
        }
        NotificationEntry::ArpDel { ip } => {
            side.arp.remove(&ip);
        }
        NotificationEntry::RouteAdd {
            dest,
            prefix_len,
            gateway,
            ifindex,
            scope,
            src_mac,
        } => {
            side.routes.retain(|r| !(r.dest == dest && r.prefix_len == prefix_len));
            side.routes.push(RouteEntry {
                dest,
                prefix_len,
                gateway,
                ifindex,
                scope,
                src_mac,
            });
        }
        NotificationEntry::RouteDel { dest, prefix_len } => {
            side.routes.retain(|r| !(r.dest == dest && r.prefix_len == prefix_len));
        }
    }
}

/// One IPv4 packet's mutable header fields, as seen by [`rib_lookup`].
#[derive(Clone, Debug)]
pub struct L3Packet {
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub dst_addr: Ipv4Addr,
    pub ttl: u8,
    pub output_port: Option<u32>,
    pub send_to_kernel: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RibLookupOutcome {
    Forward,
    SendToKernel,
    Drop,
}

/// spec §4.6 "L3 lookup (`rib_lookup`)", steps 1–7.
pub fn rib_lookup(
    rib: &Rib,
    local: &mut RibLocalWorkerData,
    mac_table: &MacTable,
    mac_worker: &mut MacLocalWorkerData,
    packet: &mut L3Packet,
) -> RibLookupOutcome {
    local.shared.referring.store(true, Ordering::Release);
    rib.reconcile(local);

    if let Some(fib) = local.fib_cache.get(&packet.dst_addr) {
        packet.src_mac = fib.src_mac;
        packet.dst_mac = fib.dst_mac;
        packet.output_port = Some(fib.output_port);
        local.shared.referring.store(false, Ordering::Release);
        return RibLookupOutcome::Forward;
    }

    let read_idx = rib.read_index.load(Ordering::Acquire);
    let snapshot = rib.sides[read_idx].load();
    let route = match Rib::longest_match(&snapshot, packet.dst_addr) {
        Some(route) => route,
        None => {
            debug!(dst_addr = %packet.dst_addr, "no matching route");
            local.shared.referring.store(false, Ordering::Release);
            return RibLookupOutcome::Drop;
        }
    };

    let next_hop = if route.scope == Scope::Link {
        packet.dst_addr
    } else {
        route.gateway
    };

    let arp = match snapshot.arp.get(&next_hop) {
        Some(arp) => *arp,
        None => {
            packet.send_to_kernel = true;
            local.shared.referring.store(false, Ordering::Release);
            return RibLookupOutcome::SendToKernel;
        }
    };

    packet.dst_mac = arp.mac;
    packet.src_mac = route.src_mac;
    if packet.ttl == 0 {
        local.shared.referring.store(false, Ordering::Release);
        return RibLookupOutcome::Drop;
    }
    packet.ttl -= 1;
    if packet.ttl == 0 {
        local.shared.referring.store(false, Ordering::Release);
        return RibLookupOutcome::Drop;
    }

    let dst_mac_u64 = u64::from_be_bytes([
        0,
        0,
        arp.mac[0],
        arp.mac[1],
        arp.mac[2],
        arp.mac[3],
        arp.mac[4],
        arp.mac[5],
    ]);
    let output_port = match mac_table.lookup(mac_worker, dst_mac_u64) {
        MacLookup::Hit { port, .. } => port,
        MacLookup::Flood => {
            debug!("no mac table entry for resolved next-hop, dropping");
            local.shared.referring.store(false, Ordering::Release);
            return RibLookupOutcome::Drop;
        }
    };

    local.fib_cache.insert(
        packet.dst_addr,
        FibEntry {
            src_mac: packet.src_mac,
            dst_mac: packet.dst_mac,
            output_port,
        },
    );
    packet.output_port = Some(output_port);
    local.shared.referring.store(false, Ordering::Release);
    RibLookupOutcome::Forward
}
