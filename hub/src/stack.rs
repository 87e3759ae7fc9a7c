/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! Protocol stack lifecycle: start, lifecycle events and the stack-wide lock.
//!
//! The stack owns the Matter UDP transport socket and a network interface
//! watcher which turns OS-level address changes into [`StackEvent`]s for the
//! application's registered callback.

use core::cell::Cell;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::{Mutex, MutexGuard};

use async_io::Async;
use embassy_time::{Duration, Timer};
use log::{debug, info, warn};

use crate::error::{Error, ErrorCode};
use crate::telemetry::DeviceInfo;
use crate::utils::rand::Rand;

/// The Matter port
pub const MATTER_PORT: u16 = 5540;

/// The default bind address for the Matter UDP transport socket
pub const MATTER_SOCKET_BIND_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), MATTER_PORT);

/// The largest UDP payload the Matter transport has to accept
pub const MAX_RX_PACKET_SIZE: usize = 1583;

/// How often the network interface watcher polls the OS address tables
const NETIF_POLL_PERIOD: Duration = Duration::from_secs(5);

/// Platform-level events surfaced through [`StackEvent::Platform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The Wi-Fi station interface acquired an IPv4 address
    WifiStationGotIp(Ipv4Addr),
    /// The Wi-Fi station interface lost its IPv4 address
    WifiStationDisconnected,
}

/// Stack lifecycle events delivered to the registered [`EventCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEvent {
    /// The stack finished its bring-up
    Started,
    /// The address set of some network interface changed
    InterfaceIpAddressChanged,
    /// A platform-level event
    Platform(PlatformEvent),
}

/// The stack lifecycle event callback.
///
/// Invoked from the stack's own execution context; has no error surface, so
/// whatever the callback triggers is fire-and-forget from the stack's point
/// of view.
pub type EventCallback = fn(&StackEvent);

/// The stack-wide lock.
///
/// Serializes access to stack-internal state between the bring-up task and
/// the stack's own execution context. Unlike the C SDKs' explicit
/// lock/unlock pairs, releasing happens when the [`StackGuard`] drops, so an
/// acquire always has a matching release on every path.
pub struct StackLock(Mutex<()>);

impl StackLock {
    pub const fn new() -> Self {
        Self(Mutex::new(()))
    }

    /// Acquire the lock, waiting for as long as it takes.
    pub fn lock(&self) -> Result<StackGuard<'_>, Error> {
        Ok(StackGuard { _guard: self.0.lock()? })
    }

    /// Acquire the lock or fail with `ErrorCode::Busy` if it is held.
    pub fn try_lock(&self) -> Result<StackGuard<'_>, Error> {
        match self.0.try_lock() {
            Ok(guard) => Ok(StackGuard { _guard: guard }),
            Err(std::sync::TryLockError::Poisoned(e)) => Err(e.into()),
            Err(std::sync::TryLockError::WouldBlock) => Err(ErrorCode::Busy.into()),
        }
    }
}

impl Default for StackLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the stack-wide lock is held.
///
/// Operations that touch stack-internal state (the commissioner client ones)
/// take a `&StackGuard`, so the lock discipline is enforced at compile time.
#[derive(Debug)]
pub struct StackGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// The protocol stack handle.
pub struct Stack<'a> {
    dev_det: &'a DeviceInfo<'a>,
    rand: Rand,
    port: u16,
    lock: StackLock,
    event_cb: Cell<Option<EventCallback>>,
    running: Cell<bool>,
    rx_packets: Cell<u32>,
    rx_bytes: Cell<u64>,
    events_dispatched: Cell<u32>,
}

impl<'a> Stack<'a> {
    /// Create a stack handle for the given device, random source and UDP port.
    pub const fn new(dev_det: &'a DeviceInfo<'a>, rand: Rand, port: u16) -> Self {
        Self {
            dev_det,
            rand,
            port,
            lock: StackLock::new(),
            event_cb: Cell::new(None),
            running: Cell::new(false),
            rx_packets: Cell::new(0),
            rx_bytes: Cell::new(0),
            events_dispatched: Cell::new(0),
        }
    }

    /// Start the stack: bind the Matter transport socket and register the
    /// lifecycle event callback.
    ///
    /// This is the one bring-up step whose failure the application must treat
    /// as fatal. Fails with `ErrorCode::InvalidState` when called twice.
    pub fn start(&self, event_cb: EventCallback) -> Result<Async<UdpSocket>, Error> {
        if self.running.get() {
            Err(ErrorCode::InvalidState)?;
        }

        let socket = Async::<UdpSocket>::bind(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            self.port,
        ))?;

        self.event_cb.set(Some(event_cb));
        self.running.set(true);

        info!(
            "Matter stack started for '{}' on UDP port {}",
            self.dev_det.device_name, self.port
        );

        self.notify_event(&StackEvent::Started);

        Ok(socket)
    }

    /// Run the transport RX loop on the socket returned by [`Stack::start`].
    pub async fn run(&self, socket: &Async<UdpSocket>) -> Result<(), Error> {
        if !self.running.get() {
            Err(ErrorCode::InvalidState)?;
        }

        let mut buf = [0; MAX_RX_PACKET_SIZE];

        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;

            self.rx_packets.set(self.rx_packets.get().wrapping_add(1));
            self.rx_bytes.set(self.rx_bytes.get().wrapping_add(len as u64));

            debug!("Received {len} bytes from {peer}");
        }
    }

    /// Run the network interface watcher.
    ///
    /// Polls the OS address tables and emits `InterfaceIpAddressChanged`
    /// whenever the address set of the candidate interfaces changes, plus
    /// `Platform(WifiStationGotIp)` / `Platform(WifiStationDisconnected)` when an
    /// interface gains or loses its IPv4 address.
    pub async fn run_netif_watch(&self) -> Result<(), Error> {
        let mut prev: Vec<(String, Ipv4Addr)> = Vec::new();

        loop {
            let current = Self::station_addrs()?;

            if current != prev {
                self.notify_event(&StackEvent::InterfaceIpAddressChanged);

                for (iname, ip) in &current {
                    if !prev.iter().any(|(n, _)| n == iname) {
                        info!("Interface {iname} acquired IPv4 address {ip}");
                        self.notify_event(&StackEvent::Platform(PlatformEvent::WifiStationGotIp(
                            *ip,
                        )));
                    }
                }

                for (iname, _) in &prev {
                    if !current.iter().any(|(n, _)| n == iname) {
                        info!("Interface {iname} lost its IPv4 address");
                        self.notify_event(&StackEvent::Platform(
                            PlatformEvent::WifiStationDisconnected,
                        ));
                    }
                }

                prev = current;
            }

            Timer::after(NETIF_POLL_PERIOD).await;
        }
    }

    /// Dispatch an event to the registered callback.
    ///
    /// Events raised before [`Stack::start`] registered a callback are
    /// dropped.
    pub fn notify_event(&self, event: &StackEvent) {
        if let Some(cb) = self.event_cb.get() {
            cb(event);
            self.events_dispatched
                .set(self.events_dispatched.get().wrapping_add(1));
        } else {
            warn!("Dropping stack event {event:?}: no callback registered");
        }
    }

    /// Acquire the stack-wide lock.
    pub fn lock(&self) -> Result<StackGuard<'_>, Error> {
        self.lock.lock()
    }

    /// Acquire the stack-wide lock or fail if it is held.
    pub fn try_lock(&self) -> Result<StackGuard<'_>, Error> {
        self.lock.try_lock()
    }

    pub fn dev_det(&self) -> &DeviceInfo<'_> {
        self.dev_det
    }

    pub fn rand(&self) -> Rand {
        self.rand
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn rx_packets(&self) -> u32 {
        self.rx_packets.get()
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.get()
    }

    pub fn events_dispatched(&self) -> u32 {
        self.events_dispatched.get()
    }

    /// The IPv4 addresses of the up, broadcast-capable, non-loopback
    /// interfaces, sorted by interface name.
    fn station_addrs() -> Result<Vec<(String, Ipv4Addr)>, Error> {
        use nix::net::if_::InterfaceFlags;

        let addrs = nix::ifaddrs::getifaddrs().map_err(|_| ErrorCode::NoNetworkInterface)?;

        let mut out: Vec<(String, Ipv4Addr)> = addrs
            .filter(|ia| {
                ia.flags
                    .contains(InterfaceFlags::IFF_UP | InterfaceFlags::IFF_BROADCAST)
                    && !ia
                        .flags
                        .intersects(InterfaceFlags::IFF_LOOPBACK | InterfaceFlags::IFF_POINTOPOINT)
            })
            .filter_map(|ia| {
                ia.address
                    .and_then(|addr| addr.as_sockaddr_in().map(|addr| addr.ip().into()))
                    .map(|ip: Ipv4Addr| (ia.interface_name, ip))
            })
            .collect();

        out.sort();

        Ok(out)
    }
}
