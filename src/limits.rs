//! One-time discovery of transport packet limits.
//!
//! Sending starts with the default capacity right away. Each tick polls
//! the transport until both channels report a limit, or the timeout
//! passes, after which the default stays for good.

use crate::bundler::BundleCapacity;
use crate::protocol::Channel;
use crate::transport::Transport;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Monotonic time source, unaffected by any simulation time scale.
pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Pending,
    Resolved { reliable: usize, unreliable: usize },
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct LimitDiscovery {
    timeout: Duration,
    started_at: Option<Duration>,
    state: DiscoveryState,
}

impl LimitDiscovery {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            started_at: None,
            state: DiscoveryState::Pending,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state != DiscoveryState::Pending
    }

    /// Returns a new capacity the first time both limits are known.
    pub fn poll<T: Transport>(&mut self, now: Duration, transport: &T) -> Option<BundleCapacity> {
        if self.is_finished() {
            return None;
        }

        let started_at = *self.started_at.get_or_insert(now);

        let reliable = transport.max_packet_size(Channel::Reliable);
        let unreliable = transport.max_packet_size(Channel::Unreliable);
        if let (Some(reliable), Some(unreliable)) = (reliable, unreliable) {
            self.state = DiscoveryState::Resolved { reliable, unreliable };
            return Some(BundleCapacity::from_packet_sizes(reliable, unreliable));
        }

        if now.saturating_sub(started_at) > self.timeout {
            log::warn!(
                "transport packet limits unavailable after {:?}, keeping default bundle capacity",
                self.timeout
            );
            self.state = DiscoveryState::TimedOut;
        }

        None
    }
}

impl Default for LimitDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_resolves_once_limits_known() {
        let clock = ManualClock::new();
        let mut transport = MemoryTransport::server();
        let mut discovery = LimitDiscovery::default();

        assert!(discovery.poll(clock.now(), &transport).is_none());
        clock.advance(Duration::from_secs(2));
        assert!(discovery.poll(clock.now(), &transport).is_none());

        transport.set_packet_limits(1420, 1180);
        let capacity = discovery.poll(clock.now(), &transport).unwrap();
        assert_eq!(capacity, BundleCapacity::from_packet_sizes(1420, 1180));
        assert_eq!(
            discovery.state(),
            DiscoveryState::Resolved {
                reliable: 1420,
                unreliable: 1180
            }
        );

        assert!(discovery.poll(clock.now(), &transport).is_none());
    }

    #[test]
    fn test_times_out_and_stays_default() {
        let clock = ManualClock::new();
        clock.set(Duration::from_secs(100));
        let mut transport = MemoryTransport::client();
        let mut discovery = LimitDiscovery::new(Duration::from_secs(10));

        assert!(discovery.poll(clock.now(), &transport).is_none());
        clock.advance(Duration::from_secs(10));
        assert!(discovery.poll(clock.now(), &transport).is_none());
        assert_eq!(discovery.state(), DiscoveryState::Pending);

        clock.advance(Duration::from_millis(1));
        assert!(discovery.poll(clock.now(), &transport).is_none());
        assert_eq!(discovery.state(), DiscoveryState::TimedOut);

        transport.set_packet_limits(1420, 1180);
        assert!(discovery.poll(clock.now(), &transport).is_none());
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now(), Duration::from_millis(250));
    }
}
