//! Accept-time admission control (§4.3, §5 Backpressure): IP allow-list,
//! a once-per-second token bucket, and an in-flight concurrency cap,
//! checked before a socket ever reaches a worker. A rejection at any stage
//! closes the socket immediately with no response (§7 "Admission
//! rejection").

use crate::limits::AdmissionLimits;
use crate::timer::TimerService;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runtime admission state shared between the accept loop and the workers
/// that call [`Admission::release`] once an admitted connection is done.
pub(crate) struct Admission {
    limits: AdmissionLimits,
    tokens: AtomicI64,
    in_flight: AtomicUsize,
    #[allow(dead_code)]
    timer: Arc<TimerService>,
}

impl Admission {
    pub(crate) fn new(limits: AdmissionLimits) -> Arc<Self> {
        let timer = TimerService::new();
        let admission = Arc::new(Self {
            tokens: AtomicI64::new(limits.service_speed as i64),
            in_flight: AtomicUsize::new(0),
            limits,
            timer,
        });

        if admission.limits.service_speed != 0 {
            let refill = Arc::clone(&admission);
            admission
                .timer
                .schedule_periodic(Duration::from_secs(1), move |_| {
                    refill.tokens.store(refill.limits.service_speed as i64, Ordering::SeqCst);
                });
        }

        admission
    }

    /// §4.3: allow-list, then token bucket, then concurrency cap, in that
    /// order. Every accepted connection must call this once; every `true`
    /// result must be paired with exactly one later call to
    /// [`Self::release`].
    pub(crate) fn admit(&self, peer: SocketAddr) -> bool {
        if !self.limits.safe_ips.is_empty() && !self.limits.safe_ips.contains(&peer.ip()) {
            return false;
        }

        if self.limits.service_speed != 0 && self.tokens.fetch_sub(1, Ordering::SeqCst) <= 0 {
            self.tokens.fetch_add(1, Ordering::SeqCst);
            return false;
        }

        if self.limits.service_concurrency != 0 {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst);
            if current >= self.limits.service_concurrency {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return false;
            }
        }

        true
    }

    /// Releases the concurrency slot claimed by a prior successful `admit`.
    /// No-op when the cap is disabled.
    pub(crate) fn release(&self) {
        if self.limits.service_concurrency != 0 {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(safe_ips: Vec<&str>, service_speed: u32, service_concurrency: usize) -> AdmissionLimits {
        AdmissionLimits {
            safe_ips: safe_ips.into_iter().map(|ip| ip.parse().unwrap()).collect(),
            service_speed,
            service_concurrency,
            ..AdmissionLimits::default()
        }
    }

    fn peer(ip: &str) -> SocketAddr {
        format!("{ip}:12345").parse().unwrap()
    }

    #[tokio::test]
    async fn unrestricted_by_default() {
        let admission = Admission::new(AdmissionLimits::default());
        assert!(admission.admit(peer("203.0.113.9")));
    }

    #[tokio::test]
    async fn allow_list_rejects_unknown_peers() {
        let admission = Admission::new(limits(vec!["127.0.0.1"], 0, 0));
        assert!(!admission.admit(peer("203.0.113.9")));
        assert!(admission.admit(peer("127.0.0.1")));
    }

    #[tokio::test]
    async fn token_bucket_closes_once_exhausted() {
        let admission = Admission::new(limits(vec![], 2, 0));
        assert!(admission.admit(peer("127.0.0.1")));
        assert!(admission.admit(peer("127.0.0.1")));
        assert!(!admission.admit(peer("127.0.0.1")));
    }

    #[tokio::test]
    async fn concurrency_cap_releases_its_slot() {
        let admission = Admission::new(limits(vec![], 0, 1));
        assert!(admission.admit(peer("127.0.0.1")));
        assert!(!admission.admit(peer("127.0.0.1")));

        admission.release();
        assert!(admission.admit(peer("127.0.0.1")));
    }
}
