//! Built-in per-IP connection admission control.
//!
//! Separate from the user-supplied [`ConnectionFilter`](crate::ConnectionFilter)
//! hook: this tracks *concurrent* connections per remote IP for the
//! lifetime of the TCP connection, rather than running arbitrary
//! caller logic once at accept time.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex},
};

#[derive(Debug, Default)]
pub(crate) struct IpAdmission {
    counts: Mutex<HashMap<IpAddr, usize>>,
}

impl IpAdmission {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempts to reserve a connection slot for `ip`. Returns `None` if
    /// `max` is already reached; otherwise returns a guard that releases
    /// the slot on drop.
    pub(crate) fn try_admit(self: &Arc<Self>, ip: IpAddr, max: usize) -> Option<IpGuard> {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = counts.entry(ip).or_insert(0);

        if *entry >= max {
            return None;
        }
        *entry += 1;

        Some(IpGuard {
            admission: Arc::clone(self),
            ip,
        })
    }
}

pub(crate) struct IpGuard {
    admission: Arc<IpAdmission>,
    ip: IpAddr,
}

impl Drop for IpGuard {
    fn drop(&mut self) {
        let mut counts = self
            .admission
            .counts
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(count) = counts.get_mut(&self.ip) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn admits_up_to_max_then_rejects() {
        let admission = IpAdmission::new();

        let g1 = admission.try_admit(ip(), 2);
        let g2 = admission.try_admit(ip(), 2);
        let g3 = admission.try_admit(ip(), 2);

        assert!(g1.is_some());
        assert!(g2.is_some());
        assert!(g3.is_none());
    }

    #[test]
    fn releasing_a_guard_frees_a_slot() {
        let admission = IpAdmission::new();

        let g1 = admission.try_admit(ip(), 1);
        assert!(g1.is_some());
        assert!(admission.try_admit(ip(), 1).is_none());

        drop(g1);
        assert!(admission.try_admit(ip(), 1).is_some());
    }

    #[test]
    fn different_ips_are_tracked_independently() {
        let admission = IpAdmission::new();
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        assert!(admission.try_admit(ip(), 1).is_some());
        assert!(admission.try_admit(other, 1).is_some());
    }
}
