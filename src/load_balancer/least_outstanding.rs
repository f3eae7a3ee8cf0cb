//! Least outstanding leases load balancing strategy.

use std::sync::{Mutex, MutexGuard, PoisonError};
use crate::load_balancer::endpoint::Endpoint;

/// Per-endpoint lease counter.
#[derive(Debug, Clone)]
struct Slot {
    endpoint: Endpoint,
    outstanding: usize,
}

#[derive(Debug, Default)]
struct Slots {
    /// Selectable slots, in endpoint set order.
    live: Vec<Slot>,
    /// Endpoints that left the set while still leased.
    draining: Vec<Slot>,
}

/// Least outstanding selector.
/// Selects the endpoint with the fewest unreleased leases; ties go to the
/// earliest endpoint in set order.
#[derive(Debug, Default)]
pub struct LeastOutstanding {
    slots: Mutex<Slots>,
}

impl LeastOutstanding {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Counters are only touched by integer ops that cannot panic midway.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select an endpoint and count the lease against it, under one lock.
    pub fn acquire(&self, endpoints: &[Endpoint]) -> Option<Endpoint> {
        let mut slots = self.lock();
        slots.reconcile(endpoints);

        let slot = slots.live.iter_mut().min_by_key(|s| s.outstanding)?;
        slot.outstanding += 1;
        Some(slot.endpoint.clone())
    }

    /// Return one lease on `endpoint`. Returns false if no lease was counted
    /// against it.
    pub fn release(&self, endpoint: &Endpoint) -> bool {
        let mut slots = self.lock();

        if let Some(slot) = slots
            .live
            .iter_mut()
            .find(|s| &s.endpoint == endpoint && s.outstanding > 0)
        {
            slot.outstanding -= 1;
            return true;
        }

        if let Some(index) = slots
            .draining
            .iter()
            .position(|s| &s.endpoint == endpoint && s.outstanding > 0)
        {
            slots.draining[index].outstanding -= 1;
            if slots.draining[index].outstanding == 0 {
                slots.draining.swap_remove(index);
            }
            return true;
        }

        false
    }

    /// Outstanding lease counts, selectable endpoints first.
    pub fn snapshot(&self) -> Vec<(Endpoint, usize)> {
        let slots = self.lock();
        slots
            .live
            .iter()
            .chain(slots.draining.iter())
            .map(|s| (s.endpoint.clone(), s.outstanding))
            .collect()
    }

    /// Sum of all outstanding leases.
    pub fn total_outstanding(&self) -> usize {
        let slots = self.lock();
        slots
            .live
            .iter()
            .chain(slots.draining.iter())
            .map(|s| s.outstanding)
            .sum()
    }
}

impl Slots {
    /// Whether the live slots already equal `endpoints` with duplicates
    /// dropped, in order.
    fn matches(&self, endpoints: &[Endpoint]) -> bool {
        let mut next = 0;
        for endpoint in endpoints {
            if self.live.get(next).is_some_and(|s| &s.endpoint == endpoint) {
                next += 1;
            } else if !self.live[..next].iter().any(|s| &s.endpoint == endpoint) {
                return false;
            }
        }
        next == self.live.len()
    }

    /// Bring the live slots in line with the current endpoint set, keeping
    /// counts for endpoints that stayed.
    fn reconcile(&mut self, endpoints: &[Endpoint]) {
        if self.matches(endpoints) {
            return;
        }

        let mut previous = std::mem::take(&mut self.live);
        for endpoint in endpoints {
            if self.live.iter().any(|s| &s.endpoint == endpoint) {
                continue;
            }

            let slot = if let Some(i) = previous.iter().position(|s| &s.endpoint == endpoint) {
                previous.swap_remove(i)
            } else if let Some(i) = self.draining.iter().position(|s| &s.endpoint == endpoint) {
                // re-added while still leased
                self.draining.swap_remove(i)
            } else {
                Slot {
                    endpoint: endpoint.clone(),
                    outstanding: 0,
                }
            };
            self.live.push(slot);
        }

        self.draining
            .extend(previous.into_iter().filter(|s| s.outstanding > 0));
    }
}
