use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// key: delivery-metrics -> injected counter sink
/// Shared by the ingress receiver and the dispatcher instead of a
/// process-wide metric registry; handed around as `Arc<DeliveryMetrics>`.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    accepted: AtomicU64,
    rejected_signature: AtomicU64,
    rejected_validation: AtomicU64,
    rejected_unmapped: AtomicU64,
    delivered: AtomicU64,
    delivery_failed: AtomicU64,
    dead_lettered: AtomicU64,
    cycles: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub accepted: u64,
    pub rejected_signature: u64,
    pub rejected_validation: u64,
    pub rejected_unmapped: u64,
    pub delivered: u64,
    pub delivery_failed: u64,
    pub dead_lettered: u64,
    pub cycles: u64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_signature(&self) {
        self.rejected_signature.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_validation(&self) {
        self.rejected_validation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_unmapped(&self) {
        self.rejected_unmapped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failed(&self) {
        self.delivery_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_signature: self.rejected_signature.load(Ordering::Relaxed),
            rejected_validation: self.rejected_validation.load(Ordering::Relaxed),
            rejected_unmapped: self.rejected_unmapped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
        }
    }
}
