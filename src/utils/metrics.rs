//! Observability and Metrics
//!
//! Process-wide counters for connections, logins, packets and pipeline
//! activity. Uses atomic counters so I/O tasks and the tick context can record
//! without coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Legacy (pre-framing) pings answered
    pub legacy_pings: AtomicU64,
    /// Login attempts (Hello received)
    pub logins_total: AtomicU64,
    /// Logins that reached Login Success
    pub logins_success: AtomicU64,
    /// Logins rejected (token mismatch, identity service, version)
    pub logins_failed: AtomicU64,
    /// Connections currently in play
    pub players_online: AtomicU64,
    /// Total packets sent
    pub packets_sent: AtomicU64,
    /// Total packets received
    pub packets_received: AtomicU64,
    /// Total frame bytes sent
    pub bytes_sent: AtomicU64,
    /// Total frame bytes received
    pub bytes_received: AtomicU64,
    /// Frames at or above the compression threshold
    pub compression_total: AtomicU64,
    /// Cipher sessions established
    pub encryption_sessions: AtomicU64,
    /// Keepalive pings that went unanswered
    pub keepalive_timeouts: AtomicU64,
    /// Transport-level failures
    pub connection_errors: AtomicU64,
    /// Protocol violations
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            legacy_pings: AtomicU64::new(0),
            logins_total: AtomicU64::new(0),
            logins_success: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            players_online: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            compression_total: AtomicU64::new(0),
            encryption_sessions: AtomicU64::new(0),
            keepalive_timeouts: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn legacy_ping(&self) {
        self.legacy_pings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_attempt(&self) {
        self.logins_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_success(&self) {
        self.logins_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_failed(&self) {
        self.logins_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn player_joined(&self) {
        self.players_online.fetch_add(1, Ordering::Relaxed);
    }

    pub fn player_left(&self) {
        self.players_online.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn packet_received(&self, byte_count: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_compressed(&self) {
        self.compression_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encryption_established(&self) {
        self.encryption_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keepalive_timeout(&self) {
        self.keepalive_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            legacy_pings: self.legacy_pings.load(Ordering::Relaxed),
            logins_total: self.logins_total.load(Ordering::Relaxed),
            logins_success: self.logins_success.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            players_online: self.players_online.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            compression_total: self.compression_total.load(Ordering::Relaxed),
            encryption_sessions: self.encryption_sessions.load(Ordering::Relaxed),
            keepalive_timeouts: self.keepalive_timeouts.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub legacy_pings: u64,
    pub logins_total: u64,
    pub logins_success: u64,
    pub logins_failed: u64,
    pub players_online: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub compression_total: u64,
    pub encryption_sessions: u64,
    pub keepalive_timeouts: u64,
    pub connection_errors: u64,
    pub protocol_errors: u64,
    pub uptime_seconds: u64,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
