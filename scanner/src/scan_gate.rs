/// Scan gate - rate limits classification and pauses it while a popup is up
///
/// Shared between the frame delivery thread (which asks whether to scan) and
/// the UI context (which pauses and resumes). All fields sit behind one mutex
/// so check-and-record is atomic.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Proof that the gate accepted a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket {
    /// When the scan was accepted
    pub accepted_at: Instant,
    /// Pause epoch at acceptance time
    pub epoch: u64,
}

#[derive(Debug)]
struct GateState {
    last_scan: Option<Instant>,
    paused: bool,
    /// Incremented on every pause
    epoch: u64,
}

/// Rate limiter with pause/resume
#[derive(Debug)]
pub struct ScanGate {
    scan_interval: Duration,
    state: Mutex<GateState>,
}

impl ScanGate {
    /// Create a gate that accepts its first scan immediately
    pub fn new(scan_interval: Duration) -> Self {
        Self {
            scan_interval,
            state: Mutex::new(GateState {
                last_scan: None,
                paused: false,
                epoch: 0,
            }),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_due(&self, state: &GateState, now: Instant) -> bool {
        if state.paused {
            return false;
        }
        match state.last_scan {
            Some(last) => now.saturating_duration_since(last) >= self.scan_interval,
            None => true,
        }
    }

    /// True if not paused and a full interval has passed since the last scan
    pub fn should_scan(&self, now: Instant) -> bool {
        let state = self.state();
        self.is_due(&state, now)
    }

    /// Mark `now` as the last scan time
    pub fn record_scan(&self, now: Instant) {
        self.state().last_scan = Some(now);
    }

    /// Check and record in one step
    pub fn try_acquire(&self, now: Instant) -> Option<ScanTicket> {
        let mut state = self.state();
        if !self.is_due(&state, now) {
            return None;
        }
        state.last_scan = Some(now);
        Some(ScanTicket {
            accepted_at: now,
            epoch: state.epoch,
        })
    }

    /// Stop accepting scans. In-flight classification is not cancelled.
    pub fn pause(&self) {
        let mut state = self.state();
        state.paused = true;
        state.epoch += 1;
        log::debug!("Scan gate paused (epoch {})", state.epoch);
    }

    /// Accept scans again, but only a full interval after `now`
    pub fn resume(&self, now: Instant) {
        let mut state = self.state();
        state.paused = false;
        state.last_scan = Some(now);
        log::debug!(
            "Scan gate resumed, next scan in {:.1}s",
            self.scan_interval.as_secs_f32()
        );
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// True if no pause happened since the ticket was issued
    pub fn is_current(&self, ticket: &ScanTicket) -> bool {
        ticket.epoch == self.epoch()
    }
}
