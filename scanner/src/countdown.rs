/// Popup countdown with cancel-and-replace tick scheduling
///
/// `Countdown` is the state owned by the UI context. Ticks are produced by a
/// `TickScheduler` and tagged with the generation they were scheduled for;
/// every `start` bumps the generation so ticks from a replaced countdown are
/// rejected as stale.
use crossbeam::channel::{bounded, tick, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One tick delivered to the countdown owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub generation: u64,
}

/// Result of applying a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick belongs to a replaced or stopped countdown
    Stale,
    /// Still counting, seconds remaining
    Running(u32),
    /// Reached zero on this tick
    Expired,
}

/// How close the countdown is to running out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Calm,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    total: u32,
    remaining: u32,
    generation: u64,
    active: bool,
}

impl Countdown {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            remaining: 0,
            generation: 0,
            active: false,
        }
    }

    /// Start (or restart) from the full duration, returns the new generation
    pub fn start(&mut self) -> u64 {
        self.generation += 1;
        self.remaining = self.total;
        self.active = true;
        self.generation
    }

    /// Stop without expiring; pending ticks become stale
    pub fn stop(&mut self) {
        self.active = false;
        self.remaining = 0;
        self.generation += 1;
    }

    pub fn tick(&mut self, tick: CountdownTick) -> TickOutcome {
        if !self.active || tick.generation != self.generation {
            return TickOutcome::Stale;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.active = false;
            TickOutcome::Expired
        } else {
            TickOutcome::Running(self.remaining)
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Elapsed fraction of the countdown (0-1)
    pub fn progress(&self) -> f32 {
        if self.total == 0 || !self.active {
            return 0.0;
        }
        (self.total - self.remaining) as f32 / self.total as f32
    }

    pub fn urgency(&self) -> Urgency {
        let progress = self.progress();
        if progress > 0.7 {
            Urgency::Critical
        } else if progress > 0.4 {
            Urgency::Warning
        } else {
            Urgency::Calm
        }
    }
}

/// Source of repeating ticks for one countdown generation at a time
pub trait TickScheduler: Send {
    /// Begin ticking for `generation`, replacing any previous schedule
    fn schedule(&mut self, generation: u64, interval: Duration);

    /// Stop ticking
    fn cancel(&mut self);
}

type TickSink = Arc<dyn Fn(CountdownTick) -> bool + Send + Sync>;

/// Spawns a ticker thread per schedule
///
/// The sink returns false once its receiver is gone, which ends the thread.
pub struct ThreadTickScheduler {
    sink: TickSink,
    cancel_tx: Option<Sender<()>>,
}

impl ThreadTickScheduler {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(CountdownTick) -> bool + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
            cancel_tx: None,
        }
    }
}

impl TickScheduler for ThreadTickScheduler {
    fn schedule(&mut self, generation: u64, interval: Duration) {
        self.cancel();

        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let sink = Arc::clone(&self.sink);

        let spawned = thread::Builder::new()
            .name(format!("countdown-{}", generation))
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    crossbeam::select! {
                        // Sender dropped on cancel
                        recv(cancel_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if !sink(CountdownTick { generation }) {
                                break;
                            }
                        }
                    }
                }
                log::trace!("Countdown ticker {} stopped", generation);
            });

        match spawned {
            Ok(_) => self.cancel_tx = Some(cancel_tx),
            Err(e) => log::error!("Failed to spawn countdown ticker: {}", e),
        }
    }

    fn cancel(&mut self) {
        self.cancel_tx.take();
    }
}

impl Drop for ThreadTickScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
