/// Detection coordinator - turns classifier output into popup state
///
/// Owned by the UI context. Two states:
/// - Idle: results that pass the filters open the popup
/// - PopupVisible: results are ignored until the countdown expires or the
///   user dismisses the popup
use crate::classify_executor::ClassifyResponse;
use crate::config::ScannerConfig;
use crate::countdown::{Countdown, CountdownTick, TickOutcome, TickScheduler};
use crate::scan_gate::{ScanGate, ScanTicket};
use crate::types::{
    Classification, DetectedItem, DismissReason, PopupState, ScanEvent, ScannerSnapshot,
};
use crossbeam::channel::{Sender, TrySendError};
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    PopupVisible,
}

/// Why a classification did not open the popup
#[derive(Debug, Clone, PartialEq)]
pub enum Ignored {
    PopupVisible,
    StaleTicket,
    NoResults,
    /// The classifier returned an error for this frame
    Failed(String),
    Background(String),
    LowConfidence(f32),
    FeatureDisabled,
}

pub struct DetectionCoordinator {
    gate: Arc<ScanGate>,
    countdown: Countdown,
    scheduler: Box<dyn TickScheduler>,
    tick_interval: Duration,
    background_labels: Vec<String>,
    min_confidence: f32,
    state: CoordinatorState,
    active_item: Option<DetectedItem>,
    error_message: Option<String>,
    session_running: bool,
    events: Sender<ScanEvent>,
}

impl DetectionCoordinator {
    pub fn new(
        config: &ScannerConfig,
        gate: Arc<ScanGate>,
        scheduler: Box<dyn TickScheduler>,
        events: Sender<ScanEvent>,
    ) -> Self {
        Self {
            gate,
            countdown: Countdown::new(config.popup_duration_secs),
            scheduler,
            tick_interval: config.tick_interval(),
            background_labels: config
                .background_labels
                .iter()
                .map(|l| l.trim().to_lowercase())
                .collect(),
            min_confidence: config.min_confidence,
            state: CoordinatorState::Idle,
            active_item: None,
            error_message: None,
            session_running: false,
            events,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn active_item(&self) -> Option<&DetectedItem> {
        self.active_item.as_ref()
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn snapshot(&self) -> ScannerSnapshot {
        ScannerSnapshot {
            popup: PopupState {
                visible: self.state == CoordinatorState::PopupVisible,
                countdown_remaining: self.countdown.remaining(),
                total_duration_secs: self.countdown.total(),
            },
            active_item: self.active_item.clone(),
            error_message: self.error_message.clone(),
            session_running: self.session_running,
        }
    }

    /// Apply a finished classification; per-frame failures are dropped
    pub fn handle_response(&mut self, response: ClassifyResponse) -> Result<(), Ignored> {
        match response.result {
            Ok(results) => {
                log::debug!(
                    "Classified in {:.1}ms: {:?}",
                    response.inference_time.as_secs_f32() * 1000.0,
                    results.first()
                );
                self.handle_classification(response.ticket, &results, response.captured_image)
            }
            Err(e) => Err(Ignored::Failed(e.to_string())),
        }
    }

    /// Idle -> PopupVisible if the top result qualifies as a detection
    pub fn handle_classification(
        &mut self,
        ticket: ScanTicket,
        results: &[Classification],
        captured_image: Option<RgbImage>,
    ) -> Result<(), Ignored> {
        if self.error_message.is_some() {
            return Err(Ignored::FeatureDisabled);
        }
        if self.state == CoordinatorState::PopupVisible {
            return Err(Ignored::PopupVisible);
        }
        if !self.gate.is_current(&ticket) {
            return Err(Ignored::StaleTicket);
        }

        let top = results.first().ok_or(Ignored::NoResults)?;
        if self.is_background(&top.label) {
            return Err(Ignored::Background(top.label.clone()));
        }
        if top.confidence.is_nan() || top.confidence < self.min_confidence {
            return Err(Ignored::LowConfidence(top.confidence));
        }

        self.gate.pause();

        let item = DetectedItem::from_classification(top, captured_image);
        log::info!(
            "Detected {} ({}, {:.0}%)",
            item.name,
            item.category,
            item.confidence * 100.0
        );

        let generation = self.countdown.start();
        self.scheduler.schedule(generation, self.tick_interval);
        self.state = CoordinatorState::PopupVisible;
        self.active_item = Some(item.clone());

        self.emit(ScanEvent::PopupShown(item));
        self.emit(ScanEvent::CountdownChanged {
            remaining: self.countdown.remaining(),
            total: self.countdown.total(),
        });
        Ok(())
    }

    /// Apply one countdown tick; returns true if it closed the popup
    pub fn on_tick(&mut self, tick: CountdownTick) -> bool {
        match self.countdown.tick(tick) {
            TickOutcome::Stale => false,
            TickOutcome::Running(remaining) => {
                self.emit(ScanEvent::CountdownChanged {
                    remaining,
                    total: self.countdown.total(),
                });
                false
            }
            TickOutcome::Expired => {
                self.emit(ScanEvent::CountdownChanged {
                    remaining: 0,
                    total: self.countdown.total(),
                });
                self.hide(DismissReason::Expired);
                true
            }
        }
    }

    /// User closed the popup; returns false if nothing was showing
    pub fn dismiss(&mut self) -> bool {
        if self.state != CoordinatorState::PopupVisible {
            return false;
        }
        self.hide(DismissReason::Dismissed);
        true
    }

    /// Model could not be loaded; scanning stays off for good
    pub fn report_model_failure(&mut self, message: &str) {
        log::error!("Classifier unavailable: {}", message);
        self.error_message = Some(message.to_string());
        self.emit(ScanEvent::Error(message.to_string()));
    }

    pub fn set_session_running(&mut self, running: bool) {
        if self.session_running == running {
            return;
        }
        self.session_running = running;
        if running {
            self.emit(ScanEvent::SessionStarted);
        } else {
            if self.state == CoordinatorState::PopupVisible {
                self.hide(DismissReason::SessionStopped);
            }
            self.scheduler.cancel();
            self.emit(ScanEvent::SessionStopped);
        }
    }

    fn hide(&mut self, reason: DismissReason) {
        self.scheduler.cancel();
        self.countdown.stop();
        self.active_item = None;
        self.state = CoordinatorState::Idle;
        self.gate.resume(Instant::now());

        log::info!("Popup hidden ({:?})", reason);
        self.emit(ScanEvent::PopupHidden { reason });
    }

    fn is_background(&self, label: &str) -> bool {
        let label = label.trim().to_lowercase();
        self.background_labels.iter().any(|b| *b == label)
    }

    fn emit(&self, event: ScanEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!("UI event buffer full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{unbounded, Receiver};
    use std::sync::Mutex;

    /// Records schedule/cancel calls instead of spawning threads
    #[derive(Clone, Default)]
    struct RecordingScheduler {
        log: Arc<Mutex<Vec<Option<u64>>>>,
    }

    impl TickScheduler for RecordingScheduler {
        fn schedule(&mut self, generation: u64, _interval: Duration) {
            self.log.lock().unwrap().push(Some(generation));
        }

        fn cancel(&mut self) {
            self.log.lock().unwrap().push(None);
        }
    }

    struct Harness {
        coordinator: DetectionCoordinator,
        gate: Arc<ScanGate>,
        events: Receiver<ScanEvent>,
        schedule_log: Arc<Mutex<Vec<Option<u64>>>>,
    }

    fn harness() -> Harness {
        let config = ScannerConfig::default();
        let gate = Arc::new(ScanGate::new(config.scan_interval()));
        let scheduler = RecordingScheduler::default();
        let schedule_log = Arc::clone(&scheduler.log);
        let (tx, rx) = unbounded();
        Harness {
            coordinator: DetectionCoordinator::new(
                &config,
                Arc::clone(&gate),
                Box::new(scheduler),
                tx,
            ),
            gate,
            events: rx,
            schedule_log,
        }
    }

    fn detect(h: &mut Harness, label: &str) -> Result<(), Ignored> {
        let ticket = ScanTicket {
            accepted_at: Instant::now(),
            epoch: h.gate.epoch(),
        };
        h.coordinator
            .handle_classification(ticket, &[Classification::new(label, 0.9)], None)
    }

    fn drain(events: &Receiver<ScanEvent>) -> Vec<ScanEvent> {
        events.try_iter().collect()
    }

    #[test]
    fn test_detection_opens_popup() {
        let mut h = harness();
        assert!(detect(&mut h, "cardboard").is_ok());

        assert_eq!(h.coordinator.state(), CoordinatorState::PopupVisible);
        assert!(h.gate.is_paused());
        let item = h.coordinator.active_item().unwrap();
        assert_eq!(item.name, "Cardboard");
        assert_eq!(item.category, crate::types::TrashCategory::Organic);

        let snapshot = h.coordinator.snapshot();
        assert!(snapshot.popup.visible);
        assert_eq!(snapshot.popup.countdown_remaining, 5);

        let events = drain(&h.events);
        assert!(matches!(events[0], ScanEvent::PopupShown(_)));
        assert_eq!(events[1], ScanEvent::CountdownChanged { remaining: 5, total: 5 });
        assert_eq!(*h.schedule_log.lock().unwrap(), vec![Some(1)]);
    }

    #[test]
    fn test_second_detection_ignored_while_visible() {
        let mut h = harness();
        assert!(detect(&mut h, "cardboard").is_ok());
        assert_eq!(detect(&mut h, "glass"), Err(Ignored::PopupVisible));

        assert_eq!(h.coordinator.active_item().unwrap().name, "Cardboard");
        let shown = drain(&h.events)
            .into_iter()
            .filter(|e| matches!(e, ScanEvent::PopupShown(_)))
            .count();
        assert_eq!(shown, 1);
    }

    #[test]
    fn test_background_and_empty_ignored() {
        let mut h = harness();
        assert_eq!(
            detect(&mut h, " Background "),
            Err(Ignored::Background(" Background ".to_string()))
        );

        let ticket = h.gate.try_acquire(Instant::now() + Duration::from_secs(10)).unwrap();
        assert_eq!(
            h.coordinator.handle_classification(ticket, &[], None),
            Err(Ignored::NoResults)
        );
        assert_eq!(h.coordinator.state(), CoordinatorState::Idle);
        assert!(!h.gate.is_paused());
    }

    #[test]
    fn test_stale_ticket_ignored() {
        let mut h = harness();
        let ticket = h.gate.try_acquire(Instant::now()).unwrap();
        h.gate.pause();
        h.gate.resume(Instant::now());

        assert_eq!(
            h.coordinator
                .handle_classification(ticket, &[Classification::new("metal", 0.9)], None),
            Err(Ignored::StaleTicket)
        );
    }

    #[test]
    fn test_countdown_expiry_hides_and_resumes() {
        let mut h = harness();
        detect(&mut h, "plastic bottle").unwrap();
        let generation = h.coordinator.countdown().generation();
        drain(&h.events);

        let closed: Vec<_> = (0..5)
            .map(|_| h.coordinator.on_tick(CountdownTick { generation }))
            .collect();
        assert_eq!(closed, vec![false, false, false, false, true]);

        assert_eq!(h.coordinator.state(), CoordinatorState::Idle);
        assert!(h.coordinator.active_item().is_none());
        assert!(!h.gate.is_paused());
        assert!(!h.gate.should_scan(Instant::now()));

        let events = drain(&h.events);
        assert_eq!(events.last(), Some(&ScanEvent::PopupHidden { reason: DismissReason::Expired }));
        let remaining: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::CountdownChanged { remaining, .. } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        // Late ticks from the finished countdown change nothing
        assert!(!h.coordinator.on_tick(CountdownTick { generation }));
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn test_dismiss_hides_and_invalidates_ticks() {
        let mut h = harness();
        detect(&mut h, "trash bag").unwrap();
        let generation = h.coordinator.countdown().generation();

        assert!(h.coordinator.dismiss());
        assert!(!h.coordinator.dismiss());
        assert!(!h.coordinator.on_tick(CountdownTick { generation }));

        let events = drain(&h.events);
        assert_eq!(
            events.last(),
            Some(&ScanEvent::PopupHidden { reason: DismissReason::Dismissed })
        );
        assert_eq!(*h.schedule_log.lock().unwrap(), vec![Some(1), None]);
    }

    #[test]
    fn test_new_popup_after_dismiss_restarts_countdown() {
        let mut h = harness();
        detect(&mut h, "cardboard").unwrap();
        let old = h.coordinator.countdown().generation();
        h.coordinator.on_tick(CountdownTick { generation: old });
        h.coordinator.dismiss();

        detect(&mut h, "glass").unwrap();
        assert_eq!(h.coordinator.countdown().remaining(), 5);
        assert!(!h.coordinator.on_tick(CountdownTick { generation: old }));
        assert_eq!(h.coordinator.countdown().remaining(), 5);
        assert_eq!(h.coordinator.active_item().unwrap().name, "Glass");
    }

    #[test]
    fn test_low_confidence_ignored() {
        let config = ScannerConfig {
            min_confidence: 0.6,
            ..Default::default()
        };
        let gate = Arc::new(ScanGate::new(config.scan_interval()));
        let (tx, _rx) = unbounded();
        let mut coordinator = DetectionCoordinator::new(
            &config,
            Arc::clone(&gate),
            Box::new(RecordingScheduler::default()),
            tx,
        );

        let ticket = gate.try_acquire(Instant::now()).unwrap();
        assert_eq!(
            coordinator.handle_classification(ticket, &[Classification::new("paper", 0.3)], None),
            Err(Ignored::LowConfidence(0.3))
        );
    }

    #[test]
    fn test_failed_classification_reported_as_failed() {
        let mut h = harness();
        let response = ClassifyResponse {
            session: 1,
            ticket: h.gate.try_acquire(Instant::now()).unwrap(),
            captured_image: None,
            result: Err(crate::error::ScanError::inference("corrupt tensor")),
            inference_time: Duration::from_millis(3),
        };

        match h.coordinator.handle_response(response) {
            Err(Ignored::Failed(message)) => assert!(message.contains("corrupt tensor")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(h.coordinator.state(), CoordinatorState::Idle);
        assert!(drain(&h.events).is_empty());
    }

    #[test]
    fn test_model_failure_disables_feature() {
        let mut h = harness();
        h.coordinator.report_model_failure("Failed to load model");

        assert_eq!(detect(&mut h, "cardboard"), Err(Ignored::FeatureDisabled));
        assert_eq!(
            h.coordinator.snapshot().error_message.as_deref(),
            Some("Failed to load model")
        );
        assert_eq!(drain(&h.events), vec![ScanEvent::Error("Failed to load model".to_string())]);
    }

    #[test]
    fn test_session_stop_closes_popup() {
        let mut h = harness();
        h.coordinator.set_session_running(true);
        detect(&mut h, "food").unwrap();

        h.coordinator.set_session_running(false);
        assert_eq!(h.coordinator.state(), CoordinatorState::Idle);

        let events = drain(&h.events);
        assert_eq!(events.first(), Some(&ScanEvent::SessionStarted));
        assert!(events.contains(&ScanEvent::PopupHidden { reason: DismissReason::SessionStopped }));
        assert_eq!(events.last(), Some(&ScanEvent::SessionStopped));
    }
}
