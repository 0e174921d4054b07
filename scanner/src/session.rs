/// Scanner session - wires frames, gate, classifier and popup together
///
/// Threads involved:
/// - capture thread: pulls frames, asks the gate, crops, queues classification
/// - classify executor: runs the model, posts results to the UI channel
/// - countdown ticker: posts ticks to the UI channel
/// - UI context: whoever owns the session and calls `pump`; the only place
///   popup state changes
use crate::classifier::Classifier;
use crate::classify_executor::{
    ClassifyExecutor, ClassifyRequest, ClassifyResponse, ClassifySubmitter, ExecutorConfig,
};
use crate::config::ScannerConfig;
use crate::coordinator::{CoordinatorState, DetectionCoordinator, Ignored};
use crate::countdown::{CountdownTick, ThreadTickScheduler};
use crate::error::{Result, ScanError};
use crate::frame_source::FrameSource;
use crate::preprocessing::FramePreprocessor;
use crate::scan_gate::ScanGate;
use crate::types::{ScanEvent, ScannerSnapshot};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Messages delivered to the UI context
#[derive(Debug)]
pub enum UiMessage {
    Classified(ClassifyResponse),
    Tick(CountdownTick),
    Dismiss,
}

/// Capture thread counters
#[derive(Debug, Default)]
struct CaptureCounters {
    frames_received: AtomicU64,
    frames_scanned: AtomicU64,
    frames_rejected: AtomicU64,
}

/// Snapshot of capture counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureStats {
    pub frames_received: u64,
    /// Frames the gate accepted and handed to the classifier
    pub frames_scanned: u64,
    /// Accepted frames dropped by preprocessing
    pub frames_rejected: u64,
}

/// Posts commands to a session's UI context from any thread
#[derive(Clone)]
pub struct SessionHandle {
    ui_tx: Sender<UiMessage>,
}

impl SessionHandle {
    /// Request a popup dismiss; false if the session is gone
    pub fn dismiss(&self) -> bool {
        self.ui_tx.send(UiMessage::Dismiss).is_ok()
    }
}

struct CaptureWorker {
    handle: thread::JoinHandle<()>,
}

/// Everything the capture thread needs
struct CaptureContext {
    gate: Arc<ScanGate>,
    preprocessor: FramePreprocessor,
    submitter: ClassifySubmitter,
    running: Arc<AtomicBool>,
    session: u64,
    counters: Arc<CaptureCounters>,
}

pub struct ScannerSession {
    config: ScannerConfig,
    gate: Arc<ScanGate>,
    coordinator: DetectionCoordinator,
    executor: Option<ClassifyExecutor>,
    ui_tx: Sender<UiMessage>,
    ui_rx: Receiver<UiMessage>,
    events_rx: Receiver<ScanEvent>,
    capture: Option<CaptureWorker>,
    running: Arc<AtomicBool>,
    session_epoch: u64,
    counters: Arc<CaptureCounters>,
}

impl ScannerSession {
    /// Build a session around an already loaded classifier.
    ///
    /// A classifier load failure does not fail construction: it is reported
    /// once as a persistent error and the session refuses to start.
    pub fn new(config: ScannerConfig, classifier: Result<Box<dyn Classifier>>) -> Result<Self> {
        config.validate()?;

        let gate = Arc::new(ScanGate::new(config.scan_interval()));
        let (ui_tx, ui_rx) = unbounded::<UiMessage>();
        let (events_tx, events_rx) = bounded::<ScanEvent>(config.event_buffer.max(1));

        let tick_tx = ui_tx.clone();
        let scheduler =
            ThreadTickScheduler::new(move |tick| tick_tx.send(UiMessage::Tick(tick)).is_ok());
        let mut coordinator =
            DetectionCoordinator::new(&config, Arc::clone(&gate), Box::new(scheduler), events_tx);

        let executor = match classifier {
            Ok(classifier) => {
                log::info!("Using classifier '{}'", classifier.name());
                let result_tx = ui_tx.clone();
                let executor_config = ExecutorConfig {
                    max_queue_depth: config.executor_queue_depth,
                };
                Some(ClassifyExecutor::new(
                    classifier,
                    executor_config,
                    move |response| {
                        let _ = result_tx.send(UiMessage::Classified(response));
                    },
                )?)
            }
            Err(e) => {
                coordinator.report_model_failure(&e.to_string());
                None
            }
        };

        Ok(Self {
            config,
            gate,
            coordinator,
            executor,
            ui_tx,
            ui_rx,
            events_rx,
            capture: None,
            running: Arc::new(AtomicBool::new(false)),
            session_epoch: 0,
            counters: Arc::new(CaptureCounters::default()),
        })
    }

    /// Start pulling frames from `source` on a capture thread
    pub fn start(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        self.reap_capture();
        if self.capture.is_some() {
            log::debug!("Scanner session already running");
            return Ok(());
        }
        let executor = self.executor.as_ref().ok_or_else(|| {
            ScanError::model_load(
                self.coordinator
                    .error_message()
                    .unwrap_or("Classifier not loaded")
                    .to_string(),
            )
        })?;

        self.session_epoch += 1;
        self.running = Arc::new(AtomicBool::new(true));

        let ctx = CaptureContext {
            gate: Arc::clone(&self.gate),
            preprocessor: FramePreprocessor::new(self.config.crop_size),
            submitter: executor.submitter(),
            running: Arc::clone(&self.running),
            session: self.session_epoch,
            counters: Arc::clone(&self.counters),
        };

        let source_name = source.name().to_string();
        let handle = thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || capture_loop(source, ctx))?;

        self.capture = Some(CaptureWorker { handle });
        self.coordinator.set_session_running(true);
        log::info!(
            "Scanner session {} started ({}, scan every {:.1}s, crop {}px)",
            self.session_epoch,
            source_name,
            self.config.scan_interval_secs,
            self.config.crop_size
        );
        Ok(())
    }

    /// Stop capture; results still in flight are discarded when they arrive
    pub fn stop(&mut self) {
        let Some(worker) = self.capture.take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        self.finish_capture(worker);
    }

    /// Collect a capture thread that exited on its own (source ended or the
    /// executor went away) so the session reads as stopped
    fn reap_capture(&mut self) {
        if self.capture.is_none() || self.running.load(Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.capture.take() {
            log::info!("Capture ended without stop()");
            self.finish_capture(worker);
        }
    }

    fn finish_capture(&mut self, worker: CaptureWorker) {
        if worker.handle.join().is_err() {
            log::error!("Capture thread panicked");
        }

        self.coordinator.set_session_running(false);
        let stats = self.stats();
        log::info!(
            "Scanner session {} stopped: {} frames, {} scanned, {} rejected",
            self.session_epoch,
            stats.frames_received,
            stats.frames_scanned,
            stats.frames_rejected
        );
    }

    /// True while the capture thread is pulling frames
    pub fn is_running(&self) -> bool {
        self.capture.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Process UI messages for up to `timeout`, returns how many were handled
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut handled = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.ui_rx.recv_timeout(remaining) {
                Ok(msg) => {
                    self.handle_message(msg);
                    handled += 1;
                }
                Err(_) => break,
            }
        }

        self.reap_capture();
        handled
    }

    /// Process whatever is already queued without waiting
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(msg) = self.ui_rx.try_recv() {
            self.handle_message(msg);
            handled += 1;
        }
        self.reap_capture();
        handled
    }

    fn handle_message(&mut self, msg: UiMessage) {
        match msg {
            UiMessage::Classified(response) => {
                if response.session != self.session_epoch || !self.is_running() {
                    log::debug!(
                        "Discarding result from session {} (current {})",
                        response.session,
                        self.session_epoch
                    );
                    return;
                }
                match self.coordinator.handle_response(response) {
                    Ok(()) => {}
                    Err(Ignored::Background(label)) => log::debug!("Background frame: {}", label),
                    Err(Ignored::Failed(message)) => {
                        log::debug!("Dropping failed classification: {}", message)
                    }
                    Err(reason) => log::trace!("Classification ignored: {:?}", reason),
                }
            }
            UiMessage::Tick(tick) => {
                self.coordinator.on_tick(tick);
            }
            UiMessage::Dismiss => {
                self.coordinator.dismiss();
            }
        }
    }

    /// Dismiss the popup from the UI context
    pub fn dismiss(&mut self) -> bool {
        self.coordinator.dismiss()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            ui_tx: self.ui_tx.clone(),
        }
    }

    /// UI event stream
    pub fn events(&self) -> Receiver<ScanEvent> {
        self.events_rx.clone()
    }

    pub fn snapshot(&self) -> ScannerSnapshot {
        let mut snapshot = self.coordinator.snapshot();
        // Capture may have ended since the last pump
        snapshot.session_running &= self.is_running();
        snapshot
    }

    pub fn popup_visible(&self) -> bool {
        self.coordinator.state() == CoordinatorState::PopupVisible
    }

    pub fn coordinator(&self) -> &DetectionCoordinator {
        &self.coordinator
    }

    pub fn gate(&self) -> &Arc<ScanGate> {
        &self.gate
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_scanned: self.counters.frames_scanned.load(Ordering::Relaxed),
            frames_rejected: self.counters.frames_rejected.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(mut source: Box<dyn FrameSource>, ctx: CaptureContext) {
    log::info!("Capture thread started");
    run_capture(source.as_mut(), &ctx);
    ctx.running.store(false, Ordering::SeqCst);
    log::info!("Capture thread stopped");
}

fn run_capture(source: &mut dyn FrameSource, ctx: &CaptureContext) {
    while ctx.running.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame() else {
            log::info!("Frame source '{}' ended", source.name());
            break;
        };
        ctx.counters.frames_received.fetch_add(1, Ordering::Relaxed);

        let Some(ticket) = ctx.gate.try_acquire(Instant::now()) else {
            continue;
        };

        let prepared = ctx.preprocessor.crop_center(&frame).and_then(|image| {
            let captured = ctx.preprocessor.to_rgb_image(&image)?;
            Ok((image, captured))
        });

        match prepared {
            Ok((image, captured)) => {
                let request = ClassifyRequest {
                    session: ctx.session,
                    ticket,
                    image,
                    captured_image: Some(captured),
                };
                if let Err(e) = ctx.submitter.submit(request) {
                    log::error!("{}", e);
                    break;
                }
                ctx.counters.frames_scanned.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_per_frame() => {
                ctx.counters.frames_rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("Frame dropped before classification: {}", e);
            }
            Err(e) => {
                log::error!("Capture aborted: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier_stub::ScriptedClassifier;
    use crate::frame_source::SyntheticFrameSource;

    fn fast_config() -> ScannerConfig {
        ScannerConfig {
            scan_interval_secs: 0.05,
            popup_duration_secs: 2,
            tick_interval_ms: 20,
            crop_size: 32,
            ..Default::default()
        }
    }

    #[test]
    fn test_model_failure_blocks_start() {
        let mut session = ScannerSession::new(
            fast_config(),
            Err(ScanError::model_load("Failed to load model")),
        )
        .unwrap();
        let events = session.events();

        let err = session
            .start(Box::new(SyntheticFrameSource::new(64, 64, 100)))
            .unwrap_err();
        assert!(matches!(err, ScanError::ModelLoadError(_)));
        assert!(!session.is_running());

        let snapshot = session.snapshot();
        assert!(snapshot.error_message.unwrap().contains("Failed to load model"));
        assert!(!snapshot.session_running);

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], ScanEvent::Error(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScannerConfig {
            crop_size: 0,
            ..Default::default()
        };
        let classifier: Box<dyn Classifier> = Box::new(ScriptedClassifier::constant("paper", 0.9));
        assert!(matches!(
            ScannerSession::new(config, Ok(classifier)),
            Err(ScanError::ConfigError(_))
        ));
    }

    #[test]
    fn test_detection_then_auto_dismiss() {
        let classifier: Box<dyn Classifier> =
            Box::new(ScriptedClassifier::constant("cardboard box", 0.92));
        let mut session = ScannerSession::new(fast_config(), Ok(classifier)).unwrap();
        let events = session.events();

        session
            .start(Box::new(SyntheticFrameSource::new(64, 64, 100)))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !session.popup_visible() && Instant::now() < deadline {
            session.pump(Duration::from_millis(10));
        }
        assert!(session.popup_visible());
        let item = session.snapshot().active_item.unwrap();
        assert_eq!(item.name, "Cardboard Box");
        assert_eq!(item.captured_image.unwrap().dimensions(), (32, 32));
        assert!(session.gate().is_paused());

        while session.popup_visible() && Instant::now() < deadline {
            session.pump(Duration::from_millis(10));
        }
        assert!(!session.popup_visible());
        session.stop();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.first(), Some(&ScanEvent::SessionStarted));
        assert!(received.contains(&ScanEvent::PopupHidden {
            reason: crate::types::DismissReason::Expired
        }));
        assert_eq!(received.last(), Some(&ScanEvent::SessionStopped));
    }

    #[test]
    fn test_results_after_stop_are_discarded() {
        let classifier: Box<dyn Classifier> = Box::new(ScriptedClassifier::constant("glass", 0.9));
        let mut session = ScannerSession::new(fast_config(), Ok(classifier)).unwrap();

        session
            .start(Box::new(SyntheticFrameSource::new(64, 64, 100)))
            .unwrap();
        thread::sleep(Duration::from_millis(200));
        session.stop();

        session.pump(Duration::from_millis(100));
        assert!(!session.popup_visible());
        assert!(session.stats().frames_scanned >= 1);
    }
}
