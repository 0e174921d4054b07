/// Classify executor - single-worker async classification
///
/// Runs the classifier off the frame delivery thread:
/// - Always processes the latest frame in queue
/// - Drops older frames to stay current
/// - Hands every finished classification to a completion callback
use crate::classifier::Classifier;
use crate::error::{Result, ScanError};
use crate::scan_gate::ScanTicket;
use crate::types::{Classification, ImageData};
use image::RgbImage;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Configuration for the classify executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum queue depth before dropping frames (backpressure limit)
    pub max_queue_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig { max_queue_depth: 2 }
    }
}

/// A cropped frame waiting for classification
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    /// Session epoch the frame was captured in
    pub session: u64,
    pub ticket: ScanTicket,
    pub image: ImageData,
    pub captured_image: Option<RgbImage>,
}

/// Outcome of one classification
#[derive(Debug)]
pub struct ClassifyResponse {
    pub session: u64,
    pub ticket: ScanTicket,
    pub captured_image: Option<RgbImage>,
    pub result: Result<Vec<Classification>>,
    pub inference_time: Duration,
}

enum ClassifyCommand {
    Classify(ClassifyRequest),
    Shutdown,
}

/// Queues frames on a `ClassifyExecutor`
#[derive(Clone)]
pub struct ClassifySubmitter {
    command_tx: UnboundedSender<ClassifyCommand>,
}

impl ClassifySubmitter {
    pub fn submit(&self, request: ClassifyRequest) -> Result<()> {
        self.command_tx
            .send(ClassifyCommand::Classify(request))
            .map_err(|_| ScanError::session("Classify executor disconnected"))
    }
}

type CompletionFn = Box<dyn Fn(ClassifyResponse) + Send + Sync>;

/// Executor that classifies frames one at a time on a dedicated runtime
pub struct ClassifyExecutor {
    command_tx: UnboundedSender<ClassifyCommand>,
    classifier_name: String,
    runtime: Option<Runtime>,
}

impl ClassifyExecutor {
    /// Create a new executor with its own tokio runtime
    pub fn new<F>(
        classifier: Box<dyn Classifier>,
        config: ExecutorConfig,
        on_complete: F,
    ) -> Result<Self>
    where
        F: Fn(ClassifyResponse) + Send + Sync + 'static,
    {
        let (command_tx, command_rx) = unbounded_channel::<ClassifyCommand>();
        let classifier_name = classifier.name().to_string();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("classify-executor")
            .enable_all()
            .build()?;

        let max_queue_depth = config.max_queue_depth.max(1);
        let on_complete: CompletionFn = Box::new(on_complete);
        runtime.spawn(async move {
            Self::executor_loop(classifier, command_rx, max_queue_depth, on_complete).await;
        });

        Ok(ClassifyExecutor {
            command_tx,
            classifier_name,
            runtime: Some(runtime),
        })
    }

    pub fn classifier_name(&self) -> &str {
        &self.classifier_name
    }

    /// Queue a frame (non-blocking)
    pub fn submit(&self, request: ClassifyRequest) -> Result<()> {
        self.submitter().submit(request)
    }

    /// Cloneable handle for queueing frames from other threads
    pub fn submitter(&self) -> ClassifySubmitter {
        ClassifySubmitter {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Stop the worker; frames still queued are discarded
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(ClassifyCommand::Shutdown);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(2));
        }
    }

    async fn executor_loop(
        mut classifier: Box<dyn Classifier>,
        mut command_rx: UnboundedReceiver<ClassifyCommand>,
        max_queue_depth: usize,
        on_complete: CompletionFn,
    ) {
        log::info!("Classify executor started ({})", classifier.name());
        let mut frames_processed = 0_u64;
        let mut frames_dropped = 0_u64;
        let mut frames_failed = 0_u64;

        loop {
            let mut pending = VecDeque::new();

            match command_rx.recv().await {
                Some(cmd) => pending.push_back(cmd),
                None => break,
            }

            while let Ok(cmd) = command_rx.try_recv() {
                pending.push_back(cmd);
                if pending.len() > max_queue_depth {
                    pending.pop_front();
                    frames_dropped += 1;
                }
            }

            if pending
                .iter()
                .any(|cmd| matches!(cmd, ClassifyCommand::Shutdown))
            {
                break;
            }

            // Only the newest frame is worth classifying
            let Some(ClassifyCommand::Classify(request)) = pending.pop_back() else {
                continue;
            };
            frames_dropped += pending.len() as u64;

            let start = Instant::now();
            let result = tokio::task::block_in_place(|| classifier.classify(&request.image));
            let inference_time = start.elapsed();

            if let Err(e) = &result {
                frames_failed += 1;
                log::warn!("Classification failed, frame dropped: {}", e);
            }
            frames_processed += 1;

            on_complete(ClassifyResponse {
                session: request.session,
                ticket: request.ticket,
                captured_image: request.captured_image,
                result,
                inference_time,
            });

            if frames_processed % 100 == 0 {
                log::info!(
                    "Classify executor: {} processed, {} failed, {} dropped",
                    frames_processed,
                    frames_failed,
                    frames_dropped
                );
            }
        }

        log::info!(
            "Classify executor stopped: {} processed, {} failed, {} dropped",
            frames_processed,
            frames_failed,
            frames_dropped
        );
    }
}

impl Drop for ClassifyExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
