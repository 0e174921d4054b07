// Scripted classifier used by the demo and the tests.
// It replays a fixed list of responses instead of running a model.

use crate::classifier::Classifier;
use crate::error::{Result, ScanError};
use crate::types::{Classification, ImageData};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStep {
    Results(Vec<Classification>),
    Fail(String),
}

/// Script file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierScript {
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
    /// Returned once the steps run out
    #[serde(default)]
    pub fallback: Vec<Classification>,
    /// Simulated inference latency
    #[serde(default)]
    pub latency_ms: u64,
}

/// Classifier that replays scripted results
pub struct ScriptedClassifier {
    steps: VecDeque<ScriptStep>,
    fallback: Vec<Classification>,
    latency: Duration,
    calls: Arc<AtomicUsize>,
}

impl ScriptedClassifier {
    pub fn new(script: ClassifierScript) -> Self {
        log::info!(
            "Creating scripted classifier ({} steps, {}ms latency)",
            script.steps.len(),
            script.latency_ms
        );
        Self {
            steps: script.steps.into(),
            fallback: script.fallback,
            latency: Duration::from_millis(script.latency_ms),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every frame with the same top label
    pub fn constant<S: Into<String>>(label: S, confidence: f32) -> Self {
        Self::new(ClassifierScript {
            fallback: vec![Classification::new(label, confidence)],
            ..Default::default()
        })
    }

    /// Load a JSON script, the stand-in for loading a model artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::model_load(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let script: ClassifierScript = serde_json::from_str(&content).map_err(|e| {
            ScanError::model_load(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Self::new(script))
    }

    /// Shared counter of classify calls
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&mut self, image: &ImageData) -> Result<Vec<Classification>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !image.validate() {
            return Err(ScanError::inference("Invalid input image"));
        }
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        match self.steps.pop_front() {
            Some(ScriptStep::Results(results)) => Ok(results),
            Some(ScriptStep::Fail(msg)) => Err(ScanError::inference(msg)),
            None => Ok(self.fallback.clone()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageFormat;

    fn frame() -> ImageData {
        ImageData::new(vec![0; 4 * 4 * 4], 4, 4, ImageFormat::BGRA)
    }

    #[test]
    fn test_replays_steps_then_fallback() {
        let mut classifier = ScriptedClassifier::new(ClassifierScript {
            steps: vec![
                ScriptStep::Results(vec![Classification::new("cardboard", 0.9)]),
                ScriptStep::Fail("boom".to_string()),
            ],
            fallback: vec![Classification::new("background", 0.99)],
            latency_ms: 0,
        });
        let calls = classifier.call_counter();

        assert_eq!(classifier.classify(&frame()).unwrap()[0].label, "cardboard");
        assert!(matches!(
            classifier.classify(&frame()),
            Err(ScanError::InferenceError(_))
        ));
        assert_eq!(classifier.classify(&frame()).unwrap()[0].label, "background");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_load_missing_script_is_model_error() {
        assert!(matches!(
            ScriptedClassifier::load("/nonexistent/model.json"),
            Err(ScanError::ModelLoadError(_))
        ));
    }

    #[test]
    fn test_load_script_file() {
        let path = std::env::temp_dir().join(format!("scripted_model_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "steps": [ { "results": [ { "label": "glass", "confidence": 0.8 } ] } ] }"#,
        )
        .unwrap();

        let mut classifier = ScriptedClassifier::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(classifier.classify(&frame()).unwrap()[0].label, "glass");
        assert!(classifier.classify(&frame()).unwrap().is_empty());
    }
}
