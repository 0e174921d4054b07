/// Classifier interface
///
/// The model itself is opaque; the scanner only needs a ranked list of
/// (label, confidence) pairs for a cropped frame.
use crate::error::Result;
use crate::types::{Classification, ImageData};

/// Common interface for image classifiers
pub trait Classifier: Send {
    /// Classify one cropped frame, best match first
    fn classify(&mut self, image: &ImageData) -> Result<Vec<Classification>>;

    /// Get the classifier name (for logging/debugging)
    fn name(&self) -> &str;
}
