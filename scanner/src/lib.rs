//! Trash Scanner Library
//!
//! Real-time scanning core for a camera-driven trash classifier. Frames are
//! sampled at a fixed interval, center-cropped and classified off the
//! capture thread; a qualifying result opens a popup that closes itself
//! after a countdown or when the user dismisses it.

pub mod classifier;
pub mod classifier_stub;
pub mod classify_executor;
pub mod config;
pub mod coordinator;
pub mod countdown;
pub mod error;
pub mod frame_source;
pub mod preprocessing;
pub mod scan_gate;
pub mod session;
pub mod types;

pub use classifier::Classifier;
pub use classifier_stub::ScriptedClassifier;
pub use config::ScannerConfig;
pub use error::{Result, ScanError};
pub use session::{ScannerSession, SessionHandle};
pub use types::{
    Classification, DetectedItem, DismissReason, ImageData, ImageFormat, PopupState, ScanEvent,
    ScannerSnapshot, TrashCategory,
};

/// Initialize the scanner library
pub fn init() -> Result<()> {
    log::info!("Trash scanner library initialized (v{})", version());
    Ok(())
}

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
