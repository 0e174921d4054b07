/// Frame sources feeding the capture thread
///
/// Real camera stacks live outside this crate; they plug in by implementing
/// `FrameSource`. The sources here generate or replay frames for demos,
/// benchmarks and tests.
use crate::error::Result;
use crate::preprocessing::utils::load_frame;
use crate::types::{ImageData, ImageFormat};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Pull-style frame stream, called from the capture thread
pub trait FrameSource: Send {
    /// Next frame, or None when the stream has ended
    fn next_frame(&mut self) -> Option<ImageData>;

    /// Get the source name (for logging/debugging)
    fn name(&self) -> &str {
        "frame-source"
    }
}

/// Sleep off whatever is left of the frame budget
fn pace(last: &mut Option<Instant>, frame_interval: Duration) {
    if let Some(prev) = *last {
        let elapsed = prev.elapsed();
        if elapsed < frame_interval {
            thread::sleep(frame_interval - elapsed);
        }
    }
    *last = Some(Instant::now());
}

/// Generates a moving gradient at a fixed resolution and frame rate
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    bytes_per_row: usize,
    format: ImageFormat,
    frame_interval: Duration,
    max_frames: Option<u64>,
    frames_emitted: u64,
    last_frame: Option<Instant>,
}

impl SyntheticFrameSource {
    /// BGRA source, the layout camera stacks usually deliver
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            width,
            height,
            bytes_per_row: (width * ImageFormat::BGRA.channels()) as usize,
            format: ImageFormat::BGRA,
            frame_interval: Duration::from_millis(1000 / fps as u64),
            max_frames: None,
            frames_emitted: 0,
            last_frame: None,
        }
    }

    /// Stop after `max_frames` frames
    pub fn with_frame_limit(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Pad every row to `bytes_per_row`
    pub fn with_row_padding(mut self, padding: usize) -> Self {
        self.bytes_per_row = (self.width * self.format.channels()) as usize + padding;
        self
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    fn render(&self) -> ImageData {
        let bpp = self.format.channels() as usize;
        let shift = (self.frames_emitted % 256) as usize;
        let mut data = vec![0u8; self.bytes_per_row * self.height as usize];

        for (y, row) in data.chunks_exact_mut(self.bytes_per_row).enumerate() {
            for (x, px) in row[..self.width as usize * bpp].chunks_exact_mut(bpp).enumerate() {
                px[0] = ((x + shift) % 256) as u8;
                px[1] = (y % 256) as u8;
                px[2] = ((x ^ y) % 256) as u8;
                px[3] = 255;
            }
        }

        ImageData::with_stride(data, self.width, self.height, self.bytes_per_row, self.format)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&mut self) -> Option<ImageData> {
        if self
            .max_frames
            .is_some_and(|max| self.frames_emitted >= max)
        {
            return None;
        }

        pace(&mut self.last_frame, self.frame_interval);
        let frame = self.render();
        self.frames_emitted += 1;
        Some(frame)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Replays one still image as a camera stream
pub struct StillFrameSource {
    frame: ImageData,
    frame_interval: Duration,
    remaining: Option<u64>,
    last_frame: Option<Instant>,
}

impl StillFrameSource {
    pub fn new(frame: ImageData, fps: u32) -> Self {
        Self {
            frame,
            frame_interval: Duration::from_millis(1000 / fps.max(1) as u64),
            remaining: None,
            last_frame: None,
        }
    }

    /// Load an image file to replay
    pub fn open<P: AsRef<Path>>(path: P, fps: u32) -> Result<Self> {
        let frame = load_frame(path.as_ref())?;
        log::info!(
            "Replaying {} ({}x{})",
            path.as_ref().display(),
            frame.width,
            frame.height
        );
        Ok(Self::new(frame, fps))
    }

    pub fn with_frame_limit(mut self, max_frames: u64) -> Self {
        self.remaining = Some(max_frames);
        self
    }
}

impl FrameSource for StillFrameSource {
    fn next_frame(&mut self) -> Option<ImageData> {
        match self.remaining.as_mut() {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }

        pace(&mut self.last_frame, self.frame_interval);
        Some(self.frame.clone())
    }

    fn name(&self) -> &str {
        "still"
    }
}
