//! Shared fixtures for unit tests.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::bail;
use asset::{DecodedImage, PixelDecoder};
use gfx::SharedDevice;
use gfx::recording::RecordingDevice;

use crate::vertex::Vertex;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn recording_device() -> (Rc<RecordingDevice>, SharedDevice) {
    init_logging();
    let device = Rc::new(RecordingDevice::new());
    let shared: SharedDevice = device.clone();
    (device, shared)
}

pub fn triangle() -> (Vec<Vertex>, Vec<u32>) {
    let vertex = |x: f32, y: f32| Vertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        ..Vertex::default()
    };
    (
        vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0)],
        vec![0, 1, 2],
    )
}

/// Decoder returning a fixed image and logging every requested path.
pub struct FakeDecoder {
    image: DecodedImage,
    failing: Vec<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeDecoder {
    pub fn new(image: DecodedImage) -> Self {
        Self {
            image,
            failing: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn rgba(width: u32, height: u32) -> Self {
        Self::new(DecodedImage::new(
            width,
            height,
            4,
            vec![255; (width * height * 4) as usize],
        ))
    }

    /// Makes decoding fail for paths ending in `suffix`.
    pub fn failing(mut self, suffix: &str) -> Self {
        self.failing.push(suffix.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl PixelDecoder for FakeDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<DecodedImage> {
        let path = path.to_string_lossy().into_owned();
        self.calls.borrow_mut().push(path.clone());
        if self.failing.iter().any(|suffix| path.ends_with(suffix.as_str())) {
            bail!("no such file: {path}");
        }
        Ok(self.image.clone())
    }
}
