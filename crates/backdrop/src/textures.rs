//! Background texture decoding.
//!
//! Each load runs on its own worker thread and hands the decoded pixels back
//! over a channel. Workers never touch GPU objects; the engine drains the
//! channel at the start of a tick and uploads on the host thread. Once the
//! loader is dropped a late result has nowhere to go and is discarded.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use image::imageops::flip_vertical_in_place;
use image::GenericImageView;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, warn};

use crate::backend::TextureImage;
use crate::error::TextureError;
use crate::types::{TextureSource, CUBEMAP_FACE_STEMS};

const MAX_NOISE_SIZE: u32 = 4096;

/// Result of one background load, tagged with the uniform it belongs to.
#[derive(Debug)]
pub struct LoadedTexture {
    pub uniform: String,
    pub result: Result<TextureImage, TextureError>,
}

#[derive(Debug)]
pub struct TextureLoader {
    sender: Sender<LoadedTexture>,
    receiver: Receiver<LoadedTexture>,
    in_flight: usize,
}

impl Default for TextureLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureLoader {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            in_flight: 0,
        }
    }

    /// Starts decoding `source` for `uniform` on a worker thread.
    pub fn spawn(&mut self, uniform: &str, source: TextureSource) {
        let sender = self.sender.clone();
        let name = uniform.to_string();
        let spawned = thread::Builder::new()
            .name(format!("backdrop-texture-{uniform}"))
            .spawn(move || {
                let result = load_texture(&source);
                // The engine may have been detached meanwhile.
                let _ = sender.send(LoadedTexture {
                    uniform: name,
                    result,
                });
            });
        match spawned {
            Ok(_) => self.in_flight += 1,
            Err(err) => {
                warn!(uniform, error = %err, "failed to spawn texture loader thread");
            }
        }
    }

    /// Loads that have finished since the last call.
    pub fn drain(&mut self) -> Vec<LoadedTexture> {
        let finished: Vec<_> = self.receiver.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(finished.len());
        finished
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[cfg(test)]
    pub(crate) fn wait(&mut self, timeout: std::time::Duration) -> Option<LoadedTexture> {
        let loaded = self.receiver.recv_timeout(timeout).ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(loaded)
    }
}

/// Decodes or generates pixels for a texture source.
pub fn load_texture(source: &TextureSource) -> Result<TextureImage, TextureError> {
    match source {
        TextureSource::Image { path } => load_image(path),
        TextureSource::Cubemap { directory } => load_cubemap(directory),
        TextureSource::Noise { size, seed } => Ok(generate_noise(*size, *seed)),
    }
}

fn decode(path: &Path) -> Result<image::DynamicImage, TextureError> {
    image::open(path).map_err(|source| TextureError::Decode {
        path: path.display().to_string(),
        source,
    })
}

fn load_image(path: &Path) -> Result<TextureImage, TextureError> {
    let image = decode(path)?;
    let (width, height) = image.dimensions();
    let mut rgba = image.to_rgba8();
    // Row zero ends up at the bottom, matching GL texture coordinates.
    flip_vertical_in_place(&mut rgba);
    debug!(path = %path.display(), width, height, "decoded texture");
    Ok(TextureImage::Flat {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

fn load_cubemap(directory: &Path) -> Result<TextureImage, TextureError> {
    let mut size = None;
    let mut data = Vec::new();
    for face in CUBEMAP_FACE_STEMS {
        let face_path =
            find_cubemap_face(directory, face).ok_or_else(|| TextureError::MissingFace {
                directory: directory.display().to_string(),
                face: face.to_string(),
            })?;
        let image = decode(&face_path)?;
        let (width, height) = image.dimensions();
        if width != height || size.is_some_and(|expected| expected != width) {
            return Err(TextureError::FaceMismatch(format!(
                "{} is {width}x{height}",
                face_path.display()
            )));
        }
        size = Some(width);
        let mut rgba = image.to_rgba8();
        flip_vertical_in_place(&mut rgba);
        data.extend_from_slice(&rgba);
    }
    let size = size.unwrap_or(1);
    debug!(dir = %directory.display(), size, "decoded cubemap");
    Ok(TextureImage::Cube { size, rgba: data })
}

fn find_cubemap_face(directory: &Path, stem: &str) -> Option<PathBuf> {
    const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];
    EXTENSIONS
        .iter()
        .map(|ext| directory.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.exists())
}

/// Deterministic RGBA white noise, one independent byte per channel.
pub fn generate_noise(size: u32, seed: u64) -> TextureImage {
    let size = size.clamp(1, MAX_NOISE_SIZE);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rgba = vec![0u8; (size * size * 4) as usize];
    rng.fill_bytes(&mut rgba);
    for texel in rgba.chunks_exact_mut(4) {
        texel[3] = 255;
    }
    TextureImage::Flat {
        width: size,
        height: size,
        rgba,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::types::UniformKind;

    #[test]
    fn noise_is_deterministic_per_seed() {
        let a = generate_noise(16, 7);
        let b = generate_noise(16, 7);
        let c = generate_noise(16, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.dimensions(), (16, 16));
        assert!(a.pixels().chunks(4).all(|texel| texel[3] == 255));
    }

    #[test]
    fn noise_size_is_clamped() {
        assert_eq!(generate_noise(0, 1).dimensions(), (1, 1));
    }

    #[test]
    fn images_are_flipped_bottom_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stripe.png");
        let mut image = RgbaImage::from_pixel(1, 2, Rgba([255, 0, 0, 255]));
        image.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        image.save(&path).expect("save png");

        let loaded = load_texture(&TextureSource::Image { path }).expect("load");
        assert_eq!(loaded.kind(), UniformKind::Texture2D);
        assert_eq!(loaded.dimensions(), (1, 2));
        assert_eq!(&loaded.pixels()[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn missing_image_reports_path() {
        let err = load_texture(&TextureSource::Image {
            path: PathBuf::from("/nonexistent/backdrop.png"),
        })
        .expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/backdrop.png"));
    }

    #[test]
    fn cubemap_requires_all_faces() {
        let dir = tempfile::tempdir().expect("tempdir");
        for face in &CUBEMAP_FACE_STEMS[..5] {
            RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]))
                .save(dir.path().join(format!("{face}.png")))
                .expect("save face");
        }
        let source = TextureSource::Cubemap {
            directory: dir.path().to_path_buf(),
        };
        assert!(matches!(
            load_texture(&source),
            Err(TextureError::MissingFace { face, .. }) if face == "negz"
        ));

        RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]))
            .save(dir.path().join("negz.png"))
            .expect("save face");
        let cube = load_texture(&source).expect("complete cubemap");
        assert_eq!(cube.kind(), UniformKind::TextureCube);
        assert_eq!(cube.pixels().len(), 6 * 2 * 2 * 4);
    }

    #[test]
    fn loader_delivers_results_over_channel() {
        let mut loader = TextureLoader::new();
        loader.spawn("uNoise", TextureSource::Noise { size: 4, seed: 1 });
        assert_eq!(loader.in_flight(), 1);

        let loaded = loader.wait(Duration::from_secs(5)).expect("load finished");
        assert_eq!(loaded.uniform, "uNoise");
        assert!(loaded.result.is_ok());
        assert_eq!(loader.in_flight(), 0);
        assert!(loader.drain().is_empty());
    }
}
