use std::path::{Path, PathBuf};

use crate::backend::GpuBackend;
use crate::error::ResourceCreationError;

/// Decoded RGBA8 pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    /// `None` unless `rgba` holds exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 4;
        (width > 0 && height > 0 && rgba.len() == expected).then_some(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            rgba: color.repeat(pixels),
        }
    }

    /// 2x2 magenta/black checkerboard bound when a texture fails to decode.
    pub fn checkerboard() -> Self {
        const MAGENTA: [u8; 4] = [255, 0, 255, 255];
        const BLACK: [u8; 4] = [0, 0, 0, 255];
        Self {
            width: 2,
            height: 2,
            rgba: [MAGENTA, BLACK, BLACK, MAGENTA].concat(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{0} has zero size")]
    Empty(PathBuf),
}

/// Turns an image file into RGBA8 pixels.
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<ImageData, ImageLoadError>;
}

/// Decodes TGA and PNG files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path) -> Result<ImageData, ImageLoadError> {
        let decoded = image::open(path).map_err(|source| ImageLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        ImageData::new(width, height, rgba.into_raw())
            .ok_or_else(|| ImageLoadError::Empty(path.to_path_buf()))
    }
}

/// GPU-resident image plus the validity flag set by the loader.
///
/// An invalid texture still owns a bindable fallback view.
pub struct Texture<B: GpuBackend> {
    view: B::TextureView,
    valid: bool,
    width: u32,
    height: u32,
}

impl<B: GpuBackend> Texture<B> {
    /// Decode `path` and upload it. Decode failures fall back to a
    /// checkerboard and leave [`Texture::is_valid`] false; upload failures
    /// are errors.
    pub fn load(
        backend: &mut B,
        loader: &dyn ImageLoader,
        path: &Path,
    ) -> Result<Self, ResourceCreationError> {
        match loader.load(path) {
            Ok(image) => {
                tracing::info!(
                    path = %path.display(),
                    width = image.width,
                    height = image.height,
                    "texture decoded"
                );
                Self::upload(backend, &image, true)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "texture failed to load; using fallback");
                Self::upload(backend, &ImageData::checkerboard(), false)
            }
        }
    }

    /// Upload already-decoded pixels.
    pub fn from_image(backend: &mut B, image: &ImageData) -> Result<Self, ResourceCreationError> {
        Self::upload(backend, image, true)
    }

    fn upload(backend: &mut B, image: &ImageData, valid: bool) -> Result<Self, ResourceCreationError> {
        let view = backend.create_texture("texture", image)?;
        Ok(Self {
            view,
            valid,
            width: image.width,
            height: image.height,
        })
    }

    pub fn view(&self) -> &B::TextureView {
        &self.view
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{FaultPlan, RecordingBackend, ResourceKind};
    use texgrid_common::DisplayConfig;

    fn backend() -> RecordingBackend {
        RecordingBackend::create(FaultPlan::default(), &DisplayConfig::default()).unwrap()
    }

    #[test]
    fn image_data_checks_length() {
        assert!(ImageData::new(2, 2, vec![0; 16]).is_some());
        assert!(ImageData::new(2, 2, vec![0; 15]).is_none());
        assert!(ImageData::new(0, 2, vec![]).is_none());
        assert_eq!(ImageData::solid(3, 1, [1, 2, 3, 4]).rgba.len(), 12);
    }

    #[test]
    fn loads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let image = FileImageLoader.load(&path).unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(&image.rgba[..4], &[10, 20, 30, 255]);

        let mut b = backend();
        let texture = Texture::load(&mut b, &FileImageLoader, &path).unwrap();
        assert!(texture.is_valid());
        assert_eq!(texture.dimensions(), (4, 2));
    }

    #[test]
    fn decode_failure_binds_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tga");
        std::fs::write(&path, b"not an image").unwrap();

        let mut b = backend();
        let texture = Texture::load(&mut b, &FileImageLoader, &path).unwrap();
        assert!(!texture.is_valid());
        assert_eq!(texture.dimensions(), (2, 2));
        assert_eq!(b.tracker().live_of(ResourceKind::Texture), 1);
    }

    #[test]
    fn missing_file_binds_fallback() {
        let mut b = backend();
        let texture =
            Texture::load(&mut b, &FileImageLoader, Path::new("/no/such/texture.tga")).unwrap();
        assert!(!texture.is_valid());
    }

    #[test]
    fn upload_failure_is_an_error() {
        let mut b = backend();
        b.set_faults(FaultPlan {
            textures: true,
            ..FaultPlan::default()
        });
        let result = Texture::from_image(&mut b, &ImageData::checkerboard());
        assert!(result.is_err());
    }
}
