//! Frame artifacts: the compressed capture that gets uploaded, and the
//! decoded RGBA grid the analyzers read.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;

/// JPEG quality used for camera captures.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("pixel buffer is {len} bytes, expected {width}x{height} RGBA")]
    BufferSize { width: u32, height: u32, len: usize },
    #[error("frame has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("image encode failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),
}

/// Compressed image artifact, the unit that is analyzed and uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Vec<u8>,
    mime: &'static str,
}

impl CapturedImage {
    /// Encode a rendered camera bitmap as JPEG.
    pub fn encode_jpeg(frame: RgbaImage, quality: u8) -> Result<Self, CaptureError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CaptureError::Empty {
                width: frame.width(),
                height: frame.height(),
            });
        }

        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgba8(frame).into_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(CaptureError::Encode)?;

        Ok(Self {
            bytes,
            mime: ImageFormat::Jpeg.to_mime_type(),
        })
    }

    /// Wrap a user-selected file as the artifact without re-encoding it.
    ///
    /// Only the container format is sniffed here; pixel decoding happens in
    /// the liveness check.
    pub fn from_upload(bytes: Vec<u8>) -> Result<Self, CaptureError> {
        let format = image::guess_format(&bytes).map_err(CaptureError::Decode)?;
        Ok(Self {
            bytes,
            mime: format.to_mime_type(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// Upload file name matching the artifact's format.
    pub fn file_name(&self) -> &'static str {
        match self.mime {
            "image/png" => "face.png",
            "image/webp" => "face.webp",
            _ => "face.jpg",
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Width × height grid of RGBA pixels, each channel in `[0, 255]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl DecodedFrame {
    /// Build a frame from a raw RGBA buffer of `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        if data.len() != width as usize * height as usize * 4 {
            return Err(CaptureError::BufferSize {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame where every pixel has the same colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            data: rgba.repeat(pixels),
        }
    }

    /// Decode a compressed artifact into RGBA pixels.
    pub fn decode(image: &CapturedImage) -> Result<Self, CaptureError> {
        let rgba = image::load_from_memory(image.bytes())
            .map_err(CaptureError::Decode)?
            .into_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(width, height, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / 4
    }

    /// RGB channels of the pixel at linear index `i`.
    pub fn rgb(&self, i: usize) -> (u8, u8, u8) {
        let p = &self.data[i * 4..i * 4 + 3];
        (p[0], p[1], p[2])
    }

    /// Broadcast luma of the pixel at linear index `i`.
    pub fn luma(&self, i: usize) -> f64 {
        let (r, g, b) = self.rgb(i);
        luma(r, g, b)
    }
}

/// `0.299 R + 0.587 G + 0.114 B`
pub fn luma(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        let err = DecodedFrame::from_rgba(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, CaptureError::BufferSize { len: 10, .. }));
    }

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(0, 0, 0), 0.0);
        assert!((luma(255, 255, 255) - 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let img = RgbaImage::from_pixel(32, 24, Rgba([120, 90, 60, 255]));
        let captured = CapturedImage::encode_jpeg(img, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(captured.mime(), "image/jpeg");
        assert_eq!(captured.file_name(), "face.jpg");
        // SOI marker
        assert_eq!(&captured.bytes()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_rejects_empty_bitmap() {
        let err = CapturedImage::encode_jpeg(RgbaImage::new(0, 480), 80).unwrap_err();
        assert!(matches!(err, CaptureError::Empty { width: 0, .. }));
    }

    #[test]
    fn test_decode_keeps_dimensions() {
        let img = RgbaImage::from_pixel(40, 30, Rgba([128, 128, 128, 255]));
        let captured = CapturedImage::encode_jpeg(img, 90).unwrap();
        let frame = DecodedFrame::decode(&captured).unwrap();
        assert_eq!((frame.width(), frame.height()), (40, 30));
        assert_eq!(frame.pixel_count(), 1200);
        // Flat grey survives compression almost exactly
        assert!((frame.luma(0) - 128.0).abs() < 3.0);
    }

    #[test]
    fn test_upload_sniffs_png() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        let upload = CapturedImage::from_upload(bytes.into_inner()).unwrap();
        assert_eq!(upload.mime(), "image/png");
        assert_eq!(upload.file_name(), "face.png");
    }

    #[test]
    fn test_upload_rejects_garbage() {
        assert!(CapturedImage::from_upload(b"not an image".to_vec()).is_err());
    }
}
