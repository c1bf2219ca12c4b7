//! Image loading from local paths and HTTP(S) URLs.
//!
//! Every load produces a [`DecodedImage`] normalized to three 8-bit channels,
//! regardless of the source format (paletted, greyscale, with alpha, ...).

use std::path::PathBuf;
use std::time::Duration;

use image::{DynamicImage, RgbImage};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::HttpConfig;

/// Errors from loading an image reference.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("http request failed")]
    Fetch(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(StatusCode),

    #[error("could not read file")]
    Io(#[from] std::io::Error),

    #[error("could not decode image")]
    Decode(#[from] image::ImageError),
}

/// Where an image lives: a network location or a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    Remote(Url),
    Local(PathBuf),
}

impl ImageReference {
    /// Classify a raw reference. Only `http` and `https` URLs count as remote.
    pub fn parse(reference: &str) -> Self {
        match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => ImageReference::Remote(url),
            _ => ImageReference::Local(PathBuf::from(reference)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ImageReference::Remote(_))
    }
}

/// Color bitmap with blue-green-red channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BgrImage {
    /// Reorder an RGB bitmap into BGR.
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let data = rgb
            .as_raw()
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();
        Self {
            width: rgb.width(),
            height: rgb.height(),
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw interleaved `B, G, R` bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Iterate pixels as `[b, g, r]`.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|px| [px[0], px[1], px[2]])
    }
}

/// Two read-only views of the same source pixels.
///
/// `color` is in natural RGB order for the recognizers; `analysis` is the
/// BGR view consumed by the mode selector.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    color: RgbImage,
    analysis: BgrImage,
}

impl DecodedImage {
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::from_rgb(image.to_rgb8())
    }

    pub fn from_rgb(color: RgbImage) -> Self {
        let analysis = BgrImage::from_rgb(&color);
        Self { color, analysis }
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn analysis(&self) -> &BgrImage {
        &self.analysis
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }
}

/// Source of decoded images for the dispatcher.
pub trait ImageLoader: Send + Sync {
    fn load(&self, reference: &ImageReference) -> Result<DecodedImage, LoadError>;
}

/// Loads images from disk or over blocking HTTP.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
}

impl ImageFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, LoadError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        debug!("Fetching image from {}", url);
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status(status));
        }
        Ok(response.bytes()?.to_vec())
    }
}

impl ImageLoader for ImageFetcher {
    fn load(&self, reference: &ImageReference) -> Result<DecodedImage, LoadError> {
        let bytes = match reference {
            ImageReference::Remote(url) => self.fetch(url)?,
            ImageReference::Local(path) => std::fs::read(path)?,
        };
        let image = image::load_from_memory(&bytes)?;
        Ok(DecodedImage::from_dynamic(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, LumaA, Rgb};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(&HttpConfig::default()).unwrap()
    }

    /// Serve a single canned HTTP response and return its URL.
    fn serve_once(status: &'static str, content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                content_type,
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
        });
        format!("http://{}/image.png", addr)
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_reference_classification() {
        assert!(ImageReference::parse("https://example.com/a.png").is_remote());
        assert!(ImageReference::parse("http://example.com/a.png").is_remote());
        assert!(!ImageReference::parse("/tmp/a.png").is_remote());
        assert!(!ImageReference::parse("scans/a.png").is_remote());
        assert!(!ImageReference::parse("file:///tmp/a.png").is_remote());
        assert!(!ImageReference::parse(r"C:\scans\a.png").is_remote());
    }

    #[test]
    fn test_missing_local_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let reference = ImageReference::Local(dir.path().join("nope.png"));
        match fetcher().load(&reference) {
            Err(LoadError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected io error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_corrupt_local_file_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let result = fetcher().load(&ImageReference::Local(path));
        assert!(matches!(result, Err(LoadError::Decode(_))));
    }

    #[test]
    fn test_greyscale_input_is_normalized_to_rgb() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grey.png");
        GrayImage::from_pixel(4, 3, Luma([77])).save(&path).unwrap();

        let decoded = fetcher().load(&ImageReference::Local(path)).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert!(decoded.color().pixels().all(|p| *p == Rgb([77, 77, 77])));
        assert_eq!(decoded.analysis().as_raw().len(), 4 * 3 * 3);
    }

    #[test]
    fn test_alpha_channel_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alpha.png");
        image::ImageBuffer::from_pixel(2, 2, LumaA([200u8, 10])).save(&path).unwrap();

        let decoded = fetcher().load(&ImageReference::Local(path)).unwrap();
        assert_eq!(decoded.color().get_pixel(1, 1), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_analysis_view_is_bgr_ordered() {
        let rgb = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let decoded = DecodedImage::from_rgb(rgb);
        assert_eq!(decoded.analysis().as_raw(), &[30, 20, 10, 30, 20, 10]);
        assert_eq!(decoded.analysis().pixels().next(), Some([30, 20, 10]));
        assert_eq!((decoded.analysis().width(), decoded.analysis().height()), (2, 1));
    }

    #[test]
    fn test_remote_image_is_fetched_and_decoded() {
        let body = png_bytes(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            3,
            2,
            Rgb([1, 2, 3]),
        )));
        let url = serve_once("200 OK", "image/png", body);

        let decoded = fetcher().load(&ImageReference::parse(&url)).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.color().get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_remote_non_image_payload_is_decode_error() {
        let url = serve_once("200 OK", "text/html", b"<html>not an image</html>".to_vec());
        let result = fetcher().load(&ImageReference::parse(&url));
        assert!(matches!(result, Err(LoadError::Decode(_))));
    }

    #[test]
    fn test_remote_error_status_is_reported() {
        let url = serve_once("404 Not Found", "text/plain", b"missing".to_vec());
        match fetcher().load(&ImageReference::parse(&url)) {
            Err(LoadError::Status(status)) => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected status error, got {:?}", other.map(|_| ())),
        }
    }
}
