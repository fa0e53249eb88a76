//! Image acquisition.
//!
//! Every way of getting a sheet into the grader (a file on disk, bytes piped
//! on stdin, a frame grabbed elsewhere) goes through [`ImageSource`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::RecognitionError;

/// A captured sheet ready to be sent for recognition.
#[derive(Debug, Clone)]
pub struct SheetImage {
    /// Encoded image data.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes` (e.g. "image/jpeg").
    pub mime_type: String,
    /// Where the image came from, for reports and logs.
    pub source: String,
}

impl SheetImage {
    /// Wrap encoded bytes, sniffing the MIME type from their header.
    pub fn from_bytes(bytes: Vec<u8>, source: impl Into<String>) -> Result<Self, RecognitionError> {
        let source = source.into();
        if bytes.is_empty() {
            return Err(RecognitionError::EmptyImage(source));
        }
        let mime_type = sniff_mime(&bytes).unwrap_or("image/jpeg").to_string();
        Ok(Self {
            bytes,
            mime_type,
            source,
        })
    }
}

/// Something that can produce a sheet image.
pub trait ImageSource: Send + Sync {
    /// Short description of the source (path, "stdin", ...).
    fn describe(&self) -> String;

    /// Produce the image.
    fn acquire(&self) -> Result<SheetImage>;
}

/// An image file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn acquire(&self) -> Result<SheetImage> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("failed to read image: {}", self.path.display()))?;
        let mut image = SheetImage::from_bytes(bytes, self.describe())?;
        if sniff_mime(&image.bytes).is_none() {
            if let Some(mime) = mime_from_extension(&self.path) {
                image.mime_type = mime.to_string();
            }
        }
        Ok(image)
    }
}

/// Image bytes already in memory.
#[derive(Debug, Clone)]
pub struct BytesSource {
    bytes: Vec<u8>,
    label: String,
}

impl BytesSource {
    pub fn new(bytes: Vec<u8>, label: impl Into<String>) -> Self {
        Self {
            bytes,
            label: label.into(),
        }
    }
}

impl ImageSource for BytesSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn acquire(&self) -> Result<SheetImage> {
        Ok(SheetImage::from_bytes(self.bytes.clone(), self.label.clone())?)
    }
}

/// Extensions accepted when scanning a directory for sheets.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "heic", "heif"];

/// List image files directly inside `dir`, sorted by name.
pub fn image_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && mime_from_extension(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else {
        None
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}
