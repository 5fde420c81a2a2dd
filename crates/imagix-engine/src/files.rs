use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use imagix_contracts::encoding::{extension_for_mime, mime_for_extension, EncodedImage};

/// Reads an image file into its base64 form. The MIME type comes from the
/// extension and defaults to PNG.
pub fn load_image_file(path: &Path) -> Result<EncodedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
        .unwrap_or("image/png");
    Ok(EncodedImage::new(mime, BASE64.encode(bytes)))
}

/// Decodes a data-URL and writes it as `<dir>/<stem>.<ext>`.
pub fn write_data_url(url: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
    let Some(image) = EncodedImage::from_data_url(url) else {
        bail!("not an image data URL");
    };
    let bytes = BASE64
        .decode(image.payload.as_bytes())
        .context("image data URL carries invalid base64")?;
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{stem}.{}", extension_for_mime(&image.mime_type)));
    fs::write(&path, bytes).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_then_export_preserves_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("ref.jpg");
        fs::write(&source, b"\xff\xd8\xffjpeg-bytes")?;

        let image = load_image_file(&source)?;
        assert_eq!(image.mime_type, "image/jpeg");

        let out = write_data_url(&image.to_data_url(), &temp.path().join("out"), "copy")?;
        assert_eq!(out.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(fs::read(out)?, b"\xff\xd8\xffjpeg-bytes");
        Ok(())
    }

    #[test]
    fn unknown_extension_defaults_to_png() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("ref.bin");
        fs::write(&source, b"raw")?;
        assert_eq!(load_image_file(&source)?.mime_type, "image/png");
        Ok(())
    }

    #[test]
    fn export_rejects_non_image_urls() {
        let temp = tempfile::tempdir().unwrap();
        assert!(write_data_url("https://example.test/a.png", temp.path(), "x").is_err());
        assert!(load_image_file(&temp.path().join("missing.png")).is_err());
    }
}
