//! Firmware images
//!
//! Images are sparse: only the bytes a file actually defines are stored,
//! and programming touches only those words.

mod intel_hex;
mod sparse;

use std::fs;
use std::path::Path;

pub use intel_hex::{load_ihex_file, parse_ihex, to_ihex};
pub use sparse::{SparseImage, ERASED};

use crate::error::{Error, Result};

/// Largest span a `.bin` dump may cover
pub const MAX_BINARY_SPAN: u64 = 16 * 1024 * 1024;

fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"))
}

/// Load a firmware file
///
/// `.bin` paths are taken as a raw binary placed at offset 0. Everything
/// else must be Intel-HEX starting with a `:` record mark.
pub fn load_image_file(path: &Path) -> Result<SparseImage> {
    let data = fs::read(path)?;
    if is_binary_path(path) {
        log::debug!("Loading {} as raw binary", path.display());
        return Ok(SparseImage::from_bytes(0, &data, ERASED));
    }
    if data.first() != Some(&b':') {
        return Err(Error::HexFormat("file does not start with a ':' record"));
    }
    let text = String::from_utf8_lossy(&data);
    parse_ihex(&text)
}

/// Save an image
///
/// `.bin` paths get a dense dump from the lowest to the highest present
/// address (gaps filled with the default value, at most
/// [`MAX_BINARY_SPAN`] bytes); everything else is written as Intel-HEX.
pub fn save_image_file(path: &Path, image: &SparseImage) -> Result<()> {
    if !is_binary_path(path) {
        fs::write(path, to_ihex(image)?)?;
        return Ok(());
    }

    let data = match (image.min_address(), image.max_address()) {
        (Some(lo), Some(hi)) => {
            let span = hi - lo + 1;
            if span > MAX_BINARY_SPAN {
                return Err(Error::ArgumentOutOfRange("binary image span"));
            }
            let mut buf = vec![image.default_value(); span as usize];
            image.read(lo, &mut buf);
            buf
        }
        _ => Vec::new(),
    };
    fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tpiflasher-image-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_rejects_text_without_record_mark() {
        let path = temp_path("leading-newline.hex");
        fs::write(&path, "\n:0400000012345678E8\n:00000001FF\n").unwrap();
        let result = load_image_file(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::HexFormat(_))));

        let path = temp_path("bom.hex");
        fs::write(&path, b"\xEF\xBB\xBF:00000001FF\n").unwrap();
        let result = load_image_file(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::HexFormat(_))));
    }

    #[test]
    fn test_binary_only_by_extension() {
        let path = temp_path("raw.bin");
        fs::write(&path, [0x0A, 0x3A, 0x30]).unwrap();
        let image = load_image_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(image.iter().collect::<Vec<_>>(), vec![(0, 0x0A), (1, 0x3A), (2, 0x30)]);

        let path = temp_path("blink.hex");
        fs::write(&path, ":0400000012345678E8\n:00000001FF\n").unwrap();
        let image = load_image_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(image.get(3), 0x78);
    }

    #[test]
    fn test_binary_dump_span_is_capped() {
        let path = temp_path("sparse.bin");
        let mut image = SparseImage::default();
        image.insert(0, 0x01);
        image.insert(0x8000_0000, 0x02);
        assert!(matches!(
            save_image_file(&path, &image),
            Err(Error::ArgumentOutOfRange(_))
        ));
        assert!(!path.exists());

        let mut image = SparseImage::default();
        image.insert(2, 0x01);
        image.insert(4, 0x02);
        save_image_file(&path, &image).unwrap();
        let data = fs::read(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(data, vec![0x01, 0xFF, 0x02]);
    }
}
