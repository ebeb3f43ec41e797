//! Intel-HEX input and output

use std::fs;
use std::path::Path;

use ihex::Record;

use super::sparse::SparseImage;
use crate::error::{Error, Result};

/// Bytes per data record in generated files
const RECORD_DATA_LEN: usize = 16;

/// How data record offsets are extended to full addresses
#[derive(Debug, Clone, Copy)]
enum AddressMode {
    /// Type 02: offset + (segment << 4)
    Segment(u64),
    /// Type 04: (upper << 16) | offset
    Linear(u64),
}

/// Parse Intel-HEX text into a new image (fill value 0xFF)
///
/// The whole file is validated before the image is returned, so a bad
/// record anywhere yields no image at all.
pub fn parse_ihex(text: &str) -> Result<SparseImage> {
    let mut image = SparseImage::default();
    let mut mode = AddressMode::Segment(0);
    let mut seen_eof = false;

    for record in ihex::Reader::new(text) {
        match record? {
            Record::Data { offset, value } => {
                for (i, byte) in value.iter().enumerate() {
                    let low = u64::from(offset) + i as u64;
                    let address = match mode {
                        AddressMode::Segment(base) => base + low,
                        AddressMode::Linear(upper) => upper | low,
                    };
                    image.insert(address, *byte);
                }
            }
            Record::EndOfFile => {
                seen_eof = true;
                break;
            }
            Record::ExtendedSegmentAddress(segment) => {
                mode = AddressMode::Segment(u64::from(segment) << 4);
            }
            Record::ExtendedLinearAddress(upper) => {
                mode = AddressMode::Linear(u64::from(upper) << 16);
            }
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
        }
    }

    if !seen_eof {
        return Err(Error::HexFormat("missing end-of-file record"));
    }

    log::debug!("Parsed {} bytes of Intel HEX data", image.len());
    Ok(image)
}

/// Read and parse an Intel-HEX file
pub fn load_ihex_file(path: &Path) -> Result<SparseImage> {
    let text = fs::read_to_string(path)?;
    parse_ihex(&text)
}

/// Render present bytes as Intel-HEX text
///
/// Contiguous runs become data records of at most 16 bytes. Extended linear
/// address records are emitted whenever the upper 16 address bits change.
pub fn to_ihex(image: &SparseImage) -> Result<String> {
    let mut records = Vec::new();
    let mut upper: u16 = 0;
    let mut pending: Option<(u64, Vec<u8>)> = None;

    for (address, value) in image.iter() {
        let continues = matches!(
            &pending,
            Some((start, data)) if start + data.len() as u64 == address
                && data.len() < RECORD_DATA_LEN
                && address & 0xFFFF != 0
        );

        if !continues {
            if let Some((start, data)) = pending.take() {
                records.push(Record::Data {
                    offset: (start & 0xFFFF) as u16,
                    value: data,
                });
            }
            let high = u16::try_from(address >> 16)
                .map_err(|_| Error::HexFormat("address does not fit in 32 bits"))?;
            if high != upper {
                records.push(Record::ExtendedLinearAddress(high));
                upper = high;
            }
            pending = Some((address, Vec::with_capacity(RECORD_DATA_LEN)));
        }

        if let Some((_, data)) = pending.as_mut() {
            data.push(value);
        }
    }

    if let Some((start, data)) = pending {
        records.push(Record::Data {
            offset: (start & 0xFFFF) as u16,
            value: data,
        });
    }
    records.push(Record::EndOfFile);

    Ok(ihex::create_object_file_representation(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_and_eof() {
        let text = ":0300000002C0FE3D\n:00000001FF\n";
        let image = parse_ihex(text).unwrap();
        assert_eq!(image.len(), 3);
        assert_eq!(image.get(0), 0x02);
        assert_eq!(image.get(1), 0xC0);
        assert_eq!(image.get(2), 0xFE);
        assert_eq!(image.get(3), 0xFF);
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        const GOOD: &str = ":0300100002C0FE2D\n";
        const FULL: &str = ":10000000000102030405060708090A0B0C0D0E0F78\n";
        const BAD: &str = ":10000000000102030405060708090A0B0C0D0E0F79\n";

        let intact = parse_ihex(&format!("{GOOD}{FULL}:00000001FF\n")).unwrap();
        assert_eq!(intact.len(), 19);
        assert_eq!(intact.get(0x0F), 0x0F);
        assert_eq!(intact.get(0x10), 0x02);

        // Neither the preceding record nor any byte of the bad one survives
        let result = parse_ihex(&format!("{GOOD}{BAD}:00000001FF\n"));
        assert!(matches!(result, Err(Error::HexRead(_))));
    }

    #[test]
    fn test_bad_record_after_good_yields_nothing() {
        let text = ":0300000002C0FE3D\n0300030001020300\n:00000001FF\n";
        assert!(parse_ihex(text).is_err());
    }

    #[test]
    fn test_missing_eof() {
        let text = ":0300000002C0FE3D\n";
        assert!(matches!(parse_ihex(text), Err(Error::HexFormat(_))));
    }

    #[test]
    fn test_segment_and_linear_addressing() {
        // Segment 0x1000 -> base 0x10000, then linear upper 0x0002
        let text = ":020000021000EC\n:0100040055A6\n:020000040002F8\n:01000100AA54\n:00000001FF\n";
        let image = parse_ihex(text).unwrap();
        assert_eq!(image.get_present(0x10004), Some(0x55));
        assert_eq!(image.get_present(0x20001), Some(0xAA));
        assert_eq!(image.len(), 2);
    }

    #[test]
    fn test_write_then_parse() {
        let mut image = SparseImage::default();
        image.write(0x0000, &[0x11; 20]);
        image.write(0x0100, &[0x22, 0x33]);
        image.write(0xFFFE, &[0x44, 0x55, 0x66, 0x77]);

        let text = to_ihex(&image).unwrap();
        assert!(text.ends_with(":00000001FF") || text.ends_with(":00000001FF\n"));
        assert!(text.contains(":020000040001F9"));

        let parsed = parse_ihex(&text).unwrap();
        assert_eq!(parsed, image);
    }
}
