//! Byte decoding and CSV record iteration for export files

use csv::{ReaderBuilder, StringRecord};
use tracing::warn;

use crate::{Error, Result};

/// Decode raw file bytes to text.
///
/// UTF-8 (with or without BOM) and UTF-16LE with BOM are decoded as such;
/// any other byte sequence that is not valid UTF-8 is taken as Latin-1, which
/// never fails and keeps ASCII columns intact.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }

    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => body.iter().map(|&b| b as char).collect(),
    }
}

/// Pick the delimiter that occurs most often in the header line
pub fn sniff_delimiter(header_line: &str) -> u8 {
    [b',', b';', b'\t', b'|']
        .iter()
        .max_by_key(|&&d| header_line.matches(d as char).count())
        .copied()
        .filter(|&d| header_line.contains(d as char))
        .unwrap_or(b',')
}

/// A parsed CSV file: header plus the records that could be read
#[derive(Debug)]
pub struct CsvTable {
    pub file: String,
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
    /// Records the CSV layer itself rejected
    pub malformed: usize,
}

impl CsvTable {
    /// True when the file has no header line at all
    pub fn is_blank(&self) -> bool {
        self.headers.iter().all(|h| h.trim().is_empty())
    }
}

/// Parse `bytes` as a delimited table
pub fn read_table(file: &str, bytes: &[u8]) -> Result<CsvTable> {
    let text = decode_text(bytes);
    let header_line = text.lines().next().unwrap_or("");
    let delimiter = sniff_delimiter(header_line);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| Error::Csv {
            file: file.to_string(),
            message: e.to_string(),
        })?
        .clone();

    let mut records = Vec::new();
    let mut malformed = 0usize;
    for record in reader.records() {
        match record {
            Ok(r) if r.iter().all(|cell| cell.trim().is_empty()) => {}
            Ok(r) => records.push(r),
            Err(e) => {
                malformed += 1;
                warn!("{}: unreadable CSV record: {}", file, e);
            }
        }
    }

    Ok(CsvTable {
        file: file.to_string(),
        headers,
        records,
        malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_utf8_bom() {
        let bytes = b"\xEF\xBB\xBFemail,created_at\n";
        assert_eq!(decode_text(bytes), "email,created_at\n");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // "Zürich" in Latin-1
        let bytes = b"Z\xFCrich";
        assert_eq!(decode_text(bytes), "Zürich");
    }

    #[test]
    fn test_decode_utf16le_with_bom() {
        let bytes = [0xFF, 0xFE, b'h', 0, b'i', 0];
        assert_eq!(decode_text(&bytes), "hi");
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("email;created_at;plan"), b';');
        assert_eq!(sniff_delimiter("email\tcreated_at"), b'\t');
        assert_eq!(sniff_delimiter("email,created_at"), b',');
        assert_eq!(sniff_delimiter("email"), b',');
    }

    #[test]
    fn test_read_table_skips_blank_lines() {
        let table = read_table("f.csv", b"a,b\n1,2\n,\n3,4\n").unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.malformed, 0);
        assert!(!table.is_blank());
    }

    #[test]
    fn test_read_table_handles_quoted_commas() {
        let table = read_table("posts.csv", b"post_id,title\n1.a,\"Hello, world\"\n").unwrap();
        assert_eq!(table.records[0].get(1), Some("Hello, world"));
    }

    #[test]
    fn test_empty_file_is_blank() {
        let table = read_table("posts/1.opens.csv", b"").unwrap();
        assert!(table.is_blank());
        assert!(table.records.is_empty());
    }
}
