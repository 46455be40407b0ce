//! Reads logical header fields from a CRLF-normalized, seekable stream.
//!
//! Each call scans a bounded window for the first line break that is not
//! followed by a continuation character, hands back the field in both raw and
//! relaxed form, and leaves the stream positioned for the next call. When the
//! blank separator line is reached the stream is left at the first body byte.

use std::io::{Read, Seek, SeekFrom};

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::canonicalization::relax_header_field;
use crate::errors::DKIMError;

const READ_WINDOW: usize = 8192;

// A CRLF followed by anything that cannot start a continuation line. CR is a
// terminator on purpose: it is what cuts a field short of the blank separator
// line so the end-of-headers case is seen at offset zero on the next call.
static HEADER_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)\r\n[^\t \n]").unwrap());

/// One logical header field in the two representations the hashing core
/// needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    /// The bytes exactly as read, including continuation-line CRLFs.
    pub raw: Vec<u8>,
    /// The relaxed-canonical form: lower-cased name, collapsed whitespace,
    /// single trailing CRLF.
    pub relaxed: Vec<u8>,
}

impl HeaderField {
    /// The lower-cased field name.
    pub fn name(&self) -> &[u8] {
        match self.relaxed.iter().position(|&b| b == b':') {
            Some(idx) => &self.relaxed[..idx],
            None => &self.relaxed,
        }
    }
}

/// Reads the next logical header field, or `None` at the header/body
/// boundary (the stream is then positioned at the first body byte) and at
/// end of input.
pub fn next_header<R: Read + Seek>(r: &mut R) -> Result<Option<HeaderField>, DKIMError> {
    Ok(read_raw_header(r)?.map(|raw| {
        let relaxed = relax_header_field(&raw);
        HeaderField { raw, relaxed }
    }))
}

fn read_raw_header<R: Read + Seek>(r: &mut R) -> Result<Option<Vec<u8>>, DKIMError> {
    let start = r.stream_position()?;
    let mut buf = vec![0u8; READ_WINDOW];
    let n = read_window(r, &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);

    match HEADER_END.find(&buf) {
        None => {
            // No terminator in the window; treat everything read as the last
            // header. The stream is already positioned past it.
            Ok(Some(buf))
        }
        Some(m) if m.start() == 0 => {
            // Two consecutive line breaks: the header section is over. Leave
            // the stream just past the blank line.
            r.seek(SeekFrom::Start(start + 2))?;
            Ok(None)
        }
        Some(m) => {
            let end = m.end() - 1;
            r.seek(SeekFrom::Start(start + end as u64))?;
            buf.truncate(end);
            Ok(Some(buf))
        }
    }
}

// Read::read may return short counts; fill as much of the window as the
// stream has.
fn read_window<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_headers(input: &str) -> (Vec<HeaderField>, Vec<u8>) {
        let mut cursor = Cursor::new(input.as_bytes().to_vec());
        let mut fields = Vec::new();
        while let Some(field) = next_header(&mut cursor).unwrap() {
            fields.push(field);
        }
        let mut body = Vec::new();
        cursor.read_to_end(&mut body).unwrap();
        (fields, body)
    }

    #[test]
    fn test_single_header() {
        let (fields, _) = collect_headers("foo: bar\r\n");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].raw, b"foo: bar\r\n");
        assert_eq!(fields[0].relaxed, b"foo:bar\r\n");
    }

    #[test]
    fn test_case_preserved_in_raw() {
        let (fields, _) = collect_headers("Foo: bar\r\n");
        assert_eq!(fields[0].raw, b"Foo: bar\r\n");
        assert_eq!(fields[0].relaxed, b"foo:bar\r\n");
    }

    #[test]
    fn test_no_line_ending() {
        let (fields, _) = collect_headers("Foo: bar");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].raw, b"Foo: bar");
        assert_eq!(fields[0].relaxed, b"foo:bar\r\n");
    }

    #[test]
    fn test_multiple_headers() {
        let (fields, _) = collect_headers("Foo: bar\r\nBar: foo\r\n");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].raw, b"Foo: bar\r\n");
        assert_eq!(fields[1].raw, b"Bar: foo\r\n");
    }

    #[test]
    fn test_continuation_lines() {
        let (fields, _) = collect_headers("Foo: Bar\r\n with continuation\r\nBar: end\r\n");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].raw, b"Foo: Bar\r\n with continuation\r\n");
        assert_eq!(fields[0].relaxed, b"foo:Bar with continuation\r\n");
        assert_eq!(fields[1].raw, b"Bar: end\r\n");
        assert_eq!(fields[1].relaxed, b"bar:end\r\n");
    }

    #[test]
    fn test_body_boundary() {
        let (fields, body) =
            collect_headers("Foo: Bar\r\n with continuation\r\nBar: end\r\n\r\nHello");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].raw, b"Bar: end\r\n");
        assert_eq!(body, b"Hello");
    }

    #[test]
    fn test_field_name() {
        let (fields, _) = collect_headers("DKIM-Signature: v=1\r\n");
        assert_eq!(fields[0].name(), b"dkim-signature");
    }
}
