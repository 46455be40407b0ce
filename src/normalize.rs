//! Line-ending normalization for message streams.
//!
//! DKIM canonicalization is defined over CRLF-terminated lines, but messages
//! arrive from mbox files, pipes and sockets with whatever endings the
//! transport left behind. [`NormalizingReader`] projects `LF`, bare `CR` and
//! `CRLF` all to `CRLF`, and can optionally undo SMTP dot-stuffing.
//! [`file_buffer`] drains any reader into an anonymous temp file so the
//! signing/verification core can seek back to the body after header parsing.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Wraps a byte source, yielding the same bytes with all line endings
/// rewritten to `CRLF`.
pub struct NormalizingReader<R> {
    inner: R,
    scratch: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    eof: bool,
    // True while the last input byte was a CR whose LF we already emitted.
    pending_lf: bool,
    // True while the last output byte was a LF (start-of-line for unstuffing).
    at_line_start: bool,
    unstuff: bool,
}

impl<R: Read> NormalizingReader<R> {
    pub fn new(inner: R) -> Self {
        NormalizingReader {
            inner,
            scratch: vec![0u8; 8192],
            out: Vec::new(),
            pos: 0,
            eof: false,
            pending_lf: false,
            at_line_start: false,
            unstuff: false,
        }
    }

    /// Remove SMTP dot-stuffing: a `.` immediately following a line break is
    /// dropped from the output.
    pub fn unstuff(mut self) -> Self {
        self.unstuff = true;
        self
    }

    fn refill(&mut self) -> io::Result<()> {
        self.out.clear();
        self.pos = 0;
        let n = self.inner.read(&mut self.scratch)?;
        if n == 0 {
            self.eof = true;
            return Ok(());
        }
        for i in 0..n {
            let b = self.scratch[i];
            match b {
                b'\r' => {
                    self.out.extend_from_slice(b"\r\n");
                    self.pending_lf = true;
                    self.at_line_start = true;
                }
                b'\n' => {
                    if self.pending_lf {
                        // Second half of a CRLF we already emitted.
                        self.pending_lf = false;
                    } else {
                        self.out.extend_from_slice(b"\r\n");
                        self.at_line_start = true;
                    }
                }
                b'.' if self.unstuff && self.at_line_start => {
                    self.pending_lf = false;
                    self.at_line_start = false;
                }
                _ => {
                    self.out.push(b);
                    self.pending_lf = false;
                    self.at_line_start = false;
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for NormalizingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.out.len() {
            if self.eof {
                return Ok(0);
            }
            self.refill()?;
        }
        let n = (self.out.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Drains `r` into an anonymous temp file and rewinds it.
///
/// The file is unlinked from the filesystem the moment it is created, so it
/// disappears on every exit path once the handle is dropped.
pub fn file_buffer<R: Read>(mut r: R) -> io::Result<File> {
    let mut file = tempfile::tempfile()?;
    io::copy(&mut r, &mut file)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}
