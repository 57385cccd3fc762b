// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded byte copy/concat into caller-supplied buffers.
//!
//! Neither function writes past `dst.len()`; on overflow nothing is written
//! and `BUFFER_TOO_SMALL` is returned.

use crate::error::{Error, Result};

/// Copy `src` to the start of `dst`. Returns bytes written.
pub fn copy_bounded(dst: &mut [u8], src: &[u8]) -> Result<usize> {
    if src.len() > dst.len() {
        return Err(Error::buffer_too_small(format!(
            "copy of {} bytes into {} byte buffer",
            src.len(),
            dst.len()
        )));
    }
    dst[..src.len()].copy_from_slice(src);
    Ok(src.len())
}

/// Append `src` after the first `used` bytes of `dst`. Returns the new used length.
pub fn concat_bounded(dst: &mut [u8], used: usize, src: &[u8]) -> Result<usize> {
    if used > dst.len() {
        return Err(Error::invalid(format!(
            "used length {} exceeds buffer {}",
            used,
            dst.len()
        )));
    }
    let written = copy_bounded(&mut dst[used..], src)?;
    Ok(used + written)
}

/// Header names are limited to `[A-Za-z0-9_-]`.
pub fn is_header_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_copy_exact_fit() {
        let mut buf = [0u8; 4];
        assert_eq!(copy_bounded(&mut buf, b"abcd").expect("fits"), 4);
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn test_copy_overflow_writes_nothing() {
        let mut buf = [b'x'; 3];
        let err = copy_bounded(&mut buf, b"abcd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferTooSmall);
        assert_eq!(&buf, b"xxx");
    }

    #[test]
    fn test_concat_sequence() {
        let mut buf = [0u8; 8];
        let used = concat_bounded(&mut buf, 0, b"GET ").expect("fits");
        let used = concat_bounded(&mut buf, used, b"/a").expect("fits");
        assert_eq!(&buf[..used], b"GET /a");
        let err = concat_bounded(&mut buf, used, b"bcd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferTooSmall);
        assert_eq!(&buf[..used], b"GET /a");
    }

    #[test]
    fn test_concat_rejects_bad_used() {
        let mut buf = [0u8; 2];
        assert_eq!(
            concat_bounded(&mut buf, 3, b"").unwrap_err().kind(),
            ErrorKind::Invalid
        );
    }

    #[test]
    fn test_header_name_bytes() {
        assert!(b"Content-Length".iter().all(|b| is_header_name_byte(*b)));
        assert!(b"X_Custom_9".iter().all(|b| is_header_name_byte(*b)));
        assert!(!is_header_name_byte(b' '));
        assert!(!is_header_name_byte(b':'));
    }
}
