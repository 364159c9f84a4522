//! Encode/decode J2735 message frames to and from UPER bytes.
//!
//! The two public operations are [`encode`] (into a caller-supplied buffer) and [`decode`].
//! Both are stateless: every call builds its output from scratch, and a failed call leaves
//! nothing behind but the error. Errors carry the dotted path of the field that failed.

use crate::bits::BitWriter;
use crate::frame::{self, Frame};
use log::debug;

/// Fieldless discriminant of [`CodecError`], for matching without caring about the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingRequiredField,
    OutOfRangeValue,
    InvalidBitPattern,
    StructuralMismatch,
    MalformedStream,
    BufferTooSmall,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("missing required field: {path}")]
    MissingRequiredField { path: String },
    #[error("value {value} outside [{min}..{max}]: {path}")]
    OutOfRangeValue {
        path: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("unrecognised bit pattern {value:#x}: {path}")]
    InvalidBitPattern { path: String, value: u64 },
    #[error("structural mismatch at {path}: {reason}")]
    StructuralMismatch { path: String, reason: String },
    #[error("malformed stream at {path}: {reason}")]
    MalformedStream { path: String, reason: String },
    #[error("buffer too small: {required} bytes required, {available} available")]
    BufferTooSmall { required: usize, available: usize },
}

impl CodecError {
    pub(crate) fn missing(path: &str) -> Self {
        CodecError::MissingRequiredField {
            path: path.to_string(),
        }
    }

    pub(crate) fn out_of_range(path: &str, value: i64, min: i64, max: i64) -> Self {
        CodecError::OutOfRangeValue {
            path: path.to_string(),
            value,
            min,
            max,
        }
    }

    pub(crate) fn invalid_bits(path: &str, value: u64) -> Self {
        CodecError::InvalidBitPattern {
            path: path.to_string(),
            value,
        }
    }

    pub(crate) fn mismatch(path: &str, reason: impl Into<String>) -> Self {
        CodecError::StructuralMismatch {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CodecError::MalformedStream {
            path: String::new(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            CodecError::OutOfRangeValue { .. } => ErrorKind::OutOfRangeValue,
            CodecError::InvalidBitPattern { .. } => ErrorKind::InvalidBitPattern,
            CodecError::StructuralMismatch { .. } => ErrorKind::StructuralMismatch,
            CodecError::MalformedStream { .. } => ErrorKind::MalformedStream,
            CodecError::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
        }
    }

    /// Dotted path of the failing field; empty for errors that are not tied to a field.
    pub fn path(&self) -> &str {
        match self {
            CodecError::MissingRequiredField { path }
            | CodecError::OutOfRangeValue { path, .. }
            | CodecError::InvalidBitPattern { path, .. }
            | CodecError::StructuralMismatch { path, .. }
            | CodecError::MalformedStream { path, .. } => path,
            CodecError::BufferTooSmall { .. } => "",
        }
    }

    /// Prefix the error path with an enclosing field name.
    pub(crate) fn within(mut self, segment: &str) -> Self {
        if segment.is_empty() {
            return self;
        }
        match &mut self {
            CodecError::MissingRequiredField { path }
            | CodecError::OutOfRangeValue { path, .. }
            | CodecError::InvalidBitPattern { path, .. }
            | CodecError::StructuralMismatch { path, .. }
            | CodecError::MalformedStream { path, .. } => {
                *path = if path.is_empty() {
                    segment.to_string()
                } else {
                    format!("{}.{}", segment, path)
                };
            }
            CodecError::BufferTooSmall { .. } => {}
        }
        self
    }
}

/// Convert a bit count to the number of octets that hold it.
pub fn bits_to_bytes(bits: usize) -> usize {
    (bits + 7) / 8
}

/// Encode `frame` into `buf` and return the number of bytes written.
///
/// Validation runs before anything is copied: on error `buf` is untouched. When `buf` is
/// too short the error reports how many bytes the encoding needs.
pub fn encode(frame: &Frame, buf: &mut [u8]) -> Result<usize, CodecError> {
    let bytes = encode_to_vec(frame)?;
    if bytes.len() > buf.len() {
        debug!(
            "encode {:?}: need {} bytes, buffer holds {}",
            frame.message_id(),
            bytes.len(),
            buf.len()
        );
        return Err(CodecError::BufferTooSmall {
            required: bytes.len(),
            available: buf.len(),
        });
    }
    buf[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

/// Encode `frame` into a freshly allocated buffer.
pub fn encode_to_vec(frame: &Frame) -> Result<Vec<u8>, CodecError> {
    let mut w = BitWriter::with_capacity(64);
    if let Err(e) = frame::write_frame(&mut w, frame) {
        debug!("encode {:?} rejected: {}", frame.message_id(), e);
        return Err(e);
    }
    Ok(w.into_bytes())
}

/// Decode one message frame from the start of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Frame, CodecError> {
    decode_with_extent(bytes).1
}

/// Decode one frame and return `(bytes_consumed, result)`.
///
/// The envelope is parsed first, so the byte extent is known even when the payload fails
/// validation; [`frame::decode_frames`] relies on this to step over rejected frames.
/// `bytes_consumed` is zero only when the envelope itself cannot be read.
pub fn decode_with_extent(bytes: &[u8]) -> (usize, Result<Frame, CodecError>) {
    let envelope = match frame::read_envelope(bytes) {
        Ok(env) => env,
        Err(e) => {
            debug!("decode rejected envelope: {}", e);
            return (0, Err(e));
        }
    };
    let consumed = envelope.extent;
    let result = frame::adapt_payload(&envelope);
    if let Err(ref e) = result {
        debug!("decode message id {} rejected: {}", envelope.message_id, e);
    }
    (consumed, result)
}
