//! Parsed-dataset abstraction consumed by the classification pipeline.
//!
//! The pipeline never walks the binary container itself. It asks a
//! [`FormatDecoder`] to turn raw file bytes into a [`Dataset`], then reads a
//! handful of string and byte-range elements from it.
//!
//! # Architecture
//!
//! - [`tags`]: element identifiers the classifier cares about
//! - [`uids`]: SOP Class and transfer syntax identifiers
//! - [`parser`]: a minimal Part-10 decoder ([`Part10Decoder`]) bundled so the
//!   binary works end to end
//!
//! # Example
//!
//! ```
//! use dicomdupe::dicom::{Dataset, FormatDecoder, Part10Decoder, DecodeError};
//!
//! let decoder = Part10Decoder;
//! let result = decoder.decode(b"not an imaging file");
//! assert!(matches!(result, Err(DecodeError::NotDicom)));
//! ```

pub mod parser;
pub mod tags;
pub mod uids;

use std::fmt;

pub use parser::{Element, ParsedDataset, Part10Decoder};

/// A data element identifier: `(group, element)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    /// Group number of the tag.
    #[must_use]
    pub fn group(self) -> u16 {
        self.0
    }

    /// Element number of the tag.
    #[must_use]
    pub fn element(self) -> u16 {
        self.1
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

/// Two-character value representation code of an explicit-VR element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vr(pub [u8; 2]);

impl Vr {
    /// Sequence of items.
    pub const SQ: Vr = Vr(*b"SQ");
    /// Unknown; contents of undefined length are implicit little endian.
    pub const UN: Vr = Vr(*b"UN");

    /// VRs whose explicit header carries two reserved bytes and a 32-bit length.
    #[must_use]
    pub fn has_long_length(self) -> bool {
        matches!(
            &self.0,
            b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN" | b"UR"
                | b"UT" | b"UV"
        )
    }

    /// Whether this VR is a sequence.
    #[must_use]
    pub fn is_sequence(self) -> bool {
        self == Self::SQ
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(self.0[0]), char::from(self.0[1]))
    }
}

/// Read access to a decoded dataset.
///
/// Byte slices borrow from the buffer the dataset was decoded from, so a
/// dataset never outlives the bytes of the file being processed.
pub trait Dataset {
    /// String value of a top-level element (or a file-meta element), with the
    /// format's trailing NUL/space padding removed.
    fn string_value(&self, tag: Tag) -> Option<&str>;

    /// Raw value bytes of a top-level element.
    fn raw_bytes(&self, tag: Tag) -> Option<&[u8]>;

    /// Raw value bytes of every occurrence of `tag` nested inside sequence
    /// items, in document order.
    fn nested_raw_bytes(&self, tag: Tag) -> Vec<&[u8]>;
}

/// Decoder collaborator turning file bytes into a [`Dataset`].
pub trait FormatDecoder: Send + Sync {
    /// Decode `bytes` into a dataset borrowing from them.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotDicom`] when the bytes are not in the
    /// container format at all, and other variants for malformed content.
    fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn Dataset + 'a>, DecodeError>;

    /// Number of leading bytes [`matches_signature`](Self::matches_signature)
    /// needs. Zero disables the early check.
    fn signature_len(&self) -> usize {
        0
    }

    /// Whether `head` (at most `signature_len` bytes) can start a file this
    /// decoder accepts. A `false` lets callers skip reading the rest.
    fn matches_signature(&self, _head: &[u8]) -> bool {
        true
    }
}

/// Errors produced while decoding a file.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The file does not start with the 128-byte preamble and `DICM` marker.
    #[error("Not a DICOM Part-10 file (missing DICM marker)")]
    NotDicom,

    /// The transfer syntax cannot be decoded by this decoder.
    #[error("Unsupported transfer syntax: {0}")]
    Unsupported(String),

    /// An element header or value runs past the end of the buffer.
    #[error("Truncated data at offset {offset}")]
    Truncated {
        /// Byte offset where reading failed
        offset: usize,
    },

    /// A tag appeared where the structure does not allow it.
    #[error("Unexpected tag {tag} at offset {offset}")]
    UnexpectedTag {
        /// The offending tag
        tag: Tag,
        /// Byte offset of its header
        offset: usize,
    },

    /// An undefined length was used where only defined lengths are valid.
    #[error("Undefined length for {tag} at offset {offset}")]
    UndefinedLength {
        /// The offending tag
        tag: Tag,
        /// Byte offset of its header
        offset: usize,
    },

    /// Sequences are nested deeper than the decoder accepts.
    #[error("Sequence nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag(0x7FE0, 0x0010).to_string(), "(7FE0,0010)");
        assert_eq!(Tag(0x0008, 0x0016).to_string(), "(0008,0016)");
    }

    #[test]
    fn test_vr_long_length() {
        assert!(Vr(*b"OB").has_long_length());
        assert!(Vr::SQ.has_long_length());
        assert!(!Vr(*b"UI").has_long_length());
        assert!(!Vr(*b"CS").has_long_length());
    }

    #[test]
    fn test_decode_error_display() {
        assert_eq!(
            DecodeError::Truncated { offset: 140 }.to_string(),
            "Truncated data at offset 140"
        );
        assert_eq!(
            DecodeError::Unsupported("1.2.840.10008.1.2.1.99".to_string()).to_string(),
            "Unsupported transfer syntax: 1.2.840.10008.1.2.1.99"
        );
    }
}
