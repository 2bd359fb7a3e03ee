//! Minimal DICOM Part-10 decoder.
//!
//! # Overview
//!
//! Builds an index of element value ranges over the original byte buffer
//! without copying or interpreting values. Only what the classifier needs is
//! kept:
//!
//! - file meta elements (group 0002, always explicit VR little endian)
//! - top-level dataset elements: tag → VR + value range
//! - every element nested inside sequence items: tag → value ranges in
//!   document order
//!
//! Defined and undefined lengths, item and sequence delimiters, and
//! encapsulated pixel data fragments are handled. Every read is bounds
//! checked; malformed input yields a [`DecodeError`], never a panic.

use std::collections::HashMap;
use std::ops::Range;

use super::tags::{
    ENCAPSULATED_DOCUMENT, ITEM, ITEM_DELIMITATION, MEDIA_STORAGE_SOP_CLASS_UID, PIXEL_DATA,
    SEQUENCE_DELIMITATION, TRANSFER_SYNTAX_UID, WAVEFORM_DATA,
};
use super::uids::{
    DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN, EXPLICIT_VR_BIG_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN,
};
use super::{Dataset, DecodeError, FormatDecoder, Tag, Vr};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
/// Smallest possible element header (tag + 32-bit length).
const MIN_HEADER_LEN: usize = 8;

/// Binary payload tags that are never sequences, whatever their bytes look like.
const BULK_DATA_TAGS: [Tag; 3] = [PIXEL_DATA, WAVEFORM_DATA, ENCAPSULATED_DOCUMENT];

/// Maximum depth of nested sequences accepted before giving up.
pub const MAX_NESTING: usize = 32;

/// Decoder for files carrying the 128-byte preamble and `DICM` marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Part10Decoder;

impl FormatDecoder for Part10Decoder {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn Dataset + 'a>, DecodeError> {
        Ok(Box::new(ParsedDataset::parse(bytes)?))
    }

    fn signature_len(&self) -> usize {
        PREAMBLE_LEN + MAGIC.len()
    }

    fn matches_signature(&self, head: &[u8]) -> bool {
        head.get(PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()) == Some(&MAGIC[..])
    }
}

/// Byte order and VR encoding of the dataset body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    ImplicitLittle,
    ExplicitLittle,
    ExplicitBig,
}

impl Encoding {
    fn from_transfer_syntax(uid: &str) -> Result<Self, DecodeError> {
        match uid {
            IMPLICIT_VR_LITTLE_ENDIAN => Ok(Self::ImplicitLittle),
            EXPLICIT_VR_BIG_ENDIAN => Ok(Self::ExplicitBig),
            DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => Err(DecodeError::Unsupported(uid.to_string())),
            // Every compressed syntax is explicit VR little endian with
            // encapsulated pixel data.
            _ => Ok(Self::ExplicitLittle),
        }
    }

    fn is_explicit(self) -> bool {
        !matches!(self, Self::ImplicitLittle)
    }
}

/// A top-level or meta element located in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Value representation, when the encoding is explicit.
    pub vr: Option<Vr>,
    /// Value bytes within the original buffer.
    pub range: Range<usize>,
}

/// Header fields of one element or item.
#[derive(Debug, Clone, Copy)]
struct Header {
    tag: Tag,
    vr: Option<Vr>,
    length: u32,
    offset: usize,
}

/// Where a run of elements stops.
#[derive(Debug, Clone, Copy)]
enum Bound {
    /// At a byte offset (defined-length item or end of file).
    End(usize),
    /// At an Item Delimitation Item (undefined-length item).
    ItemDelimiter,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    encoding: Encoding,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(match self.encoding {
            Encoding::ExplicitBig => u16::from_be_bytes([b[0], b[1]]),
            _ => u16::from_le_bytes([b[0], b[1]]),
        })
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(match self.encoding {
            Encoding::ExplicitBig => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            _ => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        })
    }

    /// Peek the group number of the next tag without consuming it.
    fn peek_group(&self) -> Option<u16> {
        let b = self.bytes.get(self.pos..self.pos + 2)?;
        Some(match self.encoding {
            Encoding::ExplicitBig => u16::from_be_bytes([b[0], b[1]]),
            _ => u16::from_le_bytes([b[0], b[1]]),
        })
    }

    /// Whether the next four bytes are an Item tag in the current byte order.
    fn at_item_tag(&self) -> bool {
        let mut probe = Cursor {
            bytes: self.bytes,
            pos: self.pos,
            encoding: self.encoding,
        };
        matches!((probe.u16(), probe.u16()), (Ok(g), Ok(e)) if Tag(g, e) == ITEM)
    }

    fn header(&mut self) -> Result<Header, DecodeError> {
        let offset = self.pos;
        let tag = Tag(self.u16()?, self.u16()?);

        // Items and delimiters never carry a VR, whatever the encoding.
        if tag.group() == 0xFFFE {
            let length = self.u32()?;
            return Ok(Header {
                tag,
                vr: None,
                length,
                offset,
            });
        }

        if self.encoding.is_explicit() {
            let code = self.take(2)?;
            let vr = Vr([code[0], code[1]]);
            let length = if vr.has_long_length() {
                self.take(2)?;
                self.u32()?
            } else {
                u32::from(self.u16()?)
            };
            Ok(Header {
                tag,
                vr: Some(vr),
                length,
                offset,
            })
        } else {
            let length = self.u32()?;
            Ok(Header {
                tag,
                vr: None,
                length,
                offset,
            })
        }
    }
}

/// Element index over a Part-10 file.
#[derive(Debug, Clone)]
pub struct ParsedDataset<'a> {
    bytes: &'a [u8],
    transfer_syntax: String,
    meta: HashMap<Tag, Element>,
    elements: HashMap<Tag, Element>,
    nested: HashMap<Tag, Vec<Range<usize>>>,
}

impl<'a> ParsedDataset<'a> {
    /// Decode a complete Part-10 file.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::NotDicom`] if the preamble/marker is missing
    /// - [`DecodeError::Unsupported`] for deflated transfer syntax
    /// - structural errors for malformed element streams
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        if bytes.len() < PREAMBLE_LEN + MAGIC.len()
            || &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] != MAGIC
        {
            return Err(DecodeError::NotDicom);
        }

        let mut dataset = Self {
            bytes,
            transfer_syntax: String::new(),
            meta: HashMap::new(),
            elements: HashMap::new(),
            nested: HashMap::new(),
        };

        let mut cursor = Cursor {
            bytes,
            pos: PREAMBLE_LEN + MAGIC.len(),
            encoding: Encoding::ExplicitLittle,
        };

        while cursor.remaining() >= MIN_HEADER_LEN && cursor.peek_group() == Some(0x0002) {
            let header = cursor.header()?;
            if header.length == UNDEFINED_LENGTH {
                return Err(DecodeError::UndefinedLength {
                    tag: header.tag,
                    offset: header.offset,
                });
            }
            let start = cursor.pos;
            cursor.take(header.length as usize)?;
            dataset.meta.entry(header.tag).or_insert(Element {
                vr: header.vr,
                range: start..cursor.pos,
            });
        }

        dataset.transfer_syntax = dataset
            .meta_string(TRANSFER_SYNTAX_UID)
            .unwrap_or(super::uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .to_string();
        cursor.encoding = Encoding::from_transfer_syntax(&dataset.transfer_syntax)?;

        dataset.read_elements(&mut cursor, Bound::End(bytes.len()), 0)?;

        log::trace!(
            "Decoded {} top-level elements ({} nested tags), transfer syntax {}",
            dataset.elements.len(),
            dataset.nested.len(),
            dataset.transfer_syntax
        );

        Ok(dataset)
    }

    /// Transfer syntax UID declared in the file meta group.
    #[must_use]
    pub fn transfer_syntax(&self) -> &str {
        &self.transfer_syntax
    }

    /// Top-level element, or file-meta element for group 0002 tags.
    #[must_use]
    pub fn element(&self, tag: Tag) -> Option<&Element> {
        if tag.group() == 0x0002 {
            self.meta.get(&tag)
        } else {
            self.elements.get(&tag)
        }
    }

    fn meta_string(&self, tag: Tag) -> Option<&'a str> {
        self.meta
            .get(&tag)
            .and_then(|e| decode_string(&self.bytes[e.range.clone()]))
    }

    /// Read elements until `bound`, recording them at `depth`.
    fn read_elements(
        &mut self,
        cursor: &mut Cursor<'a>,
        bound: Bound,
        depth: usize,
    ) -> Result<(), DecodeError> {
        loop {
            if let Bound::End(end) = bound {
                if cursor.pos >= end {
                    return Ok(());
                }
                // Trailing padding shorter than a header at the end of the file.
                if depth == 0 && end - cursor.pos < MIN_HEADER_LEN {
                    log::trace!("Ignoring {} trailing bytes", end - cursor.pos);
                    return Ok(());
                }
            }

            let header = cursor.header()?;
            match header.tag {
                ITEM_DELIMITATION if matches!(bound, Bound::ItemDelimiter) => return Ok(()),
                ITEM | ITEM_DELIMITATION | SEQUENCE_DELIMITATION => {
                    return Err(DecodeError::UnexpectedTag {
                        tag: header.tag,
                        offset: header.offset,
                    });
                }
                _ => {}
            }

            let range = self.read_value(cursor, header, depth)?;
            self.record(header, range, depth);
        }
    }

    /// Consume the value of `header`, descending into sequences.
    fn read_value(
        &mut self,
        cursor: &mut Cursor<'a>,
        header: Header,
        depth: usize,
    ) -> Result<Range<usize>, DecodeError> {
        let start = cursor.pos;

        if header.length == UNDEFINED_LENGTH {
            let is_sequence = header.vr.is_some_and(Vr::is_sequence)
                || header.vr == Some(Vr::UN)
                || (header.vr.is_none() && header.tag != PIXEL_DATA);
            let end = if is_sequence {
                // Undefined-length UN content is always implicit little endian.
                let saved = cursor.encoding;
                if header.vr == Some(Vr::UN) {
                    cursor.encoding = Encoding::ImplicitLittle;
                }
                let end = self.read_items(cursor, None, depth + 1);
                cursor.encoding = saved;
                end?
            } else {
                read_fragments(cursor)?
            };
            return Ok(start..end);
        }

        let value = cursor.take(header.length as usize)?;
        let range = start..cursor.pos;
        let mut inner = Cursor {
            bytes: cursor.bytes,
            pos: start,
            encoding: cursor.encoding,
        };

        if header.vr.is_some_and(Vr::is_sequence) {
            self.read_items(&mut inner, Some(range.end), depth + 1)?;
        } else if header.vr.is_none()
            && !value.is_empty()
            && !BULK_DATA_TAGS.contains(&header.tag)
            && inner.at_item_tag()
        {
            // Implicit VR gives no type; a value that merely starts like an
            // Item stays opaque when it does not parse as one.
            let snapshot = self.nested.clone();
            if let Err(e) = self.read_items(&mut inner, Some(range.end), depth + 1) {
                log::trace!(
                    "Treating {} at offset {} as opaque bytes: {e}",
                    header.tag,
                    header.offset
                );
                self.nested = snapshot;
            }
        }
        Ok(range)
    }

    /// Walk sequence items, returning the end offset of the sequence content.
    fn read_items(
        &mut self,
        cursor: &mut Cursor<'a>,
        end: Option<usize>,
        depth: usize,
    ) -> Result<usize, DecodeError> {
        if depth > MAX_NESTING {
            return Err(DecodeError::NestingTooDeep(MAX_NESTING));
        }

        loop {
            if let Some(end) = end {
                if cursor.pos >= end {
                    return Ok(end);
                }
            }

            let header = cursor.header()?;
            match header.tag {
                SEQUENCE_DELIMITATION if end.is_none() => return Ok(header.offset),
                ITEM if header.length == UNDEFINED_LENGTH => {
                    self.read_elements(cursor, Bound::ItemDelimiter, depth)?;
                }
                ITEM => {
                    let item_end = cursor
                        .pos
                        .checked_add(header.length as usize)
                        .filter(|&e| e <= end.unwrap_or(cursor.bytes.len()))
                        .ok_or(DecodeError::Truncated { offset: cursor.pos })?;
                    self.read_elements(cursor, Bound::End(item_end), depth)?;
                    if cursor.pos != item_end {
                        return Err(DecodeError::Truncated { offset: cursor.pos });
                    }
                }
                _ => {
                    return Err(DecodeError::UnexpectedTag {
                        tag: header.tag,
                        offset: header.offset,
                    });
                }
            }
        }
    }

    fn record(&mut self, header: Header, range: Range<usize>, depth: usize) {
        if depth == 0 {
            self.elements.entry(header.tag).or_insert(Element {
                vr: header.vr,
                range,
            });
        } else {
            self.nested.entry(header.tag).or_default().push(range);
        }
    }
}

/// Skip encapsulated pixel data fragments up to the sequence delimiter.
///
/// Returns the offset of the delimiter, i.e. the end of the fragment data.
fn read_fragments(cursor: &mut Cursor<'_>) -> Result<usize, DecodeError> {
    loop {
        let header = cursor.header()?;
        match header.tag {
            SEQUENCE_DELIMITATION => return Ok(header.offset),
            ITEM if header.length != UNDEFINED_LENGTH => {
                cursor.take(header.length as usize)?;
            }
            ITEM => {
                return Err(DecodeError::UndefinedLength {
                    tag: header.tag,
                    offset: header.offset,
                });
            }
            _ => {
                return Err(DecodeError::UnexpectedTag {
                    tag: header.tag,
                    offset: header.offset,
                });
            }
        }
    }
}

/// Interpret value bytes as text, dropping NUL/space padding.
fn decode_string(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes)
        .ok()
        .map(|s| s.trim_matches(|c: char| c == '\0' || c == ' '))
}

impl Dataset for ParsedDataset<'_> {
    fn string_value(&self, tag: Tag) -> Option<&str> {
        self.element(tag)
            .and_then(|e| decode_string(&self.bytes[e.range.clone()]))
    }

    fn raw_bytes(&self, tag: Tag) -> Option<&[u8]> {
        self.element(tag).map(|e| &self.bytes[e.range.clone()])
    }

    fn nested_raw_bytes(&self, tag: Tag) -> Vec<&[u8]> {
        self.nested
            .get(&tag)
            .map(|ranges| ranges.iter().map(|r| &self.bytes[r.clone()]).collect())
            .unwrap_or_default()
    }
}

/// SOP Class of the dataset, falling back to the file meta declaration.
#[must_use]
pub fn sop_class<'d>(dataset: &'d dyn Dataset) -> &'d str {
    dataset
        .string_value(super::tags::SOP_CLASS_UID)
        .filter(|s| !s.is_empty())
        .or_else(|| dataset.string_value(MEDIA_STORAGE_SOP_CLASS_UID))
        .unwrap_or("")
}
