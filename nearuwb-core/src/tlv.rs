//! BER-TLV encoding and decoding.
//!
//! This module contains the tag-length-value codec used for every byte that
//! crosses the driver channel: outbound configuration-parameter sets, control
//! request payloads and inbound notification frames. It is pure data
//! manipulation - just `&[u8]` → `Result<T>` functions and a record builder,
//! with no I/O.
//!
//! # Format
//!
//! A record is `tag | length | value`. Tags are 1-3 bytes: the leading byte
//! carries the class (bits 7-6), the primitive/constructed flag (bit 5) and
//! the tag number (bits 4-0); a tag number of `0b11111` switches to long form
//! where each following byte contributes 7 bits and flags continuation in its
//! high bit. Lengths are one byte up to 127, otherwise an indicator byte
//! (`0x80 | n`) followed by `n` big-endian octets, at most four.
//!
//! Constructed records carry the concatenated encodings of their child
//! records as their value; primitive records carry raw bytes. The [`Builder`]
//! enforces that distinction at build time, before anything is sent anywhere.

use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Mask for the class bits of a leading tag byte
pub const TAG_CLASS_MASK: u8 = 0b1100_0000;

/// Constructed/primitive flag of a leading tag byte
pub const TAG_CONSTRUCTED_FLAG: u8 = 0b0010_0000;

/// Tag-number bits of a leading tag byte
pub const TAG_NUMBER_MASK: u8 = 0b0001_1111;

/// Tag-number value that switches the tag to long form
const TAG_LONG_FORM: u8 = 0b0001_1111;

/// Continuation flag of a long-form tag byte
const TAG_CONTINUATION_FLAG: u8 = 0x80;

/// Maximum supported encoded tag size
pub const MAX_TAG_BYTES: usize = 3;

/// Long-form flag of a length indicator byte
const LENGTH_LONG_FORM_FLAG: u8 = 0x80;

/// Maximum number of length octets following a long-form indicator
pub const MAX_LENGTH_OCTETS: usize = 4;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur while parsing or building TLV records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TlvError {
    /// Tag encoding needs more than [`MAX_TAG_BYTES`] bytes
    #[error("Tag exceeds {MAX_TAG_BYTES} bytes")]
    TagTooLong,

    /// A tag byte is not valid at its position
    #[error("Invalid tag byte {byte:#04X} at offset {offset}")]
    InvalidTagByte { byte: u8, offset: usize },

    /// Length indicator requires more than [`MAX_LENGTH_OCTETS`] octets
    #[error("Length encoding requires more than {MAX_LENGTH_OCTETS} octets")]
    LengthTooLong,

    /// Input ended before the declared amount of data
    #[error("Input truncated: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// `add_tlv` was used with a tag that encodes a primitive record
    #[error("Cannot add child records under a primitive tag")]
    ChildInPrimitive,

    /// `set_value` was used with a tag that encodes a constructed record
    #[error("Cannot set a primitive value under a constructed tag")]
    ValueInConstructed,
}

// =============================================================================
// Tag properties
// =============================================================================

/// Tag class from the two top bits of the leading tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl TagClass {
    /// Extract the class from a leading tag byte
    pub fn from_leading_byte(byte: u8) -> Self {
        match byte >> 6 {
            0b00 => TagClass::Universal,
            0b01 => TagClass::Application,
            0b10 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }
}

/// Whether a tag introduces raw bytes or nested records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Primitive,
    Constructed,
}

impl TagType {
    /// Extract the type from a leading tag byte
    pub fn from_leading_byte(byte: u8) -> Self {
        if byte & TAG_CONSTRUCTED_FLAG != 0 {
            TagType::Constructed
        } else {
            TagType::Primitive
        }
    }
}

/// A fully decoded tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTag {
    /// Tag class
    pub class: TagClass,
    /// Primitive or constructed
    pub tag_type: TagType,
    /// Decoded tag number
    pub number: u32,
    /// The raw tag bytes as they appeared on the wire
    pub bytes: Vec<u8>,
}

impl ParsedTag {
    /// Number of input bytes the tag occupied
    pub fn consumed(&self) -> usize {
        self.bytes.len()
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a tag from the front of `input`.
///
/// Fails if the tag would need more than three bytes, if a two-byte tag's
/// second byte is outside `0x1F..=0x7F`, or if the input ends mid-tag.
pub fn parse_tag(input: &[u8]) -> Result<ParsedTag, TlvError> {
    let &first = input.first().ok_or(TlvError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let class = TagClass::from_leading_byte(first);
    let tag_type = TagType::from_leading_byte(first);

    if first & TAG_NUMBER_MASK != TAG_LONG_FORM {
        return Ok(ParsedTag {
            class,
            tag_type,
            number: u32::from(first & TAG_NUMBER_MASK),
            bytes: vec![first],
        });
    }

    let &second = input.get(1).ok_or(TlvError::Truncated {
        needed: 2,
        available: input.len(),
    })?;
    if (0x1F..=0x7F).contains(&second) {
        return Ok(ParsedTag {
            class,
            tag_type,
            number: u32::from(second),
            bytes: vec![first, second],
        });
    }
    if second & TAG_CONTINUATION_FLAG == 0 {
        // Below 0x1F: would fit in the leading byte, not a valid long form
        return Err(TlvError::InvalidTagByte {
            byte: second,
            offset: 1,
        });
    }

    let &third = input.get(2).ok_or(TlvError::Truncated {
        needed: 3,
        available: input.len(),
    })?;
    if third & TAG_CONTINUATION_FLAG != 0 {
        return Err(TlvError::TagTooLong);
    }

    Ok(ParsedTag {
        class,
        tag_type,
        number: (u32::from(second & 0x7F) << 7) | u32::from(third),
        bytes: vec![first, second, third],
    })
}

/// Parse a length field from the front of `input`.
///
/// Returns `(length, bytes_consumed)`. Fails if the indicator byte requires
/// more than [`MAX_LENGTH_OCTETS`] following octets or the input is short.
pub fn parse_length(input: &[u8]) -> Result<(usize, usize), TlvError> {
    let &first = input.first().ok_or(TlvError::Truncated {
        needed: 1,
        available: 0,
    })?;
    if first & LENGTH_LONG_FORM_FLAG == 0 {
        return Ok((usize::from(first), 1));
    }

    let octets = usize::from(first & 0x7F);
    if octets > MAX_LENGTH_OCTETS {
        return Err(TlvError::LengthTooLong);
    }
    if input.len() < 1 + octets {
        return Err(TlvError::Truncated {
            needed: 1 + octets,
            available: input.len(),
        });
    }

    let mut length = 0usize;
    for &octet in &input[1..1 + octets] {
        length = (length << 8) | usize::from(octet);
    }
    Ok((length, 1 + octets))
}

/// Copy `declared` bytes of primitive value data from the front of `input`.
///
/// Returns `(value, bytes_consumed)`. Fails if fewer than `declared` bytes
/// remain.
pub fn parse_primitive_value(declared: usize, input: &[u8]) -> Result<(Vec<u8>, usize), TlvError> {
    if input.len() < declared {
        return Err(TlvError::Truncated {
            needed: declared,
            available: input.len(),
        });
    }
    Ok((input[..declared].to_vec(), declared))
}

/// Produce the minimum-size length encoding for `length`.
///
/// Short form up to 127, otherwise a long-form indicator plus the fewest
/// big-endian octets that represent the value (total 2..=5 bytes).
pub fn length_encoding(length: usize) -> Vec<u8> {
    if length <= 0x7F {
        vec![length as u8]
    } else if length < 1 << 8 {
        vec![0x81, length as u8]
    } else if length < 1 << 16 {
        vec![0x82, (length >> 8) as u8, length as u8]
    } else if length < 1 << 24 {
        vec![0x83, (length >> 16) as u8, (length >> 8) as u8, length as u8]
    } else {
        vec![
            0x84,
            (length >> 24) as u8,
            (length >> 16) as u8,
            (length >> 8) as u8,
            length as u8,
        ]
    }
}

// =============================================================================
// Record
// =============================================================================

/// An immutable BER-TLV record.
///
/// Obtained from [`Builder::build`] or [`TlvBer::parse`]. For constructed
/// records the value holds the concatenated encodings of the children, which
/// [`TlvBer::children`] re-parses on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvBer {
    /// Raw tag bytes (may be empty for a record built from an empty builder)
    pub tag: Vec<u8>,
    /// Value bytes
    pub value: Vec<u8>,
}

impl TlvBer {
    /// Start building a record
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Tag class, if the record has a tag
    pub fn class(&self) -> Option<TagClass> {
        self.tag.first().map(|&b| TagClass::from_leading_byte(b))
    }

    /// Primitive or constructed, if the record has a tag
    pub fn tag_type(&self) -> Option<TagType> {
        self.tag.first().map(|&b| TagType::from_leading_byte(b))
    }

    /// Serialize to `tag | length | value` wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.tag.len() + 5 + self.value.len());
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&length_encoding(self.value.len()));
        out.extend_from_slice(&self.value);
        out
    }

    /// Parse one record from the front of `input`.
    ///
    /// Returns the record and the number of bytes consumed. The value is kept
    /// raw; use [`TlvBer::children`] to descend into constructed records.
    pub fn parse(input: &[u8]) -> Result<(TlvBer, usize), TlvError> {
        let tag = parse_tag(input)?;
        let tag_len = tag.consumed();
        let (length, length_len) = parse_length(&input[tag_len..])?;
        let (value, value_len) = parse_primitive_value(length, &input[tag_len + length_len..])?;
        Ok((
            TlvBer {
                tag: tag.bytes,
                value,
            },
            tag_len + length_len + value_len,
        ))
    }

    /// Parse consecutive records until `input` is exhausted
    pub fn parse_all(input: &[u8]) -> Result<Vec<TlvBer>, TlvError> {
        let mut records = Vec::new();
        let mut offset = 0;
        while offset < input.len() {
            let (record, consumed) = TlvBer::parse(&input[offset..])?;
            records.push(record);
            offset += consumed;
        }
        Ok(records)
    }

    /// Parse the child records of a constructed record's value
    pub fn children(&self) -> Result<Vec<TlvBer>, TlvError> {
        TlvBer::parse_all(&self.value)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Mutable builder for [`TlvBer`] records.
///
/// Reusable: [`Builder::reset`] returns it to the empty state regardless of
/// what was built before. A tag whose leading byte encodes a primitive record
/// rejects [`Builder::add_tlv`]; a constructed tag rejects
/// [`Builder::set_value`]. Both violations are reported by
/// [`Builder::build`], never deferred.
#[derive(Debug, Default)]
pub struct Builder {
    tag: Vec<u8>,
    value: Vec<u8>,
    has_primitive_value: bool,
    has_children: bool,
}

impl Builder {
    /// Create an empty builder
    pub fn new() -> Self {
        Builder::default()
    }

    /// Set the raw tag bytes
    pub fn set_tag(&mut self, tag: impl AsRef<[u8]>) -> &mut Self {
        self.tag = tag.as_ref().to_vec();
        self
    }

    /// Set a primitive value, replacing any previous value
    pub fn set_value(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        self.value = value.as_ref().to_vec();
        self.has_primitive_value = true;
        self.has_children = false;
        self
    }

    /// Append a fully-encoded child record to the value
    pub fn add_tlv(&mut self, child: &TlvBer) -> &mut Self {
        if !self.has_children {
            self.value.clear();
        }
        self.value.extend_from_slice(&child.to_bytes());
        self.has_children = true;
        self.has_primitive_value = false;
        self
    }

    /// Clear all builder state. Idempotent, independent of prior builds.
    pub fn reset(&mut self) -> &mut Self {
        self.tag.clear();
        self.value.clear();
        self.has_primitive_value = false;
        self.has_children = false;
        self
    }

    /// Build the record, validating the tag/value combination.
    ///
    /// An empty builder yields a record with empty tag and empty value.
    pub fn build(&self) -> Result<TlvBer, TlvError> {
        if let Some(&leading) = self.tag.first() {
            let parsed = parse_tag(&self.tag)?;
            if parsed.consumed() != self.tag.len() {
                return Err(TlvError::InvalidTagByte {
                    byte: self.tag[parsed.consumed()],
                    offset: parsed.consumed(),
                });
            }
            match TagType::from_leading_byte(leading) {
                TagType::Primitive if self.has_children => return Err(TlvError::ChildInPrimitive),
                TagType::Constructed if self.has_primitive_value => {
                    return Err(TlvError::ValueInConstructed)
                }
                _ => {}
            }
        }
        Ok(TlvBer {
            tag: self.tag.clone(),
            value: self.value.clone(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
