// Path: crates/types/src/app/filter.rs

//! The consensus filter wire format.
//!
//! ```text
//! None: | 0x00 |
//! Mode: | 0x01 | path_len (u64 BE) | json_path |
//! MAD:  | 0x02 | max_sigma (u64 BE) | number_type (u8) | path_len (u64 BE) | json_path |
//! ```

use crate::error::TallyError;
use crate::numeric::Sigma;

/// Minimum length of a `Mode` filter input.
pub const MODE_HEADER_LEN: usize = 9;
/// Minimum length of a `MAD` filter input.
pub const MAD_HEADER_LEN: usize = 18;

/// The filter family named by the first byte of a filter input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Every reveal is accepted.
    None,
    /// Reveals must match the most frequent value.
    Mode,
    /// Reveals must lie within a fixed distance from the median.
    Mad,
}

impl FilterKind {
    /// The type byte identifying this filter.
    pub const fn type_byte(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Mode => 0x01,
            Self::Mad => 0x02,
        }
    }

    /// Reads the filter kind from the first byte of a filter input.
    pub fn from_input(input: &[u8]) -> Result<Self, TallyError> {
        match input.first() {
            Some(0x00) => Ok(Self::None),
            Some(0x01) => Ok(Self::Mode),
            Some(0x02) => Ok(Self::Mad),
            _ => Err(TallyError::InvalidFilterType),
        }
    }
}

/// The integer type the MAD filter parses reveal values into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberType {
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit unsigned integer.
    Uint32,
    /// 64-bit unsigned integer.
    Uint64,
}

impl NumberType {
    /// Decodes a number type tag.
    pub fn from_byte(byte: u8) -> Result<Self, TallyError> {
        match byte {
            0x00 => Ok(Self::Int32),
            0x01 => Ok(Self::Int64),
            0x02 => Ok(Self::Uint32),
            0x03 => Ok(Self::Uint64),
            other => Err(TallyError::InvalidNumberType(other)),
        }
    }

    /// The wire tag of this number type.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Int32 => 0x00,
            Self::Int64 => 0x01,
            Self::Uint32 => 0x02,
            Self::Uint64 => 0x03,
        }
    }
}

/// A decoded consensus filter input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterInput {
    /// Accept every reveal.
    None,
    /// Mode filter over the value at `json_path`.
    Mode {
        /// JSONPath selecting the compared value.
        json_path: String,
    },
    /// Median absolute deviation filter over the integer at `json_path`.
    Mad {
        /// Maximum tolerated distance from the median.
        max_sigma: Sigma,
        /// Integer type of the compared value.
        number_type: NumberType,
        /// JSONPath selecting the compared value.
        json_path: String,
    },
}

impl FilterInput {
    /// The filter family of this input.
    pub fn kind(&self) -> FilterKind {
        match self {
            Self::None => FilterKind::None,
            Self::Mode { .. } => FilterKind::Mode,
            Self::Mad { .. } => FilterKind::Mad,
        }
    }

    /// Decodes a filter input.
    pub fn decode(input: &[u8]) -> Result<Self, TallyError> {
        match FilterKind::from_input(input)? {
            FilterKind::None => Ok(Self::None),
            FilterKind::Mode => {
                let (header, path) = split_header(input, MODE_HEADER_LEN)?;
                let path_len = read_u64(header, 1)?;
                Ok(Self::Mode {
                    json_path: read_path(path, path_len)?,
                })
            }
            FilterKind::Mad => {
                let (header, path) = split_header(input, MAD_HEADER_LEN)?;
                let max_sigma = Sigma(read_u64(header, 1)?);
                let number_type = header
                    .get(9)
                    .copied()
                    .ok_or(TallyError::FilterInputTooShort {
                        expected: MAD_HEADER_LEN,
                        got: input.len(),
                    })
                    .and_then(NumberType::from_byte)?;
                let path_len = read_u64(header, 10)?;
                Ok(Self::Mad {
                    max_sigma,
                    number_type,
                    json_path: read_path(path, path_len)?,
                })
            }
        }
    }

    /// Encodes this filter input into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.kind().type_byte()];
        match self {
            Self::None => {}
            Self::Mode { json_path } => {
                out.extend_from_slice(&(json_path.len() as u64).to_be_bytes());
                out.extend_from_slice(json_path.as_bytes());
            }
            Self::Mad {
                max_sigma,
                number_type,
                json_path,
            } => {
                out.extend_from_slice(&max_sigma.to_be_bytes());
                out.push(number_type.as_byte());
                out.extend_from_slice(&(json_path.len() as u64).to_be_bytes());
                out.extend_from_slice(json_path.as_bytes());
            }
        }
        out
    }
}

fn split_header(input: &[u8], header_len: usize) -> Result<(&[u8], &[u8]), TallyError> {
    if input.len() < header_len {
        return Err(TallyError::FilterInputTooShort {
            expected: header_len,
            got: input.len(),
        });
    }
    Ok(input.split_at(header_len))
}

fn read_u64(header: &[u8], offset: usize) -> Result<u64, TallyError> {
    let bytes: [u8; 8] = header
        .get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or(TallyError::FilterInputTooShort {
            expected: offset + 8,
            got: header.len(),
        })?;
    Ok(u64::from_be_bytes(bytes))
}

fn read_path(path: &[u8], declared_len: u64) -> Result<String, TallyError> {
    if u64::try_from(path.len()).ok() != Some(declared_len) {
        return Err(TallyError::InvalidPathLen {
            expected: declared_len,
            got: path.len(),
        });
    }
    // A path that is not valid UTF-8 cannot select anything, so lossy decoding
    // yields the same outcome as rejecting it at parse time.
    Ok(String::from_utf8_lossy(path).into_owned())
}
