use std::fmt;
use std::io::{self, Read};

use crate::{Value, ValueMap, tag};

/// Upper bound on speculative preallocation for arrays, maps, and
/// strings. The declared count is attacker-controlled; anything beyond
/// this grows organically as elements actually decode.
const PREALLOC_LIMIT: usize = 4096;

/// Why a value frame failed to decode.
#[derive(Debug)]
pub enum DecodeError {
    /// The underlying reader failed or ran dry mid-frame.
    Io(io::Error),
    /// The tag byte is not assigned.
    UnsupportedTag(u8),
    /// A float frame nested something other than its bit-carrier integer.
    BadFloatFrame {
        /// The float tag that was being decoded.
        float: u8,
        /// Variant name of the nested value actually found.
        found: &'static str,
    },
    /// A string body was not valid UTF-8.
    BadUtf8(std::string::FromUtf8Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Io(e) => write!(f, "i/o error: {e}"),
            DecodeError::UnsupportedTag(t) => write!(f, "unsupported code: {t}"),
            DecodeError::BadFloatFrame { float, found } => {
                write!(f, "float tag {float} nests a {found} frame")
            }
            DecodeError::BadUtf8(e) => write!(f, "invalid utf-8 in string: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(e) => Some(e),
            DecodeError::BadUtf8(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        DecodeError::Io(e)
    }
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

impl Value {
    /// Reads exactly one value frame, leaving the reader positioned after
    /// it. Short reads surface as [`DecodeError::Io`]; an unassigned tag
    /// is [`DecodeError::UnsupportedTag`] and consumes only the tag byte.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Value, DecodeError> {
        let tag = read_u8(reader)?;
        match tag {
            tag::NIL => Ok(Value::Nil),
            tag::FALSE => Ok(Value::Bool(false)),
            tag::TRUE => Ok(Value::Bool(true)),
            tag::F32 => match Value::decode(reader)? {
                Value::U32(bits) => Ok(Value::F32(f32::from_bits(bits))),
                other => Err(DecodeError::BadFloatFrame {
                    float: tag,
                    found: other.type_name(),
                }),
            },
            tag::F64 => match Value::decode(reader)? {
                Value::U64(bits) => Ok(Value::F64(f64::from_bits(bits))),
                other => Err(DecodeError::BadFloatFrame {
                    float: tag,
                    found: other.type_name(),
                }),
            },
            tag::U8 => Ok(Value::U8(read_u8(reader)?)),
            tag::U16 => Ok(Value::U16(read_u16(reader)?)),
            tag::U32 => Ok(Value::U32(read_u32(reader)?)),
            tag::U64 => Ok(Value::U64(read_u64(reader)?)),
            tag::I8 => Ok(Value::I8(read_u8(reader)? as i8)),
            tag::I16 => Ok(Value::I16(read_u16(reader)? as i16)),
            tag::I32 => Ok(Value::I32(read_u32(reader)? as i32)),
            tag::I64 => Ok(Value::I64(read_u64(reader)? as i64)),
            tag::STR32 => {
                let n = read_u32(reader)? as usize;
                if n == 0 {
                    return Ok(Value::Str(String::new()));
                }
                let mut data = Vec::with_capacity(n.min(PREALLOC_LIMIT));
                reader.take(n as u64).read_to_end(&mut data)?;
                if data.len() != n {
                    return Err(DecodeError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "string body truncated",
                    )));
                }
                Ok(Value::Str(String::from_utf8(data).map_err(DecodeError::BadUtf8)?))
            }
            tag::ARR32 => {
                let n = read_u32(reader)? as usize;
                let mut items = Vec::with_capacity(n.min(PREALLOC_LIMIT));
                for _ in 0..n {
                    items.push(Value::decode(reader)?);
                }
                Ok(Value::Arr(items))
            }
            tag::MAP32 => {
                let n = read_u32(reader)? as usize;
                let mut map = ValueMap::new();
                for _ in 0..n {
                    let key = Value::decode(reader)?;
                    let value = Value::decode(reader)?;
                    map.insert_wire(key, value);
                }
                Ok(Value::Map(map))
            }
            other => Err(DecodeError::UnsupportedTag(other)),
        }
    }
}
