use std::io::{self, Write};

use crate::{Value, tag};

fn write_len<W: Write>(writer: &mut W, len: usize) -> io::Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value length exceeds u32"))?;
    writer.write_all(&len.to_be_bytes())
}

impl Value {
    /// Writes one complete value frame: the tag byte, then the
    /// tag-dependent body. Recursive for arrays, maps, and floats (a float
    /// body is a nested U32/U64 frame carrying the IEEE-754 bits).
    pub fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Value::Nil => writer.write_all(&[tag::NIL]),
            Value::Bool(false) => writer.write_all(&[tag::FALSE]),
            Value::Bool(true) => writer.write_all(&[tag::TRUE]),
            Value::U8(v) => writer.write_all(&[tag::U8, *v]),
            Value::U16(v) => {
                writer.write_all(&[tag::U16])?;
                writer.write_all(&v.to_be_bytes())
            }
            Value::U32(v) => {
                writer.write_all(&[tag::U32])?;
                writer.write_all(&v.to_be_bytes())
            }
            Value::U64(v) => {
                writer.write_all(&[tag::U64])?;
                writer.write_all(&v.to_be_bytes())
            }
            Value::I8(v) => writer.write_all(&[tag::I8, *v as u8]),
            Value::I16(v) => {
                writer.write_all(&[tag::I16])?;
                writer.write_all(&v.to_be_bytes())
            }
            Value::I32(v) => {
                writer.write_all(&[tag::I32])?;
                writer.write_all(&v.to_be_bytes())
            }
            Value::I64(v) => {
                writer.write_all(&[tag::I64])?;
                writer.write_all(&v.to_be_bytes())
            }
            Value::F32(v) => {
                writer.write_all(&[tag::F32])?;
                Value::U32(v.to_bits()).encode(writer)
            }
            Value::F64(v) => {
                writer.write_all(&[tag::F64])?;
                Value::U64(v.to_bits()).encode(writer)
            }
            Value::Str(s) => {
                writer.write_all(&[tag::STR32])?;
                write_len(writer, s.len())?;
                writer.write_all(s.as_bytes())
            }
            Value::Arr(items) => {
                writer.write_all(&[tag::ARR32])?;
                write_len(writer, items.len())?;
                for item in items {
                    item.encode(writer)?;
                }
                Ok(())
            }
            Value::Map(map) => {
                writer.write_all(&[tag::MAP32])?;
                write_len(writer, map.len())?;
                for (k, v) in map.iter() {
                    k.encode(writer)?;
                    v.encode(writer)?;
                }
                Ok(())
            }
        }
    }

    /// Encodes into a fresh buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf)
            .expect("Vec<u8> writes are infallible");
        buf
    }
}
