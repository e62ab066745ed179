use crate::{TypeMismatch, ValueMap};

/// A runtime-typed wire value.
///
/// This is the codec's entire domain: every protocol body is built out of
/// these variants. Arrays and maps are heterogeneous. Equality is
/// structural; floats compare by bit pattern and maps ignore pair order.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Arr(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Arr(_) => "arr",
            Value::Map(_) => "map",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The value as a signed 128-bit integer, if it holds any integer
    /// variant. Shared plumbing for the width-checked projections below.
    fn as_int_repr(&self) -> Option<i128> {
        Some(match *self {
            Value::U8(v) => v as i128,
            Value::U16(v) => v as i128,
            Value::U32(v) => v as i128,
            Value::U64(v) => v as i128,
            Value::I8(v) => v as i128,
            Value::I16(v) => v as i128,
            Value::I32(v) => v as i128,
            Value::I64(v) => v as i128,
            _ => return None,
        })
    }

    fn mismatch(&self, expected: &'static str) -> TypeMismatch {
        TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, TypeMismatch> {
        match *self {
            Value::Bool(v) => Ok(v),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn as_str(&self) -> Result<&str, TypeMismatch> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(self.mismatch("str")),
        }
    }

    /// Consumes the value, yielding its string without a copy.
    pub fn into_string(self) -> Result<String, TypeMismatch> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.mismatch("str")),
        }
    }

    pub fn as_arr(&self) -> Result<&[Value], TypeMismatch> {
        match self {
            Value::Arr(items) => Ok(items),
            _ => Err(self.mismatch("arr")),
        }
    }

    pub fn into_arr(self) -> Result<Vec<Value>, TypeMismatch> {
        match self {
            Value::Arr(items) => Ok(items),
            other => Err(other.mismatch("arr")),
        }
    }

    pub fn as_map(&self) -> Result<&ValueMap, TypeMismatch> {
        match self {
            Value::Map(m) => Ok(m),
            _ => Err(self.mismatch("map")),
        }
    }

    pub fn as_f32(&self) -> Result<f32, TypeMismatch> {
        match *self {
            Value::F32(v) => Ok(v),
            _ => Err(self.mismatch("f32")),
        }
    }

    /// An `f32` widens losslessly; anything else must already be an `f64`.
    pub fn as_f64(&self) -> Result<f64, TypeMismatch> {
        match *self {
            Value::F64(v) => Ok(v),
            Value::F32(v) => Ok(v as f64),
            _ => Err(self.mismatch("f64")),
        }
    }
}

macro_rules! int_projection {
    ($($name:ident => $ty:ty),* $(,)?) => {
        impl Value {
            $(
                /// Projects any integer variant whose value fits the target
                /// width; fails with a type mismatch otherwise.
                pub fn $name(&self) -> Result<$ty, TypeMismatch> {
                    let repr = self
                        .as_int_repr()
                        .ok_or_else(|| self.mismatch(stringify!($ty)))?;
                    <$ty>::try_from(repr).map_err(|_| self.mismatch(stringify!($ty)))
                }
            )*
        }
    };
}

int_projection! {
    as_u8 => u8,
    as_u16 => u16,
    as_u32 => u32,
    as_u64 => u64,
    as_i8 => i8,
    as_i16 => i16,
    as_i32 => i32,
    as_i64 => i64,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            // Bit identity, so NaN == NaN and -0.0 != 0.0.
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Arr(a), Value::Arr(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => Str,
    Vec<Value> => Arr,
    ValueMap => Map,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}
