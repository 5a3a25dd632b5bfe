//! Typed keys and values
//!
//! The engine stores raw bytes. These conversions let callers use
//! fixed-width scalars and strings directly:
//!
//! - integers and floats are stored as their native-endian bytes and must
//!   come back with exactly that width
//! - strings and byte buffers are stored as-is

use std::borrow::Cow;

use crate::error::{CaskError, Result};

/// Something that can be written as a key or value
pub trait ToRaw {
    /// Raw bytes handed to the engine
    fn to_raw(&self) -> Cow<'_, [u8]>;
}

/// Something that can be rebuilt from a stored value
pub trait FromRaw: Sized {
    fn from_raw(raw: Vec<u8>) -> Result<Self>;
}

macro_rules! impl_raw_for_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToRaw for $ty {
                fn to_raw(&self) -> Cow<'_, [u8]> {
                    Cow::Owned(self.to_ne_bytes().to_vec())
                }
            }

            impl FromRaw for $ty {
                fn from_raw(raw: Vec<u8>) -> Result<Self> {
                    const WIDTH: usize = std::mem::size_of::<$ty>();
                    let bytes: [u8; WIDTH] = raw.as_slice().try_into().map_err(|_| {
                        CaskError::Deserialization {
                            expected: WIDTH,
                            actual: raw.len(),
                        }
                    })?;
                    Ok(<$ty>::from_ne_bytes(bytes))
                }
            }
        )*
    };
}

impl_raw_for_scalar!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

impl ToRaw for str {
    fn to_raw(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl ToRaw for String {
    fn to_raw(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl FromRaw for String {
    fn from_raw(raw: Vec<u8>) -> Result<Self> {
        Ok(String::from_utf8(raw)?)
    }
}

impl ToRaw for [u8] {
    fn to_raw(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl ToRaw for Vec<u8> {
    fn to_raw(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl FromRaw for Vec<u8> {
    fn from_raw(raw: Vec<u8>) -> Result<Self> {
        Ok(raw)
    }
}
