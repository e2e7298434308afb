pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait WriteBytesBe {
    fn write_be(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le_be {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
        impl WriteBytesBe for $t { #[inline] fn write_be(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_be_bytes()); }}
    )+ }
}

impl_num_le_be!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

macro_rules! impl_collection {
    ($trait:ident, $method:ident) => {
        impl<T: $trait> $trait for Vec<T> {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
        impl<T: $trait, const N: usize> $trait for [T; N] {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
    };
}

impl_collection!(WriteBytesLe, write_le);
impl_collection!(WriteBytesBe, write_be);

#[macro_export]
macro_rules! impl_u32_enum {
    ($t:ty) => {
        impl $crate::byteorder::WriteBytesLe for $t {
            fn write_le(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&(*self as u32).to_le_bytes())
            }
        }
        impl $crate::byteorder::WriteBytesBe for $t {
            fn write_be(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&(*self as u32).to_be_bytes())
            }
        }
    };
}

/// Four character codes are written as raw bytes in either order.
impl WriteBytesBe for avstream::demux::FourCC {
    fn write_be(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(self.as_bytes());
    }
}

impl WriteBytesLe for avstream::demux::FourCC {
    fn write_le(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(self.as_bytes());
    }
}
