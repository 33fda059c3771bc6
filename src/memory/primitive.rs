//! Fixed-width values stored little-endian in target memory

use std::fmt::Debug;

/// A value with a fixed little-endian encoding
pub trait Primitive: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Decodes from exactly [`Self::SIZE`] bytes
    fn decode(bytes: &[u8]) -> Option<Self>;

    fn encode(self) -> Vec<u8>;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(bytes: &[u8]) -> Option<Self> {
                    bytes.try_into().ok().map(<$ty>::from_le_bytes)
                }

                fn encode(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }
        )*
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(0x1234u16.encode(), vec![0x34, 0x12]);
        assert_eq!((-2i32).encode(), vec![0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(1.0f32.encode(), vec![0x00, 0x00, 0x80, 0x3F]);
        assert_eq!(
            u64::decode(&[1, 0, 0, 0, 0, 0, 0, 0x80]),
            Some(0x8000_0000_0000_0001)
        );
    }

    #[test]
    fn test_wrong_width_is_rejected() {
        assert_eq!(u32::decode(&[1, 2, 3]), None);
        assert_eq!(u8::decode(&[]), None);
        assert_eq!(i16::SIZE, 2);
        assert_eq!(f64::SIZE, 8);
    }

    proptest! {
        #[test]
        fn prop_i64_codec(value: i64) {
            prop_assert_eq!(i64::decode(&value.encode()), Some(value));
        }
    }
}
