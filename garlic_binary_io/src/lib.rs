/*! Serialization and deserialization traits used by every wire type of the
garlic overlay.

Parsing is built on nom function combinators, generation on cookie_factory.
Both operate on flat byte slices so that packets can be nested without any
intermediate allocation.
*/

#![forbid(unsafe_code)]

mod crypto;

pub use cookie_factory::GenError;
pub use nom::IResult;

use cookie_factory::{do_gen, gen_slice};

/// The trait which provides parsing from a byte slice.
pub trait FromBytes: Sized {
    /// Parse a value of this type from the beginning of `input`, returning
    /// the unconsumed rest of the slice.
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self>;
}

/// The trait which provides serialization into a `(buffer, offset)` pair.
pub trait ToBytes {
    /// Write the serialized form of `self` into `buf`, returning the buffer
    /// and the offset past the written bytes.
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError>;
}

macro_rules! array_impls {
    ($($n:expr)+) => {
        $(
            impl FromBytes for [u8; $n] {
                fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
                    use std::convert::TryInto;
                    nom::combinator::map_opt(
                        nom::bytes::complete::take($n as usize),
                        |bytes: &[u8]| bytes.try_into().ok()
                    )(input)
                }
            }

            impl ToBytes for [u8; $n] {
                fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
                    do_gen!(buf, gen_slice!(self.as_ref()))
                }
            }
        )+
    }
}

array_impls!(4 16 24 32);

/// Test that serializing a value and parsing it back yields the original.
#[macro_export]
macro_rules! encode_decode_test (
    ($test:ident, $value:expr) => (
        #[test]
        fn $test() {
            fn decode_same_type<'a, T: FromBytes>(_: &T, input: &'a [u8]) -> IResult<&'a [u8], T> {
                T::from_bytes(input)
            }

            let value = $value;
            let mut buf = [0; 1024 * 1024];
            let (_, size) = value.to_bytes((&mut buf, 0)).unwrap();
            let (rest, decoded_value) = decode_same_type(&value, &buf[..size]).unwrap();
            assert!(rest.is_empty());
            assert_eq!(decoded_value, value);
        }
    )
);
