/*! Wire types of the garlic overlay protocol.

Every message starts with a stable 32-bit little-endian tag. Variable-size
byte fields carry a `u32` little-endian length prefix, sequences a `u32`
count prefix, and 256-bit ids are raw unprefixed byte arrays.
*/

#![forbid(unsafe_code)]

mod errors;
pub mod garlic;
pub mod tunnel;

pub use errors::*;

use garlic_binary_io::IResult;
use nom::combinator::map;
use nom::multi::length_data;
use nom::number::complete::le_u32;

/// Parse a `u32`-length-prefixed byte field.
pub(crate) fn length_bytes(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    map(length_data(le_u32), |bytes: &[u8]| bytes.to_vec())(input)
}
