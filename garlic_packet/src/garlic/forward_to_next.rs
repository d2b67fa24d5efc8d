/*! ForwardToNext message
*/

use super::*;

use cookie_factory::{do_gen, gen_call, gen_le_u32, gen_slice};
use garlic_binary_io::*;
use garlic_crypto::ShortId;
use nom::bytes::complete::tag;

/// Tag of the `ForwardToNext` message.
pub const FORWARD_TO_NEXT_ID: [u8; 4] = 0x43dd_1f9c_u32.to_le_bytes();

/** One onion layer: the receiving relay sends the carried ciphertext to the
named next hop as an [`EncryptedMessage`], without interpreting it.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | Short id of the next hop
`4`      | Length of encrypted data
variable | Encrypted data

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForwardToNext {
    /// Short id of the relay the data should be forwarded to.
    pub dst: ShortId,
    /// Sealed-box ciphertext for the next hop.
    pub data: Vec<u8>,
}

impl FromBytes for ForwardToNext {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&FORWARD_TO_NEXT_ID[..])(input)?;
        let (input, dst) = ShortId::from_bytes(input)?;
        let (input, data) = length_bytes(input)?;
        Ok((input, ForwardToNext { dst, data }))
    }
}

impl ToBytes for ForwardToNext {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(FORWARD_TO_NEXT_ID.as_ref()) >>
            gen_call!(|buf, dst| ShortId::to_bytes(dst, buf), &self.dst) >>
            gen_le_u32!(self.data.len() as u32) >>
            gen_slice!(self.data.as_slice())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlic_binary_io::encode_decode_test;

    encode_decode_test!(
        forward_to_next_encode_decode,
        ForwardToNext {
            dst: ShortId::from([42; 32]),
            data: vec![43; 123],
        }
    );
}
