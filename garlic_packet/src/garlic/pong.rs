/*! Pong message
*/

use super::*;

use cookie_factory::{do_gen, gen_slice};
use garlic_binary_io::*;
use nom::bytes::complete::tag;

/// Tag of the `Pong` message.
pub const PONG_ID: [u8; 4] = 0x51be_0d64_u32.to_le_bytes();

/** Answer to a [`Ping`](./struct.Ping.html), travelling back through the
tunnel as a custom message.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | Nonce

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pong {
    /// Nonce of the ping being answered.
    pub nonce: [u8; 32],
}

impl FromBytes for Pong {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&PONG_ID[..])(input)?;
        let (input, nonce) = <[u8; 32]>::from_bytes(input)?;
        Ok((input, Pong { nonce }))
    }
}

impl ToBytes for Pong {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(PONG_ID.as_ref()) >>
            gen_slice!(self.nonce.as_ref())
        )
    }
}
