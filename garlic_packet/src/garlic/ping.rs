/*! Ping message
*/

use super::*;

use cookie_factory::{do_gen, gen_call, gen_slice};
use garlic_binary_io::*;
use garlic_crypto::ShortId;
use nom::bytes::complete::tag;

/// Tag of the `Ping` message.
pub const PING_ID: [u8; 4] = 0xf3c1_49ab_u32.to_le_bytes();

/** Liveness probe for a tunnel midpoint. The relay holding `tunnel_id`
refreshes its TTL and answers with a [`Pong`](./struct.Pong.html) carrying the
same nonce over the midpoint's return path.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | Tunnel id
`32`     | Nonce

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ping {
    /// Short id of the midpoint being probed.
    pub tunnel_id: ShortId,
    /// Nonce echoed back in the pong.
    pub nonce: [u8; 32],
}

impl FromBytes for Ping {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&PING_ID[..])(input)?;
        let (input, tunnel_id) = ShortId::from_bytes(input)?;
        let (input, nonce) = <[u8; 32]>::from_bytes(input)?;
        Ok((input, Ping { tunnel_id, nonce }))
    }
}

impl ToBytes for Ping {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(PING_ID.as_ref()) >>
            gen_call!(|buf, id| ShortId::to_bytes(id, buf), &self.tunnel_id) >>
            gen_slice!(self.nonce.as_ref())
        )
    }
}
