/*! CreateTunnelMidpoint message
*/

use super::*;

use cookie_factory::{do_gen, gen_call, gen_slice};
use garlic_binary_io::*;
use garlic_crypto::{PublicKey, ShortId};
use nom::bytes::complete::tag;

/// Tag of the `CreateTunnelMidpoint` message.
pub const CREATE_TUNNEL_MIDPOINT_ID: [u8; 4] = 0xdb5c_7a1d_u32.to_le_bytes();

/** Instructs a relay to install a tunnel midpoint.

The midpoint encrypts every datagram arriving with `message_prefix` under
`encrypt_via` and forwards the result to `proxy_as` as a direct message.
A midpoint with an already-known `message_prefix` is not replaced.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | `PublicKey` return packets are encrypted under
`32`     | Short id of the predecessor the midpoint forwards to
`32`     | Short id the midpoint listens on

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateTunnelMidpoint {
    /// Session `PublicKey` this hop encrypts return traffic under.
    pub encrypt_via: PublicKey,
    /// Short id of the node wrapped packets are forwarded to.
    pub proxy_as: ShortId,
    /// Short id of the next hop's session key; the midpoint serves datagrams
    /// prefixed with it.
    pub message_prefix: ShortId,
}

impl FromBytes for CreateTunnelMidpoint {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&CREATE_TUNNEL_MIDPOINT_ID[..])(input)?;
        let (input, encrypt_via) = PublicKey::from_bytes(input)?;
        let (input, proxy_as) = ShortId::from_bytes(input)?;
        let (input, message_prefix) = ShortId::from_bytes(input)?;
        Ok((input, CreateTunnelMidpoint { encrypt_via, proxy_as, message_prefix }))
    }
}

impl ToBytes for CreateTunnelMidpoint {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(CREATE_TUNNEL_MIDPOINT_ID.as_ref()) >>
            gen_slice!(self.encrypt_via.as_bytes()) >>
            gen_call!(|buf, id| ShortId::to_bytes(id, buf), &self.proxy_as) >>
            gen_call!(|buf, id| ShortId::to_bytes(id, buf), &self.message_prefix)
        )
    }
}
