/*! TunnelPacketPrefix packet
*/

use super::*;

use cookie_factory::{do_gen, gen_call, gen_slice};
use garlic_binary_io::*;
use garlic_crypto::ShortId;
use nom::bytes::complete::tag;
use nom::combinator::rest;

/// Tag of the `TunnelPacketPrefix` packet.
pub const TUNNEL_PACKET_PREFIX_ID: [u8; 4] = 0xd6f2_7a91_u32.to_le_bytes();

/** Outermost framing of a tunnel datagram: a routing discriminator followed
by the encrypted remainder.

`id` is the short id of the session key the receiver must decrypt the body
with; at a relay it selects the tunnel midpoint, at the endpoint it names the
expected peel layer. The body has no length prefix of its own, it extends to
the end of the datagram.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | Id
variable | Encrypted body

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TunnelPacketPrefix {
    /// Short id selecting the decryption key.
    pub id: ShortId,
    /// Sealed-box encrypted body.
    pub data: Vec<u8>,
}

impl FromBytes for TunnelPacketPrefix {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&TUNNEL_PACKET_PREFIX_ID[..])(input)?;
        let (input, id) = ShortId::from_bytes(input)?;
        let (input, data) = rest(input)?;
        Ok((input, TunnelPacketPrefix { id, data: data.to_vec() }))
    }
}

impl ToBytes for TunnelPacketPrefix {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(TUNNEL_PACKET_PREFIX_ID.as_ref()) >>
            gen_call!(|buf, id| ShortId::to_bytes(id, buf), &self.id) >>
            gen_slice!(self.data.as_slice())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlic_binary_io::encode_decode_test;

    encode_decode_test!(
        tunnel_packet_prefix_encode_decode,
        TunnelPacketPrefix {
            id: ShortId::from([42; 32]),
            data: vec![43; 123],
        }
    );

    #[test]
    fn tunnel_packet_prefix_too_short() {
        assert!(TunnelPacketPrefix::from_bytes(&TUNNEL_PACKET_PREFIX_ID).is_err());
    }
}
