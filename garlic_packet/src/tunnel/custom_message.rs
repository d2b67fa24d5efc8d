/*! TunnelCustomMessage packet
*/

use super::*;

use cookie_factory::{do_gen, gen_le_u32, gen_slice};
use garlic_binary_io::*;
use nom::bytes::complete::tag;

/// Tag of the `TunnelCustomMessage` packet.
pub const TUNNEL_CUSTOM_MESSAGE_ID: [u8; 4] = 0x219c_bb35_u32.to_le_bytes();

/** A control answer addressed to the tunnel endpoint itself rather than to
the node behind it. Pongs travel back through the tunnel in this wrapper.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`4`      | Length of data
variable | Data

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TunnelCustomMessage {
    /// The carried control payload.
    pub data: Vec<u8>,
}

impl FromBytes for TunnelCustomMessage {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&TUNNEL_CUSTOM_MESSAGE_ID[..])(input)?;
        let (input, data) = length_bytes(input)?;
        Ok((input, TunnelCustomMessage { data }))
    }
}

impl ToBytes for TunnelCustomMessage {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(TUNNEL_CUSTOM_MESSAGE_ID.as_ref()) >>
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
        tunnel_custom_message_encode_decode,
        TunnelCustomMessage {
            data: vec![42; 123],
        }
    );
}
