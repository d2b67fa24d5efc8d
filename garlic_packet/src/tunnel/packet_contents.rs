/*! TunnelPacketContents packet
*/

use super::*;

use std::net::{Ipv4Addr, SocketAddrV4};

use cookie_factory::{do_gen, gen_call, gen_le_u16, gen_le_u32, gen_slice};
use garlic_binary_io::*;
use nom::bytes::complete::tag;
use nom::combinator::cond;
use nom::number::complete::{le_u16, le_u32};

/// Tag of the `TunnelPacketContents` packet.
pub const TUNNEL_PACKET_CONTENTS_ID: [u8; 4] = 0x48e3_a7c2_u32.to_le_bytes();

/// Flag bit: the wrapping relay recorded the datagram's source address.
const FROM_ADDR_FLAG: u32 = 1;
/// Flag bit: an inner message is present.
const MESSAGE_FLAG: u32 = 2;

/** The plaintext a tunnel midpoint wraps an inbound datagram in before
encrypting it for its hop.

The source address is recorded only when the datagram arrived over plain UDP
with a known IPv4 origin; relayed hops carry no address.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`4`      | Flags: `1` = source address present, `2` = message present
`4`+`2`  | Source IPv4 address and port, if flag `1`
`4`+var  | Length-prefixed inner message, if flag `2`

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TunnelPacketContents {
    /// Source address of the wrapped datagram, when known.
    pub from_addr: Option<SocketAddrV4>,
    /// The wrapped datagram.
    pub message: Option<Vec<u8>>,
}

impl FromBytes for TunnelPacketContents {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&TUNNEL_PACKET_CONTENTS_ID[..])(input)?;
        let (input, flags) = le_u32(input)?;
        let (input, from_addr) = cond(flags & FROM_ADDR_FLAG != 0, |input| {
            let (input, octets) = <[u8; 4]>::from_bytes(input)?;
            let (input, port) = le_u16(input)?;
            Ok((input, SocketAddrV4::new(Ipv4Addr::from(octets), port)))
        })(input)?;
        let (input, message) = cond(flags & MESSAGE_FLAG != 0, length_bytes)(input)?;
        Ok((input, TunnelPacketContents { from_addr, message }))
    }
}

impl ToBytes for TunnelPacketContents {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        let mut flags = 0;
        if self.from_addr.is_some() {
            flags |= FROM_ADDR_FLAG;
        }
        if self.message.is_some() {
            flags |= MESSAGE_FLAG;
        }
        do_gen!(buf,
            gen_slice!(TUNNEL_PACKET_CONTENTS_ID.as_ref()) >>
            gen_le_u32!(flags) >>
            gen_call!(|buf, addr| gen_from_addr(addr, buf), &self.from_addr) >>
            gen_call!(|buf, message| gen_inner_message(message, buf), &self.message)
        )
    }
}

fn gen_from_addr<'a>(addr: &Option<SocketAddrV4>, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
    match addr {
        Some(addr) => do_gen!(buf,
            gen_slice!(addr.ip().octets().as_ref()) >>
            gen_le_u16!(addr.port())
        ),
        None => Ok(buf),
    }
}

fn gen_inner_message<'a>(message: &Option<Vec<u8>>, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
    match message {
        Some(message) => do_gen!(buf,
            gen_le_u32!(message.len() as u32) >>
            gen_slice!(message.as_slice())
        ),
        None => Ok(buf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlic_binary_io::encode_decode_test;

    encode_decode_test!(
        tunnel_packet_contents_encode_decode,
        TunnelPacketContents {
            from_addr: Some("127.0.0.1:9999".parse().unwrap()),
            message: Some(vec![42; 123]),
        }
    );

    encode_decode_test!(
        tunnel_packet_contents_bare_encode_decode,
        TunnelPacketContents {
            from_addr: None,
            message: Some(vec![42; 12]),
        }
    );

    encode_decode_test!(
        tunnel_packet_contents_empty_encode_decode,
        TunnelPacketContents {
            from_addr: None,
            message: None,
        }
    );
}
