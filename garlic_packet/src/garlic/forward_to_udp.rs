/*! ForwardToUdp message
*/

use super::*;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use cookie_factory::{do_gen, gen_call, gen_le_u16, gen_le_u32, gen_slice};
use garlic_binary_io::*;
use nom::bytes::complete::tag;
use nom::combinator::map;
use nom::number::complete::{le_u16, le_u32};

/// Tag of the `ForwardToUdp` message.
pub const FORWARD_TO_UDP_ID: [u8; 4] = 0x8b9c_f54c_u32.to_le_bytes();

/// Flag bit marking an IPv4 destination.
const IPV4_FLAG: u32 = 1;
/// Flag bit marking an IPv6 destination.
const IPV6_FLAG: u32 = 2;

/** The innermost message of an outbound onion: the terminal relay emits the
carried bytes as a raw UDP datagram to the given address.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`4`      | Flags: `1` = IPv4, `2` = IPv6
`4`/`16` | IP address octets
`2`      | Port
`4`      | Length of data
variable | Data

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForwardToUdp {
    /// Destination IP address of the datagram.
    pub ip: IpAddr,
    /// Destination UDP port.
    pub port: u16,
    /// Datagram payload.
    pub data: Vec<u8>,
}

impl FromBytes for ForwardToUdp {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&FORWARD_TO_UDP_ID[..])(input)?;
        let (input, flags) = le_u32(input)?;
        let (input, ip) = match flags {
            IPV4_FLAG => map(<[u8; 4]>::from_bytes, |octets| IpAddr::V4(Ipv4Addr::from(octets)))(input)?,
            IPV6_FLAG => map(<[u8; 16]>::from_bytes, |octets| IpAddr::V6(Ipv6Addr::from(octets)))(input)?,
            _ => return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Switch))),
        };
        let (input, port) = le_u16(input)?;
        let (input, data) = length_bytes(input)?;
        Ok((input, ForwardToUdp { ip, port, data }))
    }
}

impl ToBytes for ForwardToUdp {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(FORWARD_TO_UDP_ID.as_ref()) >>
            gen_le_u32!(if self.ip.is_ipv4() { IPV4_FLAG } else { IPV6_FLAG }) >>
            gen_call!(|buf, ip| gen_ip_addr(ip, buf), &self.ip) >>
            gen_le_u16!(self.port) >>
            gen_le_u32!(self.data.len() as u32) >>
            gen_slice!(self.data.as_slice())
        )
    }
}

fn gen_ip_addr<'a>(ip: &IpAddr, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
    match *ip {
        IpAddr::V4(addr) => do_gen!(buf, gen_slice!(addr.octets().as_ref())),
        IpAddr::V6(addr) => do_gen!(buf, gen_slice!(addr.octets().as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlic_binary_io::encode_decode_test;

    encode_decode_test!(
        forward_to_udp_encode_decode,
        ForwardToUdp {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9999,
            data: vec![42; 123],
        }
    );

    encode_decode_test!(
        forward_to_udp_ipv6_encode_decode,
        ForwardToUdp {
            ip: "::1".parse().unwrap(),
            port: 33445,
            data: vec![42; 12],
        }
    );

    #[test]
    fn forward_to_udp_invalid_flags() {
        let valid = ForwardToUdp {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9999,
            data: Vec::new(),
        };
        let mut buf = [0; 128];
        let (_, size) = valid.to_bytes((&mut buf, 0)).unwrap();
        // Both family bits at once.
        buf[4] = 3;
        assert!(ForwardToUdp::from_bytes(&buf[..size]).is_err());
    }
}
