/*! CreateChannel message
*/

use super::*;

use cookie_factory::{do_gen, gen_slice};
use garlic_binary_io::*;
use nom::bytes::complete::tag;

/// Tag of the `CreateChannel` message.
pub const CREATE_CHANNEL_ID: [u8; 4] = 0x75c3_f1be_u32.to_le_bytes();

/** Installs a symmetric decryption channel at a relay, letting later traffic
skip the asymmetric sealed-box path. The channel is addressed by the hash of
its key. A channel with an already-known id is not replaced.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | Symmetric key

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateChannel {
    /// Symmetric key of the channel.
    pub key: [u8; 32],
}

impl FromBytes for CreateChannel {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&CREATE_CHANNEL_ID[..])(input)?;
        let (input, key) = <[u8; 32]>::from_bytes(input)?;
        Ok((input, CreateChannel { key }))
    }
}

impl ToBytes for CreateChannel {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(CREATE_CHANNEL_ID.as_ref()) >>
            gen_slice!(self.key.as_ref())
        )
    }
}
