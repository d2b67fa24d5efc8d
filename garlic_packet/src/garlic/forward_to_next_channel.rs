/*! ForwardToNextChannel message
*/

use super::*;

use cookie_factory::{do_gen, gen_call, gen_le_u32, gen_slice};
use garlic_binary_io::*;
use garlic_crypto::ShortId;
use nom::bytes::complete::tag;

/// Tag of the `ForwardToNextChannel` message.
pub const FORWARD_TO_NEXT_CHANNEL_ID: [u8; 4] = 0x3a8f_e051_u32.to_le_bytes();

/** Like [`ForwardToNext`](./struct.ForwardToNext.html), but the carried data
is channel ciphertext: the relay re-emits it to `dst` as an
[`EncryptedMessageChannel`](./struct.EncryptedMessageChannel.html).

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | Short id of the next hop
`32`     | Channel key id
`4`      | Length of encrypted data
variable | Encrypted data

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ForwardToNextChannel {
    /// Short id of the relay the data should be forwarded to.
    pub dst: ShortId,
    /// Id of the channel key the data is encrypted under.
    pub key_id: ShortId,
    /// Channel ciphertext for the next hop.
    pub data: Vec<u8>,
}

impl FromBytes for ForwardToNextChannel {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&FORWARD_TO_NEXT_CHANNEL_ID[..])(input)?;
        let (input, dst) = ShortId::from_bytes(input)?;
        let (input, key_id) = ShortId::from_bytes(input)?;
        let (input, data) = length_bytes(input)?;
        Ok((input, ForwardToNextChannel { dst, key_id, data }))
    }
}

impl ToBytes for ForwardToNextChannel {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(FORWARD_TO_NEXT_CHANNEL_ID.as_ref()) >>
            gen_call!(|buf, id| ShortId::to_bytes(id, buf), &self.dst) >>
            gen_call!(|buf, id| ShortId::to_bytes(id, buf), &self.key_id) >>
            gen_le_u32!(self.data.len() as u32) >>
            gen_slice!(self.data.as_slice())
        )
    }
}
