/*! EncryptedMessageChannel message
*/

use super::*;

use cookie_factory::{do_gen, gen_call, gen_le_u32, gen_slice};
use garlic_binary_io::*;
use garlic_crypto::ShortId;
use nom::bytes::complete::tag;

/// Tag of the `EncryptedMessageChannel` message.
pub const ENCRYPTED_MESSAGE_CHANNEL_ID: [u8; 4] = 0x94e1_c2d7_u32.to_le_bytes();

/** Like [`EncryptedMessage`](./struct.EncryptedMessage.html), but encrypted
under the symmetric channel named by `key_id` instead of the relay's
long-term key.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`32`     | Channel key id
`4`      | Length of encrypted data
variable | Encrypted data

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedMessageChannel {
    /// Id of the channel key the data is encrypted under.
    pub key_id: ShortId,
    /// Channel ciphertext of an inner message.
    pub data: Vec<u8>,
}

impl FromBytes for EncryptedMessageChannel {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&ENCRYPTED_MESSAGE_CHANNEL_ID[..])(input)?;
        let (input, key_id) = ShortId::from_bytes(input)?;
        let (input, data) = length_bytes(input)?;
        Ok((input, EncryptedMessageChannel { key_id, data }))
    }
}

impl ToBytes for EncryptedMessageChannel {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(ENCRYPTED_MESSAGE_CHANNEL_ID.as_ref()) >>
            gen_call!(|buf, id| ShortId::to_bytes(id, buf), &self.key_id) >>
            gen_le_u32!(self.data.len() as u32) >>
            gen_slice!(self.data.as_slice())
        )
    }
}
