/*! EncryptedMessage message
*/

use super::*;

use cookie_factory::{do_gen, gen_le_u32, gen_slice};
use garlic_binary_io::*;
use garlic_crypto::{open, seal, PublicKey, SecretKey};
use nom::bytes::complete::tag;
use rand::{CryptoRng, Rng};

use crate::GetPayloadError;

/// Tag of the `EncryptedMessage` message.
pub const ENCRYPTED_MESSAGE_ID: [u8; 4] = 0x6ac9_4bd8_u32.to_le_bytes();

/** A message sealed to the receiving relay's long-term key. The relay
decrypts it and processes the plaintext as a fresh message.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`4`      | Length of encrypted data
variable | Encrypted data

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedMessage {
    /// Sealed-box ciphertext of an inner message.
    pub data: Vec<u8>,
}

impl FromBytes for EncryptedMessage {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&ENCRYPTED_MESSAGE_ID[..])(input)?;
        let (input, data) = length_bytes(input)?;
        Ok((input, EncryptedMessage { data }))
    }
}

impl ToBytes for EncryptedMessage {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(ENCRYPTED_MESSAGE_ID.as_ref()) >>
            gen_le_u32!(self.data.len() as u32) >>
            gen_slice!(self.data.as_slice())
        )
    }
}

impl EncryptedMessage {
    /// Seal an inner message to the recipient's public key.
    pub fn new<R: Rng + CryptoRng>(rng: &mut R, to: &PublicKey, payload: &Message) -> EncryptedMessage {
        let data = seal(rng, to, &payload.to_vec().unwrap());
        EncryptedMessage { data }
    }

    /** Open the sealed box with the recipient's secret key and parse the
    plaintext as a message.

    Returns `Error` in case of failure:

    - fails to decrypt
    - fails to parse as `Message`
    */
    pub fn get_payload(&self, sk: &SecretKey) -> Result<Message, GetPayloadError> {
        let decrypted = open(sk, &self.data).map_err(|()| GetPayloadError::decrypt())?;
        match Message::from_bytes(&decrypted) {
            Err(error) => Err(GetPayloadError::deserialize(error, decrypted.clone())),
            Ok((_, payload)) => Ok(payload),
        }
    }
}
