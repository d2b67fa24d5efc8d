/*! MultipleMessages message
*/

use super::*;

use cookie_factory::{do_gen, gen_le_u32, gen_many_ref, gen_slice};
use garlic_binary_io::*;
use nom::bytes::complete::tag;
use nom::combinator::verify;
use nom::multi::length_count;
use nom::number::complete::le_u32;

/// Tag of the `MultipleMessages` message.
pub const MULTIPLE_MESSAGES_ID: [u8; 4] = 0x2f5e_dc9a_u32.to_le_bytes();

/// Maximum number of inner messages a single `MultipleMessages` may carry.
pub const MAX_MULTIPLE_MESSAGES: usize = 64;

/** A batch of messages processed in order. Each inner message is handled
independently: one malformed entry does not poison its siblings.

Serialized form:

Length   | Content
-------- | ------
`4`      | Tag
`4`      | Number of messages
variable | Messages

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MultipleMessages {
    /// Inner messages in processing order.
    pub messages: Vec<Message>,
}

impl FromBytes for MultipleMessages {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&MULTIPLE_MESSAGES_ID[..])(input)?;
        let (input, messages) = length_count(
            verify(le_u32, |len| *len as usize <= MAX_MULTIPLE_MESSAGES),
            Message::from_bytes
        )(input)?;
        Ok((input, MultipleMessages { messages }))
    }
}

impl ToBytes for MultipleMessages {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(MULTIPLE_MESSAGES_ID.as_ref()) >>
            gen_le_u32!(self.messages.len() as u32) >>
            gen_many_ref!(&self.messages, |buf, message| Message::to_bytes(message, buf))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlic_binary_io::encode_decode_test;

    encode_decode_test!(
        multiple_messages_empty_encode_decode,
        MultipleMessages {
            messages: Vec::new(),
        }
    );

    #[test]
    fn multiple_messages_count_limit() {
        let message = MultipleMessages {
            messages: Vec::new(),
        };
        let mut buf = [0; 64];
        let (_, size) = message.to_bytes((&mut buf, 0)).unwrap();
        // Claim a count far beyond the limit.
        buf[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(MultipleMessages::from_bytes(&buf[..size]).is_err());
    }
}
