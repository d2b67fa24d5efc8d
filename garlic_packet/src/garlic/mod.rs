/*! Garlic control and forwarding messages.

A relay dispatches on the leading 32-bit tag of every message it receives.
The variants form a closed union; composition is expressed by nesting
[`MultipleMessages`].
*/

mod create_channel;
mod create_tunnel_midpoint;
mod encrypted_message;
mod encrypted_message_channel;
mod forward_to_next;
mod forward_to_next_channel;
mod forward_to_udp;
mod multiple_messages;
mod ping;
mod pong;

pub use self::create_channel::*;
pub use self::create_tunnel_midpoint::*;
pub use self::encrypted_message::*;
pub use self::encrypted_message_channel::*;
pub use self::forward_to_next::*;
pub use self::forward_to_next_channel::*;
pub use self::forward_to_udp::*;
pub use self::multiple_messages::*;
pub use self::ping::*;
pub use self::pong::*;

use garlic_binary_io::*;

use nom::branch::alt;
use nom::combinator::map;

pub(crate) use crate::length_bytes;

/// Maximum size in bytes of a serialized message, layered wrapping included.
pub const MAX_MESSAGE_SIZE: usize = 0x10000;

/// Tag of the well-known public overlay descriptor. Its hash is the overlay
/// id every garlic relay and client joins.
pub const PUBLIC_OVERLAY_DESCRIPTOR_ID: [u8; 4] = 0x6e4b_e82f_u32.to_le_bytes();

/** Garlic message: the tagged union a relay dispatches on.
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// [`ForwardToUdp`](./struct.ForwardToUdp.html) structure.
    ForwardToUdp(ForwardToUdp),
    /// [`ForwardToNext`](./struct.ForwardToNext.html) structure.
    ForwardToNext(ForwardToNext),
    /// [`EncryptedMessage`](./struct.EncryptedMessage.html) structure.
    EncryptedMessage(EncryptedMessage),
    /// [`MultipleMessages`](./struct.MultipleMessages.html) structure.
    MultipleMessages(MultipleMessages),
    /// [`CreateTunnelMidpoint`](./struct.CreateTunnelMidpoint.html) structure.
    CreateTunnelMidpoint(CreateTunnelMidpoint),
    /// [`CreateChannel`](./struct.CreateChannel.html) structure.
    CreateChannel(CreateChannel),
    /// [`EncryptedMessageChannel`](./struct.EncryptedMessageChannel.html) structure.
    EncryptedMessageChannel(EncryptedMessageChannel),
    /// [`ForwardToNextChannel`](./struct.ForwardToNextChannel.html) structure.
    ForwardToNextChannel(ForwardToNextChannel),
    /// [`Ping`](./struct.Ping.html) structure.
    Ping(Ping),
    /// [`Pong`](./struct.Pong.html) structure.
    Pong(Pong),
}

impl FromBytes for Message {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        alt((
            map(ForwardToUdp::from_bytes, Message::ForwardToUdp),
            map(ForwardToNext::from_bytes, Message::ForwardToNext),
            map(EncryptedMessage::from_bytes, Message::EncryptedMessage),
            map(MultipleMessages::from_bytes, Message::MultipleMessages),
            map(CreateTunnelMidpoint::from_bytes, Message::CreateTunnelMidpoint),
            map(CreateChannel::from_bytes, Message::CreateChannel),
            map(EncryptedMessageChannel::from_bytes, Message::EncryptedMessageChannel),
            map(ForwardToNextChannel::from_bytes, Message::ForwardToNextChannel),
            map(Ping::from_bytes, Message::Ping),
            map(Pong::from_bytes, Message::Pong),
        ))(input)
    }
}

impl ToBytes for Message {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        match *self {
            Message::ForwardToUdp(ref p) => p.to_bytes(buf),
            Message::ForwardToNext(ref p) => p.to_bytes(buf),
            Message::EncryptedMessage(ref p) => p.to_bytes(buf),
            Message::MultipleMessages(ref p) => p.to_bytes(buf),
            Message::CreateTunnelMidpoint(ref p) => p.to_bytes(buf),
            Message::CreateChannel(ref p) => p.to_bytes(buf),
            Message::EncryptedMessageChannel(ref p) => p.to_bytes(buf),
            Message::ForwardToNextChannel(ref p) => p.to_bytes(buf),
            Message::Ping(ref p) => p.to_bytes(buf),
            Message::Pong(ref p) => p.to_bytes(buf),
        }
    }
}

impl Message {
    /// Serialize this message into a fresh byte vector.
    pub fn to_vec(&self) -> Result<Vec<u8>, GenError> {
        let mut buf = vec![0; MAX_MESSAGE_SIZE];
        let (_, size) = self.to_bytes((&mut buf, 0))?;
        buf.truncate(size);
        Ok(buf)
    }

    /// Parse a message that must occupy the whole of `data`.
    pub fn from_slice(data: &[u8]) -> Option<Message> {
        match Message::from_bytes(data) {
            Ok((rest, message)) if rest.is_empty() => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlic_binary_io::encode_decode_test;
    use garlic_crypto::{SecretKey, ShortId};
    use rand::thread_rng;

    encode_decode_test!(
        message_forward_to_udp_encode_decode,
        Message::ForwardToUdp(ForwardToUdp {
            ip: "127.0.0.1".parse().unwrap(),
            port: 9999,
            data: vec![42; 123],
        })
    );

    encode_decode_test!(
        message_multiple_messages_encode_decode,
        Message::MultipleMessages(MultipleMessages {
            messages: vec![
                Message::Ping(Ping {
                    tunnel_id: ShortId::from([1; 32]),
                    nonce: [2; 32],
                }),
                Message::ForwardToNext(ForwardToNext {
                    dst: ShortId::from([3; 32]),
                    data: vec![4; 56],
                }),
            ],
        })
    );

    #[test]
    fn message_unknown_tag() {
        let mut data = vec![0xde, 0xad, 0xbe, 0xef];
        data.extend_from_slice(&[0; 64]);
        assert!(Message::from_slice(&data).is_none());
    }

    #[test]
    fn message_from_slice_trailing_garbage() {
        let message = Message::Pong(Pong { nonce: [7; 32] });
        let mut data = message.to_vec().unwrap();
        assert_eq!(Message::from_slice(&data), Some(message));
        data.push(0);
        assert_eq!(Message::from_slice(&data), None);
    }

    #[test]
    fn message_nested_multiple_round_trip() {
        let inner = Message::MultipleMessages(MultipleMessages {
            messages: vec![Message::Pong(Pong { nonce: [9; 32] })],
        });
        let outer = Message::MultipleMessages(MultipleMessages { messages: vec![inner] });
        let data = outer.to_vec().unwrap();
        assert_eq!(Message::from_slice(&data), Some(outer));
    }

    #[test]
    fn message_create_tunnel_midpoint_round_trip() {
        let mut rng = thread_rng();
        let message = Message::CreateTunnelMidpoint(CreateTunnelMidpoint {
            encrypt_via: SecretKey::generate(&mut rng).public_key(),
            proxy_as: ShortId::from([5; 32]),
            message_prefix: ShortId::from([6; 32]),
        });
        let data = message.to_vec().unwrap();
        assert_eq!(Message::from_slice(&data), Some(message));
    }
}
