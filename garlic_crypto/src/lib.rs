//! Crypto primitives for the garlic overlay.
//!
//! Every asymmetric layer of a garlic message is a *sealed box*: the sender
//! mints a fresh ephemeral keypair, encrypts with the shared secret of the
//! ephemeral secret key and the recipient's public key, and ships the
//! ephemeral public key and nonce in front of the ciphertext. The recipient
//! needs nothing but its own secret key to open the layer, and the layer
//! carries no sender identity.

#![forbid(unsafe_code)]

use cookie_factory::{do_gen, gen_slice};
use nom::IResult;
use sha2::{Digest, Sha256};
use std::fmt;
use xsalsa20poly1305::aead::{Aead, NewAead};

use garlic_binary_io::*;

pub use crypto_box::{KEY_SIZE, PublicKey, SalsaBox, SecretKey};
pub use xsalsa20poly1305::XSalsa20Poly1305;

use rand::{CryptoRng, Rng};

/// Number of bytes in a [`Nonce`].
pub const NONCEBYTES: usize = 24;

/// Nonce of the XSalsa20 cipher.
pub type Nonce = [u8; NONCEBYTES];

/// Number of bytes of the Poly1305 authentication tag.
pub const MACBYTES: usize = 16;

/// Number of bytes a sealed box adds in front of the plaintext: ephemeral
/// public key, nonce and authentication tag.
pub const SEAL_OVERHEAD: usize = KEY_SIZE + NONCEBYTES + MACBYTES;

/// Number of bytes in a [`ShortId`].
pub const SHORT_ID_SIZE: usize = 32;

/// Sha256 of a byte slice.
pub fn sha256(data: &[u8]) -> [u8; SHORT_ID_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/** Short form of a public key: its sha256 hash.

Short ids are the routing identifiers of the overlay. A relay is addressed by
the short id of its long-term key, a tunnel midpoint by the short id of the
session key it serves.
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortId([u8; SHORT_ID_SIZE]);

impl ShortId {
    /// The all-zero id, used where no meaningful source id exists.
    pub const ZERO: ShortId = ShortId([0; SHORT_ID_SIZE]);

    /// Short id of a public key.
    pub fn of(pk: &PublicKey) -> ShortId {
        ShortId(sha256(pk.as_bytes()))
    }

    /// Id of a symmetric channel key.
    pub fn of_channel_key(key: &[u8; 32]) -> ShortId {
        ShortId(sha256(key))
    }

    /// Raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8; SHORT_ID_SIZE] {
        &self.0
    }

    /// Parse an id from its hex representation.
    pub fn from_hex(s: &str) -> Result<ShortId, hex::FromHexError> {
        let mut bytes = [0; SHORT_ID_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(ShortId(bytes))
    }
}

impl From<[u8; SHORT_ID_SIZE]> for ShortId {
    fn from(bytes: [u8; SHORT_ID_SIZE]) -> ShortId {
        ShortId(bytes)
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ShortId({})", hex::encode(self.0))
    }
}

impl FromBytes for ShortId {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, bytes) = <[u8; SHORT_ID_SIZE]>::from_bytes(input)?;
        Ok((input, ShortId(bytes)))
    }
}

impl ToBytes for ShortId {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf, gen_slice!(self.0.as_ref()))
    }
}

/** Encrypt `plaintext` so that only the owner of the secret half of `to` can
read it.

The result is `ephemeral_pk (32) || nonce (24) || ciphertext`.
*/
pub fn seal<R: Rng + CryptoRng>(rng: &mut R, to: &PublicKey, plaintext: &[u8]) -> Vec<u8> {
    let ephemeral_sk = SecretKey::generate(rng);
    let ephemeral_pk = ephemeral_sk.public_key();
    let nonce = crypto_box::generate_nonce(rng);
    let cipher = SalsaBox::new(to, &ephemeral_sk);
    let ciphertext = cipher.encrypt(&nonce, plaintext).unwrap();

    let mut sealed = Vec::with_capacity(KEY_SIZE + NONCEBYTES + ciphertext.len());
    sealed.extend_from_slice(ephemeral_pk.as_bytes());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/** Open a sealed box produced by [`seal`] with the recipient's secret key.

Returns `Err(())` if the box is too short or does not authenticate.
*/
pub fn open(sk: &SecretKey, sealed: &[u8]) -> Result<Vec<u8>, ()> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(());
    }
    let mut pk_bytes = [0; KEY_SIZE];
    pk_bytes.copy_from_slice(&sealed[..KEY_SIZE]);
    let ephemeral_pk = PublicKey::from(pk_bytes);
    let mut nonce = [0; NONCEBYTES];
    nonce.copy_from_slice(&sealed[KEY_SIZE..KEY_SIZE + NONCEBYTES]);

    let cipher = SalsaBox::new(&ephemeral_pk, sk);
    cipher.decrypt(&nonce.into(), &sealed[KEY_SIZE + NONCEBYTES..]).map_err(drop)
}

/** Encrypt `plaintext` under a symmetric channel key.

The result is `nonce (24) || ciphertext`. Channels are the symmetric shortcut
a relay installs on request so that steady-state traffic can skip the
asymmetric sealed-box path.
*/
pub fn channel_encrypt<R: Rng + CryptoRng>(rng: &mut R, key: &XSalsa20Poly1305, plaintext: &[u8]) -> Vec<u8> {
    let nonce = xsalsa20poly1305::generate_nonce(rng);
    let ciphertext = key.encrypt(&nonce, plaintext).unwrap();

    let mut data = Vec::with_capacity(NONCEBYTES + ciphertext.len());
    data.extend_from_slice(nonce.as_slice());
    data.extend_from_slice(&ciphertext);
    data
}

/// Decrypt data produced by [`channel_encrypt`].
pub fn channel_decrypt(key: &XSalsa20Poly1305, data: &[u8]) -> Result<Vec<u8>, ()> {
    if data.len() < NONCEBYTES + MACBYTES {
        return Err(());
    }
    let mut nonce = [0; NONCEBYTES];
    nonce.copy_from_slice(&data[..NONCEBYTES]);
    key.decrypt(&nonce.into(), &data[NONCEBYTES..]).map_err(drop)
}

/// Build a channel cipher from raw key bytes.
pub fn channel_cipher(key: &[u8; 32]) -> XSalsa20Poly1305 {
    XSalsa20Poly1305::new(key.into())
}
