/*! Errors for packet decoding and payload decryption.
*/

use nom::error::Error as NomError;
use thiserror::Error;

/// Error that can happen when decrypting and parsing the payload of an
/// encrypted packet.
#[derive(Debug, PartialEq, Error)]
pub enum GetPayloadError {
    /// The payload could not be decrypted.
    #[error("Decrypt payload error")]
    Decrypt,
    /// The decrypted payload could not be parsed.
    #[error("Deserialize payload error: {error:?}, data: {payload:?}")]
    Deserialize {
        /// Parsing error.
        error: nom::Err<NomError<Vec<u8>>>,
        /// The decrypted payload that failed to parse.
        payload: Vec<u8>,
    },
}

impl GetPayloadError {
    pub(crate) fn decrypt() -> GetPayloadError {
        GetPayloadError::Decrypt
    }

    pub(crate) fn deserialize(e: nom::Err<NomError<&[u8]>>, payload: Vec<u8>) -> GetPayloadError {
        GetPayloadError::Deserialize { error: e.to_owned(), payload }
    }
}
