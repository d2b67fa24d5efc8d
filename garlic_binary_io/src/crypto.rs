use std::convert::TryInto;

use nom::IResult;
use nom::bytes::complete::take;
use nom::combinator::{map, map_opt};

use cookie_factory::{do_gen, gen_slice};
use crypto_box::{KEY_SIZE, PublicKey, SecretKey};

use super::{FromBytes, GenError, ToBytes};

impl FromBytes for PublicKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(map_opt(take(KEY_SIZE), |pk: &[u8]| pk.try_into().ok()), |pk: [u8; KEY_SIZE]| pk.into())(input)
    }
}

impl ToBytes for PublicKey {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf, gen_slice!(self.as_bytes()))
    }
}

impl FromBytes for SecretKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(map_opt(take(KEY_SIZE), |sk: &[u8]| sk.try_into().ok()), |sk: [u8; KEY_SIZE]| sk.into())(input)
    }
}

impl ToBytes for SecretKey {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf, gen_slice!(self.as_bytes()))
    }
}
