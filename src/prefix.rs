//! CID prefix handling and block/CID integrity verification.
//!
//! This entire file used to be part of <https://github.com/multiformats/rust-cid> in 0.4,
//! but got removed in some refactoring; carried forward here from the upstream bitswap
//! implementation this transport retrieves blocks for.
use cid::{Cid, Version};
#[cfg(test)]
use quickcheck::{Arbitrary, Gen};
use std::convert::TryFrom;
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

/// Prefix represents all metadata of a CID, without the actual content.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Prefix {
    /// The version of CID.
    pub version: Version,
    /// The codec of CID.
    pub codec: u64,
    /// The multihash type of CID.
    pub mh_type: u64,
    /// The multihash length of CID.
    pub mh_len: usize,
}

impl Prefix {
    /// Create a new prefix from encoded bytes.
    pub fn new(data: &[u8]) -> Result<Prefix, cid::Error> {
        let (raw_version, remain) = varint_decode::u64(data).map_err(|_| cid::Error::VarIntDecodeError)?;
        let version = Version::try_from(raw_version)?;

        let (codec, remain) = varint_decode::u64(remain).map_err(|_| cid::Error::VarIntDecodeError)?;

        let (mh_type, remain) = varint_decode::u64(remain).map_err(|_| cid::Error::VarIntDecodeError)?;

        let (mh_len, _remain) = varint_decode::usize(remain).map_err(|_| cid::Error::VarIntDecodeError)?;

        Ok(Prefix {
            version,
            codec,
            mh_type,
            mh_len,
        })
    }

    /// Convert the prefix to encoded bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res = Vec::with_capacity(4);

        let mut buf = varint_encode::u64_buffer();
        let version = varint_encode::u64(self.version.into(), &mut buf);
        res.extend_from_slice(version);
        let mut buf = varint_encode::u64_buffer();
        let codec = varint_encode::u64(self.codec, &mut buf);
        res.extend_from_slice(codec);
        let mut buf = varint_encode::u64_buffer();
        let mh_type = varint_encode::u64(self.mh_type, &mut buf);
        res.extend_from_slice(mh_type);
        let mut buf = varint_encode::u64_buffer();
        let mh_len = varint_encode::u64(self.mh_len as u64, &mut buf);
        res.extend_from_slice(mh_len);

        res
    }

    /// Create a CID out of the prefix and some data that will be hashed.
    pub fn to_cid(&self, data: &[u8]) -> Result<Cid, cid::Error> {
        let code = multihash::Code::try_from(self.mh_type).map_err(|_| cid::Error::UnknownCodec)?;
        let mut hash = code.digest(data);
        if self.mh_len < hash.digest().len() {
            hash = multihash::Multihash::wrap(hash.code(), &hash.digest()[..self.mh_len])
                .map_err(|_| cid::Error::VarIntDecodeError)?;
        }
        Cid::new(self.version, self.codec, hash)
    }
}

impl From<&Cid> for Prefix {
    fn from(cid: &Cid) -> Self {
        Self {
            version: cid.version(),
            codec: cid.codec(),
            mh_type: cid.hash().code(),
            mh_len: cid.hash().digest().len(),
        }
    }
}

/// Verifies that `data` hashes to `cid` under `cid`'s own prefix (version,
/// codec, multihash type/length). Used to reject HTTP responses from
/// misbehaving or adversarial peers: a `200 OK` GET response whose body does
/// not hash to the requested identifier must never be accepted as a block.
pub fn verify_block(cid: &Cid, data: &[u8]) -> bool {
    let prefix = Prefix::from(cid);
    match prefix.to_cid(data) {
        Ok(computed) => &computed == cid,
        Err(_) => false,
    }
}

#[cfg(test)]
impl Arbitrary for Prefix {
    fn arbitrary(g: &mut Gen) -> Self {
        // Stick to the one multihash/codec combination this crate actually
        // verifies against, rather than arbitrary (version, codec, mh_type,
        // mh_len) tuples that may not round-trip through `to_cid`.
        let version = if bool::arbitrary(g) { Version::V0 } else { Version::V1 };
        Prefix {
            version,
            codec: 0x55, // raw
            mh_type: u64::from(multihash::Code::Sha2_256),
            mh_len: 32,
        }
    }
}
