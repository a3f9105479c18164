//! Compact binary encoding for proofs.
//!
//! Integers are big-endian.  A [`MerkleProof`] is laid out as
//!
//! ```text
//! value_size:u32 leaf sibling_size:u32 sibling cohash_count:u8 cohash*
//! ```
//!
//! and a [`BatchMerkleProof`] as
//!
//! ```text
//! depth:u32 value_size:u32 value_count:u32 value*
//! path_count:u32 ( has_sibling:u8 [sibling_size:u32 sibling] cohash_count:u8 cohash* )*
//! ```
//!
//! Decoding checks every length against the remaining input before
//! allocating, so a short buffer can't make us reserve large containers.

use thiserror::Error;

use crate::hasher::MerkleHash;
use crate::proof::{BatchMerkleProof, BatchPath, MerkleProof};

/// Errors from encoding or decoding proofs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A container length does not fit its length tag, or is longer than the
    /// input could possibly hold.
    #[error("overflow container")]
    OverflowContainer,

    /// We tried to read past the end of the input.
    #[error("would overrun end of input")]
    OverrunInput,

    /// Bytes were left over after reading a value.
    #[error("extra unnecessary input leftover")]
    ExtraInput,

    /// A flag byte had a value other than 0 or 1.
    #[error("invalid variant for {0}")]
    InvalidVariant(&'static str),

    /// A field is not representable in this format.
    #[error("malformed field {0}")]
    MalformedField(&'static str),
}

/// Types that go between bytes.
pub trait Codec: Sized {
    /// Decodes self from a decoder.
    fn decode(dec: &mut impl Decoder) -> Result<Self, CodecError>;

    /// Encodes self into an encoder.
    fn encode(&self, enc: &mut impl Encoder) -> Result<(), CodecError>;
}

/// Reads inputs.
pub trait Decoder {
    /// Fills `into` from the input.  This does NOT include length tagging.
    fn read_buf(&mut self, into: &mut [u8]) -> Result<(), CodecError>;

    /// Reads a fixed size array.
    fn read_arr<const N: usize>(&mut self) -> Result<[u8; N], CodecError>;

    /// Number of bytes left to read.
    fn remaining(&self) -> usize;
}

/// Writes outputs.
pub trait Encoder {
    /// Writes a buf.  This does NOT include length tagging.
    fn write_buf(&mut self, buf: &[u8]) -> Result<(), CodecError>;
}

impl Encoder for Vec<u8> {
    fn write_buf(&mut self, buf: &[u8]) -> Result<(), CodecError> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

/// Decoder over a flat buffer.
#[derive(Debug)]
pub struct BufDecoder<B> {
    buf: B,
    at: usize,
}

impl<B: AsRef<[u8]>> BufDecoder<B> {
    /// Wraps a buffer, starting at the beginning.
    pub fn new(buf: B) -> Self {
        Self { buf, at: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::OverrunInput);
        }
        let start = self.at;
        self.at += n;
        Ok(&self.buf.as_ref()[start..self.at])
    }
}

impl<B: AsRef<[u8]>> Decoder for BufDecoder<B> {
    fn read_buf(&mut self, into: &mut [u8]) -> Result<(), CodecError> {
        let src = self.take(into.len())?;
        into.copy_from_slice(src);
        Ok(())
    }

    fn read_arr<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut buf = [0; N];
        self.read_buf(&mut buf)?;
        Ok(buf)
    }

    fn remaining(&self) -> usize {
        self.buf.as_ref().len() - self.at
    }
}

macro_rules! impl_int_codec {
    ( $ity:ident $bytes:literal ) => {
        impl Codec for $ity {
            fn decode(dec: &mut impl Decoder) -> Result<Self, CodecError> {
                let arr: [u8; $bytes] = dec.read_arr()?;
                Ok(<$ity>::from_be_bytes(arr))
            }

            fn encode(&self, enc: &mut impl Encoder) -> Result<(), CodecError> {
                enc.write_buf(&self.to_be_bytes())
            }
        }
    };
}

impl_int_codec!(u8 1);
impl_int_codec!(u32 4);

/// Decodes a value, failing if there are leftover bytes.
pub fn decode_buf_exact<T: Codec>(buf: &[u8]) -> Result<T, CodecError> {
    let mut dec = BufDecoder::new(buf);
    let v = T::decode(&mut dec)?;
    if dec.remaining() > 0 {
        return Err(CodecError::ExtraInput);
    }
    Ok(v)
}

/// Encodes a value into a newly allocated vec.
pub fn encode_to_vec<T: Codec>(v: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    v.encode(&mut buf)?;
    Ok(buf)
}

fn encode_len(len: usize, enc: &mut impl Encoder) -> Result<(), CodecError> {
    u32::try_from(len)
        .map_err(|_| CodecError::OverflowContainer)?
        .encode(enc)
}

/// Reads a u32 count of `item_size`-byte items and checks they can fit in the
/// rest of the input.
fn decode_len(dec: &mut impl Decoder, item_size: usize) -> Result<usize, CodecError> {
    let len = u32::decode(dec)? as usize;
    check_fits(&*dec, len, item_size)?;
    Ok(len)
}

fn check_fits(dec: &impl Decoder, count: usize, item_size: usize) -> Result<(), CodecError> {
    match count.checked_mul(item_size) {
        Some(total) if total <= dec.remaining() => Ok(()),
        _ => Err(CodecError::OverflowContainer),
    }
}

fn encode_bytes(bytes: &[u8], enc: &mut impl Encoder) -> Result<(), CodecError> {
    encode_len(bytes.len(), enc)?;
    enc.write_buf(bytes)
}

fn decode_bytes(dec: &mut impl Decoder) -> Result<Vec<u8>, CodecError> {
    let len = decode_len(dec, 1)?;
    let mut buf = vec![0; len];
    dec.read_buf(&mut buf)?;
    Ok(buf)
}

fn encode_hashes<H: MerkleHash>(hashes: &[H], enc: &mut impl Encoder) -> Result<(), CodecError> {
    let count = u8::try_from(hashes.len()).map_err(|_| CodecError::OverflowContainer)?;
    count.encode(enc)?;
    for h in hashes {
        enc.write_buf(h.as_ref())?;
    }
    Ok(())
}

fn decode_hashes<H: MerkleHash>(dec: &mut impl Decoder) -> Result<Vec<H>, CodecError> {
    let count = u8::decode(dec)? as usize;
    check_fits(&*dec, count, H::HASH_LEN)?;

    let mut buf = vec![0; H::HASH_LEN];
    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        dec.read_buf(&mut buf)?;
        hashes.push(H::from_slice(&buf).ok_or(CodecError::MalformedField("cohash"))?);
    }
    Ok(hashes)
}

impl<H: MerkleHash> Codec for MerkleProof<H> {
    fn decode(dec: &mut impl Decoder) -> Result<Self, CodecError> {
        let leaf = decode_bytes(dec)?;
        let sibling = decode_bytes(dec)?;
        let cohashes = decode_hashes(dec)?;
        Ok(Self::new(leaf, sibling, cohashes))
    }

    fn encode(&self, enc: &mut impl Encoder) -> Result<(), CodecError> {
        encode_bytes(&self.leaf, enc)?;
        encode_bytes(&self.sibling, enc)?;
        encode_hashes(&self.cohashes, enc)
    }
}

impl<H: MerkleHash> Codec for BatchPath<H> {
    fn decode(dec: &mut impl Decoder) -> Result<Self, CodecError> {
        let sibling_leaf = match u8::decode(dec)? {
            0 => None,
            1 => Some(decode_bytes(dec)?),
            _ => return Err(CodecError::InvalidVariant("has_sibling")),
        };
        let cohashes = decode_hashes(dec)?;
        Ok(Self::new(sibling_leaf, cohashes))
    }

    fn encode(&self, enc: &mut impl Encoder) -> Result<(), CodecError> {
        match &self.sibling_leaf {
            Some(leaf) => {
                1u8.encode(enc)?;
                encode_bytes(leaf, enc)?;
            }
            None => 0u8.encode(enc)?,
        }
        encode_hashes(&self.cohashes, enc)
    }
}

impl<H: MerkleHash> Codec for BatchMerkleProof<H> {
    fn decode(dec: &mut impl Decoder) -> Result<Self, CodecError> {
        let depth = u32::decode(dec)?;
        let value_size = u32::decode(dec)? as usize;
        let value_count = decode_len(dec, value_size.max(1))?;

        let mut values = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let mut v = vec![0; value_size];
            dec.read_buf(&mut v)?;
            values.push(v);
        }

        // Every path takes at least its two flag bytes.
        let path_count = decode_len(dec, 2)?;
        let mut paths = Vec::with_capacity(path_count);
        for _ in 0..path_count {
            paths.push(BatchPath::decode(dec)?);
        }

        Ok(Self::new(values, paths, depth))
    }

    fn encode(&self, enc: &mut impl Encoder) -> Result<(), CodecError> {
        let value_size = self.values.first().map_or(0, Vec::len);
        if self.values.iter().any(|v| v.len() != value_size) {
            return Err(CodecError::MalformedField("values"));
        }

        self.depth.encode(enc)?;
        encode_len(value_size, enc)?;
        encode_len(self.values.len(), enc)?;
        for v in &self.values {
            enc.write_buf(v)?;
        }

        encode_len(self.paths.len(), enc)?;
        for path in &self.paths {
            path.encode(enc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::hasher::Sha256Hasher;
    use crate::proof::{verify, verify_batch};
    use crate::tree::MerkleTree;

    type H = [u8; 32];

    fn tree(n: usize, size: usize) -> MerkleTree<H> {
        let values = (0..n).map(|i| vec![i as u8; size]);
        MerkleTree::from_values(values, &Sha256Hasher::new()).unwrap()
    }

    #[test]
    fn single_proof_layout() {
        let proof = MerkleProof::<H>::new(vec![1, 2], vec![3, 4], vec![[9; 32]]);
        let buf = encode_to_vec(&proof).unwrap();

        let mut want = vec![0, 0, 0, 2, 1, 2, 0, 0, 0, 2, 3, 4, 1];
        want.extend([9; 32]);
        assert_eq!(buf, want);
        assert_eq!(decode_buf_exact::<MerkleProof<H>>(&buf).unwrap(), proof);
    }

    #[test]
    fn batch_proof_layout() {
        let proof = BatchMerkleProof::<H>::new(
            vec![vec![7, 7], vec![8, 8]],
            vec![BatchPath::new(None, vec![]), BatchPath::new(Some(vec![5]), vec![[1; 32]])],
            4,
        );
        let buf = encode_to_vec(&proof).unwrap();

        let mut want = hex::decode("00000004000000020000000207070808000000020000").unwrap();
        want.extend([1, 0, 0, 0, 1, 5, 1]);
        want.extend([1; 32]);
        assert_eq!(buf, want);
        assert_eq!(decode_buf_exact::<BatchMerkleProof<H>>(&buf).unwrap(), proof);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let h = Sha256Hasher::new();
        let tree = tree(5, 4);
        let mut buf = encode_to_vec(&tree.prove(2).unwrap()).unwrap();

        let decoded: MerkleProof<H> = decode_buf_exact(&buf).unwrap();
        assert!(verify(tree.root(), 2, &decoded, &h));

        buf.push(0);
        assert_eq!(
            decode_buf_exact::<MerkleProof<H>>(&buf),
            Err(CodecError::ExtraInput)
        );
    }

    #[test]
    fn huge_lengths_rejected_before_allocating() {
        let buf = hex::decode("ffffffff00").unwrap();
        assert_eq!(
            decode_buf_exact::<MerkleProof<H>>(&buf),
            Err(CodecError::OverflowContainer)
        );

        let buf = hex::decode("0000000300100000ffffffff").unwrap();
        assert_eq!(
            decode_buf_exact::<BatchMerkleProof<H>>(&buf),
            Err(CodecError::OverflowContainer)
        );

        // Zero-sized values still can't claim more entries than bytes left.
        let buf = hex::decode("0000000300000000ffffffff").unwrap();
        assert_eq!(
            decode_buf_exact::<BatchMerkleProof<H>>(&buf),
            Err(CodecError::OverflowContainer)
        );
    }

    #[test]
    fn bad_sibling_flag() {
        let buf = hex::decode("00000001000000010000000101000000010200").unwrap();
        assert_eq!(
            decode_buf_exact::<BatchMerkleProof<H>>(&buf),
            Err(CodecError::InvalidVariant("has_sibling"))
        );
    }

    #[test]
    fn ragged_values_not_encodable() {
        let proof = BatchMerkleProof::<H>::new(vec![vec![1], vec![1, 2]], vec![], 2);
        assert_eq!(
            encode_to_vec(&proof),
            Err(CodecError::MalformedField("values"))
        );
    }

    #[test]
    fn too_many_cohashes_not_encodable() {
        let proof = MerkleProof::<H>::new(vec![], vec![], vec![[0; 32]; 256]);
        assert_eq!(encode_to_vec(&proof), Err(CodecError::OverflowContainer));
    }

    proptest! {
        #[test]
        fn decoded_batch_proofs_verify(
            n in 1usize..64,
            size in 1usize..40,
            picks in proptest::collection::btree_set(any::<usize>(), 1..8),
        ) {
            let h = Sha256Hasher::new();
            let tree = tree(n, size);
            let indexes: Vec<usize> = picks
                .into_iter()
                .map(|p| p % n)
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();

            let proof = tree.prove_batch(&indexes).unwrap();
            let buf = encode_to_vec(&proof).unwrap();
            let decoded: BatchMerkleProof<H> = decode_buf_exact(&buf).unwrap();
            prop_assert!(verify_batch(tree.root(), &indexes, &decoded, &h));
        }

        #[test]
        fn truncated_input_never_panics(
            n in 1usize..32,
            index in any::<usize>(),
            cut in any::<usize>(),
        ) {
            let tree = tree(n, 8);
            let index = index % n;
            let buf = encode_to_vec(&tree.prove_batch(&[index]).unwrap()).unwrap();
            let cut = cut % buf.len();
            prop_assert!(decode_buf_exact::<BatchMerkleProof<H>>(&buf[..cut]).is_err());
        }

        #[test]
        fn arbitrary_input_never_panics(buf in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_buf_exact::<BatchMerkleProof<H>>(&buf);
            let _ = decode_buf_exact::<MerkleProof<H>>(&buf);
        }
    }
}
