// sampler-core/src/storage/format.rs

//! On-disk array file format.
//!
//! All integers are little-endian:
//! ```text
//! +----------------------------+
//! | magic "SMPA"      [u8; 4]  |
//! | version           u32      |
//! | ndims             u32      |
//! | reserved          u32      |
//! | dims              u64 * n  |  <- leading sample axis first
//! +----------------------------+
//! | data              f32 * M  |  <- row-major, M = product(dims)
//! +----------------------------+
//! ```

use std::io::Read;

use crate::error::{Result, RuntimeError};

/// Header of an array file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayHeader {
    pub version: u32,
    pub dims: Vec<u64>,
}

impl ArrayHeader {
    /// Magic bytes for array files
    pub const MAGIC: [u8; 4] = *b"SMPA";

    /// Current format version
    pub const VERSION: u32 = 1;

    /// Upper bound on the rank of a stored array.
    pub const MAX_DIMS: u32 = 32;

    const FIXED_LEN: usize = 16;

    pub fn new(dims: Vec<u64>) -> Self {
        Self {
            version: Self::VERSION,
            dims,
        }
    }

    /// Size of the encoded header in bytes; the data section starts here.
    pub fn encoded_len(&self) -> usize {
        Self::FIXED_LEN + self.dims.len() * 8
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&Self::MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.dims.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        for dim in &self.dims {
            out.extend_from_slice(&dim.to_le_bytes());
        }
        out
    }

    /// Reads and validates a header from the start of `reader`.
    ///
    /// `name` labels errors.
    pub fn decode(reader: &mut impl Read, name: &str) -> Result<Self> {
        let mut fixed = [0u8; Self::FIXED_LEN];
        reader
            .read_exact(&mut fixed)
            .map_err(|_| RuntimeError::dataset(name, "file too short for array header"))?;

        if fixed[0..4] != Self::MAGIC {
            return Err(RuntimeError::dataset(name, "bad magic, not an array file"));
        }

        let version = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
        if version != Self::VERSION {
            return Err(RuntimeError::dataset(
                name,
                format!("unsupported format version {version}"),
            ));
        }

        let ndims = u32::from_le_bytes([fixed[8], fixed[9], fixed[10], fixed[11]]);
        if ndims == 0 || ndims > Self::MAX_DIMS {
            return Err(RuntimeError::dataset(
                name,
                format!("invalid number of dimensions {ndims}"),
            ));
        }

        let mut dims = Vec::with_capacity(ndims as usize);
        let mut word = [0u8; 8];
        for _ in 0..ndims {
            reader
                .read_exact(&mut word)
                .map_err(|_| RuntimeError::dataset(name, "truncated dimension list"))?;
            dims.push(u64::from_le_bytes(word));
        }

        Ok(Self { version, dims })
    }

    /// Size in bytes of the data section this header describes.
    pub fn data_len(&self) -> Option<u64> {
        self.dims
            .iter()
            .try_fold(4u64, |acc, &d| acc.checked_mul(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_encode_layout() {
        let header = ArrayHeader::new(vec![10, 3]);
        let bytes = header.encode();

        assert_eq!(bytes.len(), header.encoded_len());
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], b"SMPA");
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
        assert_eq!(&bytes[16..24], &10u64.to_le_bytes());
    }

    #[test]
    fn test_header_decode() {
        let header = ArrayHeader::new(vec![7, 2, 5]);
        let decoded = ArrayHeader::decode(&mut Cursor::new(header.encode()), "t").unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.data_len(), Some(7 * 2 * 5 * 4));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = ArrayHeader::new(vec![1]).encode();
        bytes[0] = b'X';
        let err = ArrayHeader::decode(&mut Cursor::new(bytes), "t").unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_bad_version() {
        let mut header = ArrayHeader::new(vec![1]);
        header.version = 9;
        assert!(ArrayHeader::decode(&mut Cursor::new(header.encode()), "t").is_err());
    }

    #[test]
    fn test_zero_dims() {
        let header = ArrayHeader::new(vec![]);
        assert!(ArrayHeader::decode(&mut Cursor::new(header.encode()), "t").is_err());
    }

    #[test]
    fn test_truncated() {
        let bytes = ArrayHeader::new(vec![4, 4]).encode();
        assert!(ArrayHeader::decode(&mut Cursor::new(&bytes[..20]), "t").is_err());
        assert!(ArrayHeader::decode(&mut Cursor::new(&bytes[..3]), "t").is_err());
    }

    #[test]
    fn test_data_len_overflow() {
        let header = ArrayHeader::new(vec![u64::MAX, 2]);
        assert_eq!(header.data_len(), None);
    }
}
