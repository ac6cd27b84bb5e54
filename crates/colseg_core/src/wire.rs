//! Little-endian field reader used by footer and DPN decoding.

use crate::error::{SegmentError, SegmentResult};

/// Reads fixed-width fields from a byte slice, reporting truncation as
/// corruption.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    cursor: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Self {
            data,
            cursor: 0,
            what,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub(crate) fn bytes(&mut self, len: usize) -> SegmentResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(SegmentError::corrupt(format!(
                "{} truncated at byte {} (wanted {len}, have {})",
                self.what,
                self.cursor,
                self.remaining()
            )));
        }
        let out = &self.data[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> SegmentResult<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.bytes(N)?);
        Ok(buf)
    }

    pub(crate) fn u8(&mut self) -> SegmentResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> SegmentResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> SegmentResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> SegmentResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> SegmentResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}
