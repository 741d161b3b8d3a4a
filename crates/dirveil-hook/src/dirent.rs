//! Codec for the raw record buffer produced by the enumeration call.
//!
//! The buffer is a contiguous run of variable-length, self-describing
//! records: a fixed native-endian header (inode, offset of the next record,
//! declared record length) followed by a NUL-terminated name, with the
//! declared length padded to an 8-byte boundary. The sum of the declared
//! lengths equals the reported buffer length; there are no gaps.

use thiserror::Error;

/// Fixed part of a record: `u64` inode + `u64` next-offset + `u16` length.
pub const HEADER_LEN: usize = 18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirentError {
    #[error("record at offset {offset} crosses the end of the valid region")]
    Truncated { offset: usize },
    #[error("record at offset {offset} declares invalid length {reclen}")]
    BadRecordLength { offset: usize, reclen: u16 },
}

/// Borrowed view of one record inside the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry<'a> {
    pub ino: u64,
    pub off: u64,
    pub reclen: u16,
    /// Name bytes up to the first NUL, or up to the record end if the
    /// record carries no terminator.
    pub name: &'a [u8],
}

/// Parse the record starting at `offset` inside the valid region `buf`.
pub fn parse(buf: &[u8], offset: usize) -> Result<DirEntry<'_>, DirentError> {
    let header_end = offset
        .checked_add(HEADER_LEN)
        .filter(|end| *end <= buf.len())
        .ok_or(DirentError::Truncated { offset })?;

    let ino = u64::from_ne_bytes(buf[offset..offset + 8].try_into().unwrap());
    let off = u64::from_ne_bytes(buf[offset + 8..offset + 16].try_into().unwrap());
    let reclen = u16::from_ne_bytes(buf[offset + 16..header_end].try_into().unwrap());

    if (reclen as usize) <= HEADER_LEN {
        return Err(DirentError::BadRecordLength { offset, reclen });
    }
    let record_end = offset + reclen as usize;
    if record_end > buf.len() {
        return Err(DirentError::Truncated { offset });
    }

    let body = &buf[header_end..record_end];
    let name = match body.iter().position(|b| *b == 0) {
        Some(nul) => &body[..nul],
        None => body,
    };

    Ok(DirEntry {
        ino,
        off,
        reclen,
        name,
    })
}

/// Iterator over the records of a buffer, front to back in declared-length
/// steps. Stops at the first malformed record after yielding its error.
pub fn entries(buf: &[u8]) -> EntryIter<'_> {
    EntryIter { buf, offset: 0 }
}

pub struct EntryIter<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Result<DirEntry<'a>, DirentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }
        match parse(self.buf, self.offset) {
            Ok(entry) => {
                self.offset += entry.reclen as usize;
                Some(Ok(entry))
            }
            Err(err) => {
                self.offset = self.buf.len();
                Some(Err(err))
            }
        }
    }
}

/// Declared length of a record holding `name_len` name bytes.
pub fn record_len(name_len: usize) -> usize {
    (HEADER_LEN + name_len + 1 + 7) & !7
}

/// Append one record to `buf`, keeping the contiguity invariant. Used by
/// fake enumerators and tests to build well-formed buffers.
pub fn append(buf: &mut Vec<u8>, ino: u64, name: &str) {
    let reclen = record_len(name.len());
    let next_off = (buf.len() + reclen) as u64;
    buf.extend_from_slice(&ino.to_ne_bytes());
    buf.extend_from_slice(&next_off.to_ne_bytes());
    buf.extend_from_slice(&(reclen as u16).to_ne_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.resize(next_off as usize, 0);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_and_contiguity() {
        let mut buf = Vec::new();
        append(&mut buf, 1, "alpha");
        append(&mut buf, 2, "b");
        append(&mut buf, 3, "a-much-longer-entry-name");

        let parsed: Vec<_> = entries(&buf).map(|e| e.unwrap()).collect();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].name, b"alpha");
        assert_eq!(parsed[1].ino, 2);
        assert_eq!(parsed[2].name, b"a-much-longer-entry-name");

        let total: usize = parsed.iter().map(|e| e.reclen as usize).sum();
        assert_eq!(total, buf.len());
    }

    #[test]
    fn zero_reclen_is_rejected_not_looped_on() {
        let mut buf = Vec::new();
        append(&mut buf, 1, "x");
        buf[16] = 0;
        buf[17] = 0;
        let mut iter = entries(&buf);
        assert_eq!(
            iter.next(),
            Some(Err(DirentError::BadRecordLength {
                offset: 0,
                reclen: 0
            }))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut buf = Vec::new();
        append(&mut buf, 1, "x");
        buf.truncate(buf.len() - 4);
        assert_eq!(parse(&buf, 0), Err(DirentError::Truncated { offset: 0 }));
        // A header that does not even fit.
        assert_eq!(parse(&buf[..4], 0), Err(DirentError::Truncated { offset: 0 }));
    }

    #[test]
    fn name_without_terminator_is_bounded_by_the_record() {
        let mut buf = Vec::new();
        append(&mut buf, 7, "abcde");
        // Overwrite the NUL and the padding with name bytes.
        for b in buf.iter_mut().skip(HEADER_LEN + 5) {
            *b = b'z';
        }
        let entry = parse(&buf, 0).unwrap();
        assert_eq!(entry.name.len(), entry.reclen as usize - HEADER_LEN);
    }
}
