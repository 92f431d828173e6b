//! Sequential record reader.
//!
//! The reader stops quietly at the end of valid data: a clean EOF, an
//! unknown type tag or a record cut short by a crash all end the stream
//! with `Ok(None)`. Damage inside a complete frame is an error, and the
//! reader has already stepped past that frame so the caller may go on.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::WalError;
use crate::wal::buffer::ALIGNMENT;
use crate::wal::record::{
    check_insert, record_type, RawRecord, RecordHeader, CRC_LEN, HEADER_LEN, MATCH_RECORD_LEN,
    ORDER_RECORD_LEN,
};

/// Streaming reader over a write-ahead log.
pub struct WalReader<R> {
    inner: R,
    crc_enabled: bool,
    /// Offset of the next unread byte
    offset: u64,
    last_sequence: u64,
    frame: Vec<u8>,
    records: u64,
    done: bool,
}

impl WalReader<BufReader<File>> {
    /// Open a log file for reading.
    pub fn open(path: impl AsRef<Path>, crc_enabled: bool) -> Result<Self, WalError> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), crc_enabled))
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(inner: R, crc_enabled: bool) -> Self {
        Self {
            inner,
            crc_enabled,
            offset: 0,
            last_sequence: 0,
            frame: Vec::with_capacity(ALIGNMENT),
            records: 0,
            done: false,
        }
    }

    /// Read the next record.
    ///
    /// # Returns
    /// * `Ok(Some(record))` - a complete, verified record
    /// * `Ok(None)` - end of valid data
    /// * `Err(CrcMismatch)` - checksum failure; the next call continues after it
    /// * `Err(Corrupt)` - a frame that cannot be valid
    pub fn next_record(&mut self) -> Result<Option<RawRecord<'_>>, WalError> {
        loop {
            if self.done {
                return Ok(None);
            }
            let start = self.offset;

            let mut word = [0u8; HEADER_LEN];
            let got = read_full(&mut self.inner, &mut word)?;
            if got < HEADER_LEN {
                // Clean end, or a header cut short
                self.done = true;
                return Ok(None);
            }

            let raw = u64::from_le_bytes(word);
            if raw == 0 {
                if !self.skip_padding(start)? {
                    self.done = true;
                    return Ok(None);
                }
                continue;
            }

            let header = RecordHeader::unpack(raw);
            if !record_type::is_known(header.kind) {
                self.done = true;
                return Ok(None);
            }

            let payload_len = header.len as usize;
            let crc_len = if self.crc_enabled { CRC_LEN } else { 0 };
            self.frame.clear();
            self.frame.resize(HEADER_LEN + payload_len + crc_len, 0);
            self.frame[..HEADER_LEN].copy_from_slice(&word);
            let got = read_full(&mut self.inner, &mut self.frame[HEADER_LEN..])?;
            if got < payload_len + crc_len {
                self.done = true;
                return Ok(None);
            }

            // The frame is complete: whatever happens next, move past it.
            self.offset = start + self.frame.len() as u64;
            let previous = self.last_sequence;
            self.last_sequence = self.last_sequence.max(header.sequence);

            if self.crc_enabled {
                let body = &self.frame[..HEADER_LEN + payload_len];
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(body);
                let mut stored = [0u8; CRC_LEN];
                stored.copy_from_slice(&self.frame[HEADER_LEN + payload_len..]);
                if hasher.finalize() != u32::from_le_bytes(stored) {
                    return Err(WalError::CrcMismatch {
                        sequence: header.sequence,
                        offset: start,
                    });
                }
            }

            let follows = if previous == 0 {
                header.sequence > 0
            } else {
                header.sequence == previous + 1
            };
            if !follows {
                return Err(WalError::Corrupt {
                    offset: start,
                    reason: format!(
                        "sequence {} does not follow {previous}",
                        header.sequence
                    ),
                });
            }

            let payload = &self.frame[HEADER_LEN..HEADER_LEN + payload_len];
            check_frame(header.kind, payload).map_err(|reason| WalError::Corrupt {
                offset: start,
                reason,
            })?;

            self.records += 1;
            return Ok(Some(RawRecord {
                sequence: header.sequence,
                kind: header.kind,
                payload,
                offset: start,
            }));
        }
    }

    /// Skip from a zero header word to the end of its padding block.
    ///
    /// Returns `false` if the input ends inside the padding.
    fn skip_padding(&mut self, start: u64) -> Result<bool, WalError> {
        let align = ALIGNMENT as u64;
        let word_end = start + HEADER_LEN as u64;
        let target = word_end.div_ceil(align) * align;
        let gap = target - word_end;

        let skipped = io::copy(&mut (&mut self.inner).take(gap), &mut io::sink())?;
        if skipped < gap {
            return Ok(false);
        }
        self.offset = target;
        Ok(true)
    }

    /// Offset just past the last record or padding block consumed.
    ///
    /// After `next_record` returns `Ok(None)` this is the end of valid
    /// data; anything beyond it is a torn tail.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Highest sequence seen so far, 0 if none.
    #[inline]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Number of valid records returned.
    #[inline]
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn check_frame(kind: u8, payload: &[u8]) -> Result<(), String> {
    let expected = match kind {
        record_type::INSERT => return check_insert(payload).map(|_| ()),
        record_type::CANCEL | record_type::ACTIVATE | record_type::DEACTIVATE => ORDER_RECORD_LEN,
        record_type::MATCH => MATCH_RECORD_LEN,
        _ => return Ok(()),
    };
    if payload.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "record type {kind} carries {} bytes, expected {expected}",
            payload.len()
        ))
    }
}

/// Read until `buf` is full or the input ends; returns bytes read.
fn read_full<R: Read>(inner: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::record::{MatchRecord, OrderRecord};
    use std::io::Cursor;

    fn frame(sequence: u64, kind: u8, payload: &[u8], crc: bool) -> Vec<u8> {
        let header = RecordHeader {
            sequence,
            kind,
            len: payload.len() as u16,
        };
        let mut out = header.pack().to_le_bytes().to_vec();
        out.extend_from_slice(payload);
        if crc {
            let checksum = crc32fast::hash(&out);
            out.extend_from_slice(&checksum.to_le_bytes());
        }
        out
    }

    fn cancel(sequence: u64, order_id: u64, crc: bool) -> Vec<u8> {
        let mut payload = [0u8; ORDER_RECORD_LEN];
        OrderRecord::new(order_id, 3, 0).encode(&mut payload);
        frame(sequence, record_type::CANCEL, &payload, crc)
    }

    fn sequences(bytes: Vec<u8>, crc: bool) -> Vec<u64> {
        let mut reader = WalReader::from_reader(Cursor::new(bytes), crc);
        let mut out = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            out.push(record.sequence);
        }
        out
    }

    #[test]
    fn test_empty_input() {
        assert!(sequences(Vec::new(), true).is_empty());
    }

    #[test]
    fn test_reads_records_in_order() {
        let mut bytes = cancel(1, 10, true);
        let mut payload = [0u8; MATCH_RECORD_LEN];
        MatchRecord::new(1, 2, 100, 5, 0).encode(&mut payload);
        bytes.extend(frame(2, record_type::MATCH, &payload, true));
        bytes.extend(frame(3, 0x90, b"user", true));

        let mut reader = WalReader::from_reader(Cursor::new(bytes.clone()), true);
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!((first.sequence, first.kind, first.offset), (1, record_type::CANCEL, 0));
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.kind, record_type::MATCH);
        let third = reader.next_record().unwrap().unwrap();
        assert_eq!(third.payload, b"user");
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.offset(), bytes.len() as u64);
        assert_eq!(reader.last_sequence(), 3);
    }

    #[test]
    fn test_truncated_tail_ends_stream() {
        let mut bytes = cancel(1, 10, false);
        let valid = bytes.len() as u64;
        let torn = cancel(2, 11, false);
        bytes.extend_from_slice(&torn[..torn.len() - 5]);

        let mut reader = WalReader::from_reader(Cursor::new(bytes), false);
        assert!(reader.next_record().unwrap().is_some());
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.offset(), valid);
        // Stays ended
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_unknown_type_ends_stream() {
        let mut bytes = cancel(1, 10, false);
        bytes.extend(frame(2, 0x42, &[0; 8], false));
        bytes.extend(cancel(3, 11, false));
        assert_eq!(sequences(bytes, false), vec![1]);
    }

    #[test]
    fn test_crc_mismatch_is_skippable() {
        let mut bytes = cancel(1, 10, true);
        let bad_at = bytes.len();
        bytes.extend(cancel(2, 11, true));
        bytes.extend(cancel(3, 12, true));
        bytes[bad_at + HEADER_LEN + 2] ^= 0xFF;

        let mut reader = WalReader::from_reader(Cursor::new(bytes), true);
        assert_eq!(reader.next_record().unwrap().map(|r| r.sequence), Some(1));
        match reader.next_record() {
            Err(WalError::CrcMismatch { sequence, offset }) => {
                assert_eq!(sequence, 2);
                assert_eq!(offset, bad_at as u64);
            }
            other => panic!("expected CRC mismatch, got {other:?}"),
        }
        assert_eq!(reader.next_record().unwrap().map(|r| r.sequence), Some(3));
    }

    #[test]
    fn test_sequence_regression_is_corrupt() {
        let mut bytes = cancel(5, 10, false);
        bytes.extend(cancel(4, 11, false));

        let mut reader = WalReader::from_reader(Cursor::new(bytes), false);
        assert!(reader.next_record().unwrap().is_some());
        assert!(matches!(reader.next_record(), Err(WalError::Corrupt { .. })));
    }

    #[test]
    fn test_sequence_gap_is_corrupt() {
        let mut bytes = cancel(1, 10, true);
        bytes.extend(cancel(2, 11, true));
        let gap_at = bytes.len() as u64;
        bytes.extend(cancel(4, 12, true));
        bytes.extend(cancel(5, 13, true));

        let mut reader = WalReader::from_reader(Cursor::new(bytes), true);
        assert!(reader.next_record().unwrap().is_some());
        assert!(reader.next_record().unwrap().is_some());
        assert!(matches!(
            reader.next_record(),
            Err(WalError::Corrupt { offset, .. }) if offset == gap_at
        ));
        // Records after the gap follow it
        assert_eq!(reader.next_record().unwrap().map(|r| r.sequence), Some(5));
    }

    #[test]
    fn test_wrong_fixed_length_is_corrupt() {
        let bytes = frame(1, record_type::CANCEL, &[0; 16], false);
        let mut reader = WalReader::from_reader(Cursor::new(bytes), false);
        assert!(matches!(reader.next_record(), Err(WalError::Corrupt { .. })));
    }

    #[test]
    fn test_skips_block_padding() {
        let mut bytes = cancel(1, 10, true);
        bytes.resize(ALIGNMENT, 0);
        bytes.extend(cancel(2, 11, true));
        bytes.resize(2 * ALIGNMENT, 0);

        let mut reader = WalReader::from_reader(Cursor::new(bytes), true);
        assert_eq!(reader.next_record().unwrap().map(|r| r.sequence), Some(1));
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!((second.sequence, second.offset), (2, ALIGNMENT as u64));
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.offset(), 2 * ALIGNMENT as u64);
    }
}
