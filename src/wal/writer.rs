//! Append-only log writer.
//!
//! Records are serialized straight into an aligned buffer and written out
//! in one call per flush. Opening an existing log scans it to resume the
//! sequence and cuts off any torn tail left by a crash.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::arena::{Arena, SlotIndex};
use crate::config::WalConfig;
use crate::error::WalError;
use crate::wal::buffer::{padding_len, AlignedBuffer, ALIGNMENT};
use crate::wal::reader::WalReader;
use crate::wal::record::{
    frame_len, insert_payload_len, record_type, InsertMeta, MatchRecord, OrderRecord, RecordHeader,
    CRC_LEN, HEADER_LEN, INSERT_META_LEN, MATCH_RECORD_LEN, MAX_PAYLOAD_LEN, MAX_SEQUENCE,
    ORDER_RECORD_LEN,
};
use crate::wal::AuxSource;

/// What an existing log file holds.
#[derive(Debug, Default)]
struct Scan {
    valid_end: u64,
    file_len: u64,
    last_sequence: u64,
    records: u64,
}

/// Write-ahead log writer.
pub struct Wal {
    file: File,
    path: PathBuf,
    buffer: AlignedBuffer,
    /// Largest frame accepted
    record_limit: usize,
    /// File offset where the buffer will land
    position: u64,
    /// Leading buffer bytes already in the file
    flushed: usize,
    next_sequence: u64,
    hot_size: usize,
    cold_size: usize,
    crc_enabled: bool,
    direct: bool,
    sync_interval: u32,
    since_sync: u32,
}

impl Wal {
    /// Open or create the log described by `config`.
    ///
    /// `hot_size` and `cold_size` must match the arena whose slots will be
    /// logged.
    pub fn open(config: &WalConfig, hot_size: usize, cold_size: usize) -> Result<Self, WalError> {
        config.validate()?;
        if insert_payload_len(hot_size, cold_size) > MAX_PAYLOAD_LEN
            || frame_len(insert_payload_len(hot_size, cold_size), config.crc_enabled)
                > config.buffer_size
        {
            return Err(WalError::RecordTooLarge {
                len: frame_len(insert_payload_len(hot_size, cold_size), config.crc_enabled),
                capacity: config.buffer_size.min(MAX_PAYLOAD_LEN),
            });
        }

        let scan = scan(&config.path, config.crc_enabled)?;
        let (mut file, direct) = open_file(&config.path, config.direct_io)?;

        let mut position = scan.valid_end;
        if scan.file_len > scan.valid_end {
            warn!(
                target: "wal",
                path = %config.path.display(),
                valid_end = scan.valid_end,
                file_len = scan.file_len,
                "truncating torn tail"
            );
            file.set_len(scan.valid_end)?;
        }
        if direct {
            // Resume on a block boundary; the gap reads back as padding.
            position += padding_len(position);
            file.set_len(position)?;
        }
        file.seek(SeekFrom::Start(position))?;

        info!(
            target: "wal",
            path = %config.path.display(),
            records = scan.records,
            next_sequence = scan.last_sequence + 1,
            direct,
            "WAL opened"
        );

        let record_limit = config.buffer_size.div_ceil(ALIGNMENT) * ALIGNMENT;
        // Direct mode carries up to one partial block between flushes.
        let capacity = if direct {
            record_limit + ALIGNMENT
        } else {
            record_limit
        };

        Ok(Self {
            file,
            path: config.path.clone(),
            buffer: AlignedBuffer::new(capacity),
            record_limit,
            position,
            flushed: 0,
            next_sequence: scan.last_sequence + 1,
            hot_size,
            cold_size,
            crc_enabled: config.crc_enabled,
            direct,
            sync_interval: config.sync_interval,
            since_sync: 0,
        })
    }

    // ========================================================================
    // Appends
    // ========================================================================

    /// Log an order slot with its hot and cold data.
    pub fn append_insert(&mut self, arena: &Arena, slot: SlotIndex) -> Result<u64, WalError> {
        self.append_insert_with(arena, slot, arena)
    }

    /// Log an order slot, taking the cold bytes from `aux`.
    pub fn append_insert_with(
        &mut self,
        arena: &Arena,
        slot: SlotIndex,
        aux: &dyn AuxSource,
    ) -> Result<u64, WalError> {
        let hot = arena.data(slot);
        let cold = aux.aux_bytes(slot);
        if hot.len() != self.hot_size || cold.len() != self.cold_size {
            return Err(WalError::SizeMismatch {
                expected: (self.hot_size, self.cold_size),
                actual: (hot.len(), cold.len()),
            });
        }

        let meta = InsertMeta::from_slot(arena.slot(slot), slot, hot.len(), cold.len());
        let len = insert_payload_len(hot.len(), cold.len());
        self.append_frame(record_type::INSERT, len, |payload| {
            meta.encode(&mut payload[..INSERT_META_LEN]);
            let hot_end = INSERT_META_LEN + hot.len();
            payload[INSERT_META_LEN..hot_end].copy_from_slice(hot);
            payload[hot_end..hot_end + cold.len()].copy_from_slice(cold);
        })
    }

    pub fn append_cancel(
        &mut self,
        order_id: u64,
        slot: SlotIndex,
        product_id: u16,
    ) -> Result<u64, WalError> {
        self.append_order(record_type::CANCEL, order_id, slot, product_id)
    }

    pub fn append_activate(
        &mut self,
        order_id: u64,
        slot: SlotIndex,
        product_id: u16,
    ) -> Result<u64, WalError> {
        self.append_order(record_type::ACTIVATE, order_id, slot, product_id)
    }

    pub fn append_deactivate(
        &mut self,
        order_id: u64,
        slot: SlotIndex,
        product_id: u16,
    ) -> Result<u64, WalError> {
        self.append_order(record_type::DEACTIVATE, order_id, slot, product_id)
    }

    fn append_order(
        &mut self,
        kind: u8,
        order_id: u64,
        slot: SlotIndex,
        product_id: u16,
    ) -> Result<u64, WalError> {
        let record = OrderRecord::new(order_id, slot, product_id);
        self.append_frame(kind, ORDER_RECORD_LEN, |payload| record.encode(payload))
    }

    pub fn append_match(&mut self, record: &MatchRecord) -> Result<u64, WalError> {
        self.append_frame(record_type::MATCH, MATCH_RECORD_LEN, |payload| {
            record.encode(payload)
        })
    }

    /// Log caller-defined bytes under a type tag of 0x80 or above.
    pub fn append_user(&mut self, kind: u8, bytes: &[u8]) -> Result<u64, WalError> {
        if kind < record_type::USER_MIN {
            return Err(WalError::InvalidRecordType(kind));
        }
        self.append_frame(kind, bytes.len(), |payload| payload.copy_from_slice(bytes))
    }

    /// Frame a record into the buffer and return its sequence.
    ///
    /// An error means nothing was buffered. Once the record is in the
    /// buffer this returns its sequence; an interval sync that fails at
    /// that point is retried before the next record is accepted.
    fn append_frame<F>(&mut self, kind: u8, payload_len: usize, fill: F) -> Result<u64, WalError>
    where
        F: FnOnce(&mut [u8]),
    {
        let len = frame_len(payload_len, self.crc_enabled);
        if payload_len > MAX_PAYLOAD_LEN || len > self.record_limit {
            return Err(WalError::RecordTooLarge {
                len,
                capacity: self.record_limit.min(MAX_PAYLOAD_LEN),
            });
        }
        if self.sync_due() {
            self.fsync()?;
        }
        if len > self.buffer.remaining() {
            self.flush()?;
        }

        let sequence = self.next_sequence;
        debug_assert!(sequence <= MAX_SEQUENCE, "sequence space exhausted");
        let header = RecordHeader {
            sequence,
            kind,
            len: payload_len as u16,
        };

        let frame = self.buffer.append_zeroed(len);
        frame[..HEADER_LEN].copy_from_slice(&header.pack().to_le_bytes());
        let body_end = HEADER_LEN + payload_len;
        fill(&mut frame[HEADER_LEN..body_end]);
        if self.crc_enabled {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&frame[..body_end]);
            frame[body_end..body_end + CRC_LEN].copy_from_slice(&hasher.finalize().to_le_bytes());
        }

        self.next_sequence += 1;
        self.since_sync += 1;
        if self.sync_due() {
            if let Err(e) = self.fsync() {
                warn!(
                    target: "wal",
                    error = %e,
                    sequence,
                    "interval sync failed, retrying before the next record"
                );
            }
        }
        Ok(sequence)
    }

    #[inline]
    fn sync_due(&self) -> bool {
        self.sync_interval > 0 && self.since_sync >= self.sync_interval
    }

    // ========================================================================
    // Durability
    // ========================================================================

    /// Write buffered records to the file.
    ///
    /// The buffer is only cleared once the write succeeds, so a failed
    /// flush can be retried. In direct mode the last partial block stays
    /// buffered and is rewritten in place by the next flush, so the file
    /// grows by the records written rather than a block per flush.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.buffer.len() == self.flushed {
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(self.position))?;
        if self.direct {
            let bytes = self.buffer.padded();
            let written = bytes.len();
            self.file.write_all(bytes)?;

            let whole = self.buffer.len() / ALIGNMENT * ALIGNMENT;
            debug!(target: "wal", bytes = written, position = self.position, "flushed");
            self.buffer.consume(whole);
            self.position += whole as u64;
            self.flushed = self.buffer.len();
        } else {
            self.file.write_all(self.buffer.as_slice())?;

            debug!(
                target: "wal",
                bytes = self.buffer.len(),
                position = self.position,
                "flushed"
            );
            self.position += self.buffer.len() as u64;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush and wait for the data to reach the device.
    pub fn fsync(&mut self) -> Result<(), WalError> {
        self.flush()?;
        self.file.sync_data()?;
        self.since_sync = 0;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Sequence the next record will carry.
    #[inline]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Sequence of the last record appended, 0 if none.
    #[inline]
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Bytes waiting for the next flush.
    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.flushed
    }

    /// Offset in the file where the written records end.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.position + self.flushed as u64
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if writes bypass the page cache.
    #[inline]
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    #[inline]
    pub fn crc_enabled(&self) -> bool {
        self.crc_enabled
    }

    #[inline]
    pub fn hot_size(&self) -> usize {
        self.hot_size
    }

    #[inline]
    pub fn cold_size(&self) -> usize {
        self.cold_size
    }
}

#[cfg(test)]
impl Wal {
    /// Swap the underlying file handle.
    pub(crate) fn replace_file(&mut self, file: File) -> File {
        std::mem::replace(&mut self.file, file)
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(target: "wal", error = %e, path = %self.path.display(), "flush on close failed");
        }
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("next_sequence", &self.next_sequence)
            .field("position", &self.position)
            .field("buffered", &self.buffered_len())
            .field("direct", &self.direct)
            .finish()
    }
}

/// Walk an existing log to find where valid data ends.
fn scan(path: &Path, crc_enabled: bool) -> Result<Scan, WalError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Scan::default()),
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();

    let mut reader = WalReader::from_reader(io::BufReader::new(file), crc_enabled);
    loop {
        match reader.next_record() {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(WalError::CrcMismatch { sequence, offset }) => {
                return Err(WalError::Corrupt {
                    offset,
                    reason: format!("CRC mismatch on record {sequence}; refusing to append"),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Scan {
        valid_end: reader.offset(),
        file_len,
        last_sequence: reader.last_sequence(),
        records: reader.records(),
    })
}

/// Open for writing, with O_DIRECT when asked and supported.
fn open_file(path: &Path, direct_io: bool) -> Result<(File, bool), WalError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);

    if direct_io {
        match open_direct(&options, path) {
            Ok(file) => return Ok((file, true)),
            Err(e) => warn!(
                target: "wal",
                error = %e,
                path = %path.display(),
                "direct I/O unavailable, using buffered writes"
            ),
        }
    }
    Ok((options.open(path)?, false))
}

#[cfg(target_os = "linux")]
fn open_direct(options: &OpenOptions, path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = options.clone();
    options.custom_flags(libc::O_DIRECT);
    options.open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_direct(_options: &OpenOptions, _path: &Path) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "O_DIRECT is only available on Linux",
    ))
}
