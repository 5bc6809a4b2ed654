use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

use crate::mbr::{MbrError, PartitionEntry, decode_partition, read_mbr};

/// Copy buffer size. Bounds peak memory while keeping the number of
/// syscalls per partition reasonable.
pub const CHUNK_SIZE: usize = 50 * 1024;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("MBR error: {0}")]
    Mbr(#[from] MbrError),
    #[error("Partition {0} is empty")]
    EmptyPartition(usize),
    #[error("Source ended after {copied} of {expected} bytes")]
    ShortRead { expected: u64, copied: u64 },
}

/// Re-read the MBR and decode slot `nr`, refusing empty slots before any
/// other file is touched.
fn resolve_partition(image: &Path, nr: usize) -> Result<PartitionEntry, CopyError> {
    let mbr = read_mbr(image)?;
    let entry = decode_partition(&mbr, nr)?;

    if entry.type_code.is_empty() {
        return Err(CopyError::EmptyPartition(nr));
    }

    return Ok(entry);
}

/// Copy exactly `byte_count` bytes from `src` to `dst` in [`CHUNK_SIZE`]
/// steps. A zero-length read before the budget is exhausted means the
/// source is shorter than the partition and fails the copy.
fn copy_bounded<R: Read, W: Write>(
    src: &mut R,
    dst: &mut W,
    byte_count: u64,
) -> Result<(), CopyError> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut remaining = byte_count;

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let got = src.read(&mut buffer[..want])?;

        if got == 0 {
            return Err(CopyError::ShortRead {
                expected: byte_count,
                copied: byte_count - remaining,
            });
        }

        dst.write_all(&buffer[..got])?;
        remaining -= got as u64;
    }

    return Ok(());
}

/// Copy the raw bytes of partition `nr` out of `image` into `output`
/// (created or truncated).
///
/// # Errors
/// Fails with [`CopyError::EmptyPartition`] on a type-0x00 slot, with
/// [`CopyError::Mbr`] on an invalid image or index, and aborts on any I/O
/// error mid-copy.
pub fn extract_partition<P, Q>(image: P, nr: usize, output: Q) -> Result<(), CopyError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let entry = resolve_partition(image.as_ref(), nr)?;

    log::debug!(
        "extract_partition - slot {nr}: {} bytes at offset {}",
        entry.byte_count,
        entry.start_offset
    );

    let mut outfile = File::create(output.as_ref())?;
    let mut imagefile = File::open(image.as_ref())?;
    imagefile.seek(SeekFrom::Start(entry.start_offset))?;

    return copy_bounded(&mut imagefile, &mut outfile, entry.byte_count);
}

/// Overwrite the bytes of partition `nr` inside `image` with the contents
/// of `input`. The image is opened read+write and never truncated; on a
/// mid-copy failure it may be left partially overwritten, so callers keep
/// their own backups.
///
/// # Errors
/// Same as [`extract_partition`], plus [`CopyError::ShortRead`] when
/// `input` holds fewer bytes than the partition.
pub fn update_partition<P, Q>(image: P, nr: usize, input: Q) -> Result<(), CopyError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let entry = resolve_partition(image.as_ref(), nr)?;

    log::debug!(
        "update_partition - slot {nr}: {} bytes at offset {}",
        entry.byte_count,
        entry.start_offset
    );

    let mut partfile = File::open(input.as_ref())?;
    let mut imagefile = OpenOptions::new()
        .read(true)
        .write(true)
        .open(image.as_ref())?;
    imagefile.seek(SeekFrom::Start(entry.start_offset))?;

    return copy_bounded(&mut partfile, &mut imagefile, entry.byte_count);
}
