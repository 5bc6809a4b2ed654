// Core library for the sdimg tool: reads the MBR of a raw disk image and
// moves partition contents in and out of it.

pub mod copy;
pub mod mbr;

use thiserror::Error;

pub use crate::copy::{CHUNK_SIZE, CopyError, extract_partition, update_partition};
pub use crate::mbr::{
    MBR_ENTRY_COUNT, MBR_SIGNATURE, Mbr, MbrError, MbrPartitionType, PartitionEntry,
    PartitionStatus, decode_partition, list_partitions, read_mbr,
};

/// Size of one disk sector in bytes. MBR images address everything in
/// 512-byte sectors regardless of the physical block size.
pub const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Error)]
pub enum SdImgError {
    #[error("MBR error: {0}")]
    Mbr(#[from] MbrError),
    #[error("Partition copy error: {0}")]
    Copy(#[from] CopyError),
}
