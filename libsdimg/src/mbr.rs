use std::fmt;
use std::fs::File;
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian as ByteorderLE};
use thiserror::Error;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, LittleEndian, U32, Unaligned};

use crate::SECTOR_SIZE;

/*
Layout from https://en.wikipedia.org/wiki/Master_boot_record
*/

/// Boot signature at offset 510 marking a sector as MBR-formatted.
pub const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Number of primary partition slots in the MBR partition table.
pub const MBR_ENTRY_COUNT: usize = 4;

#[derive(Debug, Error)]
pub enum MbrError {
    #[error("I/O operation failed: {0}")]
    IoError(#[from] IoError),
    #[error("Image shorter than one sector, no MBR present")]
    TruncatedImage,
    #[error("Invalid boot signature {found:02x?}, expected [55, aa]")]
    InvalidSignature { found: [u8; 2] },
    #[error("Invalid partition index {0}, must be 0..=3")]
    InvalidPartitionIndex(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrPartitionType(u8);

impl MbrPartitionType {
    pub const MBR_EMPTY_PARTITION: Self = Self(0x00);
    pub const MBR_W95_FAT32_LBA_PARTITION: Self = Self(0x0c);
    pub const MBR_LINUX_DATA_PARTITION: Self = Self(0x83);

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn as_byte(&self) -> u8 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == Self::MBR_EMPTY_PARTITION.0
    }

    /// Human-readable label for the type codes this tool cares about.
    pub const fn name(&self) -> &'static str {
        match *self {
            Self::MBR_EMPTY_PARTITION => "<empty>",
            Self::MBR_W95_FAT32_LBA_PARTITION => "FAT32",
            Self::MBR_LINUX_DATA_PARTITION => "Linux",
            _ => "<unknown>",
        }
    }
}

/// State of the status byte at offset 0 of a partition slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    Active,
    Inactive,
    Invalid,
}

impl PartitionStatus {
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x80 => Self::Active,
            0x00 => Self::Inactive,
            _ => Self::Invalid,
        }
    }
}

impl fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct RawPartitionEntry {
    pub boot_ind: u8,           /* 0x80 - active */
    pub begin_head: u8,         /* begin CHS */
    pub begin_sector: u8,
    pub begin_cylinder: u8,
    pub sys_ind: u8,            /* https://en.wikipedia.org/wiki/Partition_type */
    pub end_head: u8,           /* end CHS */
    pub end_sector: u8,
    pub end_cylinder: u8,
    pub start_sect: U32<LittleEndian>,
    pub nr_sects: U32<LittleEndian>,
}

/// One 512-byte boot sector. Re-read from the image for every operation;
/// the image file is the only source of truth.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub struct Mbr {
    pub bootstrap_code: [u8; 446],
    pub entries: [RawPartitionEntry; MBR_ENTRY_COUNT],
    pub boot_signature: [u8; 2],
}

impl Mbr {
    /// Optional 32-bit disk identifier at offset 440 inside the bootstrap
    /// code area. Zero on images written without one.
    pub fn disk_signature(&self) -> u32 {
        ByteorderLE::read_u32(&self.bootstrap_code[440..444])
    }

    /// Iterate the non-empty slots of an already-read sector, tagged with
    /// their slot index in ascending order.
    pub fn partitions(&self) -> impl Iterator<Item = (usize, PartitionEntry)> + '_ {
        (0..MBR_ENTRY_COUNT).filter_map(move |nr| {
            let entry = decode_partition(self, nr).ok()?;
            (!entry.type_code.is_empty()).then_some((nr, entry))
        })
    }
}

/// Decoded view of one partition slot, with LBA fields already scaled to
/// byte offsets into the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub status: PartitionStatus,
    pub type_code: MbrPartitionType,
    pub start_offset: u64,
    pub byte_count: u64,
}

impl PartitionEntry {
    pub const fn type_name(&self) -> &'static str {
        self.type_code.name()
    }
}

/// Read the first sector of an image and validate the boot signature.
///
/// # Errors
/// Returns [`MbrError::TruncatedImage`] if the image holds fewer than 512
/// bytes, [`MbrError::InvalidSignature`] if the sector does not end in
/// `0x55 0xAA`, and [`MbrError::IoError`] for anything the filesystem
/// reports (missing image, permissions).
pub fn read_mbr<P: AsRef<Path>>(image: P) -> Result<Mbr, MbrError> {
    let mut file = File::open(image.as_ref())?;

    let mut mbr = Mbr::new_zeroed();
    file.read_exact(mbr.as_mut_bytes())
        .map_err(|e| match e.kind() {
            IoErrorKind::UnexpectedEof => MbrError::TruncatedImage,
            _ => MbrError::IoError(e),
        })?;

    if mbr.boot_signature != MBR_SIGNATURE {
        return Err(MbrError::InvalidSignature {
            found: mbr.boot_signature,
        });
    }

    log::debug!(
        "read_mbr - {:?}: disk signature {:08x}",
        image.as_ref(),
        mbr.disk_signature()
    );

    return Ok(mbr);
}

/// Decode one slot of the partition table. Pure function over the sector,
/// no I/O.
pub fn decode_partition(mbr: &Mbr, nr: usize) -> Result<PartitionEntry, MbrError> {
    let raw = mbr
        .entries
        .get(nr)
        .ok_or(MbrError::InvalidPartitionIndex(nr))?;

    return Ok(PartitionEntry {
        status: PartitionStatus::from_byte(raw.boot_ind),
        type_code: MbrPartitionType::from_byte(raw.sys_ind),
        start_offset: u64::from(raw.start_sect.get()) * SECTOR_SIZE,
        byte_count: u64::from(raw.nr_sects.get()) * SECTOR_SIZE,
    });
}

/// Read the MBR of `image` once and return a lazy, restartable iterator
/// over its non-empty partitions in ascending slot order.
pub fn list_partitions<P: AsRef<Path>>(
    image: P,
) -> Result<impl Iterator<Item = (usize, PartitionEntry)> + Clone, MbrError> {
    let mbr = read_mbr(image)?;

    return Ok((0..MBR_ENTRY_COUNT).filter_map(move |nr| {
        let entry = decode_partition(&mbr, nr).ok()?;
        (!entry.type_code.is_empty()).then_some((nr, entry))
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_bytes(status: u8, sys_ind: u8, start_sect: u32, nr_sects: u32) -> [u8; 16] {
        let mut raw = [0u8; 16];
        raw[0] = status;
        raw[4] = sys_ind;
        raw[8..12].copy_from_slice(&start_sect.to_le_bytes());
        raw[12..16].copy_from_slice(&nr_sects.to_le_bytes());
        raw
    }

    fn sample_sector() -> [u8; 512] {
        let mut sector = [0u8; 512];
        sector[440..444].copy_from_slice(&0xdeadbeefu32.to_le_bytes());
        sector[446..462].copy_from_slice(&entry_bytes(0x80, 0x83, 2048, 8192));
        sector[462..478].copy_from_slice(&entry_bytes(0x00, 0x0c, 10240, 4096));
        sector[510] = 0x55;
        sector[511] = 0xaa;
        sector
    }

    fn sample_mbr() -> Mbr {
        Mbr::read_from_bytes(&sample_sector()).unwrap()
    }

    #[test]
    fn decode_linux_slot() {
        let entry = decode_partition(&sample_mbr(), 0).unwrap();

        assert_eq!(entry.status, PartitionStatus::Active);
        assert_eq!(entry.type_code, MbrPartitionType::MBR_LINUX_DATA_PARTITION);
        assert_eq!(entry.type_name(), "Linux");
        assert_eq!(entry.start_offset, 1_048_576);
        assert_eq!(entry.byte_count, 4_194_304);
    }

    #[test]
    fn decode_is_deterministic() {
        let mbr = sample_mbr();
        assert_eq!(
            decode_partition(&mbr, 1).unwrap(),
            decode_partition(&mbr, 1).unwrap()
        );
    }

    #[test]
    fn le_field_scaling() {
        let mut sector = sample_sector();
        sector[454..458].copy_from_slice(&[0x00, 0x10, 0x00, 0x00]);

        let mbr = Mbr::read_from_bytes(&sector).unwrap();
        let entry = decode_partition(&mbr, 0).unwrap();

        assert_eq!(u32::from(mbr.entries[0].start_sect), 4096);
        assert_eq!(entry.start_offset, 2_097_152);
    }

    #[test]
    fn index_out_of_table() {
        for nr in [4usize, 5, usize::MAX] {
            assert!(matches!(
                decode_partition(&sample_mbr(), nr),
                Err(MbrError::InvalidPartitionIndex(n)) if n == nr
            ));
        }
    }

    #[test]
    fn status_byte_mapping() {
        assert_eq!(PartitionStatus::from_byte(0x80), PartitionStatus::Active);
        assert_eq!(PartitionStatus::from_byte(0x00), PartitionStatus::Inactive);
        assert_eq!(PartitionStatus::from_byte(0x42), PartitionStatus::Invalid);
        assert_eq!(PartitionStatus::Invalid.to_string(), "invalid");
    }

    #[test]
    fn type_names() {
        assert_eq!(MbrPartitionType::from_byte(0x00).name(), "<empty>");
        assert_eq!(MbrPartitionType::from_byte(0x0c).name(), "FAT32");
        assert_eq!(MbrPartitionType::from_byte(0x83).name(), "Linux");
        assert_eq!(MbrPartitionType::from_byte(0x07).name(), "<unknown>");
    }

    #[test]
    fn partitions_skip_empty_slots() {
        let mbr = sample_mbr();
        let slots: Vec<usize> = mbr.partitions().map(|(nr, _)| nr).collect();

        assert_eq!(slots, vec![0, 1]);
        assert!(mbr.partitions().all(|(_, e)| e.type_name() != "<empty>"));
    }

    #[test]
    fn disk_signature_le() {
        assert_eq!(sample_mbr().disk_signature(), 0xdeadbeef);
    }
}
