// src/ipc/layout.rs

//! Bit-exact layout of the shared ring region.
//!
//! ```text
//! offset                      field
//! ------                      -----
//!  0                          RingHeader (32 bytes)
//!    0  magic          u32
//!    4  version        u32
//!    8  capacity       u32
//!   12  slot_size      u32
//!   16  write_index    u64 (atomic)
//!   24  dropped_count  u64 (atomic)
//! 32                          capacity x slot_size bytes of slots
//!    0  sequence       u64 (atomic)
//!    8  payload_len    u32
//!   12  reserved       u32
//!   16  payload        slot_size - 16 bytes
//! 32 + capacity*slot_size     Trailer (16 + 16 * MAX_CONSUMERS bytes)
//!    0  wake_seq       u32 (futex word)
//!    4  waiters        u32
//!    8  producer_pid   u32
//!   12  flags          u32 (bit 0: producer closed)
//!   16  cursors[MAX_CONSUMERS] { owner u64, read_index u64 }
//! ```
//!
//! All multi-byte fields are little-endian (native on every supported
//! target). Every field other processes may touch is accessed only through
//! atomics.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use memmap2::{MmapMut, MmapOptions};

use crate::errors::RingError;

/// "CFRG" read as a little-endian u32.
pub const RING_MAGIC: u32 = u32::from_le_bytes(*b"CFRG");
pub const RING_VERSION: u32 = 1;

pub const HEADER_SIZE: usize = size_of::<RingHeader>();
pub const SLOT_HEADER_SIZE: usize = size_of::<SlotHeader>();
pub const MIN_SLOT_SIZE: u32 = 64;
pub const MAX_CONSUMERS: usize = 16;
pub const TRAILER_SIZE: usize = size_of::<Trailer>();

pub const FLAG_PRODUCER_CLOSED: u32 = 0x1;

/// Cursor owner value while a consumer is between claiming a cursor and
/// publishing its start position.
pub(crate) const OWNER_CLAIMING: u64 = u64::MAX;

#[repr(C)]
pub struct RingHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    pub capacity: AtomicU32,
    pub slot_size: AtomicU32,
    pub write_index: AtomicU64,
    pub dropped_count: AtomicU64,
}

#[repr(C)]
pub struct SlotHeader {
    /// `(i << 1) | 1` while event `i` is written, `(i + 1) << 1` once it is
    /// committed, 0 if the slot was never written.
    pub sequence: AtomicU64,
    pub payload_len: AtomicU32,
    pub reserved: AtomicU32,
}

#[repr(C)]
pub struct CursorSlot {
    /// 0 when free, otherwise `(pid << 32) | (slot + 1)`.
    pub owner: AtomicU64,
    pub read_index: AtomicU64,
}

#[repr(C)]
pub struct Trailer {
    pub wake_seq: AtomicU32,
    pub waiters: AtomicU32,
    pub producer_pid: AtomicU32,
    pub flags: AtomicU32,
    pub cursors: [CursorSlot; MAX_CONSUMERS],
}

const _: () = assert!(size_of::<RingHeader>() == 32);
const _: () = assert!(size_of::<SlotHeader>() == 16);
const _: () = assert!(size_of::<CursorSlot>() == 16);
const _: () = assert!(size_of::<Trailer>() == 16 + 16 * MAX_CONSUMERS);

#[inline]
pub(crate) fn writing_stamp(index: u64) -> u64 {
    (index << 1) | 1
}

#[inline]
pub(crate) fn committed_stamp(index: u64) -> u64 {
    (index + 1) << 1
}

#[inline]
pub(crate) fn owner_pid(owner: u64) -> u32 {
    (owner >> 32) as u32
}

/// Capacity and slot size of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub capacity: u32,
    pub slot_size: u32,
}

impl Geometry {
    pub fn new(capacity: u32, slot_size: u32) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::InvalidOptions("capacity must be > 0".into()));
        }
        if slot_size < MIN_SLOT_SIZE || slot_size % 8 != 0 {
            return Err(RingError::InvalidOptions(format!(
                "slot_size {slot_size} must be a multiple of 8 and at least {MIN_SLOT_SIZE}"
            )));
        }
        let geometry = Self {
            capacity,
            slot_size,
        };
        geometry
            .checked_region_len()
            .ok_or_else(|| RingError::InvalidOptions("region size overflows".into()))?;
        Ok(geometry)
    }

    fn checked_region_len(&self) -> Option<usize> {
        (self.capacity as usize)
            .checked_mul(self.slot_size as usize)?
            .checked_add(HEADER_SIZE + TRAILER_SIZE)
    }

    /// Largest serialized record a slot can hold.
    pub fn payload_capacity(&self) -> usize {
        self.slot_size as usize - SLOT_HEADER_SIZE
    }

    pub fn trailer_offset(&self) -> usize {
        HEADER_SIZE + self.capacity as usize * self.slot_size as usize
    }

    pub fn region_len(&self) -> usize {
        self.trailer_offset() + TRAILER_SIZE
    }

    fn slot_offset(&self, index: u64) -> usize {
        HEADER_SIZE + (index % u64::from(self.capacity)) as usize * self.slot_size as usize
    }
}

/// A mapped ring region with typed accessors.
pub(crate) struct Region {
    map: MmapMut,
    base: *mut u8,
    geometry: Geometry,
}

// SAFETY: `base` points into `map`, which Region owns; the mapping does not
// move when Region does. Shared fields are only touched through atomics.
unsafe impl Send for Region {}

impl Region {
    /// Create a fresh region at `path`, replacing any previous file.
    ///
    /// The old file is unlinked rather than truncated so processes still
    /// mapping it keep a valid (closed) region instead of faulting.
    pub(crate) fn create(path: &Path, geometry: Geometry) -> Result<Self, RingError> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(geometry.region_len() as u64)?;

        // SAFETY: the file was just created with the right length; all
        // cross-process access goes through atomics or the seqlock protocol.
        let mut map = unsafe { MmapOptions::new().len(geometry.region_len()).map_mut(&file)? };
        let base = map.as_mut_ptr();
        let region = Self {
            map,
            base,
            geometry,
        };

        let header = region.header();
        header.version.store(RING_VERSION, Ordering::Relaxed);
        header.capacity.store(geometry.capacity, Ordering::Relaxed);
        header.slot_size.store(geometry.slot_size, Ordering::Relaxed);
        header.write_index.store(0, Ordering::Relaxed);
        header.dropped_count.store(0, Ordering::Relaxed);
        region
            .trailer()
            .producer_pid
            .store(std::process::id(), Ordering::Relaxed);
        // Magic goes last: a consumer that sees it sees everything above.
        header.magic.store(RING_MAGIC, Ordering::Release);

        Ok(region)
    }

    /// Map an existing region and validate its header.
    pub(crate) fn attach(path: &Path) -> Result<Self, RingError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        if actual < HEADER_SIZE {
            return Err(RingError::RegionTooSmall {
                required: HEADER_SIZE,
                actual,
            });
        }

        // SAFETY: length checked against the header size; the layout is
        // re-validated below before any slot is touched.
        let mut map = unsafe { MmapOptions::new().map_mut(&file)? };
        let base = map.as_mut_ptr();

        // SAFETY: the mapping is at least HEADER_SIZE bytes and page aligned.
        let header = unsafe { &*base.cast::<RingHeader>() };
        let magic = header.magic.load(Ordering::Acquire);
        let version = header.version.load(Ordering::Relaxed);
        if magic != RING_MAGIC || version != RING_VERSION {
            return Err(RingError::AttachMismatch {
                expected_magic: RING_MAGIC,
                found_magic: magic,
                expected_version: RING_VERSION,
                found_version: version,
            });
        }

        let capacity = header.capacity.load(Ordering::Relaxed);
        let slot_size = header.slot_size.load(Ordering::Relaxed);
        let geometry = Geometry::new(capacity, slot_size).map_err(|_| {
            RingError::Corrupted(format!(
                "header declares capacity {capacity} and slot_size {slot_size}"
            ))
        })?;
        if actual < geometry.region_len() {
            return Err(RingError::RegionTooSmall {
                required: geometry.region_len(),
                actual,
            });
        }

        Ok(Self {
            map,
            base,
            geometry,
        })
    }

    pub(crate) fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn header(&self) -> &RingHeader {
        // SAFETY: offset 0, size and alignment checked at create/attach.
        unsafe { &*self.base.cast::<RingHeader>() }
    }

    pub(crate) fn trailer(&self) -> &Trailer {
        // SAFETY: the trailer offset is 8-aligned and in bounds for the
        // validated geometry.
        unsafe { &*self.base.add(self.geometry.trailer_offset()).cast::<Trailer>() }
    }

    pub(crate) fn slot(&self, index: u64) -> &SlotHeader {
        // SAFETY: slot offsets are 8-aligned (slot_size % 8 == 0) and in bounds.
        unsafe { &*self.base.add(self.geometry.slot_offset(index)).cast::<SlotHeader>() }
    }

    /// Start of the payload bytes of the slot holding event `index`.
    pub(crate) fn payload_ptr(&self, index: u64) -> *mut u8 {
        // SAFETY: payload follows the slot header inside the same slot.
        unsafe {
            self.base
                .add(self.geometry.slot_offset(index) + SLOT_HEADER_SIZE)
        }
    }

    /// Active consumer cursors as `(owner, read_index)`.
    pub(crate) fn active_cursors(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.trailer().cursors.iter().filter_map(|cursor| {
            let owner = cursor.owner.load(Ordering::Acquire);
            if owner == 0 || owner == OWNER_CLAIMING {
                return None;
            }
            Some((owner, cursor.read_index.load(Ordering::Acquire)))
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.trailer().flags.load(Ordering::Acquire) & FLAG_PRODUCER_CLOSED != 0
    }
}
