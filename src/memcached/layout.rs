//! Byte layout of a memcached 1.4.x item on a 64-bit host.
//!
//! ```text
//! offset  field
//!      0  next, prev, h_next   (3 x pointer)
//!     24  time                 u32, last access on the server clock
//!     28  exptime              u32
//!     32  nbytes               u32, payload length including "\r\n"
//!     36  refcount             u16
//!     38  nsuffix              u8, length of " <flags> <length>\r\n"
//!     39  it_flags             u8
//!     40  slabs_clsid          u8, top two bits reserved
//!     41  nkey                 u8
//!     48  cas                  u64, only when CAS is enabled
//!  48/56  key, NUL, suffix, payload
//! ```
//!
//! Fields are read from a locally copied buffer with bounds-checked offsets;
//! nothing here ever dereferences a target address.

use byteorder::{ByteOrder, NativeEndian};

pub const TIME_OFFSET: usize = 24;
pub const EXPTIME_OFFSET: usize = 28;
pub const NBYTES_OFFSET: usize = 32;
pub const NSUFFIX_OFFSET: usize = 38;
pub const SLABS_CLSID_OFFSET: usize = 40;
pub const NKEY_OFFSET: usize = 41;
/// Start of the variable-length data area (`item::data`).
pub const DATA_OFFSET: usize = 48;
pub const CAS_BYTES: usize = 8;

/// Mask dropping the two reserved bits of `slabs_clsid`.
pub const SLAB_CLASS_ID_MASK: u8 = !(3 << 6);

/// Run-wide layout choice, fixed by the server's `cas_enabled` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLayout {
    pub cas_enabled: bool,
}

impl ItemLayout {
    pub fn new(cas_enabled: bool) -> Self {
        Self { cas_enabled }
    }

    /// Bytes from the start of an item to the first byte of its key.
    pub fn key_offset(&self) -> usize {
        DATA_OFFSET + if self.cas_enabled { CAS_BYTES } else { 0 }
    }
}

/// Fixed-size fields of an item header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemHeader {
    pub time: u32,
    pub exptime: u32,
    pub nbytes: u32,
    pub nsuffix: u8,
    pub slabs_clsid: u8,
    pub nkey: u8,
    pub cas: u64,
}

impl ItemHeader {
    /// Reads the header starting at `at`. `None` if the buffer is too short.
    pub fn read(buf: &[u8], at: usize, layout: ItemLayout) -> Option<Self> {
        let raw = buf.get(at..at.checked_add(layout.key_offset())?)?;
        let cas = if layout.cas_enabled {
            NativeEndian::read_u64(&raw[DATA_OFFSET..DATA_OFFSET + CAS_BYTES])
        } else {
            0
        };
        Some(Self {
            time: NativeEndian::read_u32(&raw[TIME_OFFSET..]),
            exptime: NativeEndian::read_u32(&raw[EXPTIME_OFFSET..]),
            nbytes: NativeEndian::read_u32(&raw[NBYTES_OFFSET..]),
            nsuffix: raw[NSUFFIX_OFFSET],
            slabs_clsid: raw[SLABS_CLSID_OFFSET],
            nkey: raw[NKEY_OFFSET],
            cas,
        })
    }

    /// Slab class id with the reserved bits masked off.
    pub fn class_id(&self) -> usize {
        (self.slabs_clsid & SLAB_CLASS_ID_MASK) as usize
    }

    /// Serializes the header as the server would lay it out. Pointer and
    /// padding bytes are zero.
    pub fn to_bytes(&self, layout: ItemLayout) -> Vec<u8> {
        let mut raw = vec![0u8; layout.key_offset()];
        NativeEndian::write_u32(&mut raw[TIME_OFFSET..], self.time);
        NativeEndian::write_u32(&mut raw[EXPTIME_OFFSET..], self.exptime);
        NativeEndian::write_u32(&mut raw[NBYTES_OFFSET..], self.nbytes);
        raw[NSUFFIX_OFFSET] = self.nsuffix;
        raw[SLABS_CLSID_OFFSET] = self.slabs_clsid;
        raw[NKEY_OFFSET] = self.nkey;
        if layout.cas_enabled {
            NativeEndian::write_u64(&mut raw[DATA_OFFSET..], self.cas);
        }
        raw
    }
}
