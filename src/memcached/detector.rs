//! Heuristic recovery of items from raw heap bytes.
//!
//! Every stored item is followed by its key, a NUL and the ASCII suffix
//! `" <flags> <length>\r\n"`. The scanner looks for a space followed by a
//! digit, walks backwards over printable bytes to find the key, then reads
//! the header sitting [`ItemLayout::key_offset`] bytes before the key and
//! keeps the candidate only if the header agrees with what was found.
//!
//! The key boundary assumes the byte right before the key is not printable.
//! With CAS disabled, on very long-running servers (CAS above 2^56) or on
//! big-endian hosts that byte can be printable and the key is missed.

use crate::memcached::layout::{ItemHeader, ItemLayout};
use crate::memcached::slabs::SlabTable;

/// Category assigned to keys without the delimiter.
pub const UNKNOWN_CATEGORY: &str = "__UNKNOWN_CATEGORY__";

/// Shorter keys are too likely to be noise.
pub const MIN_KEY_LEN: usize = 3;

/// Touch times beyond ten years of uptime are corrupt.
pub const MAX_TOUCH_TIME: u32 = 10 * 365 * 86_400;

/// Tolerated drift between the server clock and ours.
pub const CLOCK_SKEW_SECS: u32 = 50;

/// An item reconstructed from copied memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedItem {
    pub key: String,
    pub category: String,
    /// Last access, on the server's relative clock.
    pub last_touch: u32,
    /// Expiry on the server's relative clock; 0 never expires.
    pub expire_time: u32,
    /// Payload length including the trailing "\r\n".
    pub payload_size: u32,
    pub slab_class: usize,
    pub cas: u64,
}

impl DetectedItem {
    /// Key plus payload bytes.
    pub fn total_size(&self) -> u64 {
        self.key.len() as u64 + self.payload_size as u64
    }

    /// Seconds since last access; negative when the server clock runs ahead.
    pub fn secs_since_touch(&self, now: u32) -> i64 {
        now as i64 - self.last_touch as i64
    }

    /// Seconds until expiry; negative once expired.
    pub fn secs_until_expiry(&self, now: u32) -> i64 {
        self.expire_time as i64 - now as i64
    }

    pub fn is_expired(&self, now: u32) -> bool {
        self.expire_time != 0 && now >= self.expire_time
    }
}

/// Splits off the category prefix of `key`.
pub fn category_of(key: &str, delimiter: u8) -> &str {
    match key.bytes().position(|b| b == delimiter) {
        Some(pos) => &key[..pos],
        None => UNKNOWN_CATEGORY,
    }
}

/// Structural sanity checks applied to every candidate header.
pub fn is_plausible(header: &ItemHeader, now: u32, slabs: &SlabTable) -> bool {
    if header.time > MAX_TOUCH_TIME {
        return false;
    }
    if header.time as u64 > now as u64 + CLOCK_SKEW_SECS as u64 {
        return false;
    }
    header.nbytes as u64 + header.nkey as u64 <= slabs.unit_size(header.class_id())
}

/// Finds items in copied buffers.
#[derive(Debug, Clone, Copy)]
pub struct ItemDetector<'a> {
    layout: ItemLayout,
    delimiter: u8,
    slabs: &'a SlabTable,
}

impl<'a> ItemDetector<'a> {
    pub fn new(layout: ItemLayout, delimiter: u8, slabs: &'a SlabTable) -> Self {
        Self {
            layout,
            delimiter,
            slabs,
        }
    }

    /// Scans `buf` once, left to right. `now` is the server's relative clock.
    pub fn scan<'b>(&self, buf: &'b [u8], now: u32) -> ItemScanner<'a, 'b> {
        ItemScanner {
            detector: *self,
            buf,
            pos: 0,
            now,
        }
    }
}

/// Lazy iterator over the items of one buffer.
pub struct ItemScanner<'a, 'b> {
    detector: ItemDetector<'a>,
    buf: &'b [u8],
    pos: usize,
    now: u32,
}

impl ItemScanner<'_, '_> {
    /// Next byte offset to be examined.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Tries to read an item whose suffix starts at `i`. Returns the item and
    /// the offset just past its payload.
    fn probe(&self, i: usize) -> Option<(DetectedItem, usize)> {
        let buf = self.buf;
        let key_offset = self.detector.layout.key_offset();

        // i - 1 holds the key's NUL terminator
        let key_end = i.checked_sub(1)?;
        let mut key_start = key_end;
        // the header may start at offset 0, so the key may start at key_offset
        while key_start > key_offset && buf[key_start - 1].is_ascii_graphic() {
            key_start -= 1;
        }
        let key_len = key_end - key_start;
        if key_len < MIN_KEY_LEN {
            return None;
        }

        let header = ItemHeader::read(buf, key_start - key_offset, self.detector.layout)?;
        if header.nkey as usize != key_len {
            return None;
        }
        if !is_plausible(&header, self.now, self.detector.slabs) {
            return None;
        }

        let key_bytes = &buf[key_start..key_start + key_len];
        let key = String::from_utf8_lossy(key_bytes).into_owned();
        let category = category_of(&key, self.detector.delimiter).to_string();

        let end = i + header.nsuffix as usize + header.nbytes as usize;
        let item = DetectedItem {
            key,
            category,
            last_touch: header.time,
            expire_time: header.exptime,
            payload_size: header.nbytes,
            slab_class: header.class_id(),
            cas: header.cas,
        };
        Some((item, end.max(i + 1)))
    }
}

impl Iterator for ItemScanner<'_, '_> {
    type Item = DetectedItem;

    fn next(&mut self) -> Option<DetectedItem> {
        while self.pos + 1 < self.buf.len() {
            let i = self.pos;
            self.pos += 1;
            if self.buf[i] != b' ' || !self.buf[i + 1].is_ascii_digit() {
                continue;
            }
            if let Some((item, end)) = self.probe(i) {
                self.pos = end;
                return Some(item);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slabs() -> SlabTable {
        let mut t = SlabTable::new();
        t.get_mut(1).unwrap().unit_size = 96;
        t
    }

    fn record(layout: ItemLayout, key: &str, time: u32, payload: &[u8]) -> Vec<u8> {
        let suffix = format!(" 0 {}\r\n", payload.len() - 2);
        let header = ItemHeader {
            time,
            nbytes: payload.len() as u32,
            nsuffix: suffix.len() as u8,
            slabs_clsid: 1,
            nkey: key.len() as u8,
            ..Default::default()
        };
        let mut out = header.to_bytes(layout);
        out.extend_from_slice(key.as_bytes());
        out.push(0);
        out.extend_from_slice(suffix.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_category_of() {
        assert_eq!(category_of("user:42", b':'), "user");
        assert_eq!(category_of("a:b:c", b':'), "a");
        assert_eq!(category_of(":lead", b':'), "");
        assert_eq!(category_of("plain", b':'), UNKNOWN_CATEGORY);
        assert_eq!(category_of("ns|k", b'|'), "ns");
    }

    #[test]
    fn test_detects_single_record() {
        let layout = ItemLayout::new(true);
        let table = slabs();
        let mut buf = vec![0u8; 16];
        buf.extend(record(layout, "sess:abc", 90, b"hello\r\n"));

        let detector = ItemDetector::new(layout, b':', &table);
        let items: Vec<_> = detector.scan(&buf, 100).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "sess:abc");
        assert_eq!(items[0].category, "sess");
        assert_eq!(items[0].payload_size, 7);
        assert_eq!(items[0].slab_class, 1);
    }

    #[test]
    fn test_short_key_rejected() {
        let layout = ItemLayout::new(true);
        let table = slabs();
        let buf = record(layout, "ab", 90, b"hello\r\n");
        let detector = ItemDetector::new(layout, b':', &table);
        assert_eq!(detector.scan(&buf, 100).count(), 0);
    }

    #[test]
    fn test_pattern_at_buffer_start_is_ignored() {
        let layout = ItemLayout::new(true);
        let table = slabs();
        let buf = b" 1 2 3 4".to_vec();
        let detector = ItemDetector::new(layout, b':', &table);
        assert_eq!(detector.scan(&buf, 100).count(), 0);
    }

    #[test]
    fn test_plausibility_bounds() {
        let table = slabs();
        let ok = ItemHeader {
            time: 100,
            nbytes: 10,
            slabs_clsid: 1,
            nkey: 9,
            ..Default::default()
        };
        assert!(is_plausible(&ok, 100, &table));
        assert!(is_plausible(&ItemHeader { time: 150, ..ok }, 100, &table));
        assert!(!is_plausible(&ItemHeader { time: 151, ..ok }, 100, &table));
        assert!(!is_plausible(
            &ItemHeader {
                time: MAX_TOUCH_TIME + 1,
                ..ok
            },
            u32::MAX,
            &table
        ));
        assert!(!is_plausible(&ItemHeader { nbytes: 88, ..ok }, 100, &table));
        // reserved bits are ignored when looking up the class
        assert!(is_plausible(
            &ItemHeader {
                slabs_clsid: 0b0100_0001,
                ..ok
            },
            100,
            &table
        ));
    }
}
