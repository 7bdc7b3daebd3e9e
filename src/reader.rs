//! A read-through overlay that serves image bytes with every rebase slot
//! rewritten to its resolved address. Bind slots are left untouched; they
//! need runtime symbol data to materialise.

use std::collections::HashMap;
use std::marker::PhantomData;

use nom::number::Endianness;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fixups::ChainedFixups;
use crate::pointer::Rebase;
use crate::read_at::ReadAt;

struct RebaseEntry {
    raw: u64,
    resolved: u64,
}

struct RebaseIndex {
    rebases: HashMap<u64, RebaseEntry>,
    pointer_size: u64,
    endian: Endianness,
}

impl RebaseIndex {
    fn read_pointer(&self, bytes: &[u8]) -> u64 {
        let mut word = [0u8; 8];
        word[..bytes.len()].copy_from_slice(bytes);
        match self.endian {
            Endianness::Big => {
                // big-endian words sit in the high bytes of the copy
                let mut value = 0u64;
                for &byte in bytes {
                    value = value << 8 | byte as u64;
                }
                value
            }
            Endianness::Little | Endianness::Native => u64::from_le_bytes(word),
        }
    }

    fn write_pointer(&self, bytes: &mut [u8], value: u64) {
        match self.endian {
            Endianness::Big => {
                let width = bytes.len();
                for (index, byte) in bytes.iter_mut().enumerate() {
                    *byte = (value >> ((width - 1 - index) * 8)) as u8;
                }
            }
            Endianness::Little | Endianness::Native => {
                let word = value.to_le_bytes();
                bytes.copy_from_slice(&word[..bytes.len()]);
            }
        }
    }

    /// Rewrites every rebase slot intersecting `buf` in place. The bytes
    /// found underneath must match the recorded raw slot word.
    fn patch(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        if self.pointer_size == 0 || self.rebases.is_empty() {
            return Ok(());
        }
        let pointer_size = self.pointer_size;
        let read_end = offset + buf.len() as u64;

        for (&slot_offset, entry) in &self.rebases {
            if slot_offset + pointer_size <= offset || slot_offset >= read_end {
                continue;
            }
            // the overlap, in absolute offsets
            let lo = offset.max(slot_offset);
            let hi = read_end.min(slot_offset + pointer_size);
            let buf_range = (lo - offset) as usize..(hi - offset) as usize;
            let slot_range = (lo - slot_offset) as usize..(hi - slot_offset) as usize;

            let mut expected = [0u8; 8];
            self.write_pointer(&mut expected[..pointer_size as usize], entry.raw);
            if buf[buf_range.clone()] != expected[slot_range.clone()] {
                let mut found = expected;
                found[slot_range.clone()].copy_from_slice(&buf[buf_range.clone()]);
                return Err(Error::OverlayBytesMismatch {
                    at: slot_offset,
                    expected: entry.raw,
                    found: self.read_pointer(&found[..pointer_size as usize]),
                });
            }

            let mut resolved = [0u8; 8];
            self.write_pointer(&mut resolved[..pointer_size as usize], entry.resolved);
            buf[buf_range].copy_from_slice(&resolved[slot_range]);
        }
        Ok(())
    }
}

/// Wraps a positional reader and patches rebase slots on the way through.
///
/// The fixups and the preferred load address are produced lazily by the
/// injected closures, so the overlay can be built before either is known.
/// The rebase index is built exactly once, on the first read. Concurrent
/// reads are fine as long as the wrapped reader supports them.
pub struct RebasedReader<R, I, F, G>
where
    R: ReadAt,
    I: ReadAt,
    F: Fn() -> Result<ChainedFixups<I>>,
    G: Fn() -> u64,
{
    reader: R,
    get_fixups: F,
    get_base_addr: G,
    index: OnceCell<RebaseIndex>,
    _image: PhantomData<fn() -> I>,
}

impl<R, I, F, G> RebasedReader<R, I, F, G>
where
    R: ReadAt,
    I: ReadAt,
    F: Fn() -> Result<ChainedFixups<I>>,
    G: Fn() -> u64,
{
    pub fn new(reader: R, get_fixups: F, get_base_addr: G) -> Self {
        RebasedReader {
            reader,
            get_fixups,
            get_base_addr,
            index: OnceCell::new(),
            _image: PhantomData,
        }
    }

    fn index(&self) -> Result<&RebaseIndex> {
        self.index.get_or_try_init(|| {
            let mut fixups = (self.get_fixups)()?;
            fixups.parse()?;
            let base_addr = (self.get_base_addr)();

            let mut rebases = HashMap::new();
            let mut pointer_size = 0;
            for start in &fixups.starts {
                if pointer_size == 0 && start.page_count > 0 {
                    if let Some(format) = start.pointer_format {
                        pointer_size = format.ptr_size();
                    }
                }
                for fixup in &start.fixups {
                    if let Some(rebase) = fixup.as_rebase() {
                        rebases.insert(
                            rebase.offset(),
                            RebaseEntry {
                                raw: rebase.raw(),
                                resolved: rebase.resolve(base_addr),
                            },
                        );
                    }
                }
            }

            debug!(rebases = rebases.len(), "built rebase index");
            Ok(RebaseIndex {
                rebases,
                pointer_size,
                endian: fixups.endianness(),
            })
        })
    }

    /// Reads from the wrapped source, then rewrites any rebase slot that
    /// intersects the filled bytes to its resolved address.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let index = self.index()?;
        let n = self.reader.read_at(buf, offset)?;
        index.patch(&mut buf[..n], offset)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LE: Endianness = Endianness::Little;

    fn seg_info(
        size: u32,
        page_size: u16,
        pointer_format: u16,
        segment_offset: u64,
        entries: &[u16],
    ) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(size.to_le_bytes());
        bytes.extend(page_size.to_le_bytes());
        bytes.extend(pointer_format.to_le_bytes());
        bytes.extend(segment_offset.to_le_bytes());
        bytes.extend(0u32.to_le_bytes());
        bytes.extend((entries.len() as u16).to_le_bytes());
        for entry in entries {
            bytes.extend(entry.to_le_bytes());
        }
        bytes
    }

    /// Payload with one PTR_64_OFFSET segment at 0x1000 and a two-slot
    /// chain (targets 0x2000 and 0x3000, eight bytes apart).
    fn offset64_payload() -> Vec<u8> {
        let seg = seg_info(0x4000, 0x4000, 6, 0x1000, &[0x0000]);
        let mut payload = Vec::new();
        payload.extend(0u32.to_le_bytes());
        payload.extend(28u32.to_le_bytes()); // starts_offset
        let imports_offset = 28 + 8 + seg.len() as u32;
        payload.extend(imports_offset.to_le_bytes());
        payload.extend(imports_offset.to_le_bytes()); // symbols right behind
        payload.extend(0u32.to_le_bytes()); // imports_count
        payload.extend(1u32.to_le_bytes());
        payload.extend(0u32.to_le_bytes());
        payload.extend(1u32.to_le_bytes()); // seg_count
        payload.extend(8u32.to_le_bytes()); // seg_info_offset
        payload.extend_from_slice(&seg);
        payload
    }

    fn offset64_image() -> Vec<u8> {
        let mut image = vec![0u8; 0x1100];
        image[0x0FF0..0x1000].copy_from_slice(b"0123456789ABCDEF");
        // target 0x2000, next 2 (advance 8); target 0x3000, terminal
        let first: u64 = 0x2000 | 2 << 51;
        let second: u64 = 0x3000;
        image[0x1000..0x1008].copy_from_slice(&first.to_le_bytes());
        image[0x1008..0x1010].copy_from_slice(&second.to_le_bytes());
        image
    }

    const BASE: u64 = 0x10000000;

    fn reader_over(
        image: Vec<u8>,
    ) -> RebasedReader<Vec<u8>, Vec<u8>, impl Fn() -> Result<ChainedFixups<Vec<u8>>>, impl Fn() -> u64>
    {
        let payload = offset64_payload();
        let fixups_image = image.clone();
        RebasedReader::new(
            image,
            move || Ok(ChainedFixups::new(payload.clone(), fixups_image.clone(), LE)),
            || BASE,
        )
    }

    #[test]
    fn test_reads_away_from_slots_unchanged() {
        let reader = reader_over(offset64_image());
        let mut buf = [0u8; 16];
        let n = reader.read_at(&mut buf, 0x0FF0).unwrap();
        assert_eq!(n, 16);
        assert_eq!(&buf, b"0123456789ABCDEF");
    }

    #[test]
    fn test_slot_read_resolves() {
        let reader = reader_over(offset64_image());
        let mut buf = [0u8; 8];
        reader.read_at(&mut buf, 0x1000).unwrap();
        assert_eq!(u64::from_le_bytes(buf), 0x2000 + BASE);

        reader.read_at(&mut buf, 0x1008).unwrap();
        assert_eq!(u64::from_le_bytes(buf), 0x3000 + BASE);
    }

    #[test]
    fn test_straddling_read_patches_both_sides() {
        let reader = reader_over(offset64_image());
        // covers the tail of the first slot and the head of the second
        let mut buf = [0u8; 8];
        reader.read_at(&mut buf, 0x1004).unwrap();

        let first = (0x2000u64 + BASE).to_le_bytes();
        let second = (0x3000u64 + BASE).to_le_bytes();
        assert_eq!(&buf[..4], &first[4..]);
        assert_eq!(&buf[4..], &second[..4]);
    }

    #[test]
    fn test_mismatched_underlying_bytes() {
        let mut image = offset64_image();
        image[0x1009] = 0x77; // corrupt the second slot
        let reader = reader_over(image);

        let mut buf = [0u8; 8];
        let err = reader.read_at(&mut buf, 0x1008).unwrap_err();
        match err {
            Error::OverlayBytesMismatch {
                at,
                expected,
                found,
            } => {
                assert_eq!(at, 0x1008);
                assert_eq!(expected, 0x3000);
                assert_eq!(found, 0x7700);
            }
            other => panic!("expected OverlayBytesMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_short_reads_only_patch_filled_bytes() {
        let reader = reader_over(offset64_image());
        // the image ends at 0x1100; ask for more
        let mut buf = vec![0xEEu8; 0x120];
        let n = reader.read_at(&mut buf, 0x1000).unwrap();
        assert_eq!(n, 0x100);
        assert_eq!(
            u64::from_le_bytes(buf[..8].try_into().unwrap()),
            0x2000 + BASE
        );
        // bytes past the read are untouched
        assert!(buf[n..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_binds_pass_through() {
        // a PTR_64 segment whose only fixup is a bind: the overlay records
        // no rebases and serves the raw bytes
        let seg = seg_info(0x4000, 0x4000, 2, 0x1000, &[0x0000]);
        let mut payload = Vec::new();
        payload.extend(0u32.to_le_bytes());
        payload.extend(28u32.to_le_bytes());
        let imports_offset = 28 + 8 + seg.len() as u32;
        payload.extend(imports_offset.to_le_bytes());
        payload.extend((imports_offset + 4).to_le_bytes());
        payload.extend(1u32.to_le_bytes());
        payload.extend(1u32.to_le_bytes());
        payload.extend(0u32.to_le_bytes());
        payload.extend(1u32.to_le_bytes());
        payload.extend(8u32.to_le_bytes());
        payload.extend_from_slice(&seg);
        payload.extend(1u32.to_le_bytes()); // one import record
        payload.extend_from_slice(b"_malloc\0");

        let slot: u64 = 1 << 63; // bind, ordinal 0
        let mut image = vec![0u8; 0x1100];
        image[0x1000..0x1008].copy_from_slice(&slot.to_le_bytes());

        let fixups_image = image.clone();
        let reader = RebasedReader::new(
            image,
            move || Ok(ChainedFixups::new(payload.clone(), fixups_image.clone(), LE)),
            || BASE,
        );

        let mut buf = [0u8; 8];
        reader.read_at(&mut buf, 0x1000).unwrap();
        assert_eq!(u64::from_le_bytes(buf), slot);
    }
}
