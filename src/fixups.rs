//! The `ChainedFixups` aggregate: decodes a `LC_DYLD_CHAINED_FIXUPS`
//! payload, walks every pointer chain in the image and answers pointer
//! queries against the result.

use nom::number::Endianness;
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::{
    PointerFormat, DYLD_CHAINED_PTR_START_LAST, DYLD_CHAINED_PTR_START_MULTI,
    DYLD_CHAINED_PTR_START_NONE,
};
use crate::payload::{ChainedFixupsHeader, Import, SegmentStarts};
use crate::pointer::{bind_ordinal, decode_slot, resolve_rebase, Fixup};
use crate::read_at::{read_u16_at, read_u32_at, read_u64_at, ReadAt};

/// All chained-fixup state of one image: the load-command payload, the
/// in-place chains read from the image bytes, and the decoded results.
///
/// `parse_starts` then `parse` populate the aggregate; afterwards it is
/// never mutated and can be shared freely between readers.
pub struct ChainedFixups<R: ReadAt> {
    lcdat: Vec<u8>,
    image: R,
    endian: Endianness,
    header: Option<ChainedFixupsHeader>,
    pub starts: Vec<SegmentStarts>,
    pub imports: Vec<Import>,
}

impl<R: ReadAt> ChainedFixups<R> {
    /// `lcdat` is the load-command data blob, `image` the full Mach-O image
    /// the chains live in. No decoding happens until `parse_starts`/`parse`.
    pub fn new(lcdat: Vec<u8>, image: R, endian: Endianness) -> Self {
        ChainedFixups {
            lcdat,
            image,
            endian,
            header: None,
            starts: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn header(&self) -> Option<&ChainedFixupsHeader> {
        self.header.as_ref()
    }

    pub fn endianness(&self) -> Endianness {
        self.endian
    }

    /// Decodes the payload header and each segment's starts record. A second
    /// call is a no-op.
    pub fn parse_starts(&mut self) -> Result<()> {
        if self.header.is_some() {
            return Ok(());
        }

        let header = ChainedFixupsHeader::parse(&self.lcdat, self.endian)?;
        let starts_offset = header.starts_offset as u64;
        let seg_count = read_u32_at(self.lcdat.as_slice(), self.endian, starts_offset)? as u64;
        let table_end = starts_offset + 4 + seg_count * 4;
        if table_end > self.lcdat.len() as u64 {
            return Err(Error::TruncatedInput(table_end));
        }

        let mut starts = Vec::with_capacity(seg_count as usize);
        for index in 0..seg_count {
            let seg_info_offset =
                read_u32_at(self.lcdat.as_slice(), self.endian, starts_offset + 4 + index * 4)?;
            // a zero seg-info offset marks a segment without chains
            if seg_info_offset == 0 {
                starts.push(SegmentStarts::empty());
                continue;
            }
            starts.push(SegmentStarts::parse(
                &self.lcdat,
                starts_offset + seg_info_offset as u64,
                self.endian,
            )?);
        }

        debug!(segments = starts.len(), "parsed chained fixup starts");
        self.header = Some(header);
        self.starts = starts;
        Ok(())
    }

    /// Decodes the imports table and walks every chain of every segment.
    ///
    /// Results are staged and committed only on success, so a failed parse
    /// leaves the aggregate in its pre-parse state.
    pub fn parse(&mut self) -> Result<()> {
        self.parse_starts()?;
        let header = self
            .header
            .as_ref()
            .expect("parse_starts populated the header");
        let imports = Import::parse_all(&self.lcdat, header, self.endian)?;
        debug!(imports = imports.len(), "resolved import table");

        let mut walked = Vec::with_capacity(self.starts.len());
        for start in &self.starts {
            let mut fixups = Vec::new();
            let Some(format) = start.pointer_format else {
                walked.push(fixups);
                continue;
            };

            for page_index in 0..start.page_count {
                let offset_in_page = start.page_starts[page_index as usize];
                if offset_in_page == DYLD_CHAINED_PTR_START_NONE {
                    continue;
                }

                if offset_in_page & DYLD_CHAINED_PTR_START_MULTI != 0 {
                    // multiple chains on this page; the low bits index the
                    // first entry of an overflow run in the same array
                    let mut index = (offset_in_page & !DYLD_CHAINED_PTR_START_MULTI) as usize;
                    loop {
                        let entry = self.page_start_entry(start, index)?;
                        let chain_end = entry & DYLD_CHAINED_PTR_START_LAST != 0;
                        let offset_in_page = entry & !DYLD_CHAINED_PTR_START_LAST;
                        self.walk_chain(
                            start,
                            format,
                            page_index,
                            offset_in_page,
                            &imports,
                            &mut fixups,
                        )?;
                        if chain_end {
                            break;
                        }
                        index += 1;
                    }
                } else {
                    self.walk_chain(
                        start,
                        format,
                        page_index,
                        offset_in_page,
                        &imports,
                        &mut fixups,
                    )?;
                }
            }
            walked.push(fixups);
        }

        self.imports = imports;
        for (start, fixups) in self.starts.iter_mut().zip(walked) {
            start.fixups = fixups;
        }
        Ok(())
    }

    /// Every fixup of every segment, in deterministic order: segments in
    /// declared order, pages ascending, chain order within a page.
    pub fn fixups(&self) -> impl Iterator<Item = &Fixup> {
        self.starts.iter().flat_map(|start| start.fixups.iter())
    }

    /// Interprets `pointer` against each segment's pointer format and
    /// returns the import its bind ordinal names.
    ///
    /// This is a best-effort scan: without the address the pointer was read
    /// from, the owning segment cannot be localised, so the first format
    /// that classifies the value as a bind with an in-range ordinal wins.
    pub fn get_import_for_pointer(&self, pointer: u64) -> Result<&Import> {
        for start in &self.starts {
            let Some(format) = start.pointer_format else {
                continue;
            };
            if start.page_count == 0 {
                continue;
            }
            let Some(ordinal) = bind_ordinal(format, pointer) else {
                continue;
            };
            if (ordinal as usize) < self.imports.len() {
                return Ok(&self.imports[ordinal as usize]);
            }
        }
        Err(Error::NotABind)
    }

    /// Interprets `pointer` against each segment's pointer format and
    /// returns its resolved rebase target. Offset-encoded targets are slid
    /// by `preferred_load_address`. Values no segment claims as a rebase
    /// come back unchanged. Best-effort, like `get_import_for_pointer`.
    pub fn rebase_pointer(&self, preferred_load_address: u64, pointer: u64) -> u64 {
        for start in &self.starts {
            let Some(format) = start.pointer_format else {
                continue;
            };
            if start.page_count == 0 {
                continue;
            }
            if let Some(resolved) = resolve_rebase(format, pointer, preferred_load_address) {
                return resolved;
            }
        }
        pointer
    }

    /// Fetches a page-start entry by array index. Overflow runs may extend
    /// past the `page_count` entries held in `page_starts`, so out-of-line
    /// entries are read straight from the payload.
    fn page_start_entry(&self, start: &SegmentStarts, index: usize) -> Result<u16> {
        if let Some(&entry) = start.page_starts.get(index) {
            return Ok(entry);
        }
        let offset = start.page_starts_offset + index as u64 * 2;
        if offset + 2 > self.lcdat.len() as u64 {
            let max = (self.lcdat.len() as u64).saturating_sub(start.page_starts_offset) / 2;
            return Err(Error::PageStartOutOfBounds {
                index,
                max: max as usize,
            });
        }
        read_u16_at(self.lcdat.as_slice(), self.endian, offset)
    }

    fn read_slot(&self, format: PointerFormat, fixup_location: u64) -> Result<u64> {
        if format.ptr_size() == 4 {
            Ok(read_u32_at(&self.image, self.endian, fixup_location)? as u64)
        } else {
            read_u64_at(&self.image, self.endian, fixup_location)
        }
    }

    /// Walks one chain from its head, decoding each slot and following the
    /// `next` links until a zero link ends the chain. The walk accumulates a
    /// single location and never re-seeks from the head.
    fn walk_chain(
        &self,
        start: &SegmentStarts,
        format: PointerFormat,
        page_index: u16,
        offset_in_page: u16,
        imports: &[Import],
        fixups: &mut Vec<Fixup>,
    ) -> Result<()> {
        let segment_end = start.segment_offset + start.size as u64;
        let page_content_start =
            start.segment_offset + page_index as u64 * start.page_size as u64;
        let stride = format.stride();
        let mut fixup_location = page_content_start + offset_in_page as u64;

        loop {
            if fixup_location >= segment_end {
                return Err(Error::ChainEscapesSegment {
                    at: fixup_location,
                });
            }
            if (fixup_location - start.segment_offset) % stride != 0 {
                return Err(Error::MisalignedChain {
                    at: fixup_location,
                    stride,
                });
            }

            let raw = self.read_slot(format, fixup_location)?;
            let fixup = decode_slot(format, raw, fixup_location, imports)?;
            let next = fixup.next();
            fixups.push(fixup);

            if next == 0 {
                break;
            }
            fixup_location += next as u64 * stride;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::Rebase;

    const LE: Endianness = Endianness::Little;

    fn seg_info(
        size: u32,
        page_size: u16,
        pointer_format: u16,
        segment_offset: u64,
        page_count: u16,
        entries: &[u16],
    ) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(size.to_le_bytes());
        bytes.extend(page_size.to_le_bytes());
        bytes.extend(pointer_format.to_le_bytes());
        bytes.extend(segment_offset.to_le_bytes());
        bytes.extend(0u32.to_le_bytes()); // max_valid_pointer
        bytes.extend(page_count.to_le_bytes());
        for entry in entries {
            bytes.extend(entry.to_le_bytes());
        }
        bytes
    }

    /// Assembles a payload: header, starts table, seg-info blobs, imports,
    /// symbol pool. `None` segments get a zero seg-info offset.
    fn build_payload(
        segs: &[Option<Vec<u8>>],
        imports_format: u32,
        import_records: &[u8],
        imports_count: u32,
        symbols: &[u8],
    ) -> Vec<u8> {
        let starts_offset = 28usize;
        let table_len = 4 + 4 * segs.len();
        let mut seg_offsets = Vec::new();
        let mut blob_offset = table_len;
        for seg in segs {
            match seg {
                Some(blob) => {
                    seg_offsets.push(blob_offset as u32);
                    blob_offset += blob.len();
                }
                None => seg_offsets.push(0),
            }
        }
        let imports_offset = starts_offset + blob_offset;
        let symbols_offset = imports_offset + import_records.len();

        let mut payload = Vec::new();
        payload.extend(0u32.to_le_bytes());
        payload.extend((starts_offset as u32).to_le_bytes());
        payload.extend((imports_offset as u32).to_le_bytes());
        payload.extend((symbols_offset as u32).to_le_bytes());
        payload.extend(imports_count.to_le_bytes());
        payload.extend(imports_format.to_le_bytes());
        payload.extend(0u32.to_le_bytes());

        payload.extend((segs.len() as u32).to_le_bytes());
        for offset in &seg_offsets {
            payload.extend(offset.to_le_bytes());
        }
        for seg in segs.iter().flatten() {
            payload.extend_from_slice(seg);
        }
        payload.extend_from_slice(import_records);
        payload.extend_from_slice(symbols);
        payload
    }

    fn image_with_u64(len: usize, slots: &[(u64, u64)]) -> Vec<u8> {
        let mut image = vec![0u8; len];
        for &(offset, value) in slots {
            image[offset as usize..offset as usize + 8].copy_from_slice(&value.to_le_bytes());
        }
        image
    }

    fn image_with_u32(len: usize, slots: &[(u64, u32)]) -> Vec<u8> {
        let mut image = vec![0u8; len];
        for &(offset, value) in slots {
            image[offset as usize..offset as usize + 4].copy_from_slice(&value.to_le_bytes());
        }
        image
    }

    fn malloc_free_imports() -> (Vec<u8>, u32, &'static [u8]) {
        let mut records = Vec::new();
        records.extend(1u32.to_le_bytes());
        records.extend((1u32 | 8 << 9).to_le_bytes());
        (records, 2, b"_malloc\0_free\0")
    }

    #[test]
    fn test_single_ptr64_rebase() {
        // one page, chain head at offset zero, a single terminal slot
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(0x1100, &[(0x1000, 0x2000)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        assert_eq!(fixups.starts.len(), 1);
        let walked = &fixups.starts[0].fixups;
        assert_eq!(walked.len(), 1);
        match &walked[0] {
            Fixup::Rebase64(rebase) => {
                assert_eq!(rebase.fixup_location, 0x1000);
                assert_eq!(rebase.unpacked_target(), 0x2000);
                assert_eq!(rebase.next(), 0);
            }
            other => panic!("expected Rebase64, got {:?}", other),
        }
    }

    #[test]
    fn test_ptr32_two_slot_chain() {
        let payload = build_payload(
            &[Some(seg_info(0x1000, 0x1000, 3, 0x1000, 1, &[0x0004]))],
            1,
            &[],
            0,
            b"",
        );
        // (target 0x100, next 1), then (target 0x200, next 0)
        let image = image_with_u32(
            0x1100,
            &[(0x1004, 0x100 | 1 << 26), (0x1008, 0x200)],
        );

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let walked = &fixups.starts[0].fixups;
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[0].fixup_location(), 0x1004);
        assert_eq!(walked[1].fixup_location(), 0x1008);
        assert_eq!(
            walked[1].fixup_location() - walked[0].fixup_location(),
            PointerFormat::Ptr32.stride()
        );
        match (&walked[0], &walked[1]) {
            (Fixup::Rebase32(first), Fixup::Rebase32(second)) => {
                assert_eq!(first.target(), 0x100);
                assert_eq!(second.target(), 0x200);
            }
            other => panic!("expected two Rebase32, got {:?}", other),
        }
    }

    #[test]
    fn test_bind_resolves_import_name() {
        let (records, count, symbols) = malloc_free_imports();
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &records,
            count,
            symbols,
        );
        // bind=1, ordinal=1, addend=0, next=0
        let image = image_with_u64(0x1100, &[(0x1000, 1 | 1 << 63)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let walked = &fixups.starts[0].fixups;
        assert_eq!(walked.len(), 1);
        match &walked[0] {
            Fixup::Bind64(bind) => {
                assert_eq!(bind.ordinal(), 1);
                assert_eq!(bind.import, "_free");
            }
            other => panic!("expected Bind64, got {:?}", other),
        }
        assert_eq!(walked[0].bind_name(), Some("_free"));
    }

    #[test]
    fn test_multi_page_starts() {
        // page 0 points at an overflow run beginning at entry 2; entry 2
        // carries the LAST bit, so exactly one chain is walked, at in-page
        // offset 0x20, and entry 3 is never consulted
        let payload = build_payload(
            &[Some(seg_info(
                0x4000,
                0x4000,
                2,
                0x1000,
                1,
                &[0x8002, 0x0010, 0x4020, 0x0030],
            ))],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(0x1100, &[(0x1020, 0x3000)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let walked = &fixups.starts[0].fixups;
        assert_eq!(walked.len(), 1);
        assert_eq!(walked[0].fixup_location(), 0x1020);
    }

    #[test]
    fn test_multi_page_starts_two_chains() {
        // overflow run of two entries: offsets 0x10 and 0x30, LAST on the
        // second
        let payload = build_payload(
            &[Some(seg_info(
                0x4000,
                0x4000,
                2,
                0x1000,
                1,
                &[0x8001, 0x0010, 0x4030],
            ))],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(0x1100, &[(0x1010, 0x111), (0x1030, 0x222)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let locations: Vec<u64> = fixups.fixups().map(|f| f.fixup_location()).collect();
        assert_eq!(locations, vec![0x1010, 0x1030]);
    }

    #[test]
    fn test_arm64e_auth_rebase_resolve() {
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 1, 0x1000, 1, &[0x0000]))],
            1,
            &[],
            0,
            b"",
        );
        // bind=0 auth=1 target=0x4000 key=DA addr_div=1 diversity=0x1234
        let slot: u64 = 0x4000 | 0x1234 << 32 | 1 << 48 | 2 << 49 | 1 << 63;
        let image = image_with_u64(0x1100, &[(0x1000, slot)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let walked = &fixups.starts[0].fixups;
        match &walked[0] {
            Fixup::Arm64eAuthRebase(rebase) => {
                assert_eq!(rebase.target(), 0x4000);
                assert_eq!(rebase.diversity(), 0x1234);
                assert!(rebase.addr_div());
                assert_eq!(
                    rebase.resolve(0x100000000),
                    0x100004000,
                    "auth rebase slides by the preferred load address"
                );
            }
            other => panic!("expected Arm64eAuthRebase, got {:?}", other),
        }
    }

    #[test]
    fn test_ordinal_out_of_range() {
        let mut records = Vec::new();
        for _ in 0..3 {
            records.extend(1u32.to_le_bytes());
        }
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &records,
            3,
            b"_x\0",
        );
        // bind=1, ordinal=5 against three imports
        let image = image_with_u64(0x1100, &[(0x1000, 5 | 1 << 63)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        let err = fixups.parse().unwrap_err();
        match err {
            Error::OrdinalOutOfRange {
                ordinal,
                imports_count,
                at,
            } => {
                assert_eq!(ordinal, 5);
                assert_eq!(imports_count, 3);
                assert_eq!(at, 0x1000);
            }
            other => panic!("expected OrdinalOutOfRange, got {:?}", other),
        }
        // the failed parse leaves no partial results behind
        assert!(fixups.starts[0].fixups.is_empty());
    }

    #[test]
    fn test_empty_segment_record() {
        let payload = build_payload(
            &[
                None,
                Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000])),
            ],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(0x1100, &[(0x1000, 0x2000)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        assert_eq!(fixups.starts.len(), 2);
        assert_eq!(fixups.starts[0].pointer_format, None);
        assert!(fixups.starts[0].fixups.is_empty());
        assert_eq!(fixups.starts[1].fixups.len(), 1);
    }

    #[test]
    fn test_none_page_skipped() {
        let payload = build_payload(
            &[Some(seg_info(
                0x8000,
                0x4000,
                2,
                0x1000,
                2,
                &[0xFFFF, 0x0000],
            ))],
            1,
            &[],
            0,
            b"",
        );
        // only page 1 has a chain, at 0x1000 + 0x4000
        let image = image_with_u64(0x5100, &[(0x5000, 0x2000)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let locations: Vec<u64> = fixups.fixups().map(|f| f.fixup_location()).collect();
        assert_eq!(locations, vec![0x5000]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let (records, count, symbols) = malloc_free_imports();
        let payload = build_payload(
            &[Some(seg_info(0x1000, 0x1000, 3, 0x1000, 1, &[0x0004]))],
            1,
            &records,
            count,
            symbols,
        );
        let image = image_with_u32(
            0x1100,
            &[(0x1004, 0x100 | 1 << 26), (0x1008, 1 | 1 << 31)],
        );

        let mut first = ChainedFixups::new(payload.clone(), image.clone(), LE);
        first.parse().unwrap();
        let mut second = ChainedFixups::new(payload, image, LE);
        second.parse().unwrap();

        let first_fixups: Vec<&Fixup> = first.fixups().collect();
        let second_fixups: Vec<&Fixup> = second.fixups().collect();
        assert_eq!(first_fixups, second_fixups);
    }

    #[test]
    fn test_chain_escapes_segment() {
        let payload = build_payload(
            &[Some(seg_info(0x100, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &[],
            0,
            b"",
        );
        // next=0x100 advances 0x400 bytes, past segment_offset + size
        let image = image_with_u64(0x1200, &[(0x1000, 0x100 << 51)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        let err = fixups.parse().unwrap_err();
        assert!(matches!(err, Error::ChainEscapesSegment { at: 0x1400 }));
    }

    #[test]
    fn test_misaligned_chain_head() {
        // chain head at in-page offset 2 violates the four-byte stride
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0002]))],
            1,
            &[],
            0,
            b"",
        );
        let image = vec![0u8; 0x1100];

        let mut fixups = ChainedFixups::new(payload, image, LE);
        let err = fixups.parse().unwrap_err();
        assert!(matches!(
            err,
            Error::MisalignedChain {
                at: 0x1002,
                stride: 4
            }
        ));
    }

    #[test]
    fn test_truncated_image_read() {
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &[],
            0,
            b"",
        );
        let image = vec![0u8; 0x1004]; // slot extends past the image

        let mut fixups = ChainedFixups::new(payload, image, LE);
        let err = fixups.parse().unwrap_err();
        assert!(matches!(err, Error::TruncatedInput(0x1000)));
    }

    #[test]
    fn test_get_import_for_pointer() {
        let (records, count, symbols) = malloc_free_imports();
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &records,
            count,
            symbols,
        );
        let image = image_with_u64(0x1100, &[(0x1000, 1 | 1 << 63)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let import = fixups.get_import_for_pointer(1 | 1 << 63).unwrap();
        assert_eq!(import.name, "_free");
        let import = fixups.get_import_for_pointer(1 << 63).unwrap();
        assert_eq!(import.name, "_malloc");

        // a rebase-looking value is not a bind
        assert!(matches!(
            fixups.get_import_for_pointer(0x2000),
            Err(Error::NotABind)
        ));
    }

    #[test]
    fn test_rebase_pointer_generic64() {
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(0x1100, &[(0x1000, 0x2000)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        assert_eq!(fixups.rebase_pointer(0x100000000, 0x2000), 0x2000);
        // high8 is restored into the top byte
        let packed: u64 = 0x2000 | 0xAB << 36;
        assert_eq!(
            fixups.rebase_pointer(0x100000000, packed),
            0x2000 | 0xAB << 56
        );
        // binds pass through unchanged
        assert_eq!(fixups.rebase_pointer(0x100000000, 1 << 63), 1 << 63);
    }

    #[test]
    fn test_rebase_pointer_offset_formats() {
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 9, 0x1000, 1, &[0x0000]))],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(0x1100, &[(0x1000, 0x4000)]);

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        // userland targets are vm offsets
        assert_eq!(fixups.rebase_pointer(0x100000000, 0x4000), 0x100004000);
    }

    #[test]
    fn test_rebase_algebra_matches_records() {
        let payload = build_payload(
            &[Some(seg_info(0x4000, 0x4000, 2, 0x1000, 1, &[0x0000]))],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(
            0x1100,
            &[(0x1000, 0x2000 | 3 << 51), (0x100C, 0x3000 | 0x7F << 36)],
        );

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        let base = 0x100000000;
        for fixup in fixups.fixups() {
            let rebase = fixup.as_rebase().expect("fixture only holds rebases");
            assert_eq!(fixups.rebase_pointer(base, fixup.raw()), rebase.resolve(base));
        }
    }

    #[test]
    fn test_fixup_count_matches_chain_lengths() {
        // two pages, one two-slot chain and one single-slot chain
        let payload = build_payload(
            &[Some(seg_info(
                0x8000,
                0x4000,
                2,
                0x1000,
                2,
                &[0x0000, 0x0008],
            ))],
            1,
            &[],
            0,
            b"",
        );
        let image = image_with_u64(
            0x5100,
            &[
                (0x1000, 0x111 | 2 << 51),
                (0x1008, 0x222),
                (0x5008, 0x333),
            ],
        );

        let mut fixups = ChainedFixups::new(payload, image, LE);
        fixups.parse().unwrap();

        assert_eq!(fixups.fixups().count(), 3);
        let locations: Vec<u64> = fixups.fixups().map(|f| f.fixup_location()).collect();
        assert_eq!(locations, vec![0x1000, 0x1008, 0x5008]);
    }
}
