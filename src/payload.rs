//! Structures of the `LC_DYLD_CHAINED_FIXUPS` payload: the fixed header,
//! the per-segment starts table and the imports table.

use std::fmt;

use bitfield::bitfield;
use nom::multi::count;
use nom::number::complete::{u16, u32, u64};
use nom::number::Endianness;
use nom::IResult;

use crate::error::{Error, Result};
use crate::format::{ImportsFormat, PointerFormat, SymbolsFormat};
use crate::helpers::string_upto_null_terminator;
use crate::pointer::Fixup;
use crate::read_at::{read_u32_at, read_u64_at};

/// The fixed-size header at offset 0 of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainedFixupsHeader {
    pub fixups_version: u32,
    pub starts_offset: u32,
    pub imports_offset: u32,
    pub symbols_offset: u32,
    pub imports_count: u32,
    pub imports_format: ImportsFormat,
    pub symbols_format: SymbolsFormat,
}

impl ChainedFixupsHeader {
    fn parse_fields(
        bytes: &[u8],
        endian: Endianness,
    ) -> IResult<&[u8], (u32, u32, u32, u32, u32, u32, u32)> {
        let (bytes, fixups_version) = u32(endian)(bytes)?;
        let (bytes, starts_offset) = u32(endian)(bytes)?;
        let (bytes, imports_offset) = u32(endian)(bytes)?;
        let (bytes, symbols_offset) = u32(endian)(bytes)?;
        let (bytes, imports_count) = u32(endian)(bytes)?;
        let (bytes, imports_format) = u32(endian)(bytes)?;
        let (bytes, symbols_format) = u32(endian)(bytes)?;
        Ok((
            bytes,
            (
                fixups_version,
                starts_offset,
                imports_offset,
                symbols_offset,
                imports_count,
                imports_format,
                symbols_format,
            ),
        ))
    }

    pub fn parse(payload: &[u8], endian: Endianness) -> Result<Self> {
        let (_, fields) =
            Self::parse_fields(payload, endian).map_err(|_| Error::TruncatedInput(0))?;
        let (
            fixups_version,
            starts_offset,
            imports_offset,
            symbols_offset,
            imports_count,
            imports_format,
            symbols_format,
        ) = fields;

        if fixups_version != 0 {
            return Err(Error::UnsupportedVersion(fixups_version));
        }
        let imports_format = ImportsFormat::from_raw(imports_format)?;
        let symbols_format = SymbolsFormat::from_raw(symbols_format)?;

        Ok(ChainedFixupsHeader {
            fixups_version,
            starts_offset,
            imports_offset,
            symbols_offset,
            imports_count,
            imports_format,
            symbols_format,
        })
    }
}

bitfield! {
    struct ImportBits(u32);
    impl Debug;
    lib_ordinal, _: 7, 0;
    weak_import, _: 8;
    name_offset, _: 31, 9;
}

bitfield! {
    struct ImportAddend64Bits(u64);
    impl Debug;
    lib_ordinal, _: 15, 0;
    weak_import, _: 16;
    name_offset, _: 63, 32;
}

/// One entry of the imports table with its symbol name already resolved
/// from the NUL-terminated string pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub lib_ordinal: i8,
    pub weak_import: bool,
    pub name_offset: u32,
    pub addend: i64,
    pub name: String,
}

impl Import {
    /// Decodes `imports_count` records at `imports_offset`, whose shape is
    /// selected by `imports_format`, and attaches each record's name.
    pub fn parse_all(
        payload: &[u8],
        header: &ChainedFixupsHeader,
        endian: Endianness,
    ) -> Result<Vec<Import>> {
        let record_size = header.imports_format.record_size();
        let table_end = header.imports_offset as u64 + header.imports_count as u64 * record_size;
        if table_end > payload.len() as u64 {
            return Err(Error::TruncatedInput(table_end));
        }
        let pool = payload
            .get(header.symbols_offset as usize..)
            .ok_or(Error::TruncatedInput(header.symbols_offset as u64))?;

        let mut imports = Vec::with_capacity(header.imports_count as usize);
        let mut offset = header.imports_offset as u64;
        for _ in 0..header.imports_count {
            let mut import = match header.imports_format {
                ImportsFormat::Import => {
                    let bits = ImportBits(read_u32_at(payload, endian, offset)?);
                    Import {
                        lib_ordinal: bits.lib_ordinal() as u8 as i8,
                        weak_import: bits.weak_import(),
                        name_offset: bits.name_offset(),
                        addend: 0,
                        name: String::new(),
                    }
                }
                ImportsFormat::ImportAddend => {
                    let bits = ImportBits(read_u32_at(payload, endian, offset)?);
                    let addend = read_u32_at(payload, endian, offset + 4)? as i32;
                    Import {
                        lib_ordinal: bits.lib_ordinal() as u8 as i8,
                        weak_import: bits.weak_import(),
                        name_offset: bits.name_offset(),
                        addend: addend as i64,
                        name: String::new(),
                    }
                }
                ImportsFormat::ImportAddend64 => {
                    let bits = ImportAddend64Bits(read_u64_at(payload, endian, offset)?);
                    let addend = read_u64_at(payload, endian, offset + 8)? as i64;
                    Import {
                        lib_ordinal: bits.lib_ordinal() as u16 as i16 as i8,
                        weak_import: bits.weak_import(),
                        name_offset: bits.name_offset() as u32,
                        addend,
                        name: String::new(),
                    }
                }
            };

            let pool_offset = header.symbols_offset as u64 + import.name_offset as u64;
            let tail = pool
                .get(import.name_offset as usize..)
                .ok_or(Error::TruncatedInput(pool_offset))?;
            import.name = string_upto_null_terminator(tail)
                .ok_or(Error::UnterminatedSymbol(pool_offset))?;

            imports.push(import);
            offset += record_size;
        }

        Ok(imports)
    }

    /// Human-readable meaning of the library ordinal, naming the special
    /// negative values dyld reserves.
    pub fn lib_ordinal_description(&self) -> String {
        match self.lib_ordinal {
            0 => "self".to_string(),
            -1 => "main executable".to_string(),
            -2 => "flat lookup".to_string(),
            -3 => "weak lookup".to_string(),
            n => format!("library ordinal {}", n),
        }
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak_import {
            write!(f, "{} (weak, {})", self.name, self.lib_ordinal_description())
        } else {
            write!(f, "{} ({})", self.name, self.lib_ordinal_description())
        }
    }
}

/// Chain-start bookkeeping for one segment, and after the walk, the fixups
/// found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStarts {
    pub size: u32,
    pub page_size: u16,
    /// `None` for segments without chains (a zero seg-info offset).
    pub pointer_format: Option<PointerFormat>,
    pub segment_offset: u64,
    pub max_valid_pointer: u32,
    pub page_count: u16,
    pub page_starts: Vec<u16>,
    /// Absolute payload offset of the page-start array. Overflow entries of
    /// multi-start pages live in the same array, possibly past `page_count`,
    /// and are fetched from here.
    pub page_starts_offset: u64,
    pub fixups: Vec<Fixup>,
}

impl SegmentStarts {
    /// The record produced for a segment with no chains.
    pub fn empty() -> Self {
        SegmentStarts {
            size: 0,
            page_size: 0,
            pointer_format: None,
            segment_offset: 0,
            max_valid_pointer: 0,
            page_count: 0,
            page_starts: Vec::new(),
            page_starts_offset: 0,
            fixups: Vec::new(),
        }
    }

    fn parse_fields(
        bytes: &[u8],
        endian: Endianness,
    ) -> IResult<&[u8], (u32, u16, u16, u64, u32, u16)> {
        let (bytes, size) = u32(endian)(bytes)?;
        let (bytes, page_size) = u16(endian)(bytes)?;
        let (bytes, pointer_format) = u16(endian)(bytes)?;
        let (bytes, segment_offset) = u64(endian)(bytes)?;
        let (bytes, max_valid_pointer) = u32(endian)(bytes)?;
        let (bytes, page_count) = u16(endian)(bytes)?;
        Ok((
            bytes,
            (
                size,
                page_size,
                pointer_format,
                segment_offset,
                max_valid_pointer,
                page_count,
            ),
        ))
    }

    /// Decodes one `dyld_chained_starts_in_segment` record at `offset` of
    /// the payload, including its `page_count` page-start values.
    pub fn parse(payload: &[u8], offset: u64, endian: Endianness) -> Result<Self> {
        let bytes = payload
            .get(offset as usize..)
            .ok_or(Error::TruncatedInput(offset))?;
        let (bytes, fields) =
            Self::parse_fields(bytes, endian).map_err(|_| Error::TruncatedInput(offset))?;
        let (size, page_size, pointer_format, segment_offset, max_valid_pointer, page_count) =
            fields;

        let pointer_format = PointerFormat::from_raw(pointer_format)?;
        if !page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(page_size));
        }

        let starts: IResult<&[u8], Vec<u16>> = count(u16(endian), page_count as usize)(bytes);
        let (_, page_starts) = starts.map_err(|_| Error::TruncatedInput(offset))?;

        Ok(SegmentStarts {
            size,
            page_size,
            pointer_format: Some(pointer_format),
            segment_offset,
            max_valid_pointer,
            page_count,
            page_starts,
            // the page-start array begins right after the fixed fields
            page_starts_offset: offset + 22,
            fixups: Vec::new(),
        })
    }
}
