use num::FromPrimitive;
use num_derive::FromPrimitive;

use crate::error::{Error, Result};

/// Page has no chain.
pub const DYLD_CHAINED_PTR_START_NONE: u16 = 0xFFFF;
/// The low 15 bits index the first entry of an overflow run of chain starts.
pub const DYLD_CHAINED_PTR_START_MULTI: u16 = 0x8000;
/// Marks the final entry of an overflow run.
pub const DYLD_CHAINED_PTR_START_LAST: u16 = 0x4000;

/// The in-place pointer encoding used by a segment's chains, as recorded in
/// `dyld_chained_starts_in_segment.pointer_format`.
#[repr(u16)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum PointerFormat {
    Arm64e = 1,
    Ptr64 = 2,
    Ptr32 = 3,
    Ptr32Cache = 4,
    Ptr32Firmware = 5,
    Ptr64Offset = 6,
    Arm64eKernel = 7,
    Ptr64KernelCache = 8,
    Arm64eUserland = 9,
    Arm64eFirmware = 10,
    X86_64KernelCache = 11,
    Arm64eUserland24 = 12,
}

impl PointerFormat {
    pub fn from_raw(value: u16) -> Result<Self> {
        FromPrimitive::from_u16(value).ok_or(Error::UnknownPointerFormat(value))
    }

    /// Byte distance multiplier for the `next` field.
    pub fn stride(self) -> u64 {
        match self {
            PointerFormat::Arm64e => 8,
            PointerFormat::Arm64eUserland => 8,
            PointerFormat::Arm64eUserland24 => 8,
            PointerFormat::X86_64KernelCache => 1,
            PointerFormat::Ptr64 => 4,
            PointerFormat::Ptr32 => 4,
            PointerFormat::Ptr32Cache => 4,
            PointerFormat::Ptr32Firmware => 4,
            PointerFormat::Ptr64Offset => 4,
            PointerFormat::Arm64eKernel => 4,
            PointerFormat::Ptr64KernelCache => 4,
            PointerFormat::Arm64eFirmware => 4,
        }
    }

    /// Width in bytes of one in-place slot.
    pub fn ptr_size(self) -> u64 {
        match self {
            PointerFormat::Ptr32 | PointerFormat::Ptr32Cache | PointerFormat::Ptr32Firmware => 4,
            _ => 8,
        }
    }

    /// Rebase targets of these formats are vm offsets and must be slid by the
    /// preferred load address; the others store absolute vmaddrs.
    pub fn is_offset_based(self) -> bool {
        matches!(
            self,
            PointerFormat::Ptr64Offset
                | PointerFormat::Arm64eKernel
                | PointerFormat::Arm64eUserland
                | PointerFormat::Arm64eUserland24
        )
    }

    pub fn is_arm64e(self) -> bool {
        matches!(
            self,
            PointerFormat::Arm64e
                | PointerFormat::Arm64eKernel
                | PointerFormat::Arm64eUserland
                | PointerFormat::Arm64eFirmware
                | PointerFormat::Arm64eUserland24
        )
    }
}

/// Shape of the records in the imports table.
#[repr(u32)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum ImportsFormat {
    Import = 1,
    ImportAddend = 2,
    ImportAddend64 = 3,
}

impl ImportsFormat {
    pub fn from_raw(value: u32) -> Result<Self> {
        FromPrimitive::from_u32(value).ok_or(Error::UnknownImportsFormat(value))
    }

    pub fn record_size(self) -> u64 {
        match self {
            ImportsFormat::Import => 4,
            ImportsFormat::ImportAddend => 8,
            ImportsFormat::ImportAddend64 => 16,
        }
    }
}

/// Encoding of the symbol-name pool. Only the raw form is supported; zlib
/// pools are rejected up front.
#[repr(u32)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum SymbolsFormat {
    Uncompressed = 0,
    Zlib = 1,
}

impl SymbolsFormat {
    pub fn from_raw(value: u32) -> Result<Self> {
        match FromPrimitive::from_u32(value) {
            Some(SymbolsFormat::Uncompressed) => Ok(SymbolsFormat::Uncompressed),
            Some(SymbolsFormat::Zlib) => Err(Error::CompressedSymbols),
            None => Err(Error::UnknownSymbolsFormat(value)),
        }
    }
}

/// Pointer-authentication key recorded on ARM64E auth fixups.
#[repr(u8)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum PacKey {
    IA = 0,
    IB = 1,
    DA = 2,
    DB = 3,
}

impl PacKey {
    /// The key field is two bits wide, so every value maps to a key.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => PacKey::IA,
            1 => PacKey::IB,
            2 => PacKey::DA,
            _ => PacKey::DB,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PacKey::IA => "IA",
            PacKey::IB => "IB",
            PacKey::DA => "DA",
            PacKey::DB => "DB",
        }
    }
}
