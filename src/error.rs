use thiserror::Error;

/// A specialized Result type for chained-fixups operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while decoding a chained-fixups payload or
/// walking its pointer chains.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated input at offset {0:#x}")]
    TruncatedInput(u64),

    #[error("unsupported chained-fixups version: {0}")]
    UnsupportedVersion(u32),

    #[error("unknown pointer format: {0:#06x}")]
    UnknownPointerFormat(u16),

    #[error("unknown imports format: {0}")]
    UnknownImportsFormat(u32),

    #[error("unknown symbols format: {0}")]
    UnknownSymbolsFormat(u32),

    #[error("zlib-compressed symbol pools are not supported")]
    CompressedSymbols,

    #[error("unterminated symbol string at offset {0:#x}")]
    UnterminatedSymbol(u64),

    #[error("invalid page size: {0:#x}")]
    InvalidPageSize(u16),

    #[error("page start index {index} out of bounds (max: {max})")]
    PageStartOutOfBounds { index: usize, max: usize },

    #[error("bind ordinal {ordinal} out of range ({imports_count} imports) at offset {at:#x}")]
    OrdinalOutOfRange {
        ordinal: u32,
        imports_count: usize,
        at: u64,
    },

    #[error("chain at offset {at:#x} escapes its segment")]
    ChainEscapesSegment { at: u64 },

    #[error("misaligned chain slot at offset {at:#x} (stride {stride})")]
    MisalignedChain { at: u64, stride: u64 },

    #[error("overlay read at {at:#x}: found {found:#x}, expected raw slot value {expected:#x}")]
    OverlayBytesMismatch { at: u64, expected: u64, found: u64 },

    #[error("not a bind pointer")]
    NotABind,
}
