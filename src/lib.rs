//! Offline parser and resolver for the Mach-O chained-fixups relocation
//! format (`LC_DYLD_CHAINED_FIXUPS`).
//!
//! The payload of the load command describes, per segment, where pointer
//! chains start; the chains themselves are bit-packed into the pointer
//! slots of the image's data pages. [`ChainedFixups`] walks those chains
//! the way dyld would at load time and produces typed rebase/bind records,
//! and [`RebasedReader`] serves image bytes with rebase slots already
//! rewritten to their resolved addresses.

pub mod error;
pub mod fixups;
pub mod format;
pub mod helpers;
pub mod payload;
pub mod pointer;
pub mod read_at;
pub mod reader;

pub use error::{Error, Result};
pub use fixups::ChainedFixups;
pub use format::{ImportsFormat, PacKey, PointerFormat, SymbolsFormat};
pub use payload::{ChainedFixupsHeader, Import, SegmentStarts};
pub use pointer::{Fixup, Rebase};
pub use read_at::{ReadAt, Subset};
pub use reader::RebasedReader;

pub use nom::number::Endianness;
