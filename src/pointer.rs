//! Bit-level codecs for every chained-pointer slot layout and the typed
//! fixup records the chain walker emits.

use std::fmt;

use bitfield::bitfield;

use crate::error::{Error, Result};
use crate::format::{PacKey, PointerFormat};
use crate::payload::Import;

// The bitfield views are only decoding aids; the records below carry the raw
// slot word and compute each field on demand.

bitfield! {
    struct Generic32RebaseBits(u32);
    impl Debug;
    target, _: 25, 0;
    next, _: 30, 26;
}

bitfield! {
    struct Generic32BindBits(u32);
    impl Debug;
    ordinal, _: 19, 0;
    addend, _: 25, 20;
    next, _: 30, 26;
}

bitfield! {
    struct Cache32RebaseBits(u32);
    impl Debug;
    target, _: 29, 0;
    next, _: 31, 30;
}

bitfield! {
    struct Firmware32RebaseBits(u32);
    impl Debug;
    target, _: 25, 0;
    next, _: 31, 26;
}

bitfield! {
    struct Generic64RebaseBits(u64);
    impl Debug;
    target, _: 35, 0;
    high8, _: 43, 36;
    next, _: 62, 51;
}

bitfield! {
    struct Generic64BindBits(u64);
    impl Debug;
    ordinal, _: 23, 0;
    addend, _: 31, 24;
    next, _: 62, 51;
}

bitfield! {
    struct KernelCache64RebaseBits(u64);
    impl Debug;
    target, _: 29, 0;
    cache_level, _: 31, 30;
    diversity, _: 47, 32;
    addr_div, _: 48;
    key, _: 50, 49;
    next, _: 62, 51;
}

bitfield! {
    struct Arm64eRebaseBits(u64);
    impl Debug;
    target, _: 42, 0;
    high8, _: 50, 43;
    next, _: 61, 51;
}

bitfield! {
    struct Arm64eBindBits(u64);
    impl Debug;
    ordinal, _: 15, 0;
    addend, _: 50, 32;
    next, _: 61, 51;
}

bitfield! {
    struct Arm64eAuthRebaseBits(u64);
    impl Debug;
    target, _: 31, 0;
    diversity, _: 47, 32;
    addr_div, _: 48;
    key, _: 50, 49;
    next, _: 61, 51;
}

bitfield! {
    struct Arm64eAuthBindBits(u64);
    impl Debug;
    ordinal, _: 15, 0;
    diversity, _: 47, 32;
    addr_div, _: 48;
    key, _: 50, 49;
    next, _: 61, 51;
}

bitfield! {
    struct Arm64eRebase24Bits(u64);
    impl Debug;
    target, _: 23, 0;
    high8, _: 31, 24;
    next, _: 61, 51;
}

bitfield! {
    struct Arm64eAuthRebase24Bits(u64);
    impl Debug;
    target, _: 23, 0;
    diversity, _: 39, 24;
    addr_div, _: 40;
    key, _: 42, 41;
    next, _: 61, 51;
}

bitfield! {
    struct Arm64eBind24Bits(u64);
    impl Debug;
    ordinal, _: 23, 0;
    addend, _: 50, 32;
    next, _: 61, 51;
}

bitfield! {
    struct Arm64eAuthBind24Bits(u64);
    impl Debug;
    ordinal, _: 23, 0;
    diversity, _: 47, 32;
    addr_div, _: 48;
    key, _: 50, 49;
    next, _: 61, 51;
}

pub fn generic32_is_bind(pointer: u32) -> bool {
    pointer >> 31 == 1
}

pub fn generic64_is_bind(pointer: u64) -> bool {
    pointer >> 63 == 1
}

pub fn arm64e_is_bind(pointer: u64) -> bool {
    pointer >> 62 & 1 == 1
}

pub fn arm64e_is_auth(pointer: u64) -> bool {
    pointer >> 63 & 1 == 1
}

/// The narrow rebase surface the read-through overlay is driven by.
pub trait Rebase {
    /// Absolute file offset of the slot this fixup lives in.
    fn offset(&self) -> u64;
    /// The raw slot word, widened to 64 bits.
    fn raw(&self) -> u64;
    /// The final pointer value, given the image's preferred load address.
    fn resolve(&self, preferred_load_address: u64) -> u64;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebase32 {
    pub raw: u32,
    pub fixup_location: u64,
}

impl Rebase32 {
    pub fn target(&self) -> u32 {
        Generic32RebaseBits(self.raw).target()
    }

    pub fn next(&self) -> u32 {
        Generic32RebaseBits(self.raw).next()
    }
}

impl Rebase for Rebase32 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw as u64
    }

    fn resolve(&self, _preferred_load_address: u64) -> u64 {
        // already an absolute vmaddr in the source image
        self.target() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRebase32 {
    pub raw: u32,
    pub fixup_location: u64,
}

impl CacheRebase32 {
    pub fn target(&self) -> u32 {
        Cache32RebaseBits(self.raw).target()
    }

    pub fn next(&self) -> u32 {
        Cache32RebaseBits(self.raw).next()
    }
}

impl Rebase for CacheRebase32 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw as u64
    }

    fn resolve(&self, _preferred_load_address: u64) -> u64 {
        self.target() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRebase32 {
    pub raw: u32,
    pub fixup_location: u64,
}

impl FirmwareRebase32 {
    pub fn target(&self) -> u32 {
        Firmware32RebaseBits(self.raw).target()
    }

    pub fn next(&self) -> u32 {
        Firmware32RebaseBits(self.raw).next()
    }
}

impl Rebase for FirmwareRebase32 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw as u64
    }

    fn resolve(&self, _preferred_load_address: u64) -> u64 {
        self.target() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind32 {
    pub raw: u32,
    pub fixup_location: u64,
    /// Resolved name of the imported symbol this slot binds to.
    pub import: String,
}

impl Bind32 {
    pub fn ordinal(&self) -> u32 {
        Generic32BindBits(self.raw).ordinal()
    }

    pub fn addend(&self) -> u32 {
        Generic32BindBits(self.raw).addend()
    }

    pub fn next(&self) -> u32 {
        Generic32BindBits(self.raw).next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebase64 {
    pub raw: u64,
    pub fixup_location: u64,
}

impl Rebase64 {
    pub fn target(&self) -> u64 {
        Generic64RebaseBits(self.raw).target()
    }

    pub fn high8(&self) -> u8 {
        Generic64RebaseBits(self.raw).high8() as u8
    }

    /// The 36-bit target with the top byte restored.
    pub fn unpacked_target(&self) -> u64 {
        self.target() | (self.high8() as u64) << 56
    }

    pub fn next(&self) -> u32 {
        Generic64RebaseBits(self.raw).next() as u32
    }
}

impl Rebase for Rebase64 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw
    }

    fn resolve(&self, _preferred_load_address: u64) -> u64 {
        self.unpacked_target()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseOffset64 {
    pub raw: u64,
    pub fixup_location: u64,
}

impl RebaseOffset64 {
    pub fn target(&self) -> u64 {
        Generic64RebaseBits(self.raw).target()
    }

    pub fn high8(&self) -> u8 {
        Generic64RebaseBits(self.raw).high8() as u8
    }

    pub fn unpacked_target(&self) -> u64 {
        self.target() | (self.high8() as u64) << 56
    }

    pub fn next(&self) -> u32 {
        Generic64RebaseBits(self.raw).next() as u32
    }
}

impl Rebase for RebaseOffset64 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw
    }

    fn resolve(&self, preferred_load_address: u64) -> u64 {
        self.unpacked_target() + preferred_load_address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelCacheRebase64 {
    pub raw: u64,
    pub fixup_location: u64,
}

impl KernelCacheRebase64 {
    pub fn target(&self) -> u32 {
        KernelCache64RebaseBits(self.raw).target() as u32
    }

    pub fn cache_level(&self) -> u8 {
        KernelCache64RebaseBits(self.raw).cache_level() as u8
    }

    pub fn diversity(&self) -> u16 {
        KernelCache64RebaseBits(self.raw).diversity() as u16
    }

    pub fn addr_div(&self) -> bool {
        KernelCache64RebaseBits(self.raw).addr_div()
    }

    pub fn key(&self) -> PacKey {
        PacKey::from_bits(KernelCache64RebaseBits(self.raw).key() as u8)
    }

    pub fn is_auth(&self) -> bool {
        self.raw >> 63 & 1 == 1
    }

    pub fn next(&self) -> u32 {
        KernelCache64RebaseBits(self.raw).next() as u32
    }
}

impl Rebase for KernelCacheRebase64 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw
    }

    fn resolve(&self, _preferred_load_address: u64) -> u64 {
        self.target() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind64 {
    pub raw: u64,
    pub fixup_location: u64,
    pub import: String,
}

impl Bind64 {
    pub fn ordinal(&self) -> u32 {
        Generic64BindBits(self.raw).ordinal() as u32
    }

    pub fn addend(&self) -> u8 {
        Generic64BindBits(self.raw).addend() as u8
    }

    pub fn next(&self) -> u32 {
        Generic64BindBits(self.raw).next() as u32
    }
}

/// Unauthenticated ARM64E rebase. Target unpacking depends on whether the
/// producing format stores vmaddrs or vm offsets, so the format rides along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eRebase {
    pub raw: u64,
    pub fixup_location: u64,
    pub format: PointerFormat,
}

impl Arm64eRebase {
    pub fn target(&self) -> u64 {
        Arm64eRebaseBits(self.raw).target()
    }

    pub fn high8(&self) -> u8 {
        Arm64eRebaseBits(self.raw).high8() as u8
    }

    pub fn unpack_target(&self) -> u64 {
        if self.format.is_offset_based() {
            self.target()
        } else {
            self.target() | (self.high8() as u64) << 43
        }
    }

    pub fn next(&self) -> u32 {
        Arm64eRebaseBits(self.raw).next() as u32
    }
}

impl Rebase for Arm64eRebase {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw
    }

    fn resolve(&self, preferred_load_address: u64) -> u64 {
        if self.format.is_offset_based() {
            self.unpack_target() + preferred_load_address
        } else {
            self.unpack_target()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eRebase24 {
    pub raw: u64,
    pub fixup_location: u64,
}

impl Arm64eRebase24 {
    pub fn target(&self) -> u32 {
        Arm64eRebase24Bits(self.raw).target() as u32
    }

    pub fn high8(&self) -> u8 {
        Arm64eRebase24Bits(self.raw).high8() as u8
    }

    pub fn next(&self) -> u32 {
        Arm64eRebase24Bits(self.raw).next() as u32
    }
}

impl Rebase for Arm64eRebase24 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw
    }

    fn resolve(&self, preferred_load_address: u64) -> u64 {
        // only the userland24 format produces this record, and its targets
        // are vm offsets
        self.target() as u64 + preferred_load_address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eAuthRebase {
    pub raw: u64,
    pub fixup_location: u64,
}

impl Arm64eAuthRebase {
    pub fn target(&self) -> u32 {
        Arm64eAuthRebaseBits(self.raw).target() as u32
    }

    pub fn diversity(&self) -> u16 {
        Arm64eAuthRebaseBits(self.raw).diversity() as u16
    }

    pub fn addr_div(&self) -> bool {
        Arm64eAuthRebaseBits(self.raw).addr_div()
    }

    pub fn key(&self) -> PacKey {
        PacKey::from_bits(Arm64eAuthRebaseBits(self.raw).key() as u8)
    }

    pub fn next(&self) -> u32 {
        Arm64eAuthRebaseBits(self.raw).next() as u32
    }
}

impl Rebase for Arm64eAuthRebase {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw
    }

    fn resolve(&self, preferred_load_address: u64) -> u64 {
        // the PAC signature is recorded but never applied offline
        self.target() as u64 + preferred_load_address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eAuthRebase24 {
    pub raw: u64,
    pub fixup_location: u64,
}

impl Arm64eAuthRebase24 {
    pub fn target(&self) -> u32 {
        Arm64eAuthRebase24Bits(self.raw).target() as u32
    }

    pub fn diversity(&self) -> u16 {
        Arm64eAuthRebase24Bits(self.raw).diversity() as u16
    }

    pub fn addr_div(&self) -> bool {
        Arm64eAuthRebase24Bits(self.raw).addr_div()
    }

    pub fn key(&self) -> PacKey {
        PacKey::from_bits(Arm64eAuthRebase24Bits(self.raw).key() as u8)
    }

    pub fn next(&self) -> u32 {
        Arm64eAuthRebase24Bits(self.raw).next() as u32
    }
}

impl Rebase for Arm64eAuthRebase24 {
    fn offset(&self) -> u64 {
        self.fixup_location
    }

    fn raw(&self) -> u64 {
        self.raw
    }

    fn resolve(&self, preferred_load_address: u64) -> u64 {
        self.target() as u64 + preferred_load_address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eBind {
    pub raw: u64,
    pub fixup_location: u64,
    pub import: String,
}

impl Arm64eBind {
    pub fn ordinal(&self) -> u32 {
        Arm64eBindBits(self.raw).ordinal() as u32
    }

    pub fn addend(&self) -> u32 {
        Arm64eBindBits(self.raw).addend() as u32
    }

    /// The 19-bit addend interpreted as a signed value.
    pub fn signed_addend(&self) -> i64 {
        let addend = Arm64eBindBits(self.raw).addend();
        if addend & 0x40000 != 0 {
            (addend | !0x7FFFF) as i64
        } else {
            addend as i64
        }
    }

    pub fn next(&self) -> u32 {
        Arm64eBindBits(self.raw).next() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eBind24 {
    pub raw: u64,
    pub fixup_location: u64,
    pub import: String,
}

impl Arm64eBind24 {
    pub fn ordinal(&self) -> u32 {
        Arm64eBind24Bits(self.raw).ordinal() as u32
    }

    pub fn addend(&self) -> u32 {
        Arm64eBind24Bits(self.raw).addend() as u32
    }

    pub fn signed_addend(&self) -> i64 {
        let addend = Arm64eBind24Bits(self.raw).addend();
        if addend & 0x40000 != 0 {
            (addend | !0x7FFFF) as i64
        } else {
            addend as i64
        }
    }

    pub fn next(&self) -> u32 {
        Arm64eBind24Bits(self.raw).next() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eAuthBind {
    pub raw: u64,
    pub fixup_location: u64,
    pub import: String,
}

impl Arm64eAuthBind {
    pub fn ordinal(&self) -> u32 {
        Arm64eAuthBindBits(self.raw).ordinal() as u32
    }

    pub fn diversity(&self) -> u16 {
        Arm64eAuthBindBits(self.raw).diversity() as u16
    }

    pub fn addr_div(&self) -> bool {
        Arm64eAuthBindBits(self.raw).addr_div()
    }

    pub fn key(&self) -> PacKey {
        PacKey::from_bits(Arm64eAuthBindBits(self.raw).key() as u8)
    }

    pub fn next(&self) -> u32 {
        Arm64eAuthBindBits(self.raw).next() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm64eAuthBind24 {
    pub raw: u64,
    pub fixup_location: u64,
    pub import: String,
}

impl Arm64eAuthBind24 {
    pub fn ordinal(&self) -> u32 {
        Arm64eAuthBind24Bits(self.raw).ordinal() as u32
    }

    pub fn diversity(&self) -> u16 {
        Arm64eAuthBind24Bits(self.raw).diversity() as u16
    }

    pub fn addr_div(&self) -> bool {
        Arm64eAuthBind24Bits(self.raw).addr_div()
    }

    pub fn key(&self) -> PacKey {
        PacKey::from_bits(Arm64eAuthBind24Bits(self.raw).key() as u8)
    }

    pub fn next(&self) -> u32 {
        Arm64eAuthBind24Bits(self.raw).next() as u32
    }
}

/// One decoded in-place slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fixup {
    Rebase32(Rebase32),
    CacheRebase32(CacheRebase32),
    FirmwareRebase32(FirmwareRebase32),
    Bind32(Bind32),
    Rebase64(Rebase64),
    RebaseOffset64(RebaseOffset64),
    KernelCacheRebase64(KernelCacheRebase64),
    Bind64(Bind64),
    Arm64eRebase(Arm64eRebase),
    Arm64eRebase24(Arm64eRebase24),
    Arm64eAuthRebase(Arm64eAuthRebase),
    Arm64eAuthRebase24(Arm64eAuthRebase24),
    Arm64eBind(Arm64eBind),
    Arm64eBind24(Arm64eBind24),
    Arm64eAuthBind(Arm64eAuthBind),
    Arm64eAuthBind24(Arm64eAuthBind24),
}

impl Fixup {
    /// Absolute file offset of the slot.
    pub fn fixup_location(&self) -> u64 {
        match self {
            Fixup::Rebase32(f) => f.fixup_location,
            Fixup::CacheRebase32(f) => f.fixup_location,
            Fixup::FirmwareRebase32(f) => f.fixup_location,
            Fixup::Bind32(f) => f.fixup_location,
            Fixup::Rebase64(f) => f.fixup_location,
            Fixup::RebaseOffset64(f) => f.fixup_location,
            Fixup::KernelCacheRebase64(f) => f.fixup_location,
            Fixup::Bind64(f) => f.fixup_location,
            Fixup::Arm64eRebase(f) => f.fixup_location,
            Fixup::Arm64eRebase24(f) => f.fixup_location,
            Fixup::Arm64eAuthRebase(f) => f.fixup_location,
            Fixup::Arm64eAuthRebase24(f) => f.fixup_location,
            Fixup::Arm64eBind(f) => f.fixup_location,
            Fixup::Arm64eBind24(f) => f.fixup_location,
            Fixup::Arm64eAuthBind(f) => f.fixup_location,
            Fixup::Arm64eAuthBind24(f) => f.fixup_location,
        }
    }

    /// The raw slot word, widened to 64 bits for the 32-bit layouts.
    pub fn raw(&self) -> u64 {
        match self {
            Fixup::Rebase32(f) => f.raw as u64,
            Fixup::CacheRebase32(f) => f.raw as u64,
            Fixup::FirmwareRebase32(f) => f.raw as u64,
            Fixup::Bind32(f) => f.raw as u64,
            Fixup::Rebase64(f) => f.raw,
            Fixup::RebaseOffset64(f) => f.raw,
            Fixup::KernelCacheRebase64(f) => f.raw,
            Fixup::Bind64(f) => f.raw,
            Fixup::Arm64eRebase(f) => f.raw,
            Fixup::Arm64eRebase24(f) => f.raw,
            Fixup::Arm64eAuthRebase(f) => f.raw,
            Fixup::Arm64eAuthRebase24(f) => f.raw,
            Fixup::Arm64eBind(f) => f.raw,
            Fixup::Arm64eBind24(f) => f.raw,
            Fixup::Arm64eAuthBind(f) => f.raw,
            Fixup::Arm64eAuthBind24(f) => f.raw,
        }
    }

    /// Number of strides to the following slot; zero ends the chain.
    pub fn next(&self) -> u32 {
        match self {
            Fixup::Rebase32(f) => f.next(),
            Fixup::CacheRebase32(f) => f.next(),
            Fixup::FirmwareRebase32(f) => f.next(),
            Fixup::Bind32(f) => f.next(),
            Fixup::Rebase64(f) => f.next(),
            Fixup::RebaseOffset64(f) => f.next(),
            Fixup::KernelCacheRebase64(f) => f.next(),
            Fixup::Bind64(f) => f.next(),
            Fixup::Arm64eRebase(f) => f.next(),
            Fixup::Arm64eRebase24(f) => f.next(),
            Fixup::Arm64eAuthRebase(f) => f.next(),
            Fixup::Arm64eAuthRebase24(f) => f.next(),
            Fixup::Arm64eBind(f) => f.next(),
            Fixup::Arm64eBind24(f) => f.next(),
            Fixup::Arm64eAuthBind(f) => f.next(),
            Fixup::Arm64eAuthBind24(f) => f.next(),
        }
    }

    /// The rebase view of this fixup, or `None` for binds.
    pub fn as_rebase(&self) -> Option<&dyn Rebase> {
        match self {
            Fixup::Rebase32(f) => Some(f),
            Fixup::CacheRebase32(f) => Some(f),
            Fixup::FirmwareRebase32(f) => Some(f),
            Fixup::Rebase64(f) => Some(f),
            Fixup::RebaseOffset64(f) => Some(f),
            Fixup::KernelCacheRebase64(f) => Some(f),
            Fixup::Arm64eRebase(f) => Some(f),
            Fixup::Arm64eRebase24(f) => Some(f),
            Fixup::Arm64eAuthRebase(f) => Some(f),
            Fixup::Arm64eAuthRebase24(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_rebase(&self) -> bool {
        self.as_rebase().is_some()
    }

    pub fn is_bind(&self) -> bool {
        !self.is_rebase()
    }

    /// Name of the imported symbol a bind slot resolves to.
    pub fn bind_name(&self) -> Option<&str> {
        match self {
            Fixup::Bind32(f) => Some(&f.import),
            Fixup::Bind64(f) => Some(&f.import),
            Fixup::Arm64eBind(f) => Some(&f.import),
            Fixup::Arm64eBind24(f) => Some(&f.import),
            Fixup::Arm64eAuthBind(f) => Some(&f.import),
            Fixup::Arm64eAuthBind24(f) => Some(&f.import),
            _ => None,
        }
    }
}

impl fmt::Display for Fixup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fixup::Rebase32(x) => write!(
                f,
                "{:#010x}: rebase32 target {:#x} next {}",
                x.fixup_location,
                x.target(),
                x.next()
            ),
            Fixup::CacheRebase32(x) => write!(
                f,
                "{:#010x}: cache rebase32 target {:#x} next {}",
                x.fixup_location,
                x.target(),
                x.next()
            ),
            Fixup::FirmwareRebase32(x) => write!(
                f,
                "{:#010x}: firmware rebase32 target {:#x} next {}",
                x.fixup_location,
                x.target(),
                x.next()
            ),
            Fixup::Bind32(x) => write!(
                f,
                "{:#010x}: bind32 {} addend {} next {}",
                x.fixup_location,
                x.import,
                x.addend(),
                x.next()
            ),
            Fixup::Rebase64(x) => write!(
                f,
                "{:#010x}: rebase64 target {:#x} next {}",
                x.fixup_location,
                x.unpacked_target(),
                x.next()
            ),
            Fixup::RebaseOffset64(x) => write!(
                f,
                "{:#010x}: rebase64 offset {:#x} next {}",
                x.fixup_location,
                x.unpacked_target(),
                x.next()
            ),
            Fixup::KernelCacheRebase64(x) => write!(
                f,
                "{:#010x}: kernel cache rebase target {:#x} level {} next {}",
                x.fixup_location,
                x.target(),
                x.cache_level(),
                x.next()
            ),
            Fixup::Bind64(x) => write!(
                f,
                "{:#010x}: bind64 {} addend {} next {}",
                x.fixup_location,
                x.import,
                x.addend(),
                x.next()
            ),
            Fixup::Arm64eRebase(x) => write!(
                f,
                "{:#010x}: arm64e rebase target {:#x} next {}",
                x.fixup_location,
                x.unpack_target(),
                x.next()
            ),
            Fixup::Arm64eRebase24(x) => write!(
                f,
                "{:#010x}: arm64e rebase24 target {:#x} next {}",
                x.fixup_location,
                x.target(),
                x.next()
            ),
            Fixup::Arm64eAuthRebase(x) => write!(
                f,
                "{:#010x}: arm64e auth rebase target {:#x} key {} diversity {:#x} next {}",
                x.fixup_location,
                x.target(),
                x.key().name(),
                x.diversity(),
                x.next()
            ),
            Fixup::Arm64eAuthRebase24(x) => write!(
                f,
                "{:#010x}: arm64e auth rebase24 target {:#x} key {} diversity {:#x} next {}",
                x.fixup_location,
                x.target(),
                x.key().name(),
                x.diversity(),
                x.next()
            ),
            Fixup::Arm64eBind(x) => write!(
                f,
                "{:#010x}: arm64e bind {} addend {} next {}",
                x.fixup_location,
                x.import,
                x.signed_addend(),
                x.next()
            ),
            Fixup::Arm64eBind24(x) => write!(
                f,
                "{:#010x}: arm64e bind24 {} addend {} next {}",
                x.fixup_location,
                x.import,
                x.signed_addend(),
                x.next()
            ),
            Fixup::Arm64eAuthBind(x) => write!(
                f,
                "{:#010x}: arm64e auth bind {} key {} diversity {:#x} next {}",
                x.fixup_location,
                x.import,
                x.key().name(),
                x.diversity(),
                x.next()
            ),
            Fixup::Arm64eAuthBind24(x) => write!(
                f,
                "{:#010x}: arm64e auth bind24 {} key {} diversity {:#x} next {}",
                x.fixup_location,
                x.import,
                x.key().name(),
                x.diversity(),
                x.next()
            ),
        }
    }
}

fn import_name(imports: &[Import], ordinal: u32, at: u64) -> Result<String> {
    imports
        .get(ordinal as usize)
        .map(|import| import.name.clone())
        .ok_or(Error::OrdinalOutOfRange {
            ordinal,
            imports_count: imports.len(),
            at,
        })
}

/// Decodes one slot word into its typed fixup record. Bind slots resolve
/// their import name here; an out-of-range ordinal is fatal.
pub(crate) fn decode_slot(
    format: PointerFormat,
    raw: u64,
    fixup_location: u64,
    imports: &[Import],
) -> Result<Fixup> {
    Ok(match format {
        PointerFormat::Ptr32 => {
            let pointer = raw as u32;
            if generic32_is_bind(pointer) {
                let ordinal = Generic32BindBits(pointer).ordinal();
                let import = import_name(imports, ordinal, fixup_location)?;
                Fixup::Bind32(Bind32 {
                    raw: pointer,
                    fixup_location,
                    import,
                })
            } else {
                Fixup::Rebase32(Rebase32 {
                    raw: pointer,
                    fixup_location,
                })
            }
        }
        PointerFormat::Ptr32Cache => Fixup::CacheRebase32(CacheRebase32 {
            raw: raw as u32,
            fixup_location,
        }),
        PointerFormat::Ptr32Firmware => Fixup::FirmwareRebase32(FirmwareRebase32 {
            raw: raw as u32,
            fixup_location,
        }),
        PointerFormat::Ptr64 => {
            if generic64_is_bind(raw) {
                let ordinal = Generic64BindBits(raw).ordinal() as u32;
                let import = import_name(imports, ordinal, fixup_location)?;
                Fixup::Bind64(Bind64 {
                    raw,
                    fixup_location,
                    import,
                })
            } else {
                Fixup::Rebase64(Rebase64 {
                    raw,
                    fixup_location,
                })
            }
        }
        PointerFormat::Ptr64Offset => Fixup::RebaseOffset64(RebaseOffset64 {
            raw,
            fixup_location,
        }),
        PointerFormat::Ptr64KernelCache | PointerFormat::X86_64KernelCache => {
            Fixup::KernelCacheRebase64(KernelCacheRebase64 {
                raw,
                fixup_location,
            })
        }
        PointerFormat::Arm64e
        | PointerFormat::Arm64eKernel
        | PointerFormat::Arm64eFirmware
        | PointerFormat::Arm64eUserland
        | PointerFormat::Arm64eUserland24 => classify_arm64e(format, raw, fixup_location, imports)?,
    })
}

// Single classifier for the whole ARM64E family: the bind/auth bits sit at
// the same positions in every member, only the ordinal width differs.
fn classify_arm64e(
    format: PointerFormat,
    raw: u64,
    fixup_location: u64,
    imports: &[Import],
) -> Result<Fixup> {
    let wide_ordinal = format == PointerFormat::Arm64eUserland24;
    Ok(
        match (arm64e_is_bind(raw), arm64e_is_auth(raw), wide_ordinal) {
            (false, false, false) => Fixup::Arm64eRebase(Arm64eRebase {
                raw,
                fixup_location,
                format,
            }),
            (false, true, false) => Fixup::Arm64eAuthRebase(Arm64eAuthRebase {
                raw,
                fixup_location,
            }),
            (true, false, false) => {
                let ordinal = Arm64eBindBits(raw).ordinal() as u32;
                let import = import_name(imports, ordinal, fixup_location)?;
                Fixup::Arm64eBind(Arm64eBind {
                    raw,
                    fixup_location,
                    import,
                })
            }
            (true, true, false) => {
                let ordinal = Arm64eAuthBindBits(raw).ordinal() as u32;
                let import = import_name(imports, ordinal, fixup_location)?;
                Fixup::Arm64eAuthBind(Arm64eAuthBind {
                    raw,
                    fixup_location,
                    import,
                })
            }
            (false, false, true) => Fixup::Arm64eRebase24(Arm64eRebase24 {
                raw,
                fixup_location,
            }),
            (false, true, true) => Fixup::Arm64eAuthRebase24(Arm64eAuthRebase24 {
                raw,
                fixup_location,
            }),
            (true, false, true) => {
                let ordinal = Arm64eBind24Bits(raw).ordinal() as u32;
                let import = import_name(imports, ordinal, fixup_location)?;
                Fixup::Arm64eBind24(Arm64eBind24 {
                    raw,
                    fixup_location,
                    import,
                })
            }
            (true, true, true) => {
                let ordinal = Arm64eAuthBind24Bits(raw).ordinal() as u32;
                let import = import_name(imports, ordinal, fixup_location)?;
                Fixup::Arm64eAuthBind24(Arm64eAuthBind24 {
                    raw,
                    fixup_location,
                    import,
                })
            }
        },
    )
}

/// Interprets `pointer` under `format` and returns the bind ordinal it
/// carries, or `None` when the value is not a bind under that format.
pub fn bind_ordinal(format: PointerFormat, pointer: u64) -> Option<u32> {
    match format {
        PointerFormat::Ptr32 => {
            let pointer = pointer as u32;
            if generic32_is_bind(pointer) {
                Some(Generic32BindBits(pointer).ordinal())
            } else {
                None
            }
        }
        PointerFormat::Ptr64 => {
            if generic64_is_bind(pointer) {
                Some(Generic64BindBits(pointer).ordinal() as u32)
            } else {
                None
            }
        }
        PointerFormat::Arm64e
        | PointerFormat::Arm64eKernel
        | PointerFormat::Arm64eFirmware
        | PointerFormat::Arm64eUserland => {
            // auth and non-auth binds share the 16-bit ordinal position
            if arm64e_is_bind(pointer) {
                Some(Arm64eBindBits(pointer).ordinal() as u32)
            } else {
                None
            }
        }
        PointerFormat::Arm64eUserland24 => {
            if arm64e_is_bind(pointer) {
                Some(Arm64eBind24Bits(pointer).ordinal() as u32)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Interprets `pointer` under `format` and resolves it as a rebase, or
/// returns `None` when the value is a bind under that format.
pub fn resolve_rebase(
    format: PointerFormat,
    pointer: u64,
    preferred_load_address: u64,
) -> Option<u64> {
    match format {
        PointerFormat::Ptr32 => {
            let raw = pointer as u32;
            if generic32_is_bind(raw) {
                return None;
            }
            Some(
                Rebase32 {
                    raw,
                    fixup_location: 0,
                }
                .resolve(preferred_load_address),
            )
        }
        PointerFormat::Ptr32Cache => Some(
            CacheRebase32 {
                raw: pointer as u32,
                fixup_location: 0,
            }
            .resolve(preferred_load_address),
        ),
        PointerFormat::Ptr32Firmware => Some(
            FirmwareRebase32 {
                raw: pointer as u32,
                fixup_location: 0,
            }
            .resolve(preferred_load_address),
        ),
        PointerFormat::Ptr64 => {
            if generic64_is_bind(pointer) {
                return None;
            }
            Some(
                Rebase64 {
                    raw: pointer,
                    fixup_location: 0,
                }
                .resolve(preferred_load_address),
            )
        }
        PointerFormat::Ptr64Offset => Some(
            RebaseOffset64 {
                raw: pointer,
                fixup_location: 0,
            }
            .resolve(preferred_load_address),
        ),
        PointerFormat::Ptr64KernelCache | PointerFormat::X86_64KernelCache => Some(
            KernelCacheRebase64 {
                raw: pointer,
                fixup_location: 0,
            }
            .resolve(preferred_load_address),
        ),
        PointerFormat::Arm64e
        | PointerFormat::Arm64eKernel
        | PointerFormat::Arm64eFirmware
        | PointerFormat::Arm64eUserland => {
            if arm64e_is_bind(pointer) {
                return None;
            }
            if arm64e_is_auth(pointer) {
                Some(
                    Arm64eAuthRebase {
                        raw: pointer,
                        fixup_location: 0,
                    }
                    .resolve(preferred_load_address),
                )
            } else {
                Some(
                    Arm64eRebase {
                        raw: pointer,
                        fixup_location: 0,
                        format,
                    }
                    .resolve(preferred_load_address),
                )
            }
        }
        PointerFormat::Arm64eUserland24 => {
            if arm64e_is_bind(pointer) {
                return None;
            }
            if arm64e_is_auth(pointer) {
                Some(
                    Arm64eAuthRebase24 {
                        raw: pointer,
                        fixup_location: 0,
                    }
                    .resolve(preferred_load_address),
                )
            } else {
                Some(
                    Arm64eRebase24 {
                        raw: pointer,
                        fixup_location: 0,
                    }
                    .resolve(preferred_load_address),
                )
            }
        }
    }
}
