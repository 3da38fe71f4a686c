//! Types for representing BT82x memory regions at compile time.

use super::ptr::Ptr;
use crate::models::Model;
use core::marker::PhantomData;

/// A trait implemented by all memory regions that [`Ptr`](Ptr) instances can
/// refer to.
///
/// It doesn't make sense to implement this trait outside of the `bt82x`
/// crate. It is implemented by model-specific APIs elsewhere in this crate.
///
/// Unlike earlier EVE generations, the BT82x memory map nests some regions
/// inside others: the command FIFO, the fault report and the display list
/// all live inside the register window. Pointers into overlapping regions
/// compare by absolute address.
///
/// `BASE_ADDR` must be a multiple of `LENGTH`, so that pointer arithmetic
/// can wrap around inside the region using only a remainder.
///
/// Memory regions exist only at compile time, as a facility to have the
/// Rust type system help ensure valid use of pointers. At runtime we
/// deal only in absolute addresses represented as u32.
pub trait MemoryRegion: core::marker::Sized + core::fmt::Debug + core::marker::Copy {
    type Model: Model;

    const BASE_ADDR: u32;
    const LENGTH: u32;
    const DEBUG_NAME: &'static str;

    /// Creates a pointer in the selected memory region.
    ///
    /// The given value is interpreted as an offset into the memory region,
    /// modulo the size of the region.
    #[inline]
    fn ptr(raw: u32) -> Ptr<Self> {
        Ptr {
            addr: Self::BASE_ADDR + (raw % Self::LENGTH),
            _region: PhantomData,
        }
    }
}

pub trait MainMem: MemoryRegion + HostAccessible {}

pub trait DisplayListMem: MemoryRegion + HostAccessible {}

pub trait RegisterMem: MemoryRegion + HostAccessible {}

pub trait CommandMem: MemoryRegion + HostAccessible {}

pub trait CommandErrMem: MemoryRegion + HostAccessible {
    type RawMessage: crate::commands::coprocessor::FaultMessageRaw;
}

/// Implemented by memory regions that can be accessed indirectly via the
/// `CMD_FLASH...` family of coprocessor commands.
///
/// The coprocessor commands take addresses relative to the start of flash,
/// so callers should use [`Ptr::to_raw_offset`](Ptr::to_raw_offset) when
/// encoding a pointer into this region.
pub trait ExtFlashMem: MemoryRegion {}

/// Implemented by memory regions that can be directly read or written by
/// the host controller over the SPI bus, using the full 32-bit address.
pub trait HostAccessible: MemoryRegion {}
