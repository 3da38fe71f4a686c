use super::region::*;
use core::marker::PhantomData;

/// A pointer to a memory address within a particular memory region identified
/// by type parameter `R`.
///
/// Pointers are parameterized by memory region so that other parts of this
/// library which consume pointers can statically constrain what memory regions
/// they are able to refer to.
#[derive(Copy, Clone)]
pub struct Ptr<R: MemoryRegion> {
    pub(crate) addr: u32,
    pub(crate) _region: PhantomData<R>,
}

/// General API for pointers across all memory regions.
impl<R: MemoryRegion> Ptr<R> {
    /// Constructs a new pointer from the given raw address.
    ///
    /// Note that a pointer always belongs to a memory region, but there's
    /// no argument here to select one. Instead, we typically rely on
    /// type inference to select one, by using the result in a context which
    /// implies a particular memory region.
    ///
    /// The given offset is interpreted as an offset into the selected
    /// memory region, modulo the region length. See
    /// [`MemoryRegion::ptr`](MemoryRegion::ptr) for more information.
    #[inline]
    pub fn new(offset: u32) -> Self {
        R::ptr(offset)
    }

    /// Returns the absolute address of the pointer.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.addr
    }

    /// Returns the offset of the pointer relative to its containing memory
    /// region.
    #[inline]
    pub fn to_raw_offset(self) -> u32 {
        self.addr - R::BASE_ADDR
    }

    /// Returns true if the pointer's offset into its region is a multiple
    /// of `align`.
    #[inline]
    pub fn is_aligned(self, align: u32) -> bool {
        self.to_raw_offset() % align == 0
    }
}

impl<R1: MemoryRegion, R2: MemoryRegion<Model = R1::Model>> core::cmp::PartialEq<Ptr<R2>>
    for Ptr<R1>
{
    fn eq(&self, other: &Ptr<R2>) -> bool {
        self.addr == other.addr
    }
}

impl<R: MemoryRegion> core::cmp::Eq for Ptr<R> {}

impl<R1: MemoryRegion, R2: MemoryRegion<Model = R1::Model>> core::cmp::PartialOrd<Ptr<R2>>
    for Ptr<R1>
{
    fn partial_cmp(&self, other: &Ptr<R2>) -> core::option::Option<core::cmp::Ordering> {
        Some(self.addr.cmp(&other.addr))
    }
}

impl<R: MemoryRegion> core::cmp::Ord for Ptr<R> {
    fn cmp(&self, other: &Ptr<R>) -> core::cmp::Ordering {
        self.addr.cmp(&other.addr)
    }
}

// Pointer arithmetic wraps around within the region. Every region base is a
// multiple of its length, so reducing the absolute address modulo the length
// recovers the offset even when the u32 itself wraps.

impl<R: MemoryRegion> core::ops::Add<i32> for Ptr<R> {
    type Output = Self;

    fn add(self, offset: i32) -> Self {
        R::ptr(self.to_raw().wrapping_add(offset as u32))
    }
}

impl<R: MemoryRegion> core::ops::Add<u32> for Ptr<R> {
    type Output = Self;

    fn add(self, offset: u32) -> Self {
        R::ptr(self.to_raw().wrapping_add(offset))
    }
}

impl<R: MemoryRegion> core::ops::AddAssign<i32> for Ptr<R> {
    fn add_assign(&mut self, offset: i32) {
        *self = *self + offset
    }
}

impl<R: MemoryRegion> core::ops::AddAssign<u32> for Ptr<R> {
    fn add_assign(&mut self, offset: u32) {
        *self = *self + offset
    }
}

impl<R: MemoryRegion> core::ops::Sub<i32> for Ptr<R> {
    type Output = Self;

    fn sub(self, offset: i32) -> Self {
        R::ptr(self.to_raw().wrapping_sub(offset as u32))
    }
}

impl<R: MemoryRegion> core::ops::Sub<u32> for Ptr<R> {
    type Output = Self;

    fn sub(self, offset: u32) -> Self {
        R::ptr(self.to_raw().wrapping_sub(offset))
    }
}

impl<R: MemoryRegion> core::ops::SubAssign<i32> for Ptr<R> {
    fn sub_assign(&mut self, offset: i32) {
        *self = *self - offset
    }
}

impl<R: MemoryRegion> core::ops::SubAssign<u32> for Ptr<R> {
    fn sub_assign(&mut self, offset: u32) {
        *self = *self - offset
    }
}

impl<R: MemoryRegion> core::fmt::Debug for Ptr<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Ptr {{ addr: {:#010x?} /*{}*/ }}",
            self.addr,
            R::DEBUG_NAME
        )
    }
}

impl<R: MemoryRegion> core::fmt::Display for Ptr<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x?}", self.addr)
    }
}
