//! Pointers in the BT82x memory space.

pub mod region;

mod ptr;
mod slice;

#[doc(inline)]
pub use ptr::Ptr;

#[doc(inline)]
pub use slice::Slice;

pub(crate) use region::*;
