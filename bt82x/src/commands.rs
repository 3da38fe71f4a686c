//! The coprocessor command FIFO and the commands that can be sent through it.
//!
//! [`Coprocessor`](Coprocessor) owns the interface while it's active,
//! because it keeps a burst write open on `REG_CMDB_WRITE` between commands.
//! The [`flash`](flash) module layers the external flash helpers on top of
//! it.

pub mod coprocessor;
pub mod flash;
pub mod options;
pub mod waiter;

mod command_word;

#[doc(inline)]
pub use coprocessor::{Coprocessor, Error, FaultMessage, Result};

#[doc(inline)]
pub use waiter::{PollingWaiter, Waiter, WaiterError};

/// The size of the coprocessor command FIFO (`RAM_CMD`) in bytes.
pub const FIFO_SIZE: u32 = 16 * 1024;

/// Masks a byte offset into the command FIFO.
pub const FIFO_MASK: u32 = FIFO_SIZE - 1;

/// The value `REG_CMDB_SPACE` reports when the coprocessor has consumed
/// every command written so far.
pub const SPACE_WHEN_EMPTY: u16 = (FIFO_SIZE - 4) as u16;

/// Returns true if the given `REG_CMD_READ` or `REG_CMDB_SPACE` value
/// signals a coprocessor fault. Both are always word-aligned otherwise.
#[inline]
pub const fn is_fault(v: u32) -> bool {
    v & 0x3 != 0
}
