//! Helpers for waiting until the coprocessor has freed enough FIFO space
//! for a forthcoming command.
//!
//! [`Waiter`](Waiter) is a trait implemented by types that are able to block
//! until there's either a particular amount of buffer space available or
//! until the coprocessor reports a fault.
//!
//! [`PollingWaiter`](PollingWaiter) is a simple built-in implementation of
//! `Waiter` which busy-polls `REG_CMDB_SPACE`.
//!
//! If you are working with this library on a platform where you are able to
//! listen for and respond to interrupt signals from the chip then you
//! could improve power consumption by implementing a new `Waiter` which can
//! put the host processor to sleep while waiting for a signal that there is
//! either more buffer space or a coprocessor fault.

use crate::interface::Interface;
use crate::low_level::LowLevel;
use crate::models::Model;
use crate::registers::Register;
use log::warn;

/// Knows how to block until the coprocessor FIFO is at least empty enough
/// to receive a forthcoming message.
///
/// This is a trait in order to allow for implementations that are able to
/// respond to the chip's interrupt signal for the buffer to be ready,
/// although the only implementation available directly in this crate is one
/// that busy-polls the register that tracks the buffer usage, because
/// interaction with interrupts is always system-specific.
pub trait Waiter<M: Model, I: Interface> {
    type Error;

    /// Blocks until `REG_CMDB_SPACE` reports at least `need` bytes, and
    /// returns the space it last observed.
    fn wait_for_space(
        &mut self,
        ll: &mut LowLevel<M, I>,
        need: u16,
    ) -> core::result::Result<u16, WaiterError<Self::Error>>;
}

/// Error type returned by a waiter, which distinguishes between communication
/// transport errors, explicit coprocessor faults and giving up.
#[derive(Debug)]
pub enum WaiterError<E: Sized> {
    Comm(E),
    Fault,
    Timeout,
}

pub(crate) fn waiter_comm_result<R, E: Sized>(
    result: core::result::Result<R, E>,
) -> core::result::Result<R, WaiterError<E>> {
    match result {
        Ok(v) => Ok(v),
        Err(err) => Err(WaiterError::Comm(err)),
    }
}

/// The default [`Waiter`](Waiter) implementation, which polls the coprocessor
/// registers in a busy loop until there's enough available space.
///
/// By default it polls forever. Use
/// [`with_poll_limit`](PollingWaiter::with_poll_limit) to have it give up
/// with [`WaiterError::Timeout`](WaiterError::Timeout) instead.
pub struct PollingWaiter<M: Model, I: Interface> {
    poll_limit: Option<u32>,
    _ei: core::marker::PhantomData<I>,
    _m: core::marker::PhantomData<M>,
}

impl<M: Model, I: Interface> PollingWaiter<M, I> {
    pub fn new() -> Self {
        Self {
            poll_limit: None,
            _ei: core::marker::PhantomData,
            _m: core::marker::PhantomData,
        }
    }

    pub fn with_poll_limit(limit: u32) -> Self {
        Self {
            poll_limit: Some(limit),
            ..Self::new()
        }
    }
}

impl<M: Model, I: Interface> Waiter<M, I> for PollingWaiter<M, I> {
    type Error = I::Error;

    fn wait_for_space(
        &mut self,
        ll: &mut LowLevel<M, I>,
        need: u16,
    ) -> core::result::Result<u16, WaiterError<Self::Error>> {
        let mut polls: u32 = 0;
        loop {
            let space = waiter_comm_result(ll.rd32(ll.reg_ptr(Register::CMDB_SPACE)))?;
            if super::is_fault(space) {
                warn!("coprocessor fault (REG_CMDB_SPACE = {:#x})", space);
                return Err(WaiterError::Fault);
            }
            let space = space as u16;
            if space >= need {
                return Ok(space);
            }
            polls += 1;
            if let Some(limit) = self.poll_limit {
                if polls >= limit {
                    return Err(WaiterError::Timeout);
                }
            }
        }
    }
}
