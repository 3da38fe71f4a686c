//! A driver for the Bridgetek BT82x family of EVE graphics controllers.
//!
//! [`BT82x`](BT82x) covers booting the chip and configuring the display. Once
//! that's done, [`BT82x::start_coprocessor`](BT82x::start_coprocessor) hands
//! the interface over to a [`Coprocessor`](commands::Coprocessor), which is
//! how almost everything else happens, including access to the external
//! flash.
//!
//! This crate doesn't talk to any hardware itself. Pair it with an
//! [`Interface`](Interface) implementation for your platform, such as those
//! in `bt82x-hal` or `bt82x-spidriver`.

#![no_std]

pub mod commands;
pub mod config;
pub mod error;
pub mod host_commands;
pub mod init;
pub mod interface;
pub mod low_level;
pub mod memory;
pub mod models;
pub mod registers;

#[doc(inline)]
pub use config::{BootParameters, ClockFrequency, DdrSize, DisplayParameters, DisplayPreset};

#[doc(inline)]
pub use init::ChipId;

#[doc(inline)]
pub use interface::Interface;

#[doc(inline)]
pub use models::Model;

use commands::{Coprocessor, PollingWaiter, Waiter};
use low_level::LowLevel;
use models::WithExtFlashMem;

/// The main type for this crate, wrapping an [`Interface`](Interface) to a
/// particular model of BT82x.
///
/// The usual sequence is [`boot`](BT82x::boot), then
/// [`configure_display`](BT82x::configure_display), then
/// [`start_coprocessor`](BT82x::start_coprocessor).
pub struct BT82x<M: Model, I: Interface> {
    pub(crate) ll: LowLevel<M, I>,
}

impl<M: Model, I: Interface> BT82x<M, I> {
    pub fn new(ei: I) -> Self {
        Self {
            ll: LowLevel::new(ei),
        }
    }

    /// Power-cycles the chip and runs its boot sequence, returning the chip
    /// ID once all of the engines are out of reset.
    ///
    /// Each stage of the boot polls a status register at most
    /// [`BootParameters::poll_limit`](BootParameters::poll_limit) times
    /// before failing with [`Error::Timeout`](error::Error::Timeout).
    pub fn boot(&mut self, params: &BootParameters) -> Result<ChipId, error::Error<I>> {
        init::boot(&mut self.ll, params)
    }

    /// Writes the video timing registers, enables the display and then
    /// shows a blank screen.
    ///
    /// Fails with [`Error::Unsupported`](error::Error::Unsupported) if the
    /// visible size is zero or larger than
    /// [`MAX_DIMENSION`](config::MAX_DIMENSION).
    pub fn configure_display(&mut self, params: &DisplayParameters) -> Result<(), error::Error<I>> {
        init::configure_display(&mut self.ll, params)
    }

    /// Replaces the current display list with one that clears the screen
    /// to black.
    pub fn clear_screen(&mut self) -> Result<(), error::Error<I>> {
        init::clear_screen(&mut self.ll)
    }

    /// Drives the GPIOs to a safe state and then powers the chip down.
    pub fn shutdown(&mut self) -> Result<(), error::Error<I>> {
        init::shutdown(&mut self.ll)
    }

    /// Measures the system clock by counting its ticks across one second.
    ///
    /// This relies on the interface's `delay_ms` to time the second.
    pub fn current_frequency(&mut self) -> Result<u32, error::Error<I>> {
        init::current_frequency(&mut self.ll)
    }

    /// Consumes the `BT82x` and returns a coprocessor for the same chip,
    /// without checking or resetting the coprocessor first.
    ///
    /// Prefer [`start_coprocessor`](BT82x::start_coprocessor) straight
    /// after boot.
    pub fn coprocessor_polling(
        self,
    ) -> commands::Result<Coprocessor<M, I, PollingWaiter<M, I>>, M, I, PollingWaiter<M, I>> {
        Coprocessor::from_low_level(self.ll, PollingWaiter::new())
    }

    pub fn low_level<'a>(&'a mut self) -> &'a mut LowLevel<M, I> {
        &mut self.ll
    }

    pub fn borrow_interface<'a>(&'a mut self) -> &'a mut I {
        self.ll.borrow_interface()
    }

    pub fn take_interface(self) -> I {
        self.ll.take_interface()
    }
}

impl<M: Model + WithExtFlashMem, I: Interface> BT82x<M, I> {
    /// Consumes the `BT82x` and returns a coprocessor that's ready for
    /// commands, using a busy-polling waiter.
    ///
    /// If the coprocessor FIFO isn't empty, or the coprocessor has faulted,
    /// the coprocessor is reset first. Otherwise only the flash is
    /// reattached.
    pub fn start_coprocessor(
        self,
    ) -> commands::Result<Coprocessor<M, I, PollingWaiter<M, I>>, M, I, PollingWaiter<M, I>> {
        self.start_coprocessor_with_waiter(PollingWaiter::new())
    }

    /// Like [`start_coprocessor`](BT82x::start_coprocessor), but with a
    /// custom waiter.
    pub fn start_coprocessor_with_waiter<W: Waiter<M, I>>(
        self,
        wait: W,
    ) -> commands::Result<Coprocessor<M, I, W>, M, I, W> {
        init::start_coprocessor(self.ll, wait)
    }
}
