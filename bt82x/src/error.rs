//! Various error types returned by different components in this crate.

/// A general error type for errors from the main [`BT82x`](crate::BT82x)
/// type, covering the boot and display configuration sequences.
#[non_exhaustive]
pub enum Error<I: crate::interface::Interface> {
    /// Indicates that the requested operation isn't supported with the
    /// given parameters, such as a system clock the PLL can't divide down
    /// to.
    Unsupported,

    /// Errors encountered when sending or recieving data from the chip.
    ///
    /// The wrapped error type for this variant is the error type for whichever
    /// [`Interface`](crate::interface::Interface) implementation you are using.
    Interface(I::Error),

    /// The chip didn't reach the expected state within the poll limit.
    Timeout(BootStage),
}

/// Identifies the wait that timed out, for [`Error::Timeout`](Error::Timeout).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BootStage {
    /// `REG_BOOT_STATUS` never reported normal running.
    BootStatus,
    /// `REG_CHIP_ID` never reported a BT820.
    ChipId,
    /// `REG_ID` never reported `0x7C`.
    RegId,
    /// One of the engines stayed in reset.
    CpuReset,
    /// The coprocessor FIFO pointers didn't return to zero after a reset.
    CommandReset,
}

impl<I: crate::interface::Interface> Error<I> {
    pub(crate) fn interface_result<T>(result: Result<T, I::Error>) -> Result<T, Self> {
        result.map_err(Error::Interface)
    }
}

impl<I> core::fmt::Debug for Error<I>
where
    I: crate::interface::Interface,
    I::Error: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Error::Unsupported => f.debug_tuple("Unsupported").finish(),
            Error::Interface(err) => f.debug_tuple("Interface").field(err).finish(),
            Error::Timeout(stage) => f.debug_tuple("Timeout").field(stage).finish(),
        }
    }
}

impl<I> core::fmt::Display for Error<I>
where
    I: crate::interface::Interface,
    I::Error: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Error::Unsupported => write!(f, "operation not supported"),
            Error::Interface(err) => write!(f, "interface error: {:?}", err),
            Error::Timeout(stage) => write!(f, "timed out waiting for {}", stage),
        }
    }
}

impl core::fmt::Display for BootStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::result::Result<(), core::fmt::Error> {
        let s = match self {
            BootStage::BootStatus => "boot status",
            BootStage::ChipId => "chip id",
            BootStage::RegId => "register id",
            BootStage::CpuReset => "engines to leave reset",
            BootStage::CommandReset => "command FIFO reset",
        };
        f.write_str(s)
    }
}
