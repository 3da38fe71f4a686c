//! The boundary between this library and the physical bus to the chip.

/// Implementations of `Interface` serve as adapters between the interface
/// this library expects and a specific physical implementation of that
/// interface, such as a SPI bus.
///
/// The main library contains no implementations of this trait, in order to
/// make the library portable across systems big and small. Other crates,
/// including some with the name prefix `bt82x`, take on additional
/// dependencies in order to bind this library to specific systems/hardware.
///
/// Reads and writes are split into "begin", "continue" and "end" steps so
/// that callers can hold a single chip-select transaction open across many
/// calls. The coprocessor support relies on this to stream commands into
/// `REG_CMDB_WRITE` without re-sending an address header per command.
///
/// BT82x uses 32-bit addresses on the wire. Implementations should use
/// [`build_write_header`](Interface::build_write_header) and
/// [`build_read_header`](Interface::build_read_header) to frame them, and
/// must consume the chip's "read ready" byte (see
/// [`await_read_ready`](await_read_ready)) in `begin_read` before returning,
/// so that `continue_read` sees only payload bytes.
pub trait Interface {
    type Error;

    /// Power-cycles the chip by pulling its PD_N signal low for a while and
    /// then releasing it.
    ///
    /// Interfaces that have no control over the power-down signal can keep
    /// the default implementation, which does nothing.
    fn reset(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Blocks the host for at least the given number of milliseconds.
    ///
    /// The default implementation returns immediately, which is acceptable
    /// because every wait in this crate is also bounded by a poll count.
    /// Platforms with a timer should override this so that boot and reset
    /// sequences give the chip the settling time it expects.
    fn delay_ms(&mut self, _ms: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn begin_write(&mut self, addr: u32) -> Result<(), Self::Error>;
    fn continue_write(&mut self, v: &[u8]) -> Result<(), Self::Error>;
    fn end_write(&mut self) -> Result<(), Self::Error>;

    fn begin_read(&mut self, addr: u32) -> Result<(), Self::Error>;
    fn continue_read(&mut self, into: &mut [u8]) -> Result<(), Self::Error>;
    fn end_read(&mut self) -> Result<(), Self::Error>;

    /// Sends a single host command, in its own chip-select transaction.
    ///
    /// `cmd` is the raw command code and `arg` its single argument byte.
    /// Implementations should frame the message using
    /// [`build_host_cmd_msg`](Interface::build_host_cmd_msg).
    fn host_cmd(&mut self, cmd: u8, arg: u8) -> Result<(), Self::Error>;

    /// Writes all of the given bytes starting at the given address, as a
    /// single transaction.
    fn write(&mut self, addr: u32, v: &[u8]) -> Result<(), Self::Error> {
        self.begin_write(addr)?;
        self.continue_write(v)?;
        self.end_write()
    }

    /// Fills the given buffer from memory starting at the given address, as
    /// a single transaction.
    fn read(&mut self, addr: u32, into: &mut [u8]) -> Result<(), Self::Error> {
        self.begin_read(addr)?;
        self.continue_read(into)?;
        self.end_read()
    }

    /// Write the four bytes needed to form a "write memory" header
    /// for the given address into the given bytes. This is a helper for
    /// physical implementations that need to construct a message
    /// buffer to transmit to the real chip, e.g. via SPI.
    fn build_write_header(&self, addr: u32, into: &mut [u8; 4]) {
        into[0] = ((addr >> 24) as u8) | 0b10000000;
        into[1] = (addr >> 16) as u8;
        into[2] = (addr >> 8) as u8;
        into[3] = (addr >> 0) as u8;
    }

    /// Write the four bytes needed to form a "read memory" header
    /// for the given address into the given bytes.
    ///
    /// After sending this header the host must keep clocking single bytes
    /// until the chip returns [`READ_READY`](READ_READY); only the bytes
    /// after that one are payload.
    fn build_read_header(&self, addr: u32, into: &mut [u8; 4]) {
        into[0] = ((addr >> 24) as u8) & 0b01111111;
        into[1] = (addr >> 16) as u8;
        into[2] = (addr >> 8) as u8;
        into[3] = (addr >> 0) as u8;
    }

    /// Write the five bytes of a host command message into the given bytes.
    ///
    /// The `ACTIVE` command (code zero) is sent as five zero bytes. All other
    /// commands have the marker byte `0xFF` followed by the command code and
    /// its argument.
    fn build_host_cmd_msg(&self, cmd: u8, arg: u8, into: &mut [u8; 5]) {
        if cmd == 0 {
            *into = [0; 5];
        } else {
            *into = [0xff, cmd, arg, 0x00, 0x00];
        }
    }
}

/// The byte the chip sends once it has fetched the data for a read request.
pub const READ_READY: u8 = 0x01;

/// The number of single-byte polls to make while waiting for
/// [`READ_READY`](READ_READY) before giving up on a read.
pub const READ_READY_POLL_LIMIT: u16 = 255;

/// Calls `read_byte` repeatedly until it returns [`READ_READY`](READ_READY),
/// returning `Ok(true)` once it does.
///
/// Returns `Ok(false)` if the chip didn't become ready within
/// [`READ_READY_POLL_LIMIT`](READ_READY_POLL_LIMIT) polls. `Interface`
/// implementations should call this from `begin_read` right after sending
/// the read header, and turn `false` into an error of their own type.
pub fn await_read_ready<E, F>(mut read_byte: F) -> Result<bool, E>
where
    F: FnMut() -> Result<u8, E>,
{
    for _ in 0..READ_READY_POLL_LIMIT {
        if read_byte()? == READ_READY {
            return Ok(true);
        }
    }
    Ok(false)
}


#[cfg(test)]
mod tests {
    use super::testing::MockInterface;
    use super::*;

    #[test]
    fn test_write_header() {
        let ei = MockInterface::new();
        let mut buf = [0_u8; 4];
        ei.build_write_header(0x7f006150, &mut buf);
        assert_eq!(buf, [0xff, 0x00, 0x61, 0x50]);
        ei.build_write_header(0x00000004, &mut buf);
        assert_eq!(buf, [0x80, 0x00, 0x00, 0x04]);
    }

    #[test]
    fn test_read_header() {
        let ei = MockInterface::new();
        let mut buf = [0_u8; 4];
        ei.build_read_header(0x7f806448, &mut buf);
        assert_eq!(buf, [0x7f, 0x80, 0x64, 0x48]);
    }

    #[test]
    fn test_host_cmd_msg() {
        let ei = MockInterface::new();
        let mut buf = [0xaa_u8; 5];
        ei.build_host_cmd_msg(0x00, 0x12, &mut buf);
        assert_eq!(buf, [0, 0, 0, 0, 0]);
        ei.build_host_cmd_msg(0xe6, 0x17, &mut buf);
        assert_eq!(buf, [0xff, 0xe6, 0x17, 0, 0]);
    }

    #[test]
    fn test_await_read_ready() {
        let mut polls = 0;
        let got: Result<bool, ()> = await_read_ready(|| {
            polls += 1;
            Ok(if polls < 3 { 0x00 } else { READ_READY })
        });
        assert_eq!(got, Ok(true));
        assert_eq!(polls, 3);

        let mut polls = 0_u16;
        let got: Result<bool, ()> = await_read_ready(|| {
            polls += 1;
            Ok(0x00)
        });
        assert_eq!(got, Ok(false));
        assert_eq!(polls, READ_READY_POLL_LIMIT);

        let got: Result<bool, &str> = await_read_ready(|| Err("bus fault"));
        assert_eq!(got, Err("bus fault"));
    }

    #[test]
    fn test_mock_fifo_advances_write_pointer() {
        use super::testing::{commands, reg_addr};
        use crate::registers::Register;

        let mut ei = MockInterface::new();
        ei.begin_write(reg_addr(Register::CMDB_WRITE)).unwrap();
        ei.continue_write(&[0x00, 0xff, 0xff, 0xff, 0x01, 0xff, 0xff, 0xff])
            .unwrap();
        ei.end_write().unwrap();
        assert_eq!(ei.mem.reg(Register::CMD_WRITE), 8);
        assert_eq!(commands(&ei.calls()), [0xffffff00, 0xffffff01]);
    }
}
