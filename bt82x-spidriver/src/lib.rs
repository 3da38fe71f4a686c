#![no_std]

use bt82x::interface::{await_read_ready, Interface};
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};
use log::debug;
use spidriver::SPIDriver;

/// `SPIDriverInterface` is an implementation of `bt82x::Interface` for a
/// BT82x connected to an Excamera Labs SPIDriver.
///
/// The SPIDriver has no connection to PD_N, so `reset` does nothing and the
/// chip must be power-cycled some other way if needed.
pub struct SPIDriverInterface<TX, RX, D>
where
    TX: Write<u8>,
    RX: Read<u8>,
    D: DelayMs<u32>,
{
    sd: SPIDriver<TX, RX>,
    delay: D,
}

impl<TX, RX, D> SPIDriverInterface<TX, RX, D>
where
    TX: Write<u8>,
    RX: Read<u8>,
    D: DelayMs<u32>,
{
    pub fn new(sd: SPIDriver<TX, RX>, delay: D) -> Self {
        Self {
            sd: sd,
            delay: delay,
        }
    }

    fn with_cs<F, R>(&mut self, func: F) -> Result<R, <Self as Interface>::Error>
    where
        F: FnOnce(&mut Self) -> Result<R, <Self as Interface>::Error>,
    {
        self.sd.select()?;
        let result = func(self);
        self.sd.unselect()?;
        result
    }

    fn read_byte(&mut self) -> Result<u8, <Self as Interface>::Error> {
        let mut buf = [0_u8; 1];
        self.sd.transfer(&mut buf)?;
        Ok(buf[0])
    }
}

impl<TX, RX, D> Interface for SPIDriverInterface<TX, RX, D>
where
    TX: Write<u8>,
    RX: Read<u8>,
    D: DelayMs<u32>,
{
    type Error = SPIDriverError<TX::Error, RX::Error>;

    fn delay_ms(&mut self, ms: u32) -> Result<(), Self::Error> {
        self.delay.delay_ms(ms);
        Ok(())
    }

    fn begin_write(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.sd.select()?;
        let mut addr_words: [u8; 4] = [0; 4];
        self.build_write_header(addr, &mut addr_words);
        self.sd.write(&addr_words)?;
        Ok(())
    }

    fn continue_write(&mut self, v: &[u8]) -> Result<(), Self::Error> {
        self.sd.write(v)?;
        Ok(())
    }

    fn end_write(&mut self) -> Result<(), Self::Error> {
        self.sd.unselect()?;
        Ok(())
    }

    fn begin_read(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.sd.select()?;
        let mut addr_words: [u8; 4] = [0; 4];
        self.build_read_header(addr, &mut addr_words);
        self.sd.write(&addr_words)?;
        if await_read_ready(|| self.read_byte())? {
            Ok(())
        } else {
            debug!("no read-ready byte for {:#010x}", addr);
            self.sd.unselect()?;
            Err(SPIDriverError::ReadNotReady(addr))
        }
    }

    fn continue_read(&mut self, into: &mut [u8]) -> Result<(), Self::Error> {
        self.sd.transfer(into)?;
        Ok(())
    }

    fn end_read(&mut self) -> Result<(), Self::Error> {
        self.sd.unselect()?;
        Ok(())
    }

    fn host_cmd(&mut self, cmd: u8, arg: u8) -> Result<(), Self::Error> {
        self.with_cs(|ei| {
            let mut cmd_words: [u8; 5] = [0; 5];
            ei.build_host_cmd_msg(cmd, arg, &mut cmd_words);
            ei.sd.write(&cmd_words)?;
            Ok(())
        })
    }
}

#[derive(Debug)]
pub enum SPIDriverError<TXError, RXError> {
    Driver(spidriver::Error<TXError, RXError>),

    /// The chip didn't signal that read data was ready for the read at the
    /// given address.
    ReadNotReady(u32),
}

impl<TXError, RXError> From<spidriver::Error<TXError, RXError>>
    for SPIDriverError<TXError, RXError>
{
    fn from(err: spidriver::Error<TXError, RXError>) -> Self {
        Self::Driver(err)
    }
}
