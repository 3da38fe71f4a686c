#![no_std]

use bt82x::interface::{await_read_ready, Interface};
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;
use log::trace;

/// `HALSPIInterface` is an implementation of `bt82x::Interface` that
/// communicates over SPI using the `embedded-hal` SPI, GPIO (for "chip
/// select" and "power down") and delay traits.
pub struct HALSPIInterface<SPI, CS, PD, D>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    PD: OutputPin,
    D: DelayMs<u32>,
{
    spi: SPI,
    cs: CS,
    pd: PD,
    delay: D,
}

impl<SPI, CS, PD, D> HALSPIInterface<SPI, CS, PD, D>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    PD: OutputPin,
    D: DelayMs<u32>,
{
    /// Create a new BT82x interface in terms of the given SPI bus, CS and PD
    /// signals, and a delay source.
    ///
    /// The given CS implementation must be a digital output pin which will be
    /// set to low to assert chip select, or high to unassert it, reflecting
    /// the physical characteristics of the CS pin on BT82x packages. The PD
    /// pin is the active-low PD_N signal, used only by `reset`.
    pub fn new(spi: SPI, cs: CS, pd: PD, delay: D) -> Self {
        Self {
            spi: spi,
            cs: cs,
            pd: pd,
            delay: delay,
        }
    }

    /// Consumes the interface and returns the objects it was wrapping.
    pub fn release(self) -> (SPI, CS, PD, D) {
        (self.spi, self.cs, self.pd, self.delay)
    }

    fn with_cs<F, R>(&mut self, func: F) -> Result<R, <Self as Interface>::Error>
    where
        F: FnOnce(&mut Self) -> Result<R, <Self as Interface>::Error>,
    {
        self.spi_select()?;
        let result = func(self);
        self.spi_unselect()?;
        result
    }

    fn spi_select(&mut self) -> Result<(), <Self as Interface>::Error> {
        <Self as Interface>::Error::cs_result(self.cs.set_low())
    }

    fn spi_unselect(&mut self) -> Result<(), <Self as Interface>::Error> {
        <Self as Interface>::Error::cs_result(self.cs.set_high())
    }

    fn spi_write(&mut self, words: &[u8]) -> Result<(), <Self as Interface>::Error> {
        let r = self.spi.write(words);
        <Self as Interface>::Error::spi_write_result(r)
    }

    fn spi_transfer<'w>(
        &mut self,
        words: &'w mut [u8],
    ) -> Result<&'w [u8], <Self as Interface>::Error> {
        let r = self.spi.transfer(words);
        <Self as Interface>::Error::spi_transfer_result(r)
    }

    fn spi_read_byte(&mut self) -> Result<u8, <Self as Interface>::Error> {
        let mut buf = [0_u8; 1];
        let got = self.spi_transfer(&mut buf)?;
        Ok(got[0])
    }
}

impl<SPI, CS, PD, D> Interface for HALSPIInterface<SPI, CS, PD, D>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
    PD: OutputPin,
    D: DelayMs<u32>,
{
    type Error = HALSPIError<
        <SPI as Write<u8>>::Error,
        <SPI as Transfer<u8>>::Error,
        CS::Error,
        PD::Error,
    >;

    fn reset(&mut self) -> Result<(), Self::Error> {
        trace!("pulsing PD_N");
        <Self as Interface>::Error::pd_result(self.pd.set_low())?;
        self.delay.delay_ms(20);
        <Self as Interface>::Error::pd_result(self.pd.set_high())?;
        self.delay.delay_ms(20);
        Ok(())
    }

    fn delay_ms(&mut self, ms: u32) -> Result<(), Self::Error> {
        self.delay.delay_ms(ms);
        Ok(())
    }

    fn begin_write(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.spi_select()?;
        let mut addr_words: [u8; 4] = [0; 4];
        self.build_write_header(addr, &mut addr_words);
        self.spi_write(&addr_words)
    }

    fn continue_write(&mut self, v: &[u8]) -> Result<(), Self::Error> {
        self.spi_write(v)
    }

    fn end_write(&mut self) -> Result<(), Self::Error> {
        self.spi_unselect()
    }

    fn begin_read(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.spi_select()?;
        let mut addr_words: [u8; 4] = [0; 4];
        self.build_read_header(addr, &mut addr_words);
        self.spi_write(&addr_words)?;
        if await_read_ready(|| self.spi_read_byte())? {
            Ok(())
        } else {
            self.spi_unselect()?;
            Err(HALSPIError::ReadNotReady(addr))
        }
    }

    fn continue_read(&mut self, into: &mut [u8]) -> Result<(), Self::Error> {
        self.spi_transfer(into)?;
        Ok(())
    }

    fn end_read(&mut self) -> Result<(), Self::Error> {
        self.spi_unselect()
    }

    fn host_cmd(&mut self, cmd: u8, arg: u8) -> Result<(), Self::Error> {
        self.with_cs(|ei| {
            let mut cmd_words: [u8; 5] = [0; 5];
            ei.build_host_cmd_msg(cmd, arg, &mut cmd_words);
            ei.spi_write(&cmd_words)
        })
    }
}

#[derive(Debug)]
pub enum HALSPIError<SPIWriteError, SPITransferError, CSError, PDError> {
    SPIWrite(SPIWriteError),
    SPITransfer(SPITransferError),
    CS(CSError),
    PD(PDError),

    /// The chip didn't signal that read data was ready for the read at the
    /// given address.
    ReadNotReady(u32),
}

impl<SPIWriteError, SPITransferError, CSError, PDError>
    HALSPIError<SPIWriteError, SPITransferError, CSError, PDError>
{
    fn spi_write_result<T>(r: Result<T, SPIWriteError>) -> Result<T, Self> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(Self::SPIWrite(e)),
        }
    }

    fn spi_transfer_result<T>(r: Result<T, SPITransferError>) -> Result<T, Self> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(Self::SPITransfer(e)),
        }
    }

    fn cs_result<T>(r: Result<T, CSError>) -> Result<T, Self> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(Self::CS(e)),
        }
    }

    fn pd_result<T>(r: Result<T, PDError>) -> Result<T, Self> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => Err(Self::PD(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::convert::Infallible;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec;
    use std::vec::Vec;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Select,
        Unselect,
        PowerDown,
        PowerUp,
        Delay(u32),
        Write(Vec<u8>),
        Transfer(usize),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct FakeSPI {
        log: Log,
        miso: Vec<u8>,
    }

    impl Write<u8> for FakeSPI {
        type Error = Infallible;

        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            self.log.borrow_mut().push(Event::Write(words.to_vec()));
            Ok(())
        }
    }

    impl Transfer<u8> for FakeSPI {
        type Error = Infallible;

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
            self.log.borrow_mut().push(Event::Transfer(words.len()));
            for w in words.iter_mut() {
                *w = if self.miso.is_empty() {
                    0x00
                } else {
                    self.miso.remove(0)
                };
            }
            Ok(words)
        }
    }

    struct FakePin {
        log: Log,
        low: Event,
        high: Event,
    }

    impl OutputPin for FakePin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.log.borrow_mut().push(self.low.clone());
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.log.borrow_mut().push(self.high.clone());
            Ok(())
        }
    }

    struct FakeDelay(Log);

    impl DelayMs<u32> for FakeDelay {
        fn delay_ms(&mut self, ms: u32) {
            self.0.borrow_mut().push(Event::Delay(ms));
        }
    }

    fn interface(
        miso: Vec<u8>,
    ) -> (
        HALSPIInterface<FakeSPI, FakePin, FakePin, FakeDelay>,
        Log,
    ) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let ei = HALSPIInterface::new(
            FakeSPI {
                log: log.clone(),
                miso: miso,
            },
            FakePin {
                log: log.clone(),
                low: Event::Select,
                high: Event::Unselect,
            },
            FakePin {
                log: log.clone(),
                low: Event::PowerDown,
                high: Event::PowerUp,
            },
            FakeDelay(log.clone()),
        );
        (ei, log)
    }

    #[test]
    fn test_write() {
        let (mut ei, log) = interface(vec![]);
        ei.write(0x7f006150, &[1, 2, 3, 4]).unwrap();
        let got = log.borrow().clone();
        let want = vec![
            Event::Select,
            Event::Write(vec![0xff, 0x00, 0x61, 0x50]),
            Event::Write(vec![1, 2, 3, 4]),
            Event::Unselect,
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_read_skips_until_ready() {
        let (mut ei, log) = interface(vec![0x00, 0x00, 0x01, 0xaa, 0xbb]);
        let mut buf = [0_u8; 2];
        ei.read(0x7f800448, &mut buf).unwrap();
        assert_eq!(buf, [0xaa, 0xbb]);

        let got = log.borrow().clone();
        let want = vec![
            Event::Select,
            Event::Write(vec![0x7f, 0x80, 0x04, 0x48]),
            Event::Transfer(1),
            Event::Transfer(1),
            Event::Transfer(1),
            Event::Transfer(2),
            Event::Unselect,
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_read_not_ready() {
        let (mut ei, log) = interface(vec![]);
        let mut buf = [0_u8; 4];
        match ei.read(0x7f006000, &mut buf) {
            Err(HALSPIError::ReadNotReady(addr)) => assert_eq!(addr, 0x7f006000),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(log.borrow().last(), Some(&Event::Unselect));
    }

    #[test]
    fn test_host_cmd() {
        let (mut ei, log) = interface(vec![]);
        ei.host_cmd(0xe6, 0x17).unwrap();
        ei.host_cmd(0x00, 0x00).unwrap();
        let got = log.borrow().clone();
        let want = vec![
            Event::Select,
            Event::Write(vec![0xff, 0xe6, 0x17, 0x00, 0x00]),
            Event::Unselect,
            Event::Select,
            Event::Write(vec![0x00, 0x00, 0x00, 0x00, 0x00]),
            Event::Unselect,
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_reset() {
        let (mut ei, log) = interface(vec![]);
        ei.reset().unwrap();
        let got = log.borrow().clone();
        let want = vec![
            Event::PowerDown,
            Event::Delay(20),
            Event::PowerUp,
            Event::Delay(20),
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }
}
