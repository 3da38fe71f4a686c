//! Helpers for programming and reading the external flash.
//!
//! The `CMD_FLASH...` coprocessor commands each have alignment rules and
//! most of them only work in a particular flash state. [`Flash`](Flash)
//! sequences the raw commands on [`Coprocessor`](super::Coprocessor) so
//! that callers don't need to track those details, blocking until each step
//! has completed.

use super::coprocessor::{Coprocessor, Error, Result};
use super::waiter::Waiter;
use crate::interface::Interface;
use crate::memory::Ptr;
use crate::models::{Model, WithExtFlashMem};
use crate::registers::Register;
use core::convert::TryInto;
use log::{debug, info, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// `CMD_FLASHWRITE` destinations and lengths must be multiples of this.
pub const WRITE_ALIGN: u32 = 256;

/// `CMD_FLASHUPDATE` and `CMD_FLASHPROGRAM` work in whole sectors of this
/// size.
pub const UPDATE_ALIGN: u32 = 4096;

/// `CMD_FLASHREAD` sources must be multiples of this.
pub const READ_ALIGN: u32 = 64;

/// The size of the driver blob that occupies the start of the flash. The
/// coprocessor can only switch the flash to full speed when a valid blob is
/// present.
pub const BLOB_SIZE: usize = 4096;

/// The states reported by `REG_FLASH_STATUS`.
#[derive(TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum FlashState {
    Init = 0,
    Detached = 1,
    Basic = 2,
    Full = 3,
}

/// The reasons `CMD_FLASHFAST` can give for not switching to full speed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FlashFastError {
    NotAttached,
    /// The flash is blank or has no valid blob header.
    NoHeader,
    SectorZeroIntegrity,
    /// The blob doesn't match the flash device.
    DeviceMismatch,
    FullSpeedTestFailed,
    Other(u32),
}

impl FlashFastError {
    pub fn from_code(code: u32) -> Self {
        match code {
            0xe001 => FlashFastError::NotAttached,
            0xe002 => FlashFastError::NoHeader,
            0xe003 => FlashFastError::SectorZeroIntegrity,
            0xe004 => FlashFastError::DeviceMismatch,
            0xe005 => FlashFastError::FullSpeedTestFailed,
            other => FlashFastError::Other(other),
        }
    }
}

impl core::fmt::Display for FlashFastError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlashFastError::NotAttached => write!(f, "flash is not attached"),
            FlashFastError::NoHeader => write!(f, "no valid blob header in flash"),
            FlashFastError::SectorZeroIntegrity => write!(f, "flash sector 0 failed its integrity check"),
            FlashFastError::DeviceMismatch => write!(f, "blob doesn't match the flash device"),
            FlashFastError::FullSpeedTestFailed => write!(f, "full-speed flash test failed"),
            FlashFastError::Other(code) => write!(f, "CMD_FLASHFAST returned {:#06x}", code),
        }
    }
}

/// Failures specific to the flash helpers, reported through
/// [`Error::Flash`](super::Error::Flash).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FlashError {
    /// The flash can't be switched into the given state on request.
    InvalidTransition(FlashState),
    Fast(FlashFastError),
    /// The flash didn't reach `wanted`; `actual` is the raw status the chip
    /// reported instead.
    StateNotReached { wanted: FlashState, actual: u32 },
    /// `REG_FLASH_STATUS` held a value that isn't a known state.
    UnknownState(u32),
    /// An image destined for the start of flash didn't include a whole blob.
    MissingBlob,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlashError::InvalidTransition(state) => {
                write!(f, "can't switch flash to {:?}", state)
            }
            FlashError::Fast(err) => write!(f, "{}", err),
            FlashError::StateNotReached { wanted, actual } => {
                write!(f, "flash didn't reach {:?} (status {})", wanted, actual)
            }
            FlashError::UnknownState(raw) => write!(f, "unknown flash status {}", raw),
            FlashError::MissingBlob => write!(f, "image is too short to contain a flash blob"),
        }
    }
}

/// Flash helpers borrowing a [`Coprocessor`](Coprocessor), returned by
/// [`Coprocessor::flash`](Coprocessor::flash).
///
/// Every method here waits for the coprocessor to finish its commands
/// before returning.
pub struct Flash<'a, M, I, W>
where
    M: Model + WithExtFlashMem,
    I: Interface,
    W: Waiter<M, I>,
{
    cp: &'a mut Coprocessor<M, I, W>,
}

impl<'a, M, I, W> Flash<'a, M, I, W>
where
    M: Model + WithExtFlashMem,
    I: Interface,
    W: Waiter<M, I>,
{
    pub(crate) fn new(cp: &'a mut Coprocessor<M, I, W>) -> Self {
        Self { cp: cp }
    }

    pub fn state(&mut self) -> Result<FlashState, M, I, W> {
        let raw = self.raw_state()?;
        FlashState::try_from_primitive(raw).map_err(|_| Error::Flash(FlashError::UnknownState(raw)))
    }

    /// Moves the flash into the given state, stepping through the states
    /// in between as needed.
    ///
    /// The flash can't be returned to `Init`. Reaching `Full` requires a
    /// valid blob at the start of flash.
    pub fn switch_state(&mut self, next: FlashState) -> Result<(), M, I, W> {
        if next == FlashState::Init {
            return Err(FlashError::InvalidTransition(next).into());
        }
        let current = self.state()?;
        if current == next {
            return Ok(());
        }
        debug!("switching flash from {:?} to {:?}", current, next);

        match next {
            FlashState::Detached => {
                self.cp.flash_detach()?;
                self.cp.block_until_idle()
            }
            FlashState::Basic => {
                if current == FlashState::Full {
                    self.repeat_until(FlashState::Detached, |cp| cp.flash_detach())?;
                }
                self.cp.flash_attach()?;
                self.cp.block_until_idle()
            }
            FlashState::Full => {
                if current != FlashState::Basic {
                    self.repeat_until(FlashState::Basic, |cp| cp.flash_attach())?;
                }
                match self.cp.block_flash_fast()? {
                    0 => Ok(()),
                    code => Err(FlashError::Fast(FlashFastError::from_code(code)).into()),
                }
            }
            FlashState::Init => Err(FlashError::InvalidTransition(next).into()),
        }
    }

    /// Detaches, reattaches and then switches the flash to full speed,
    /// checking that each step reached the expected state.
    pub fn switch_full_mode(&mut self) -> Result<(), M, I, W> {
        self.cp.flash_detach()?;
        self.cp.block_until_idle()?;
        self.expect_state(FlashState::Detached)?;

        self.cp.flash_attach()?;
        self.cp.block_until_idle()?;
        self.expect_state(FlashState::Basic)?;

        let code = self.cp.block_flash_fast()?;
        let actual = self.raw_state()?;
        if actual != u32::from(FlashState::Full) {
            warn!("flash didn't reach full speed, status {}", actual);
            return Err(Error::Flash(if code != 0 {
                FlashError::Fast(FlashFastError::from_code(code))
            } else {
                FlashError::StateNotReached {
                    wanted: FlashState::Full,
                    actual: actual,
                }
            }));
        }
        info!("flash is in full-speed mode");
        Ok(())
    }

    /// Writes `num` bytes from main memory to flash, erasing and rewriting
    /// only the sectors that differ.
    ///
    /// The chip updates whole sectors, so the last sector is written in full
    /// even when `num` ends partway through it.
    pub fn update(
        &mut self,
        dest: Ptr<M::ExtFlashMem>,
        src: Ptr<M::MainMem>,
        num: u32,
    ) -> Result<(), M, I, W> {
        if !dest.is_aligned(UPDATE_ALIGN) || !src.is_aligned(4) {
            return Err(Error::Unaligned);
        }

        let tail = num % UPDATE_ALIGN;
        if num < UPDATE_ALIGN {
            self.cp.flash_update(dest, src, UPDATE_ALIGN)?;
            self.cp.block_until_idle()
        } else if tail == 0 {
            self.cp.flash_update(dest, src, num)?;
            self.cp.block_until_idle()
        } else {
            let aligned = num - tail;
            self.cp.flash_update(dest, src, aligned)?;
            self.cp.block_until_idle()?;
            self.cp.flash_update(dest + aligned, src + aligned, UPDATE_ALIGN)?;
            self.cp.block_until_idle()
        }
    }

    /// Writes `num` bytes from main memory to flash that has already been
    /// erased.
    ///
    /// A partial last sector is padded with `0xff` in main memory first, so
    /// the bytes just after `src + num` are overwritten.
    pub fn program(
        &mut self,
        dest: Ptr<M::ExtFlashMem>,
        src: Ptr<M::MainMem>,
        num: u32,
    ) -> Result<(), M, I, W> {
        if !dest.is_aligned(UPDATE_ALIGN) || !src.is_aligned(4) {
            return Err(Error::Unaligned);
        }
        if num == 0 {
            return Ok(());
        }

        let padded = align_up(num, UPDATE_ALIGN);
        if padded != num {
            self.cp.set_memory(src + num, 0xff, padded - num)?;
        }
        self.cp.flash_program(dest, src, padded)?;
        self.cp.block_until_idle()
    }

    /// Reads flash into `into`, staging it through main memory at `via`.
    ///
    /// Only whole words are read, so this returns how many bytes at the
    /// start of `into` were filled.
    pub fn read(
        &mut self,
        via: Ptr<M::MainMem>,
        src: Ptr<M::ExtFlashMem>,
        into: &mut [u8],
    ) -> Result<usize, M, I, W> {
        if !src.is_aligned(READ_ALIGN) || !via.is_aligned(4) {
            return Err(Error::Unaligned);
        }
        let num = (into.len() as u32) & !3;
        if num == 0 {
            return Ok(0);
        }

        self.cp.flash_read(via, src, num)?;
        self.cp.block_until_idle()?;
        self.cp.host_read_memory(via, &mut into[..num as usize])?;
        Ok(num as usize)
    }

    /// Erases the whole flash.
    pub fn erase(&mut self) -> Result<(), M, I, W> {
        info!("erasing flash");
        self.cp.flash_erase()?;
        self.cp.block_until_idle()
    }

    /// Writes the given bytes to already-erased flash, sending them through
    /// the command FIFO.
    ///
    /// A partial last page is padded with `0xff`.
    pub fn write(&mut self, dest: Ptr<M::ExtFlashMem>, data: &[u8]) -> Result<(), M, I, W> {
        if !dest.is_aligned(WRITE_ALIGN) {
            return Err(Error::Unaligned);
        }

        let body_len = data.len() - (data.len() % WRITE_ALIGN as usize);
        let (body, tail) = data.split_at(body_len);
        if !body.is_empty() {
            self.cp.flash_write(dest, body)?;
            self.cp.block_until_idle()?;
        }
        if !tail.is_empty() {
            let mut page = [0xff_u8; WRITE_ALIGN as usize];
            page[..tail.len()].copy_from_slice(tail);
            self.cp.flash_write(dest + body_len as u32, &page)?;
            self.cp.block_until_idle()?;
        }
        Ok(())
    }

    /// Returns the size of the attached flash in mebibytes, as detected by
    /// the chip when it attached the flash.
    pub fn size_mib(&mut self) -> Result<u32, M, I, W> {
        self.cp.read_register(Register::FLASH_SIZE)
    }

    /// Replaces the driver blob at the start of flash and then switches the
    /// flash to full speed using the new blob.
    ///
    /// The blob is staged at the start of main memory.
    pub fn update_blob(&mut self, blob: &[u8; BLOB_SIZE]) -> Result<(), M, I, W> {
        info!("updating flash blob");
        self.switch_state(FlashState::Basic)?;

        let staging: Ptr<M::MainMem> = Ptr::new(0);
        self.cp.host_write_memory(staging, &blob[..])?;
        self.update(Ptr::new(0), staging, BLOB_SIZE as u32)?;
        self.switch_full_mode()
    }

    /// Writes a flash image at `addr`, staging it through the start of main
    /// memory.
    ///
    /// An image written at the start of flash must begin with its blob,
    /// which is installed first with [`update_blob`](Flash::update_blob).
    /// Otherwise the flash must already hold a valid blob so that it can
    /// switch to full speed.
    ///
    /// `progress` receives the percentage written after each chunk.
    pub fn write_image<F>(
        &mut self,
        addr: Ptr<M::ExtFlashMem>,
        data: &[u8],
        mut progress: F,
    ) -> Result<(), M, I, W>
    where
        F: FnMut(u8),
    {
        let (mut dest, rest) = if addr.to_raw_offset() == 0 {
            if data.len() < BLOB_SIZE {
                return Err(FlashError::MissingBlob.into());
            }
            let (blob, rest) = data.split_at(BLOB_SIZE);
            let blob: &[u8; BLOB_SIZE] = match blob.try_into() {
                Ok(blob) => blob,
                Err(_) => return Err(FlashError::MissingBlob.into()),
            };
            self.update_blob(blob)?;
            (addr + BLOB_SIZE as u32, rest)
        } else {
            self.switch_state(FlashState::Full)?;
            (addr, data)
        };
        if !dest.is_aligned(UPDATE_ALIGN) {
            return Err(Error::Unaligned);
        }

        let total = rest.len();
        if total == 0 {
            progress(100);
            return Ok(());
        }

        let step = core::cmp::max(align_up((total / 100) as u32, UPDATE_ALIGN), 2 * UPDATE_ALIGN);
        let staging: Ptr<M::MainMem> = Ptr::new(0);
        let mut sent = 0_usize;
        info!("writing {} bytes of flash image at {}", total, dest);
        for chunk in rest.chunks(step as usize) {
            let len = chunk.len() as u32;
            let padded = align_up(len, UPDATE_ALIGN);
            self.cp.host_write_memory(staging, chunk)?;
            if padded != len {
                self.cp.set_memory(staging + len, 0xff, padded - len)?;
            }
            self.update(dest, staging, padded)?;

            dest += padded;
            sent += chunk.len();
            progress((sent * 100 / total) as u8);
        }
        Ok(())
    }

    fn raw_state(&mut self) -> Result<u32, M, I, W> {
        self.cp.read_register(Register::FLASH_STATUS)
    }

    fn expect_state(&mut self, wanted: FlashState) -> Result<(), M, I, W> {
        let actual = self.raw_state()?;
        if actual == u32::from(wanted) {
            return Ok(());
        }
        warn!("flash didn't reach {:?}, status {}", wanted, actual);
        Err(FlashError::StateNotReached {
            wanted: wanted,
            actual: actual,
        }
        .into())
    }

    // Sends the command produced by `f` until the flash reports `wanted`,
    // giving up after the coprocessor's poll limit.
    fn repeat_until<F>(&mut self, wanted: FlashState, mut f: F) -> Result<(), M, I, W>
    where
        F: FnMut(&mut Coprocessor<M, I, W>) -> Result<(), M, I, W>,
    {
        let mut actual = 0;
        for _ in 0..self.cp.poll_limit() {
            f(self.cp)?;
            self.cp.block_until_idle()?;
            actual = self.raw_state()?;
            if actual == u32::from(wanted) {
                return Ok(());
            }
        }
        Err(FlashError::StateNotReached {
            wanted: wanted,
            actual: actual,
        }
        .into())
    }
}

const fn align_up(v: u32, align: u32) -> u32 {
    (v + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::commands::coprocessor::RESULT_PLACEHOLDER;
    use crate::commands::PollingWaiter;
    use crate::interface::testing::{commands, writes, MockInterface, MockInterfaceCall};
    use crate::models::bt820::BT820;
    use std::vec;
    use std::vec::Vec;

    type MockWaiter = PollingWaiter<BT820, MockInterface>;
    type MockCoprocessor = Coprocessor<BT820, MockInterface, MockWaiter>;

    // Scripts the flash status transitions the chip makes in response to
    // the flash commands. `fast_result` is what CMD_FLASHFAST reports.
    fn flash_chip(ei: &mut MockInterface, initial: FlashState, fast_result: u32) {
        ei.mem.set_reg(Register::FLASH_STATUS, initial.into());
        let mut last = 0;
        ei.on_command(move |word, slot, mem| {
            match word {
                0xffffff42 => mem.set_reg(Register::FLASH_STATUS, FlashState::Detached.into()),
                0xffffff43 => mem.set_reg(Register::FLASH_STATUS, FlashState::Basic.into()),
                w if w == RESULT_PLACEHOLDER && last == 0xffffff44 => {
                    mem.write_u32(slot, fast_result);
                    if fast_result == 0 {
                        mem.set_reg(Register::FLASH_STATUS, FlashState::Full.into());
                    }
                }
                _ => {}
            }
            last = word;
        });
    }

    fn test_obj(initial: FlashState, fast_result: u32) -> MockCoprocessor {
        let mut ei = MockInterface::new();
        flash_chip(&mut ei, initial, fast_result);
        unwrap_copro(Coprocessor::new_polling(ei))
    }

    fn unwrap_copro<R>(v: Result<R, BT820, MockInterface, MockWaiter>) -> R {
        match v {
            Ok(v) => v,
            Err(err) => std::panic!("coprocessor error: {:?}", err),
        }
    }

    fn flash_ptr(offset: u32) -> Ptr<<BT820 as WithExtFlashMem>::ExtFlashMem> {
        Ptr::new(offset)
    }

    fn main_ptr(offset: u32) -> Ptr<<BT820 as Model>::MainMem> {
        Ptr::new(offset)
    }

    #[test]
    fn test_switch_to_full_from_init() {
        let mut cp = test_obj(FlashState::Init, 0);

        unwrap_copro(cp.flash().switch_state(FlashState::Full));
        assert_eq!(unwrap_copro(cp.flash().state()), FlashState::Full);

        let ei = unwrap_copro(cp.take_interface());
        let got = commands(&ei.calls());
        let want = vec![
            0xffffff43, // CMD_FLASHATTACH
            0xffffff44, // CMD_FLASHFAST
            RESULT_PLACEHOLDER,
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_switch_to_basic_from_full() {
        let mut cp = test_obj(FlashState::Full, 0);

        unwrap_copro(cp.flash().switch_state(FlashState::Basic));
        // Already there, so nothing more is sent.
        unwrap_copro(cp.flash().switch_state(FlashState::Basic));

        let ei = unwrap_copro(cp.take_interface());
        let got = commands(&ei.calls());
        let want = vec![
            0xffffff42, // CMD_FLASHDETACH
            0xffffff43, // CMD_FLASHATTACH
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_switch_state_errors() {
        let mut cp = test_obj(FlashState::Detached, 0xe002);

        match cp.flash().switch_state(FlashState::Init) {
            Err(Error::Flash(FlashError::InvalidTransition(FlashState::Init))) => {}
            other => std::panic!("expected InvalidTransition, got {:?}", other),
        }
        match cp.flash().switch_state(FlashState::Full) {
            Err(Error::Flash(FlashError::Fast(FlashFastError::NoHeader))) => {}
            other => std::panic!("expected NoHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_state() {
        let mut cp = test_obj(FlashState::Init, 0);
        unwrap_copro(cp.with_interface(|ei| {
            ei.mem.set_reg(Register::FLASH_STATUS, 7);
            Ok(())
        }));

        match cp.flash().state() {
            Err(Error::Flash(FlashError::UnknownState(7))) => {}
            other => std::panic!("expected UnknownState, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_full_mode_reports_observed_state() {
        let mut cp = test_obj(FlashState::Basic, 0);
        unwrap_copro(cp.flash().switch_full_mode());

        let mut cp = test_obj(FlashState::Basic, 0xe004);
        match cp.flash().switch_full_mode() {
            Err(Error::Flash(FlashError::Fast(FlashFastError::DeviceMismatch))) => {}
            other => std::panic!("expected DeviceMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_update_lengths() {
        let mut cp = test_obj(FlashState::Full, 0);

        unwrap_copro(cp.flash().update(flash_ptr(0x1000), main_ptr(0), 100));
        unwrap_copro(cp.flash().update(flash_ptr(0x2000), main_ptr(0), 0x2000));
        unwrap_copro(cp.flash().update(flash_ptr(0x4000), main_ptr(0x100), 0x2064));

        match cp.flash().update(flash_ptr(0x1100), main_ptr(0), 4096) {
            Err(Error::Unaligned) => {}
            other => std::panic!("expected Unaligned, got {:?}", other),
        }

        let ei = unwrap_copro(cp.take_interface());
        let got = commands(&ei.calls());
        let want = vec![
            0xffffff41, // CMD_FLASHUPDATE
            0x1000,
            0,
            0x1000, // rounded up to a whole sector
            0xffffff41, // CMD_FLASHUPDATE
            0x2000,
            0,
            0x2000,
            0xffffff41, // CMD_FLASHUPDATE, aligned part
            0x4000,
            0x100,
            0x2000,
            0xffffff41, // CMD_FLASHUPDATE, trailing sector
            0x6000,
            0x2100,
            0x1000,
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_program_pads_last_sector() {
        let mut cp = test_obj(FlashState::Full, 0);

        unwrap_copro(cp.flash().program(flash_ptr(0x10000), main_ptr(0x800), 5000));

        let ei = unwrap_copro(cp.take_interface());
        let got = commands(&ei.calls());
        let want = vec![
            0xffffff19, // CMD_MEMSET
            0x800 + 5000,
            0xff,
            3192,
            0xffffff64, // CMD_FLASHPROGRAM
            0x10000,
            0x800,
            8192,
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_read() {
        let mut cp = test_obj(FlashState::Full, 0);
        unwrap_copro(cp.with_interface(|ei| {
            ei.mem.write(0x100, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
            Ok(())
        }));

        let mut buf = [0_u8; 10];
        let n = unwrap_copro(cp.flash().read(main_ptr(0x100), flash_ptr(0x40), &mut buf));
        assert_eq!(n, 8);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8, 0, 0]);

        match cp.flash().read(main_ptr(0x100), flash_ptr(0x20), &mut buf) {
            Err(Error::Unaligned) => {}
            other => std::panic!("expected Unaligned, got {:?}", other),
        }

        let ei = unwrap_copro(cp.take_interface());
        let calls = ei.calls();
        let got = commands(&calls);
        let want = vec![
            0xffffff40, // CMD_FLASHREAD
            0x100,
            0x40,
            8,
        ];
        debug_assert_eq!(&got[..], &want[..]);
        assert!(calls.contains(&MockInterfaceCall::Read(0x100, 8)));
    }

    #[test]
    fn test_write_pads_last_page() {
        let mut cp = test_obj(FlashState::Full, 0);

        unwrap_copro(cp.flash().write(flash_ptr(0x100), &[0xab; 260]));

        let ei = unwrap_copro(cp.take_interface());
        let got = commands(&ei.calls());
        let mut want: Vec<u32> = vec![0xffffff3f, 0x100, 256]; // CMD_FLASHWRITE
        want.extend(core::iter::repeat(0xabababab).take(64));
        want.extend(&[0xffffff3f, 0x200, 256]); // CMD_FLASHWRITE
        want.push(0xabababab);
        want.extend(core::iter::repeat(0xffffffff).take(63));
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_write_image_with_blob() {
        let mut cp = test_obj(FlashState::Init, 0);

        let mut image = vec![0x5a_u8; BLOB_SIZE + 5000];
        image[0] = 0x70;
        let mut reported = Vec::new();
        unwrap_copro(cp.flash().write_image(flash_ptr(0), &image, |pct| reported.push(pct)));
        assert_eq!(reported, [100]);

        let ei = unwrap_copro(cp.take_interface());
        let calls = ei.calls();
        let got = commands(&calls);
        let want = vec![
            0xffffff43, // CMD_FLASHATTACH, to reach Basic
            0xffffff41, // CMD_FLASHUPDATE, the blob
            0,
            0,
            4096,
            0xffffff42, // CMD_FLASHDETACH
            0xffffff43, // CMD_FLASHATTACH
            0xffffff44, // CMD_FLASHFAST
            RESULT_PLACEHOLDER,
            0xffffff19, // CMD_MEMSET, padding the staged chunk
            5000,
            0xff,
            3192,
            0xffffff41, // CMD_FLASHUPDATE, the rest of the image
            0x1000,
            0,
            8192,
        ];
        debug_assert_eq!(&got[..], &want[..]);

        // Both the blob and the image body were staged at the start of RAM_G.
        let staged: Vec<(u32, usize)> = writes(&calls)
            .into_iter()
            .map(|(addr, data)| (addr, data.len()))
            .collect();
        assert_eq!(staged, [(0, BLOB_SIZE), (0, 5000)]);
    }

    #[test]
    fn test_write_image_progress() {
        let mut cp = test_obj(FlashState::Full, 0);

        let image = vec![0_u8; 3 * 8192 + 1];
        let mut reported = Vec::new();
        unwrap_copro(cp.flash().write_image(flash_ptr(0x10000), &image, |pct| reported.push(pct)));
        assert_eq!(reported, [33, 66, 99, 100]);

        let mut reported = Vec::new();
        unwrap_copro(cp.flash().write_image(flash_ptr(0x10000), &[], |pct| reported.push(pct)));
        assert_eq!(reported, [100]);
    }

    #[test]
    fn test_write_image_missing_blob() {
        let mut cp = test_obj(FlashState::Full, 0);

        match cp.flash().write_image(flash_ptr(0), &[0; 100], |_| {}) {
            Err(Error::Flash(FlashError::MissingBlob)) => {}
            other => std::panic!("expected MissingBlob, got {:?}", other),
        }
    }

    #[test]
    fn test_fast_error_codes() {
        assert_eq!(FlashFastError::from_code(0xe001), FlashFastError::NotAttached);
        assert_eq!(FlashFastError::from_code(0xe005), FlashFastError::FullSpeedTestFailed);
        assert_eq!(FlashFastError::from_code(0x1234), FlashFastError::Other(0x1234));
    }
}
