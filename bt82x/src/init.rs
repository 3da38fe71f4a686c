//! Boot, display configuration and shutdown sequences.
//!
//! These all work directly through [`LowLevel`](crate::low_level::LowLevel)
//! rather than the coprocessor, because they run either before the
//! coprocessor is ready or while it is held in reset.

use crate::commands::{Coprocessor, Waiter};
use crate::config::{BootParameters, DisplayParameters, MAX_DIMENSION};
use crate::error::{BootStage, Error};
use crate::host_commands::{BootCfg, BootCfgEn, DdrType, HostCmd, SysClkDiv};
use crate::interface::Interface;
use crate::low_level::LowLevel;
use crate::memory::MemoryRegion;
use crate::models::{Model, WithExtFlashMem};
use crate::registers::{cpureset, dlswap, Register};
use log::{debug, info, warn};

/// The value of `REG_BOOT_STATUS` once the chip is running normally.
const BOOT_STATUS_RUNNING: u32 = 0x522e2e2e;

/// The value of `REG_ID` once the register file is ready.
const REG_ID_READY: u8 = 0x7c;

/// Clears the screen to black: `CLEAR_COLOR_RGB(0, 0, 0)`, `CLEAR(1, 1, 1)`
/// and `DISPLAY()`.
const BOOT_DISPLAY_LIST: [u8; 12] = [
    0x00, 0x00, 0x00, 0x02, //
    0x07, 0x00, 0x00, 0x26, //
    0x00, 0x00, 0x00, 0x00, //
];

/// The contents of `REG_CHIP_ID`, identifying the chip that answered.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChipId(u32);

impl ChipId {
    /// The model number a BT820 reports.
    pub const BT820: u16 = 0x0820;

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u32 {
        self.0
    }

    pub const fn model(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn is_bt820(self) -> bool {
        self.model() == Self::BT820
    }
}

impl core::fmt::Display for ChipId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BT{:03x} ({:#010x})", self.model(), self.0)
    }
}

pub(crate) fn boot<M: Model, I: Interface>(
    ll: &mut LowLevel<M, I>,
    params: &BootParameters,
) -> Result<ChipId, Error<I>> {
    use HostCmd::*;
    let limit = params.poll_limit;

    Error::interface_result(ll.reset())?;

    let cfg_en = BootCfgEn::new().boot(true).ddr_type(true).gpreg(false);
    let cfg = BootCfg::new()
        .ddr(true)
        .touch(params.touch)
        .audio(params.audio)
        .watchdog(params.watchdog)
        .source(0);
    let ddr = DdrType::new(0, 1, params.ddr_size.to_raw());
    let clk = SysClkDiv::new(1, params.clock.sysclkdiv_freq());

    Error::interface_result(ll.host_command(BOOTCFGEN, cfg_en.enable(true).to_raw()))?;
    Error::interface_result(ll.host_command(SETBOOTCFG, cfg.to_raw()))?;
    Error::interface_result(ll.host_command(SETDDRTYPE, ddr.to_raw()))?;
    Error::interface_result(ll.host_command(BOOTCFGEN, cfg_en.enable(false).to_raw()))?;
    Error::interface_result(ll.host_command(SYSCLKDIV, clk.to_raw()))?;
    Error::interface_result(ll.host_command(ACTIVE, 0))?;
    Error::interface_result(ll.delay_ms(40))?;

    poll_until(ll, limit, 10, BootStage::BootStatus, |ll| {
        Ok(ll.rd_reg(Register::BOOT_STATUS)? == BOOT_STATUS_RUNNING)
    })?;
    debug!("boot status reports normal running");

    let mut chip_id = ChipId(0);
    poll_until(ll, limit, 20, BootStage::ChipId, |ll| {
        chip_id = ChipId(ll.rd_reg(Register::CHIP_ID)?);
        Ok(chip_id.is_bt820())
    })?;
    info!("chip id {}", chip_id);

    poll_until(ll, limit, 20, BootStage::RegId, |ll| {
        Ok(ll.rd_reg(Register::ID)? as u8 == REG_ID_READY)
    })?;

    poll_until(ll, limit, 20, BootStage::CpuReset, |ll| {
        let status = ll.rd_reg(Register::CPURESET)? & 0xff;
        if status & cpureset::COPROCESSOR != 0 {
            debug!("coprocessor engine is not ready");
        }
        if status & cpureset::TOUCH != 0 {
            debug!("touch engine is not ready");
        }
        if status & cpureset::AUDIO != 0 {
            debug!("audio engine is not ready");
        }
        Ok(status == 0)
    })?;
    debug!("all engines are ready");

    Error::interface_result(ll.wr_reg(Register::FREQUENCY, params.clock.reg_frequency_value()))?;
    info!(
        "system clock set to {}MHz",
        params.clock.reg_frequency_value() / 1_000_000
    );

    Error::interface_result(ll.wr_reg(Register::GPIO_DIR, 0xffffffff))?;
    Error::interface_result(ll.wr_reg(Register::GPIO, 0xffffffff))?;

    Ok(chip_id)
}

// Polls `check` until it returns true, sleeping `delay` milliseconds after
// each miss, and gives up after `limit` attempts.
fn poll_until<M, I, F>(
    ll: &mut LowLevel<M, I>,
    limit: u32,
    delay: u32,
    stage: BootStage,
    mut check: F,
) -> Result<(), Error<I>>
where
    M: Model,
    I: Interface,
    F: FnMut(&mut LowLevel<M, I>) -> Result<bool, I::Error>,
{
    for _ in 0..limit {
        if Error::interface_result(check(ll))? {
            return Ok(());
        }
        Error::interface_result(ll.delay_ms(delay))?;
    }
    warn!("timed out waiting for {}", stage);
    Err(Error::Timeout(stage))
}

pub(crate) fn configure_display<M: Model, I: Interface>(
    ll: &mut LowLevel<M, I>,
    params: &DisplayParameters,
) -> Result<(), Error<I>> {
    use crate::registers::Register::*;

    let width = params.horiz.visible as u32;
    let height = params.vert.visible as u32;
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::Unsupported);
    }

    let regs = [
        (HCYCLE, params.horiz.total as u32),
        (HOFFSET, params.horiz.offset as u32),
        (HSYNC0, params.horiz.sync_start as u32),
        (HSYNC1, params.horiz.sync_end as u32),
        (VCYCLE, params.vert.total as u32),
        (VOFFSET, params.vert.offset as u32),
        (VSYNC0, params.vert.sync_start as u32),
        (VSYNC1, params.vert.sync_end as u32),
        (PCLK_POL, params.pclk_pol.reg_pclk_pol_value()),
        (HSIZE, width),
        (VSIZE, height),
        // Enables the display once everything else is set.
        (DISP, 1),
        (PWM_DUTY, 128),
    ];
    for (reg, v) in regs.iter() {
        Error::interface_result(ll.wr_reg(*reg, *v))?;
    }
    debug!("display configured for {}x{}", width, height);

    clear_screen(ll)
}

pub(crate) fn clear_screen<M: Model, I: Interface>(ll: &mut LowLevel<M, I>) -> Result<(), Error<I>> {
    Error::interface_result(ll.wr8s(M::DisplayListMem::ptr(0), &BOOT_DISPLAY_LIST))?;
    Error::interface_result(ll.wr_reg(Register::DLSWAP, dlswap::FRAME))
}

/// Holds the coprocessor in reset while clearing its FIFO pointers, then
/// releases it. Returns `Ok(false)` if the pointers didn't read back as
/// zero afterwards.
pub(crate) fn reset_coprocessor<M: Model, I: Interface>(
    ll: &mut LowLevel<M, I>,
) -> Result<bool, I::Error> {
    debug!("resetting coprocessor");
    ll.wr_reg(Register::CPURESET, cpureset::COPROCESSOR)?;
    ll.delay_ms(100)?;

    ll.wr_reg(Register::CMD_READ, 0)?;
    ll.wr_reg(Register::CMD_WRITE, 0)?;
    ll.wr_reg(Register::CMD_DL, 0)?;
    // Audio from a video that was playing during the reset would otherwise
    // keep going.
    ll.wr_reg(Register::PLAYBACK_PLAY, 0)?;

    ll.wr_reg(Register::CPURESET, 0)?;
    ll.delay_ms(100)?;

    let wp = ll.rd_reg(Register::CMD_WRITE)?;
    let rp = ll.rd_reg(Register::CMD_READ)?;
    if wp != 0 || rp != 0 {
        warn!("command FIFO didn't reset (rp={:#x}, wp={:#x})", rp, wp);
        return Ok(false);
    }
    Ok(true)
}

pub(crate) fn start_coprocessor<M, I, W>(
    mut ll: LowLevel<M, I>,
    wait: W,
) -> crate::commands::Result<Coprocessor<M, I, W>, M, I, W>
where
    M: Model + WithExtFlashMem,
    I: Interface,
    W: Waiter<M, I>,
{
    let wp = Coprocessor::<M, I, W>::interface_result(ll.rd_reg(Register::CMD_WRITE))?;
    let rp = Coprocessor::<M, I, W>::interface_result(ll.rd_reg(Register::CMD_READ))?;

    let mut cp = Coprocessor::from_low_level(ll, wait)?;
    if wp != 0 || rp != 0 {
        // A faulted read pointer is never zero, so this covers faults too.
        debug!("command FIFO not empty (rp={:#x}, wp={:#x})", rp, wp);
        cp.reset()?;
    } else {
        debug!("configuring coprocessor defaults");
        // Reattaching brings the flash back to a known state.
        cp.flash_detach()?;
        cp.flash_attach()?;
        cp.block_until_idle()?;
    }
    info!("coprocessor ready");
    Ok(cp)
}

pub(crate) fn shutdown<M: Model, I: Interface>(ll: &mut LowLevel<M, I>) -> Result<(), Error<I>> {
    Error::interface_result(ll.wr_reg(Register::GPIO_DIR, 0xffff))?;
    Error::interface_result(ll.wr_reg(Register::GPIO, 0))?;
    Error::interface_result(ll.host_command(HostCmd::POWERDOWN, 0))?;
    info!("powered down");
    Ok(())
}

/// Counts system clock ticks across one second, as measured by the host.
pub(crate) fn current_frequency<M: Model, I: Interface>(
    ll: &mut LowLevel<M, I>,
) -> Result<u32, Error<I>> {
    let start = Error::interface_result(ll.rd_reg(Register::CLOCK))?;
    Error::interface_result(ll.delay_ms(1000))?;
    let end = Error::interface_result(ll.rd_reg(Register::CLOCK))?;
    Ok(end.wrapping_sub(start))
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::commands::PollingWaiter;
    use crate::config::{ClockFrequency, DisplayPreset};
    use crate::interface::testing::{
        commands, host_cmds, reg_addr, writes, MockInterface, MockInterfaceCall,
    };
    use crate::models::bt820::BT820;
    use std::vec;
    use std::vec::Vec;

    fn booted_chip() -> MockInterface {
        let mut ei = MockInterface::new();
        ei.mem.set_reg(Register::BOOT_STATUS, BOOT_STATUS_RUNNING);
        ei.mem.set_reg(Register::CHIP_ID, 0x08200100);
        ei.mem.set_reg(Register::ID, 0x7c);
        ei.mem.set_reg(Register::CPURESET, 0);
        ei
    }

    fn new_ll(ei: MockInterface) -> LowLevel<BT820, MockInterface> {
        LowLevel::new(ei)
    }

    #[test]
    fn test_boot() {
        let mut ll = new_ll(booted_chip());

        let chip = boot(&mut ll, &BootParameters::default()).unwrap();
        assert_eq!(chip, ChipId::from_raw(0x08200100));
        assert!(chip.is_bt820());

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Reset,
            MockInterfaceCall::HostCmd(0xe9, 0xc1), // BOOTCFGEN, enable
            MockInterfaceCall::HostCmd(0xe8, 0xf0), // SETBOOTCFG
            MockInterfaceCall::HostCmd(0xeb, 0x08), // SETDDRTYPE
            MockInterfaceCall::HostCmd(0xe9, 0xc0), // BOOTCFGEN, disable
            MockInterfaceCall::HostCmd(0xe6, 0x17), // SYSCLKDIV, 72MHz
            MockInterfaceCall::HostCmd(0x00, 0x00), // ACTIVE
            MockInterfaceCall::Delay(40),
            MockInterfaceCall::Read(0x7f80044c, 4), // REG_BOOT_STATUS
            MockInterfaceCall::Read(0x7f800448, 4), // REG_CHIP_ID
            MockInterfaceCall::Read(0x7f006000, 4), // REG_ID
            MockInterfaceCall::Read(0x7f006088, 4), // REG_CPURESET
            MockInterfaceCall::Write(0x7f00600c, vec![0x00, 0xa2, 0x4a, 0x04]), // REG_FREQUENCY
            MockInterfaceCall::Write(0x7f0060dc, vec![0xff, 0xff, 0xff, 0xff]), // REG_GPIO_DIR
            MockInterfaceCall::Write(0x7f0060e0, vec![0xff, 0xff, 0xff, 0xff]), // REG_GPIO
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_boot_parameters() {
        let mut ll = new_ll(booted_chip());

        let mut params = BootParameters::new();
        params
            .clock(ClockFrequency::F60MHz)
            .ddr_size(crate::config::DdrSize::Mb512)
            .touch(false)
            .audio(false);
        boot(&mut ll, &params).unwrap();

        let calls = ll.take_interface().calls();
        let got = host_cmds(&calls);
        let want = vec![
            (0xe9, 0xc1),
            (0xe8, 0x90), // DDR and watchdog only
            (0xeb, 0x0a), // 512MB
            (0xe9, 0xc0),
            (0xe6, 0x19), // divide by 10
            (0x00, 0x00),
        ];
        debug_assert_eq!(&got[..], &want[..]);
        assert!(writes(&calls).contains(&(reg_addr(Register::FREQUENCY), 60_000_000_u32.to_le_bytes().to_vec())));
    }

    #[test]
    fn test_boot_waits_for_each_stage() {
        let mut ei = booted_chip();
        ei.mem.set_reg(Register::BOOT_STATUS, 0);
        ei.mem.set_reg(Register::CPURESET, cpureset::TOUCH | cpureset::AUDIO);
        let mut boot_polls = 0;
        let mut reset_polls = 0;
        ei.on_read(move |addr, mem| {
            if addr == reg_addr(Register::BOOT_STATUS) {
                boot_polls += 1;
                if boot_polls == 3 {
                    mem.set_reg(Register::BOOT_STATUS, BOOT_STATUS_RUNNING);
                }
            } else if addr == reg_addr(Register::CPURESET) {
                reset_polls += 1;
                if reset_polls == 2 {
                    mem.set_reg(Register::CPURESET, 0);
                }
            }
        });
        let mut ll = new_ll(ei);

        boot(&mut ll, &BootParameters::default()).unwrap();

        let got: Vec<MockInterfaceCall> = ll
            .take_interface()
            .calls()
            .into_iter()
            .filter(|c| match c {
                MockInterfaceCall::Read(_, _) | MockInterfaceCall::Delay(_) => true,
                _ => false,
            })
            .collect();
        let want = vec![
            MockInterfaceCall::Delay(40),
            MockInterfaceCall::Read(0x7f80044c, 4),
            MockInterfaceCall::Delay(10),
            MockInterfaceCall::Read(0x7f80044c, 4),
            MockInterfaceCall::Delay(10),
            MockInterfaceCall::Read(0x7f80044c, 4),
            MockInterfaceCall::Read(0x7f800448, 4),
            MockInterfaceCall::Read(0x7f006000, 4),
            MockInterfaceCall::Read(0x7f006088, 4),
            MockInterfaceCall::Delay(20),
            MockInterfaceCall::Read(0x7f006088, 4),
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_boot_timeout() {
        let mut ei = booted_chip();
        ei.mem.set_reg(Register::CHIP_ID, 0x08150100);
        let mut ll = new_ll(ei);

        let mut params = BootParameters::new();
        params.poll_limit(3);
        match boot(&mut ll, &params) {
            Err(Error::Timeout(BootStage::ChipId)) => {}
            other => std::panic!("expected chip id timeout, got {:?}", other),
        }

        let calls = ll.take_interface().calls();
        let chip_id_reads = calls
            .iter()
            .filter(|c| **c == MockInterfaceCall::Read(0x7f800448, 4))
            .count();
        assert_eq!(chip_id_reads, 3);
    }

    #[test]
    fn test_configure_display() {
        let mut ll = new_ll(MockInterface::new());

        let params = DisplayParameters::preset(DisplayPreset::Wuxga1920x1200At60, 72_000_000);
        configure_display(&mut ll, &params).unwrap();

        let got: Vec<(u32, u32)> = writes(&ll.take_interface().calls())
            .into_iter()
            .filter(|(_, data)| data.len() == 4)
            .map(|(addr, data)| (addr, u32::from_le_bytes([data[0], data[1], data[2], data[3]])))
            .collect();
        let want = vec![
            (0x7f00608c, 2080), // REG_HCYCLE
            (0x7f006090, 50),   // REG_HOFFSET
            (0x7f006098, 0),    // REG_HSYNC0
            (0x7f00609c, 30),   // REG_HSYNC1
            (0x7f0060a0, 1244), // REG_VCYCLE
            (0x7f0060a4, 10),   // REG_VOFFSET
            (0x7f0060ac, 0),    // REG_VSYNC0
            (0x7f0060b0, 3),    // REG_VSYNC1
            (0x7f0060b8, 0),    // REG_PCLK_POL
            (0x7f006094, 1920), // REG_HSIZE
            (0x7f0060a8, 1200), // REG_VSIZE
            (0x7f0060e4, 1),    // REG_DISP
            (0x7f00612c, 128),  // REG_PWM_DUTY
            (0x7f0060b4, 2),    // REG_DLSWAP
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_configure_display_rejects_oversize() {
        let mut ll = new_ll(MockInterface::new());

        let mut params = DisplayParameters::WUXGA_1920X1200_60HZ;
        params.horiz.visible = 4096;
        match configure_display(&mut ll, &params) {
            Err(Error::Unsupported) => {}
            other => std::panic!("expected Unsupported, got {:?}", other),
        }
        assert!(ll.take_interface().calls().is_empty());
    }

    #[test]
    fn test_clear_screen() {
        let mut ll = new_ll(MockInterface::new());

        clear_screen(&mut ll).unwrap();

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Write(0x7f008000, BOOT_DISPLAY_LIST.to_vec()), // RAM_DL
            MockInterfaceCall::Write(0x7f0060b4, vec![0x02, 0x00, 0x00, 0x00]), // REG_DLSWAP
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_reset_coprocessor() {
        let mut ll = new_ll(MockInterface::new());

        assert_eq!(reset_coprocessor(&mut ll).unwrap(), true);

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Write(0x7f006088, vec![1, 0, 0, 0]), // REG_CPURESET
            MockInterfaceCall::Delay(100),
            MockInterfaceCall::Write(0x7f00614c, vec![0, 0, 0, 0]), // REG_CMD_READ
            MockInterfaceCall::Write(0x7f006150, vec![0, 0, 0, 0]), // REG_CMD_WRITE
            MockInterfaceCall::Write(0x7f006154, vec![0, 0, 0, 0]), // REG_CMD_DL
            MockInterfaceCall::Write(0x7f006124, vec![0, 0, 0, 0]), // REG_PLAYBACK_PLAY
            MockInterfaceCall::Write(0x7f006088, vec![0, 0, 0, 0]), // REG_CPURESET
            MockInterfaceCall::Delay(100),
            MockInterfaceCall::Read(0x7f006150, 4),
            MockInterfaceCall::Read(0x7f00614c, 4),
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_start_coprocessor_clean() {
        let ll = new_ll(MockInterface::new());

        let cp = start_coprocessor(ll, PollingWaiter::new()).unwrap();

        let got = commands(&cp.take_interface().unwrap().calls());
        let want = vec![
            0xffffff42, // CMD_FLASHDETACH
            0xffffff43, // CMD_FLASHATTACH
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_start_coprocessor_after_fault() {
        let mut ei = MockInterface::new();
        ei.mem.set_reg(Register::CMD_READ, 0x0103);
        ei.mem.set_reg(Register::CMD_WRITE, 0x0200);
        ei.set_space(0x3);
        ei.on_write(|addr, _, mem| {
            if addr == reg_addr(Register::CPURESET) {
                mem.set_reg(Register::CMDB_SPACE, 0x3ffc);
            }
        });
        let ll = new_ll(ei);

        let cp = start_coprocessor(ll, PollingWaiter::new()).unwrap();

        let got = commands(&cp.take_interface().unwrap().calls());
        let want = vec![
            0xffffff00, // CMD_DLSTART
            0xffffff2e, // CMD_COLDSTART
            0xffffff43, // CMD_FLASHATTACH
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_shutdown() {
        let mut ll = new_ll(MockInterface::new());

        shutdown(&mut ll).unwrap();

        let got = ll.take_interface().calls();
        let want = vec![
            MockInterfaceCall::Write(0x7f0060dc, vec![0xff, 0xff, 0x00, 0x00]), // REG_GPIO_DIR
            MockInterfaceCall::Write(0x7f0060e0, vec![0x00, 0x00, 0x00, 0x00]), // REG_GPIO
            MockInterfaceCall::HostCmd(0xe2, 0x00),                             // POWERDOWN
        ];
        debug_assert_eq!(&got[..], &want[..]);
    }

    #[test]
    fn test_current_frequency() {
        let mut ei = MockInterface::new();
        ei.mem.set_reg(Register::CLOCK, 0xfffffff0);
        let mut reads = 0;
        ei.on_read(move |addr, mem| {
            if addr == reg_addr(Register::CLOCK) {
                reads += 1;
                if reads == 2 {
                    mem.set_reg(Register::CLOCK, 72_000_000 - 0x10);
                }
            }
        });
        let mut ll = new_ll(ei);

        assert_eq!(current_frequency(&mut ll).unwrap(), 72_000_000);
    }
}
