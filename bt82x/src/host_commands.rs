//! Host commands and their argument encodings.

/// Represents a "host command".
///
/// Host commands are a low-level mechanism for controlling the basic
/// functionality of the chip, such as power state, the system clock and the
/// boot configuration. This is not the same thing as a coprocessor command;
/// those are represented by methods on
/// [`Coprocessor`](crate::commands::Coprocessor).
///
/// On the wire every host command other than `ACTIVE` carries one argument
/// byte. The argument types in this module build those bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum HostCmd {
    ACTIVE = 0x00,
    STANDBY = 0xe0,
    SLEEP = 0xe1,
    POWERDOWN = 0xe2,
    SETPLLSP1 = 0xe4,
    SYSCLKDIV = 0xe6,
    SETBOOTCFG = 0xe8,
    BOOTCFGEN = 0xe9,
    SETDDRTYPE = 0xeb,
}

impl HostCmd {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        use HostCmd::*;
        match raw {
            0x00 => Some(ACTIVE),
            0xe0 => Some(STANDBY),
            0xe1 => Some(SLEEP),
            0xe2 => Some(POWERDOWN),
            0xe4 => Some(SETPLLSP1),
            0xe6 => Some(SYSCLKDIV),
            0xe8 => Some(SETBOOTCFG),
            0xe9 => Some(BOOTCFGEN),
            0xeb => Some(SETDDRTYPE),
            _ => None, // Unknown command
        }
    }

    pub const fn to_raw(self) -> u8 {
        self as u8
    }
}

/// Argument for `SETPLLSP1`: `(CKS << 7) | NS`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PllFreq(u8);

impl PllFreq {
    pub const fn new(cks: bool, ns: u8) -> Self {
        Self(((cks as u8) << 7) | (ns & 0x7f))
    }

    pub const fn to_raw(self) -> u8 {
        self.0
    }
}

/// Argument for `SYSCLKDIV`: `(SYSPLL_CPS << 4) | freq`.
///
/// `freq` is the divider applied to the 576MHz system PLL, minus one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SysClkDiv(u8);

impl SysClkDiv {
    pub const fn new(cps: u8, freq: u8) -> Self {
        Self(((cps & 0x07) << 4) | (freq & 0x0f))
    }

    pub const fn to_raw(self) -> u8 {
        self.0
    }
}

/// Argument for `SETBOOTCFG`, selecting which subsystems the boot ROM
/// brings up.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BootCfg(u8);

impl BootCfg {
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn ddr(self, v: bool) -> Self {
        Self((self.0 & !(1 << 7)) | ((v as u8) << 7))
    }

    pub const fn touch(self, v: bool) -> Self {
        Self((self.0 & !(1 << 6)) | ((v as u8) << 6))
    }

    pub const fn audio(self, v: bool) -> Self {
        Self((self.0 & !(1 << 5)) | ((v as u8) << 5))
    }

    pub const fn watchdog(self, v: bool) -> Self {
        Self((self.0 & !(1 << 4)) | ((v as u8) << 4))
    }

    /// Selects the boot source. Zero boots from the internal ROM.
    pub const fn source(self, v: u8) -> Self {
        Self((self.0 & !0x07) | (v & 0x07))
    }

    pub const fn to_raw(self) -> u8 {
        self.0
    }
}

/// Argument for `BOOTCFGEN`, which opens and closes the window in which the
/// other boot configuration commands are accepted.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BootCfgEn(u8);

impl BootCfgEn {
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn boot(self, v: bool) -> Self {
        Self((self.0 & !(1 << 7)) | ((v as u8) << 7))
    }

    pub const fn ddr_type(self, v: bool) -> Self {
        Self((self.0 & !(1 << 6)) | ((v as u8) << 6))
    }

    pub const fn gpreg(self, v: bool) -> Self {
        Self((self.0 & !(1 << 5)) | ((v as u8) << 5))
    }

    pub const fn enable(self, v: bool) -> Self {
        Self((self.0 & !1) | (v as u8))
    }

    pub const fn to_raw(self) -> u8 {
        self.0
    }
}

/// Argument for `SETDDRTYPE`: `(speed << 5) | (type << 3) | size`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DdrType(u8);

impl DdrType {
    pub const fn new(speed: u8, ty: u8, size: u8) -> Self {
        Self(((speed & 0x07) << 5) | ((ty & 0x03) << 3) | (size & 0x07))
    }

    pub const fn to_raw(self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_raw() {
        for raw in 0..=255_u8 {
            if let Some(cmd) = HostCmd::from_raw(raw) {
                assert_eq!(cmd.to_raw(), raw);
            }
        }
        assert_eq!(HostCmd::from_raw(0x61), None);
    }

    #[test]
    fn test_args() {
        assert_eq!(SysClkDiv::new(1, 7).to_raw(), 0x17);
        assert_eq!(PllFreq::new(true, 3).to_raw(), 0x83);
        assert_eq!(
            BootCfg::new()
                .ddr(true)
                .touch(true)
                .audio(true)
                .watchdog(true)
                .source(0)
                .to_raw(),
            0xf0
        );
        assert_eq!(BootCfg::new().ddr(true).ddr(false).to_raw(), 0x00);
        assert_eq!(
            BootCfgEn::new()
                .boot(true)
                .ddr_type(true)
                .gpreg(false)
                .enable(true)
                .to_raw(),
            0xc1
        );
        assert_eq!(DdrType::new(0, 1, 3).to_raw(), 0x0b);
    }
}
