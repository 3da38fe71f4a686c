use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Represents a register on a BT82x device.
///
/// Each value is the register's offset from the base of the on-chip window
/// (`0x7F000000`). The core registers live in two banks at `+0x6000` and
/// `+0x4000`, the system registers at `+0x800400`, and `CMDB_WRITE` is the
/// bulk write port into the coprocessor FIFO.
///
/// All BT82x registers are 32 bits wide.
#[derive(TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
#[allow(non_camel_case_types)]
pub enum Register {
    BOOT_CFG = 0x6628,
    CLOCK = 0x6008,
    CMD_DL = 0x6154,
    CMD_READ = 0x614c,
    CMD_WRITE = 0x6150,
    CMDB_SPACE = 0x6594,
    CMDB_WRITE = 0x10000,
    CPURESET = 0x6088,
    DISP = 0x60e4,
    DLSWAP = 0x60b4,
    FLASH_SIZE = 0x4024,
    FLASH_STATUS = 0x65d4,
    FRAMES = 0x6004,
    FREQUENCY = 0x600c,
    GPIO = 0x60e0,
    GPIO_DIR = 0x60dc,
    HCYCLE = 0x608c,
    HOFFSET = 0x6090,
    HSIZE = 0x6094,
    HSYNC0 = 0x6098,
    HSYNC1 = 0x609c,
    ID = 0x6000,
    INT_EN = 0x6104,
    INT_FLAGS = 0x6100,
    INT_MASK = 0x6108,
    MACRO_0 = 0x6130,
    MACRO_1 = 0x6134,
    MEDIAFIFO_READ = 0x4014,
    MEDIAFIFO_WRITE = 0x4018,
    PCLK_POL = 0x60b8,
    PLAY_CONTROL = 0x4050,
    PLAYBACK_PLAY = 0x6124,
    PWM_DUTY = 0x612c,
    PWM_HZ = 0x6128,
    TAG = 0x60c4,
    TAG_X = 0x60bc,
    TAG_Y = 0x60c0,
    TRACKER = 0x4000,
    TRACKER_1 = 0x4004,
    TRACKER_2 = 0x4008,
    TRACKER_3 = 0x400c,
    TRACKER_4 = 0x4010,
    VCYCLE = 0x60a0,
    VOFFSET = 0x60a4,
    VSIZE = 0x60a8,
    VSYNC0 = 0x60ac,
    VSYNC1 = 0x60b0,

    CHIP_ID = 0x800448,
    BOOT_STATUS = 0x80044c,
    DDR_TYPE = 0x800454,
}

impl Register {
    pub fn ptr<M: crate::models::Model>(self) -> crate::memory::Ptr<M::RegisterMem> {
        use crate::memory::MemoryRegion;
        M::RegisterMem::ptr(self as u32)
    }

    /// Returns the offset of the register address within the register memory.
    pub fn offset(self) -> u32 {
        self as u32
    }
}

/// Bits of `REG_CPURESET`. A set bit holds the corresponding engine in reset.
pub mod cpureset {
    pub const COPROCESSOR: u32 = 0b001;
    pub const TOUCH: u32 = 0b010;
    pub const AUDIO: u32 = 0b100;
}

/// Values for `REG_DLSWAP`.
pub mod dlswap {
    pub const DONE: u32 = 0;
    pub const FRAME: u32 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bt820::BT820;
    use core::convert::TryFrom;

    #[test]
    fn test_ptr() {
        assert_eq!(Register::ID.ptr::<BT820>().to_raw(), 0x7f006000);
        assert_eq!(Register::CMDB_WRITE.ptr::<BT820>().to_raw(), 0x7f010000);
        assert_eq!(Register::FLASH_SIZE.ptr::<BT820>().to_raw(), 0x7f004024);
        assert_eq!(Register::CHIP_ID.ptr::<BT820>().to_raw(), 0x7f800448);
    }

    #[test]
    fn test_from_offset() {
        assert_eq!(Register::try_from(0x65d4_u32), Ok(Register::FLASH_STATUS));
        assert!(Register::try_from(0x6001_u32).is_err());
        assert_eq!(u32::from(Register::CMDB_SPACE), 0x6594);
    }
}
