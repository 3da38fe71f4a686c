use crate::host_commands::HostCmd;
use crate::interface::Interface;
use crate::memory::{HostAccessible, MemoryRegion, Ptr};
use crate::models::Model;
use crate::registers::Register;

/// A low-level interface to BT82x controllers which matches the primitive
/// operations used in the programmer guide.
///
/// This is slightly higher-level than the `Interface` trait, providing
/// size-specific memory accesses in the chip's little-endian byte order and
/// typed host commands, but doesn't know anything about sequencing.
pub struct LowLevel<M: Model, I: Interface> {
    raw: I,
    _model: core::marker::PhantomData<M>,
}

impl<M: Model, I: Interface> LowLevel<M, I> {
    pub fn new(ei: I) -> Self {
        Self {
            raw: ei,
            _model: core::marker::PhantomData,
        }
    }

    pub fn wr8<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>, v: u8) -> Result<(), I::Error> {
        self.raw.write(ptr.to_raw(), &[v])
    }

    pub fn wr16<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>, v: u16) -> Result<(), I::Error> {
        self.raw.write(ptr.to_raw(), &v.to_le_bytes())
    }

    pub fn wr32<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>, v: u32) -> Result<(), I::Error> {
        self.raw.write(ptr.to_raw(), &v.to_le_bytes())
    }

    pub fn wr8s<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>, v: &[u8]) -> Result<(), I::Error> {
        self.raw.write(ptr.to_raw(), v)
    }

    pub fn rd8<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>) -> Result<u8, I::Error> {
        let mut data: [u8; 1] = [0; 1];
        self.raw.read(ptr.to_raw(), &mut data)?;
        Ok(data[0])
    }

    pub fn rd16<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>) -> Result<u16, I::Error> {
        let mut data: [u8; 2] = [0; 2];
        self.raw.read(ptr.to_raw(), &mut data)?;
        Ok(u16::from_le_bytes(data))
    }

    pub fn rd32<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>) -> Result<u32, I::Error> {
        let mut data: [u8; 4] = [0; 4];
        self.raw.read(ptr.to_raw(), &mut data)?;
        Ok(u32::from_le_bytes(data))
    }

    pub fn rd8s<R: MemoryRegion + HostAccessible>(&mut self, ptr: Ptr<R>, into: &mut [u8]) -> Result<(), I::Error> {
        self.raw.read(ptr.to_raw(), into)
    }

    /// Reads a register. Every BT82x register is 32 bits wide.
    pub fn rd_reg(&mut self, reg: Register) -> Result<u32, I::Error> {
        self.rd32(M::reg_ptr(reg))
    }

    pub fn wr_reg(&mut self, reg: Register, v: u32) -> Result<(), I::Error> {
        self.wr32(M::reg_ptr(reg), v)
    }

    pub fn host_command(&mut self, cmd: HostCmd, arg: u8) -> Result<(), I::Error> {
        self.raw.host_cmd(cmd.to_raw(), arg)
    }

    pub fn reg_ptr(&self, reg: Register) -> Ptr<M::RegisterMem> {
        M::reg_ptr(reg)
    }

    /// Power-cycles the chip using the interface's reset mechanism.
    pub fn reset(&mut self) -> Result<(), I::Error> {
        self.raw.reset()
    }

    pub fn delay_ms(&mut self, ms: u32) -> Result<(), I::Error> {
        self.raw.delay_ms(ms)
    }

    pub fn borrow_interface<'a>(&'a mut self) -> &'a mut I {
        &mut self.raw
    }

    pub fn take_interface(self) -> I {
        self.raw
    }
}
