use super::{Model, WithCommandErrMem, WithExtFlashMem};
use crate::memory;

/// Device type representing the BT820 and its BT82x siblings.
///
/// This type is used only at compile time as a type parameter, or as an
/// empty (compile-time-only) argument in order to influence selection of
/// a type parameter on a function call that wouldn't naturally imply one.
///
/// To use the main [`BT82x`](crate::BT82x) API with this model, pass a
/// suitable [`Interface`](crate::Interface) for your underlying platform to
/// [`Model::new`](Model::new).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BT820;

/// The base of the on-chip address window. Everything other than `RAM_G`
/// lives above this address.
pub const BASE: u32 = 0x7f000000;

impl Model for BT820 {
    type MainMem = MainMem;
    type DisplayListMem = DisplayListMem;
    type RegisterMem = RegisterMem;
    type CommandMem = CommandMem;
}

impl WithExtFlashMem for BT820 {
    type ExtFlashMem = ExtFlashMem;
}

impl WithCommandErrMem for BT820 {
    type CommandErrMem = CommandErrMem;
}

/// `RAM_G`, backed by the external DDR. Its usable size depends on the DDR
/// fitted, so this covers the largest supported part.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MainMem {}
impl memory::MemoryRegion for MainMem {
    type Model = BT820;
    const BASE_ADDR: u32 = 0x00000000;
    const LENGTH: u32 = 512 * 1024 * 1024;
    const DEBUG_NAME: &'static str = "MainMem";
}
impl memory::HostAccessible for MainMem {}
impl memory::MainMem for MainMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisplayListMem {}
impl memory::MemoryRegion for DisplayListMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE + 0x8000;
    const LENGTH: u32 = 16 * 1024;
    const DEBUG_NAME: &'static str = "DisplayListMem";
}
impl memory::HostAccessible for DisplayListMem {}
impl memory::DisplayListMem for DisplayListMem {}

/// The whole on-chip window, covering the core register banks, the system
/// registers and the bulk FIFO port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterMem {}
impl memory::MemoryRegion for RegisterMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE;
    const LENGTH: u32 = 16 * 1024 * 1024;
    const DEBUG_NAME: &'static str = "RegisterMem";
}
impl memory::HostAccessible for RegisterMem {}
impl memory::RegisterMem for RegisterMem {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandMem {}
impl memory::MemoryRegion for CommandMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE;
    const LENGTH: u32 = 16 * 1024;
    const DEBUG_NAME: &'static str = "CommandMem";
}
impl memory::HostAccessible for CommandMem {}
impl memory::CommandMem for CommandMem {}

/// `RAM_REPORT`, where the coprocessor leaves a message after a fault.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandErrMem {}
impl memory::MemoryRegion for CommandErrMem {
    type Model = BT820;
    const BASE_ADDR: u32 = BASE + 0x4800;
    const LENGTH: u32 = 128;
    const DEBUG_NAME: &'static str = "CommandErrMem";
}
impl memory::HostAccessible for CommandErrMem {}
impl memory::CommandErrMem for CommandErrMem {
    type RawMessage = [u8; 128];
}

/// The attached SPI NOR flash. Only reachable through coprocessor commands,
/// so the base address is arbitrary and only serves to keep flash pointers
/// distinct from host-accessible ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtFlashMem {}
impl memory::MemoryRegion for ExtFlashMem {
    type Model = BT820;
    const BASE_ADDR: u32 = 0x80000000;
    const LENGTH: u32 = 256 * 1024 * 1024;
    const DEBUG_NAME: &'static str = "ExtFlashMem";
}
impl memory::ExtFlashMem for ExtFlashMem {}
