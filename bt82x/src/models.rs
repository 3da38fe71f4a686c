pub mod bt820;

use crate::memory;

/// Implemented by types that represent the characteristics of different
/// specific models of BT82x.
///
/// Although the Rust compiler would allow implementations of this elsewhere,
/// this trait is intended only for implementation inside this crate and its
/// requirements are subject to change in future, even in minor releases.
///
/// This type is typically implemented on empty types to represent that
/// models are a compile-time-only construct used to represent the minor
/// differences between models through monomorphization, and they have no
/// presence at runtime.
pub trait Model: Sized {
    type MainMem: memory::MainMem;
    type DisplayListMem: memory::DisplayListMem;
    type RegisterMem: memory::RegisterMem;
    type CommandMem: memory::CommandMem;

    fn new<I: crate::Interface>(ei: I) -> crate::BT82x<Self, I> {
        crate::BT82x::new(ei)
    }

    fn reg_ptr(reg: crate::registers::Register) -> crate::memory::Ptr<Self::RegisterMem> {
        reg.ptr::<Self>()
    }
}

/// Implemented by model types that have an external flash memory space.
pub trait WithExtFlashMem: Model {
    type ExtFlashMem: memory::ExtFlashMem;
}

/// Implemented by model types that report coprocessor faults as a message
/// in a dedicated memory area.
pub trait WithCommandErrMem: Model {
    type CommandErrMem: memory::CommandErrMem;
}
