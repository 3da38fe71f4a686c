use super::command_word::{command_words_for_bytes, CommandWord};
use super::flash::{Flash, FlashError};
use super::options;
use super::waiter::{PollingWaiter, Waiter, WaiterError};
use super::SPACE_WHEN_EMPTY;
use crate::interface::Interface;
use crate::low_level::LowLevel;
use crate::memory::{HostAccessible, MemoryRegion, Ptr, Slice};
use crate::models::{Model, WithExtFlashMem};
use crate::registers::Register;
use log::{debug, warn};

/// The result type for coprocessor operations, where the error type is always
/// [`Error`](Error).
pub type Result<T, M, I, W> =
    core::result::Result<T, Error<<I as Interface>::Error, <W as Waiter<M, I>>::Error>>;

/// The word written into the FIFO where the coprocessor will store a
/// command's result.
pub(crate) const RESULT_PLACEHOLDER: u32 = 0xf0f0f0f0;

/// An interface to the command FIFO for the BT82x coprocessor component.
///
/// This object encapsulates the handling of the FIFO and provides an API
/// for appending commands to it.
pub struct Coprocessor<M: Model, I: Interface, W: Waiter<M, I>> {
    ll: LowLevel<M, I>,
    wait: W,

    // Lower bound on free FIFO bytes, from the last REG_CMDB_SPACE read minus
    // everything streamed since. The chip drains the FIFO behind our back, so
    // the real figure is only ever larger. When a command doesn't fit we ask
    // the waiter for a fresh reading.
    known_space: u16,

    // Bounds the loops that wait for something other than FIFO space, such
    // as the flash state changing.
    poll_limit: u32,
}

/// Commands that are appended to the FIFO and then left for the
/// coprocessor to execute in its own time.
///
/// Each of these only waits when the FIFO is too full to take the whole
/// command. None of them wait for the command to finish; methods named
/// `block_...` do that.
impl<M: Model, I: Interface, W: Waiter<M, I>> Coprocessor<M, I, W> {
    /// A convenience function for enclosing a series of coprocessor commands
    /// in `start_display_list` and `display_list_swap` commands.
    pub fn new_display_list<F>(&mut self, f: F) -> Result<(), M, I, W>
    where
        F: FnOnce(&mut Self) -> Result<(), M, I, W>,
    {
        self.start_display_list()?;
        f(self)?;
        self.display_list_swap()
    }

    /// Sends just the coprocessor command to start a new display list, which
    /// waits for the display list memory to become writable before executing
    /// any subsequent commands and resets the pointer for new display list
    /// commands back to the top of display list memory.
    pub fn start_display_list(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF00))
    }

    /// Sends just the coprocessor command to swap in the newly-populated
    /// display list commands.
    pub fn display_list_swap(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF01))
    }

    /// Appends a single raw word, such as an already-encoded display list
    /// command.
    pub fn append_raw_word(&mut self, word: u32) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(word))
    }

    /// Wait for at least the given delay and then have the coprocessor
    /// trigger the interrupt `CMDFLAG`.
    ///
    /// If you use a delay of more than 4,294,967 seconds then the delay
    /// sent to the chip will saturate at that amount of seconds.
    pub fn trigger_cmdflag_interrupt(
        &mut self,
        delay: core::time::Duration,
    ) -> Result<(), M, I, W> {
        self.write_stream(8, |cp| {
            let delay = delay.as_millis();
            let delay = if delay > (core::u32::MAX as u128) {
                core::u32::MAX
            } else {
                delay as u32
            };
            cp.write_to_buffer(0xFFFFFF02)?;
            cp.write_to_buffer(delay)
        })
    }

    /// Resets the coprocessor's state to the boot-time defaults before
    /// continuing with later commands.
    pub fn cold_start(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF2E))
    }

    /// Plays the Bridgetek logo animation. The FIFO pointers return to zero
    /// once it's done; use
    /// [`block_until_logo_done`](Coprocessor::block_until_logo_done) to
    /// wait for that.
    pub fn show_manufacturer_logo(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF2D))
    }

    pub fn show_testcard(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF57))
    }

    pub fn wait_microseconds(&mut self, delay: u32) -> Result<(), M, I, W> {
        self.write_stream(8, |cp| {
            cp.write_to_buffer(0xFFFFFF59)?;
            cp.write_to_buffer(delay)
        })
    }

    pub fn nop(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF53))
    }

    /// Has the coprocessor wait until the end of the current video frame
    /// scanout before continuing.
    pub fn wait_video_scanout(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF3C))
    }

    pub fn reset_fonts(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF4C))
    }

    /// Reads a slice of display list command bytes from a location in the main
    /// memory space and appends them to the display list being built.
    ///
    /// The bounds of the given slice must both be addresses that are a
    /// multiple of four, to respect the required memory alignment.
    pub fn append_display_list_from_main_mem<S: Into<Slice<M::MainMem>>>(
        &mut self,
        slice: S,
    ) -> Result<(), M, I, W> {
        let slice: Slice<M::MainMem> = slice.into();
        let start = slice.start();
        let count = slice.len();
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF1C)?;
            cp.write_to_buffer(start)?;
            cp.write_to_buffer(count)
        })
    }

    /// Has the coprocessor copy the given bytes into memory, with the bytes
    /// themselves travelling through the command FIFO.
    pub fn write_memory<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        data: &[u8],
    ) -> Result<(), M, I, W> {
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF18)?;
            cp.write_to_buffer(ptr)?;
            cp.write_to_buffer(data.len() as u32)
        })?;
        self.write_bytes_chunked(data)
    }

    /// Has the coprocessor store a single 32-bit value, in sequence with
    /// the other commands.
    pub fn write_memory_u32<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        v: u32,
    ) -> Result<(), M, I, W> {
        self.write_stream(16, |cp| {
            cp.write_to_buffer(0xFFFFFF18)?;
            cp.write_to_buffer(ptr)?;
            cp.write_to_buffer(4_u32)?;
            cp.write_to_buffer(v)
        })
    }

    pub fn set_memory<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        value: u8,
        num: u32,
    ) -> Result<(), M, I, W> {
        self.write_stream(16, |cp| {
            cp.write_to_buffer(0xFFFFFF19)?;
            cp.write_to_buffer(ptr)?;
            cp.write_to_buffer(value as u32)?;
            cp.write_to_buffer(num)
        })
    }

    pub fn zero_memory<R: MemoryRegion + HostAccessible, S: Into<Slice<R>>>(
        &mut self,
        slice: S,
    ) -> Result<(), M, I, W> {
        let slice: Slice<R> = slice.into();
        let start = slice.start();
        let count = slice.len();
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF1A)?;
            cp.write_to_buffer(start)?;
            cp.write_to_buffer(count)
        })
    }

    pub fn copy_memory<R1, R2>(
        &mut self,
        dest: Ptr<R1>,
        src: Ptr<R2>,
        num: u32,
    ) -> Result<(), M, I, W>
    where
        R1: MemoryRegion + HostAccessible,
        R2: MemoryRegion + HostAccessible,
    {
        self.write_stream(16, |cp| {
            cp.write_to_buffer(0xFFFFFF1B)?;
            cp.write_to_buffer(dest)?;
            cp.write_to_buffer(src)?;
            cp.write_to_buffer(num)
        })
    }

    /// Captures the current screen into main memory.
    pub fn snapshot(&mut self, dest: Ptr<M::MainMem>) -> Result<(), M, I, W> {
        self.write_stream(8, |cp| {
            cp.write_to_buffer(0xFFFFFF1D)?;
            cp.write_to_buffer(dest)
        })
    }

    /// Decompresses zlib data into main memory.
    ///
    /// When `opts` selects [`MediaSource::CommandFifo`](options::MediaSource::CommandFifo)
    /// the compressed bytes in `data` follow the command. For the other
    /// sources `data` should be empty.
    pub fn inflate(
        &mut self,
        dest: Ptr<M::MainMem>,
        opts: options::Inflate,
        data: &[u8],
    ) -> Result<(), M, I, W> {
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF4A)?;
            cp.write_to_buffer(dest)?;
            cp.write_to_buffer(opts.to_raw())
        })?;
        self.write_bytes_chunked(data)
    }

    /// Decodes a JPEG or PNG image into main memory. `data` follows the same
    /// rules as for [`inflate`](Coprocessor::inflate).
    pub fn load_image(
        &mut self,
        dest: Ptr<M::MainMem>,
        opts: options::LoadImage,
        data: &[u8],
    ) -> Result<(), M, I, W> {
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF21)?;
            cp.write_to_buffer(dest)?;
            cp.write_to_buffer(opts.to_raw())
        })?;
        self.write_bytes_chunked(data)
    }

    /// Writes a register in sequence with the other commands, rather than
    /// immediately as a direct host write would.
    pub fn write_register(&mut self, reg: Register, v: u32) -> Result<(), M, I, W> {
        let ptr = M::reg_ptr(reg);
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF86)?;
            cp.write_to_buffer(ptr)?;
            cp.write_to_buffer(v)
        })
    }
}

/// Methods that don't return until the coprocessor has executed everything
/// sent before them.
///
/// All of them drain the FIFO through the waiter, so a waiter that sleeps
/// instead of spinning makes these much cheaper for the host.
impl<M: Model, I: Interface, W: Waiter<M, I>> Coprocessor<M, I, W> {
    #[inline]
    pub fn space_when_empty() -> u16 {
        SPACE_WHEN_EMPTY
    }

    /// Blocks until the coprocessor FIFO is empty, signalling that the
    /// coprocessor has completed all of the commands issued so far.
    pub fn block_until_idle(&mut self) -> Result<(), M, I, W> {
        self.ensure_space(Self::space_when_empty())
    }

    /// Blocks until the chip has finished scanning out the current frame.
    ///
    /// This is a blocking version of `wait_video_scanout`.
    pub fn block_until_video_scanout(&mut self) -> Result<(), M, I, W> {
        self.wait_video_scanout()?;
        self.block_until_idle()
    }

    /// Blocks until a logo animation started by
    /// [`show_manufacturer_logo`](Coprocessor::show_manufacturer_logo) has
    /// finished, which the coprocessor signals by returning both FIFO
    /// pointers to zero.
    pub fn block_until_logo_done(&mut self) -> Result<(), M, I, W> {
        let limit = self.poll_limit;
        self.while_stopped(|cp, stopped| {
            let ll = cp.borrow_low_level(stopped);
            for _ in 0..limit {
                let rp = Self::interface_result(ll.rd32(M::reg_ptr(Register::CMD_READ)))?;
                let wp = Self::interface_result(ll.rd32(M::reg_ptr(Register::CMD_WRITE)))?;
                if super::is_fault(rp) {
                    return Err(Error::Fault);
                }
                if rp == 0 && wp == 0 {
                    return cp.synchronize(stopped);
                }
                Self::interface_result(ll.delay_ms(10))?;
            }
            Err(Error::Timeout)
        })
    }

    /// Blocks until the coprocessor has completed all of the commands issued
    /// so far and then returns the value of the given register.
    ///
    /// You can use this in situations where earlier coprocessor commands may
    /// have modified the register value, in order to capture that result
    /// at the correct time.
    pub fn block_read_register(&mut self, reg: Register) -> Result<u32, M, I, W> {
        let ptr = M::reg_ptr(reg);
        self.write_with_result(8, |cp| {
            cp.write_to_buffer(0xFFFFFF17)?;
            cp.write_to_buffer(ptr)
        })
    }

    /// Blocks until the coprocessor has computed the CRC-32 of the given
    /// memory range.
    pub fn block_memory_crc<R: MemoryRegion + HostAccessible, S: Into<Slice<R>>>(
        &mut self,
        slice: S,
    ) -> Result<u32, M, I, W> {
        let slice: Slice<R> = slice.into();
        let start = slice.start();
        let count = slice.len();
        self.write_with_result(12, |cp| {
            cp.write_to_buffer(0xFFFFFF16)?;
            cp.write_to_buffer(start)?;
            cp.write_to_buffer(count)
        })
    }

    /// Returns the end address of the data written by the most recent
    /// `CMD_INFLATE` or `CMD_LOADIMAGE`.
    pub fn block_get_ptr(&mut self) -> Result<Ptr<M::MainMem>, M, I, W> {
        let raw = self.write_with_result(4, |cp| cp.write_to_buffer(0xFFFFFF20))?;
        Ok(Ptr::new(raw))
    }

    // Writes a command followed by a placeholder for its result, waits for
    // the coprocessor to finish it, and then reads the result back out of
    // the FIFO memory.
    fn write_with_result<F>(&mut self, len: u16, f: F) -> Result<u32, M, I, W>
    where
        F: FnOnce(&mut Self) -> Result<(), M, I, W>,
    {
        self.write_stream(len + 4, |cp| {
            f(cp)?;
            cp.write_to_buffer(RESULT_PLACEHOLDER)
        })?;

        self.while_stopped(|cp, stopped| {
            // The write pointer now sits just after our placeholder.
            let write_offset = {
                let ll = cp.borrow_low_level(stopped);
                Self::interface_result(ll.rd32(M::reg_ptr(Register::CMD_WRITE)))?
            };

            cp.ensure_space_stopped(stopped, Self::space_when_empty())?;

            let result_ptr: Ptr<M::CommandMem> = Ptr::new(write_offset) - 4_u32;
            let ll = cp.borrow_low_level(stopped);
            Self::interface_result(ll.rd32(result_ptr))
        })
    }
}

/// Direct host access to the chip while the coprocessor is active.
///
/// These pause the command stream for the duration of the access, and don't
/// wait for the coprocessor to execute anything already in the FIFO.
impl<M: Model, I: Interface, W: Waiter<M, I>> Coprocessor<M, I, W> {
    /// Reads a register immediately over the host interface.
    pub fn read_register(&mut self, reg: Register) -> Result<u32, M, I, W> {
        self.while_stopped(|cp, stopped| {
            let ll = cp.borrow_low_level(stopped);
            Self::interface_result(ll.rd_reg(reg))
        })
    }

    pub fn host_write_memory<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        data: &[u8],
    ) -> Result<(), M, I, W> {
        self.while_stopped(|cp, stopped| {
            let ll = cp.borrow_low_level(stopped);
            Self::interface_result(ll.wr8s(ptr, data))
        })
    }

    pub fn host_read_memory<R: MemoryRegion + HostAccessible>(
        &mut self,
        ptr: Ptr<R>,
        into: &mut [u8],
    ) -> Result<(), M, I, W> {
        self.while_stopped(|cp, stopped| {
            let ll = cp.borrow_low_level(stopped);
            Self::interface_result(ll.rd8s(ptr, into))
        })
    }
}

/// Recovery after the coprocessor reports a fault.
impl<M: Model, I: Interface, W: Waiter<M, I>> Coprocessor<M, I, W> {
    /// Clears a coprocessor fault by resetting the read pointer, and waits
    /// for the coprocessor to acknowledge by resetting the write pointer.
    ///
    /// Any commands still in the FIFO are discarded.
    pub fn recover_from_fault(&mut self) -> Result<(), M, I, W> {
        let limit = self.poll_limit;
        self.while_stopped(|cp, stopped| {
            let ll = cp.borrow_low_level(stopped);
            Self::interface_result(ll.wr_reg(Register::CMD_READ, 0))?;
            let mut cleared = false;
            for _ in 0..limit {
                if Self::interface_result(ll.rd_reg(Register::CMD_WRITE))? == 0 {
                    cleared = true;
                    break;
                }
            }
            if !cleared {
                return Err(Error::Timeout);
            }
            debug!("recovered from coprocessor fault");
            cp.synchronize(stopped)
        })
    }

    /// Fully resets the coprocessor by holding it in reset while clearing
    /// the FIFO pointers, then restores the default coprocessor state and
    /// reattaches the flash.
    pub fn reset(&mut self) -> Result<(), M, I, W> {
        self.while_stopped(|cp, stopped| {
            let ll = cp.borrow_low_level(stopped);
            let cleared = Self::interface_result(crate::init::reset_coprocessor(ll))?;
            if !cleared {
                return Err(Error::Timeout);
            }
            cp.synchronize(stopped)
        })?;
        self.start_display_list()?;
        self.cold_start()?;
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF43))?;
        self.block_until_idle()
    }
}

impl<M: Model, I: Interface, W: Waiter<M, I>> Coprocessor<M, I, W> {
    /// The default for how many times the non-FIFO waits poll before giving
    /// up with [`Error::Timeout`](Error::Timeout).
    pub const DEFAULT_POLL_LIMIT: u32 = 1000;

    /// Consumes the given interface and waiter and returns an interface to
    /// the coprocessor via the given interface.
    ///
    /// This function consumes the interface because it will be constantly
    /// writing into the command FIFO of the associated chip and so it isn't
    /// safe to do any other concurrent access. You can get the underlying
    /// interface back again if you need it using some of the methods of
    /// `Coprocessor`.
    pub fn new(ei: I, wait: W) -> Result<Self, M, I, W> {
        Self::from_low_level(LowLevel::new(ei), wait)
    }

    pub(crate) fn from_low_level(ll: LowLevel<M, I>, wait: W) -> Result<Self, M, I, W> {
        let mut ret = Self {
            ll: ll,
            wait: wait,
            known_space: 0,
            poll_limit: Self::DEFAULT_POLL_LIMIT,
        };

        // The stream isn't running until we call start_stream for the first
        // time below.
        let stopped = StoppedStream;

        ret.synchronize(&stopped)?;

        // We keep our write transaction open any time we're not
        // resynchronizing or waiting, since that allows us to burst writes
        // into the command FIFO.
        ret.start_stream(stopped)?;

        Ok(ret)
    }

    /// Sets how many times the waits that don't go through the waiter poll
    /// before giving up.
    pub fn with_poll_limit(mut self, limit: u32) -> Self {
        self.poll_limit = limit;
        self
    }

    pub fn poll_limit(&self) -> u32 {
        self.poll_limit
    }

    /// Consumes the current coprocessor object and then returns a new one
    /// that's the same except that it has a new waiter, which is possibly
    /// derived from the previous one.
    pub fn with_new_waiter<W2, F>(self, f: F) -> Coprocessor<M, I, W2>
    where
        W2: Waiter<M, I>,
        F: FnOnce(W) -> W2,
    {
        Coprocessor {
            ll: self.ll,
            wait: f(self.wait),
            known_space: self.known_space,
            poll_limit: self.poll_limit,
        }
    }

    /// `take_interface` consumes the coprocessor object and returns its
    /// underlying `Interface`.
    ///
    /// To make temporary use of the underlying interface, without also
    /// discarding the coprocessor object, use `with_interface` instead.
    pub fn take_interface(mut self) -> Result<I, M, I, W> {
        self.stop_stream()?;
        Ok(self.ll.take_interface())
    }

    /// `with_interface` runs your given closure with access to the
    /// coprocessor object's underlying `Interface`, temporarily pausing
    /// local coprocessor management so the closure can make use of other
    /// chip functionality.
    pub fn with_interface<R, F: FnOnce(&mut I) -> Result<R, M, I, W>>(
        &mut self,
        f: F,
    ) -> Result<R, M, I, W> {
        self.while_stopped(|cp, stopped| {
            let result = f(cp.borrow_low_level(stopped).borrow_interface());
            // The caller could've messed with the registers we depend on, so
            // we'll resynchronize them before we restart our write stream.
            cp.synchronize(stopped)?;
            result
        })
    }

    // Update our internal records to match the state of the remote chip.
    fn synchronize(&mut self, _stopped: &StoppedStream) -> Result<(), M, I, W> {
        let space = Self::interface_result(self.ll.rd_reg(Register::CMDB_SPACE))?;
        // A faulted coprocessor has no usable space. Leaving it at zero
        // sends the next write through the waiter, which reports the fault.
        self.known_space = if super::is_fault(space) { 0 } else { space as u16 };
        Ok(())
    }

    fn borrow_low_level<'a>(&'a mut self, _stopped: &StoppedStream) -> &'a mut LowLevel<M, I> {
        &mut self.ll
    }

    fn borrow_low_level_and_waiter<'a>(
        &'a mut self,
        _stopped: &StoppedStream,
    ) -> (&'a mut LowLevel<M, I>, &'a mut W) {
        (&mut self.ll, &mut self.wait)
    }

    // Runs `f` with the stream stopped, and restarts it afterwards even if
    // `f` failed so that the object stays usable after an error.
    fn while_stopped<R, F>(&mut self, f: F) -> Result<R, M, I, W>
    where
        F: FnOnce(&mut Self, &StoppedStream) -> Result<R, M, I, W>,
    {
        let stopped = self.stop_stream()?;
        let result = f(self, &stopped);
        self.start_stream(stopped)?;
        result
    }

    // Takes the token by value: once this returns the stream is open again.
    fn start_stream(&mut self, _stopped: StoppedStream) -> Result<(), M, I, W> {
        // Everything written into REG_CMDB_WRITE is appended to the FIFO at
        // the chip's current write pointer, so one long burst can carry any
        // number of commands.
        let ei = self.ll.borrow_interface();
        Self::interface_result(ei.begin_write(M::reg_ptr(Register::CMDB_WRITE).to_raw()))
    }

    // The returned token is the proof that plain register access is safe.
    fn stop_stream(&mut self) -> Result<StoppedStream, M, I, W> {
        let ei = self.ll.borrow_interface();
        Self::interface_result(ei.end_write())?;
        Ok(StoppedStream)
    }

    pub(crate) fn write_stream<F: FnOnce(&mut Self) -> Result<(), M, I, W>>(
        &mut self,
        len: u16,
        f: F,
    ) -> Result<(), M, I, W> {
        if len > Self::space_when_empty() {
            return Err(Error::Oversize);
        }
        self.ensure_space(len)?;

        // The stream is always active here, so we can just burst writes
        // into it.
        f(self)
    }

    // Block using our waiter until there's at least `need` bytes of free space
    // in the FIFO.
    fn ensure_space(&mut self, need: u16) -> Result<(), M, I, W> {
        if self.known_space >= need {
            // Fast path: our local tracking knows there's enough space, so
            // we can avoid stopping our burst-writing stream.
            return Ok(());
        }

        // The waiter needs to make other calls against the chip, so we pause
        // the burst stream while it runs.
        self.while_stopped(|cp, stopped| cp.ensure_space_stopped(stopped, need))
    }

    // A version of `ensure_space` that assumes the stream is already stopped
    // and will remain stopped after it returns.
    fn ensure_space_stopped(&mut self, stopped: &StoppedStream, need: u16) -> Result<(), M, I, W> {
        if self.known_space >= need {
            return Ok(());
        }

        let (ll, wait) = self.borrow_low_level_and_waiter(stopped);
        match wait.wait_for_space(ll, need) {
            Ok(known_space) => {
                self.known_space = known_space;
                Ok(())
            }
            Err(err) => {
                // We don't know how much space we have, so we'll set it
                // to zero to force calling the waiter again next time.
                self.known_space = 0;

                Err(match err {
                    WaiterError::Comm(err) => Error::Waiter(err),
                    WaiterError::Fault => Error::Fault,
                    WaiterError::Timeout => Error::Timeout,
                })
            }
        }
    }

    // Write directly to the output stream. This function doesn't check whether
    // there's sufficient space in the buffer, so the caller should call
    // ensure_space first to wait until there's enough space for the full
    // message it intends to write.
    fn write_to_buffer<V: Into<CommandWord>>(&mut self, v: V) -> Result<(), M, I, W> {
        let v: CommandWord = v.into();
        let data = v.to_raw().to_le_bytes();
        let ei = self.ll.borrow_interface();
        let result = Self::interface_result(ei.continue_write(&data));

        // We assume we consumed some buffer space even if there was an error,
        // because reducing our known minimum just means that we'll resync
        // this value from the real device sooner.
        self.known_space = self.known_space.saturating_sub(4);
        result
    }

    // Write a series of bytes into the output stream in chunks, with zero
    // padding at the end to ensure that the message ends on a four-byte
    // word boundary.
    fn write_bytes_chunked(&mut self, v: &[u8]) -> Result<(), M, I, W> {
        for word in command_words_for_bytes(v) {
            self.ensure_space(4)?;
            self.write_to_buffer(word)?;
        }
        Ok(())
    }

    pub(crate) fn interface_result<T>(
        result: core::result::Result<T, I::Error>,
    ) -> Result<T, M, I, W> {
        match result {
            Ok(v) => Ok(v),
            Err(err) => Err(Error::Interface(err)),
        }
    }
}

impl<M: Model, I: Interface> Coprocessor<M, I, PollingWaiter<M, I>> {
    /// Consumes the given interface and returns an interface to the
    /// coprocessor via the given interface, which will use busy-polling to
    /// wait when there isn't enough buffer space.
    ///
    /// If your platform allows you to detect the coprocessor space
    /// interrupt then you might prefer to call `new` and pass a custom
    /// waiter that can put your main processor to sleep while waiting.
    pub fn new_polling(ei: I) -> Result<Self, M, I, PollingWaiter<M, I>> {
        let w: PollingWaiter<M, I> = PollingWaiter::new();
        Self::new(ei, w)
    }
}

/// The `CMD_FLASH...` family, available only for models with an external
/// flash memory space.
///
/// These only queue the commands. [`flash`](Coprocessor::flash) returns a
/// helper that sequences them with the alignment checks and waits that the
/// flash needs.
impl<M, I, W> Coprocessor<M, I, W>
where
    M: Model + WithExtFlashMem,
    I: Interface,
    W: Waiter<M, I>,
{
    pub fn flash(&mut self) -> Flash<'_, M, I, W> {
        Flash::new(self)
    }

    pub fn flash_erase(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF3E))
    }

    /// Writes the given bytes to already-erased flash, with the bytes
    /// travelling through the command FIFO.
    pub fn flash_write(
        &mut self,
        dest: Ptr<M::ExtFlashMem>,
        data: &[u8],
    ) -> Result<(), M, I, W> {
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF3F)?;
            cp.write_to_buffer(dest.to_raw_offset())?;
            cp.write_to_buffer(data.len() as u32)
        })?;
        self.write_bytes_chunked(data)
    }

    pub fn flash_read(
        &mut self,
        dest: Ptr<M::MainMem>,
        src: Ptr<M::ExtFlashMem>,
        num: u32,
    ) -> Result<(), M, I, W> {
        self.write_stream(16, |cp| {
            cp.write_to_buffer(0xFFFFFF40)?;
            cp.write_to_buffer(dest)?;
            cp.write_to_buffer(src.to_raw_offset())?;
            cp.write_to_buffer(num)
        })
    }

    /// Writes main memory to flash, erasing only the sectors whose content
    /// differs.
    pub fn flash_update(
        &mut self,
        dest: Ptr<M::ExtFlashMem>,
        src: Ptr<M::MainMem>,
        num: u32,
    ) -> Result<(), M, I, W> {
        self.write_stream(16, |cp| {
            cp.write_to_buffer(0xFFFFFF41)?;
            cp.write_to_buffer(dest.to_raw_offset())?;
            cp.write_to_buffer(src)?;
            cp.write_to_buffer(num)
        })
    }

    /// Writes main memory to already-erased flash.
    pub fn flash_program(
        &mut self,
        dest: Ptr<M::ExtFlashMem>,
        src: Ptr<M::MainMem>,
        num: u32,
    ) -> Result<(), M, I, W> {
        self.write_stream(16, |cp| {
            cp.write_to_buffer(0xFFFFFF64)?;
            cp.write_to_buffer(dest.to_raw_offset())?;
            cp.write_to_buffer(src)?;
            cp.write_to_buffer(num)
        })
    }

    pub fn flash_detach(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF42))
    }

    pub fn flash_attach(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF43))
    }

    /// Asks the coprocessor to switch the flash into full-speed mode, and
    /// blocks until it reports the outcome. Zero means success; see
    /// [`FlashFastError`](super::flash::FlashFastError) for the rest.
    pub fn block_flash_fast(&mut self) -> Result<u32, M, I, W> {
        self.write_with_result(4, |cp| cp.write_to_buffer(0xFFFFFF44))
    }

    pub fn flash_spi_deselect(&mut self) -> Result<(), M, I, W> {
        self.write_stream(4, |cp| cp.write_to_buffer(0xFFFFFF45))
    }

    /// Sends the given bytes to the flash over its SPI bus, which must be in
    /// the detached state.
    pub fn flash_spi_tx(&mut self, data: &[u8]) -> Result<(), M, I, W> {
        self.write_stream(8, |cp| {
            cp.write_to_buffer(0xFFFFFF46)?;
            cp.write_to_buffer(data.len() as u32)
        })?;
        self.write_bytes_chunked(data)
    }

    /// Receives bytes from the flash SPI bus into main memory.
    pub fn flash_spi_rx(&mut self, dest: Ptr<M::MainMem>, num: u32) -> Result<(), M, I, W> {
        self.write_stream(12, |cp| {
            cp.write_to_buffer(0xFFFFFF47)?;
            cp.write_to_buffer(dest)?;
            cp.write_to_buffer(num)
        })
    }

    /// Selects the flash address that later commands using
    /// [`MediaSource::Flash`](options::MediaSource::Flash) read from.
    pub fn flash_source(&mut self, src: Ptr<M::ExtFlashMem>) -> Result<(), M, I, W> {
        self.write_stream(8, |cp| {
            cp.write_to_buffer(0xFFFFFF48)?;
            cp.write_to_buffer(src.to_raw_offset())
        })
    }

    /// Decodes an image stored in flash into main memory, without
    /// generating display list commands for it.
    pub fn load_image_from_flash(
        &mut self,
        dest: Ptr<M::MainMem>,
        src: Ptr<M::ExtFlashMem>,
    ) -> Result<(), M, I, W> {
        use options::Options;
        if !src.is_aligned(64) {
            return Err(Error::Unaligned);
        }
        let opts = options::LoadImage::new()
            .source(options::MediaSource::Flash)
            .no_display_list();
        self.flash_source(src)?;
        self.load_image(dest, opts, &[])
    }
}

/// These methods are available only when working with a model that has a
/// coprocessor error message memory space.
impl<M, I, W> Coprocessor<M, I, W>
where
    M: Model + crate::models::WithCommandErrMem,
    I: Interface,
    W: Waiter<M, I>,
{
    /// Returns the fault message currently available in the coprocessor's
    /// fault report memory.
    ///
    /// It's only meaningful to call this immediately after another coprocessor
    /// method returns the error variant `Fault`, before calling
    /// [`recover_from_fault`](Coprocessor::recover_from_fault).
    pub fn coprocessor_fault_msg(&mut self) -> Result<FaultMessage<M::CommandErrMem>, M, I, W> {
        use crate::memory::CommandErrMem;
        use crate::models::WithCommandErrMem;

        let mut raw = <<M as WithCommandErrMem>::CommandErrMem as CommandErrMem>::RawMessage::new();
        self.while_stopped(|cp, stopped| {
            let into = raw.as_storage_bytes();
            let ll = cp.borrow_low_level(stopped);
            let addr = <<M as WithCommandErrMem>::CommandErrMem as MemoryRegion>::ptr(0);
            Self::interface_result(ll.rd8s(addr, into))
        })?;
        let msg = FaultMessage::new(raw);
        warn!(
            "coprocessor fault: {}",
            core::str::from_utf8(msg.as_bytes()).unwrap_or("<non-UTF-8 message>")
        );
        Ok(msg)
    }
}

/// Error type for coprocessor operations.
///
/// This distinguishes between errors from the underlying interface to the
/// hardware, errors returned by the "waiter" while waiting for more buffer
/// space, coprocessor faults reported by the chip itself, and misuse that
/// this crate detects before sending anything.
#[derive(Debug)]
pub enum Error<IErr, WErr> {
    /// Errors encountered when sending or recieving data from the chip.
    ///
    /// The wrapped error type for this variant is the error type for whichever
    /// [`Interface`](crate::Interface) implementation you are using.
    Interface(IErr),

    /// Errors encountered while waiting for more space in the FIFO.
    ///
    /// The wrapped error type for this variant is the error type for whichever
    /// [`Waiter`](super::waiter::Waiter) implementation you are using. If you
    /// are using the default polling waiter then the error will be of the
    /// error type associated with your chosen [`Interface`](crate::Interface).
    Waiter(WErr),

    /// Indicates that the coprocessor itself reported a fault.
    ///
    /// Call [`Coprocessor::coprocessor_fault_msg`](Coprocessor::coprocessor_fault_msg)
    /// to get an error string from the chip, and then
    /// [`Coprocessor::recover_from_fault`](Coprocessor::recover_from_fault).
    ///
    /// The coprocessor typically runs asynchronously from the host processor,
    /// and so a fault error may be returned from some later method call than
    /// the one which caused the fault.
    Fault,

    /// A wait exceeded its poll limit.
    Timeout,

    /// A single command was larger than the whole FIFO.
    Oversize,

    /// An address or length didn't meet the alignment the command requires.
    Unaligned,

    /// A flash operation didn't reach the expected flash state.
    Flash(FlashError),
}

impl<IErr, WErr> core::fmt::Display for Error<IErr, WErr>
where
    IErr: core::fmt::Debug,
    WErr: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Error::Interface(err) => write!(f, "interface error: {:?}", err),
            Error::Waiter(err) => write!(f, "error while waiting for FIFO space: {:?}", err),
            Error::Fault => write!(f, "coprocessor fault"),
            Error::Timeout => write!(f, "timed out waiting for the coprocessor"),
            Error::Oversize => write!(f, "command is larger than the command FIFO"),
            Error::Unaligned => write!(f, "misaligned address or length"),
            Error::Flash(err) => write!(f, "flash error: {}", err),
        }
    }
}

impl<IErr, WErr> From<FlashError> for Error<IErr, WErr> {
    fn from(err: FlashError) -> Self {
        Error::Flash(err)
    }
}

/// Represents a coprocessor fault message retrieved from the chip.
#[derive(Debug, Clone)]
pub struct FaultMessage<R: crate::memory::CommandErrMem>(R::RawMessage);

impl<R: crate::memory::CommandErrMem> FaultMessage<R> {
    fn new(raw: R::RawMessage) -> Self {
        Self(raw)
    }

    pub fn as_bytes<'a>(&'a self) -> &'a [u8] {
        self.0.as_bytes()
    }
}

#[doc(hidden)]
pub trait FaultMessageRaw: core::fmt::Debug + Clone {
    fn new() -> Self;
    fn as_bytes<'a>(&'a self) -> &'a [u8];
    fn as_storage_bytes<'a>(&'a mut self) -> &'a mut [u8];
}

impl FaultMessageRaw for [u8; 128] {
    fn new() -> Self {
        [0; 128]
    }

    fn as_bytes<'a>(&'a self) -> &'a [u8] {
        // The message is null-terminated, unless it fills the whole buffer.
        let all = &self[..];
        match all.iter().position(|b| *b == 0) {
            Some(i) => &all[0..i],
            None => all,
        }
    }

    fn as_storage_bytes<'a>(&'a mut self) -> &'a mut [u8] {
        &mut self[..]
    }
}

// This type is used to create a zero-cost token representing codepaths in
// the Coprocessor type where the stream is stopped, to help ensure correct
// discipline around which functions expect to be called with the stream
// deactivated.
pub(crate) struct StoppedStream;
