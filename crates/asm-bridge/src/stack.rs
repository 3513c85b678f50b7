//! Machine stack model
//!
//! A fixed block of 64-bit slots with real, byte-granular addresses. The
//! stack grows toward lower addresses; `sp` points at the last pushed slot
//! and `fp` is the frame-chain register.
//!
//! ```text
//! top (exclusive) ─► ┌───────────────────┐ high addresses
//!                    │ first pushed slot │
//!                    │ ...               │
//!        sp ───────► │ last pushed slot  │
//!                    │ free              │
//!   glue.stack_limit │ - - - - - - - - - │
//!                    │ reserved headroom │
//!   bottom ────────► └───────────────────┘ low addresses
//! ```
//!
//! Pushes never fail: overflow is detected against the glue stack limit by
//! the argument adapter before a variable-length push starts. Running past
//! the physical bottom means a fixed-size push was not covered by the
//! reserved headroom, which is a bug in the bridge.

use crate::defaults::FRAME_SLOT_SIZE;
use crate::value::TaggedValue;

/// Word written into released slots when scrubbing is enabled. It is
/// neither a heap pointer, an int, nor a special value.
pub const STACK_POISON: u64 = 0xDEAD_0000_0000_DEAD;

/// Simulated machine stack
#[derive(Debug)]
pub struct MachineStack {
    memory: Vec<u64>,
    bottom: usize,
    top: usize,
    sp: usize,
    fp: usize,
    scrub_released: bool,
}

impl MachineStack {
    /// Stack of `slots` words ending just below `top`
    pub fn new(top: usize, slots: usize) -> Self {
        let bottom = top - slots * FRAME_SLOT_SIZE;
        Self {
            memory: vec![STACK_POISON; slots],
            bottom,
            top,
            sp: top,
            fp: 0,
            scrub_released: true,
        }
    }

    /// Enable or disable poisoning of released slots
    pub fn set_scrub_released(&mut self, on: bool) {
        self.scrub_released = on;
    }

    /// Lowest valid address
    #[inline]
    pub fn bottom(&self) -> usize {
        self.bottom
    }

    /// One past the highest valid address
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Stack pointer
    #[inline]
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Frame pointer
    #[inline]
    pub fn fp(&self) -> usize {
        self.fp
    }

    /// Set the frame pointer
    #[inline]
    pub fn set_fp(&mut self, fp: usize) {
        self.fp = fp;
    }

    /// Move the stack pointer. Slots released by moving up are scrubbed.
    pub fn set_sp(&mut self, sp: usize) {
        self.check_bounds(sp, "set_sp");
        if self.scrub_released && sp > self.sp {
            let from = self.index(self.sp);
            let to = self.index(sp);
            self.memory[from..to].fill(STACK_POISON);
        }
        self.sp = sp;
    }

    /// Slots in use
    #[inline]
    pub fn depth(&self) -> usize {
        (self.top - self.sp) / FRAME_SLOT_SIZE
    }

    /// Is `addr` a slot of this stack?
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom && addr < self.top && addr % FRAME_SLOT_SIZE == 0
    }

    /// Address `slots` words away from `base` (negative is toward the top of
    /// the frame chain, i.e. lower addresses)
    #[inline]
    pub fn slot_addr(base: usize, slots: isize) -> usize {
        (base as isize + slots * FRAME_SLOT_SIZE as isize) as usize
    }

    #[inline]
    fn index(&self, addr: usize) -> usize {
        (addr - self.bottom) / FRAME_SLOT_SIZE
    }

    fn check_bounds(&self, addr: usize, op: &str) {
        if addr < self.bottom || addr > self.top {
            log::error!(
                "{} at {:#x} outside stack [{:#x}, {:#x})",
                op,
                addr,
                self.bottom,
                self.top
            );
            panic!("machine stack exhausted past reserved headroom at {:#x}", addr);
        }
    }

    /// Push a raw word
    #[inline]
    pub fn push(&mut self, word: u64) {
        let sp = self.sp - FRAME_SLOT_SIZE;
        self.check_bounds(sp, "push");
        let idx = self.index(sp);
        self.memory[idx] = word;
        self.sp = sp;
    }

    /// Push a tagged value
    #[inline]
    pub fn push_value(&mut self, value: TaggedValue) {
        self.push(value.raw());
    }

    /// Pop a raw word
    #[inline]
    pub fn pop(&mut self) -> u64 {
        let word = self.read(self.sp);
        let sp = self.sp + FRAME_SLOT_SIZE;
        self.set_sp(sp);
        word
    }

    /// Move sp down by `count` slots without writing them
    pub fn reserve(&mut self, count: usize) -> usize {
        let sp = self.sp - count * FRAME_SLOT_SIZE;
        self.check_bounds(sp, "reserve");
        self.sp = sp;
        sp
    }

    /// Release `count` slots
    pub fn drop_slots(&mut self, count: usize) {
        let sp = self.sp + count * FRAME_SLOT_SIZE;
        self.set_sp(sp);
    }

    /// Read a slot
    #[inline]
    pub fn read(&self, addr: usize) -> u64 {
        self.check_bounds(addr + FRAME_SLOT_SIZE, "read");
        self.check_bounds(addr, "read");
        self.memory[self.index(addr)]
    }

    /// Read a slot, None outside the stack
    pub fn try_read(&self, addr: usize) -> Option<u64> {
        if self.contains(addr) {
            Some(self.memory[self.index(addr)])
        } else {
            None
        }
    }

    /// Write a slot
    #[inline]
    pub fn write(&mut self, addr: usize, word: u64) {
        self.check_bounds(addr + FRAME_SLOT_SIZE, "write");
        self.check_bounds(addr, "write");
        let idx = self.index(addr);
        self.memory[idx] = word;
    }

    /// Read a tagged value
    #[inline]
    pub fn read_value(&self, addr: usize) -> TaggedValue {
        TaggedValue::from_raw(self.read(addr))
    }

    /// Write a tagged value
    #[inline]
    pub fn write_value(&mut self, addr: usize, value: TaggedValue) {
        self.write(addr, value.raw());
    }

    /// Read the slot `slots` words away from `base`
    #[inline]
    pub fn read_slot(&self, base: usize, slots: isize) -> u64 {
        self.read(Self::slot_addr(base, slots))
    }

    /// Write the slot `slots` words away from `base`
    #[inline]
    pub fn write_slot(&mut self, base: usize, slots: isize, word: u64) {
        self.write(Self::slot_addr(base, slots), word);
    }
}
