//! Architecture backends
//!
//! The call algorithms are written once against [`ArchBackend`]; a backend
//! only decides what the native side of a transition looks like: which
//! registers are callee-saved, where the glue word is kept in an entry
//! frame, which registers a preserve-most call saves, and how many slots
//! the entry push/pop sequences span.

pub mod aarch64;
pub mod x64;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::FrameLayoutError;
use crate::frames::layout::EntryFrameSlots;
use crate::frames::FrameType;
use crate::stack::MachineStack;

pub use aarch64::AArch64Backend;
pub use x64::X64Backend;

/// Target instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetArch {
    /// x86-64
    X64,
    /// 64-bit ARM
    AArch64,
}

impl TargetArch {
    /// Architecture of the host
    pub fn host() -> Self {
        if cfg!(target_arch = "aarch64") {
            TargetArch::AArch64
        } else {
            TargetArch::X64
        }
    }

    /// Backend for this architecture
    pub fn backend(self) -> Arc<dyn ArchBackend> {
        match self {
            TargetArch::X64 => Arc::new(X64Backend),
            TargetArch::AArch64 => Arc::new(AArch64Backend),
        }
    }
}

impl Default for TargetArch {
    fn default() -> Self {
        Self::host()
    }
}

/// General-purpose register number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u8);

/// General-purpose register file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    regs: Vec<u64>,
}

impl CpuState {
    /// Zeroed register file
    pub fn new(count: usize) -> Self {
        Self {
            regs: vec![0; count],
        }
    }

    /// Read a register
    #[inline]
    pub fn get(&self, reg: Reg) -> u64 {
        self.regs[reg.0 as usize]
    }

    /// Write a register
    #[inline]
    pub fn set(&mut self, reg: Reg, value: u64) {
        self.regs[reg.0 as usize] = value;
    }

    /// Number of registers
    pub fn len(&self) -> usize {
        self.regs.len()
    }

    /// No registers?
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }
}

/// Slot counts the frame walker assumes for the entry sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCompletion {
    /// Slots pushed from the first callee save to the end of the entry frame
    pub cpp_to_asm_interp: usize,
    /// Slots released by the native epilogue after the entry header is popped
    pub asm_interp_to_cpp: usize,
}

/// Native side of the calling convention for one instruction set
pub trait ArchBackend: Send + Sync + fmt::Debug {
    /// Architecture
    fn target(&self) -> TargetArch;

    /// Number of general-purpose registers
    fn register_count(&self) -> usize;

    /// Assembly name of a register
    fn register_name(&self, reg: Reg) -> &'static str;

    /// Registers saved when native code enters the bridge
    fn callee_saved(&self) -> &'static [Reg];

    /// Return address register pushed on entry, if the call does not push it
    fn link_register(&self) -> Option<Reg>;

    /// Registers a preserve-most call saves and restores
    fn preserve_most_saved(&self) -> &'static [Reg];

    /// The one register the write barrier fast path may clobber
    fn barrier_scratch(&self) -> Reg;

    /// Registers the shared barrier spills around its bitset update
    fn barrier_spills(&self) -> &'static [Reg];

    /// Is the glue word stored inside the entry frame?
    fn glue_in_entry_frame(&self) -> bool;

    /// Constants the walker was written against
    fn frame_completion(&self) -> FrameCompletion;

    /// Save native callee-saved state before an entry frame header
    fn push_native_prologue(&self, stack: &mut MachineStack, cpu: &CpuState, glue_word: u64) {
        for reg in self.callee_saved() {
            stack.push(cpu.get(*reg));
        }
        if let Some(lr) = self.link_register() {
            stack.push(cpu.get(lr));
        }
        if !self.glue_in_entry_frame() {
            stack.push(glue_word);
            // Alignment pad
            stack.push(0);
        }
    }

    /// Append the arch-specific tail of an entry frame header
    fn push_entry_tail(&self, stack: &mut MachineStack, glue_word: u64) {
        if self.glue_in_entry_frame() {
            stack.push(glue_word);
        }
    }

    /// Restore native state saved by [`ArchBackend::push_native_prologue`]
    fn pop_native_epilogue(&self, stack: &mut MachineStack, cpu: &mut CpuState) {
        if !self.glue_in_entry_frame() {
            stack.pop();
            stack.pop();
        }
        if let Some(lr) = self.link_register() {
            let v = stack.pop();
            cpu.set(lr, v);
        }
        for reg in self.callee_saved().iter().rev() {
            let v = stack.pop();
            cpu.set(*reg, v);
        }
    }
}

/// Run the entry push/pop sequences on a scratch stack and compare the
/// measured distances with the backend's constants.
pub fn check_frame_completion(arch: &dyn ArchBackend) -> Result<(), FrameLayoutError> {
    let mut stack = MachineStack::new(0x1000_0000, 256);
    let mut cpu = CpuState::new(arch.register_count());
    let expected = arch.frame_completion();

    let begin = stack.sp();
    arch.push_native_prologue(&mut stack, &cpu, 0x5157);
    let prev_fp = stack.fp();
    stack.push(prev_fp as u64);
    let handle = stack.sp();
    stack.push(FrameType::InterpretedEntry.tag());
    stack.push(0);
    stack.push(0);
    arch.push_entry_tail(&mut stack, 0x5157);
    let pushed = (begin - stack.sp()) / crate::defaults::FRAME_SLOT_SIZE;
    if pushed != expected.cpp_to_asm_interp {
        return Err(FrameLayoutError {
            frame: "AsmInterpreterEntry",
            constant: "CPP_TO_ASM_INTERP_SLOTS",
            expected: expected.cpp_to_asm_interp,
            measured: pushed,
        });
    }
    let header_end = MachineStack::slot_addr(handle, EntryFrameSlots::SAVED_FP + 1);
    stack.set_sp(header_end);
    let epilogue_begin = stack.sp();
    arch.pop_native_epilogue(&mut stack, &mut cpu);
    let popped = (stack.sp() - epilogue_begin) / crate::defaults::FRAME_SLOT_SIZE;
    if popped != expected.asm_interp_to_cpp || stack.sp() != begin {
        return Err(FrameLayoutError {
            frame: "AsmInterpreterEntry",
            constant: "ASM_INTERP_TO_CPP_SLOTS",
            expected: expected.asm_interp_to_cpp,
            measured: popped,
        });
    }
    Ok(())
}
