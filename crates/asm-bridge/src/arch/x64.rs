//! x86-64 backend
//!
//! Entry from native code pushes rbx, r12-r15, then the glue word and an
//! alignment pad above the entry frame header. The return address is
//! pushed by the `call` itself and is not part of the measured sequence.

use super::{ArchBackend, FrameCompletion, Reg, TargetArch};

/// rax
pub const RAX: Reg = Reg(0);
/// rcx
pub const RCX: Reg = Reg(1);
/// rdx
pub const RDX: Reg = Reg(2);
/// rbx
pub const RBX: Reg = Reg(3);
/// rsi
pub const RSI: Reg = Reg(6);
/// rdi
pub const RDI: Reg = Reg(7);
/// r8
pub const R8: Reg = Reg(8);
/// r9
pub const R9: Reg = Reg(9);
/// r10
pub const R10: Reg = Reg(10);
/// r11
pub const R11: Reg = Reg(11);
/// r12
pub const R12: Reg = Reg(12);
/// r13
pub const R13: Reg = Reg(13);
/// r14
pub const R14: Reg = Reg(14);
/// r15
pub const R15: Reg = Reg(15);

const NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

const CALLEE_SAVED: [Reg; 5] = [RBX, R12, R13, R14, R15];
const PRESERVE_MOST: [Reg; 8] = [RDI, RSI, RDX, RCX, R8, R9, R10, RAX];
const BARRIER_SPILLS: [Reg; 2] = [R12, R13];

/// Slots from the first callee save to the end of the entry header
pub const CPP_TO_ASM_INTERP_SLOTS: usize = CALLEE_SAVED.len() + 2 + 4;
/// Slots popped after the entry header
pub const ASM_INTERP_TO_CPP_SLOTS: usize = 2 + CALLEE_SAVED.len();

/// x86-64
#[derive(Debug, Clone, Copy, Default)]
pub struct X64Backend;

impl ArchBackend for X64Backend {
    fn target(&self) -> TargetArch {
        TargetArch::X64
    }

    fn register_count(&self) -> usize {
        NAMES.len()
    }

    fn register_name(&self, reg: Reg) -> &'static str {
        NAMES.get(reg.0 as usize).copied().unwrap_or("?")
    }

    fn callee_saved(&self) -> &'static [Reg] {
        &CALLEE_SAVED
    }

    fn link_register(&self) -> Option<Reg> {
        None
    }

    fn preserve_most_saved(&self) -> &'static [Reg] {
        &PRESERVE_MOST
    }

    fn barrier_scratch(&self) -> Reg {
        R11
    }

    fn barrier_spills(&self) -> &'static [Reg] {
        &BARRIER_SPILLS
    }

    fn glue_in_entry_frame(&self) -> bool {
        false
    }

    fn frame_completion(&self) -> FrameCompletion {
        FrameCompletion {
            cpp_to_asm_interp: CPP_TO_ASM_INTERP_SLOTS,
            asm_interp_to_cpp: ASM_INTERP_TO_CPP_SLOTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_is_not_preserved() {
        let arch = X64Backend;
        assert!(!arch.preserve_most_saved().contains(&arch.barrier_scratch()));
        assert_eq!(arch.register_name(R11), "r11");
    }

    #[test]
    fn test_entry_is_even_with_return_address() {
        // The call pushes one return address slot on top of the sequence.
        assert_eq!((CPP_TO_ASM_INTERP_SLOTS + 1) % 2, 0);
    }
}
