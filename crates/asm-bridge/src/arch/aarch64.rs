//! AArch64 backend
//!
//! Entry from native code stores x19-x28 and the link register, then the
//! entry frame header with the glue word as its last slot. `bl` does not
//! push a return address, so the whole sequence keeps sp 16-byte aligned.

use super::{ArchBackend, FrameCompletion, Reg, TargetArch};

/// Intra-procedure-call scratch register x16
pub const X16: Reg = Reg(16);
/// Link register x30
pub const LR: Reg = Reg(30);

const NAMES: [&str; 32] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
    "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26",
    "x27", "x28", "x29", "x30", "sp",
];

const CALLEE_SAVED: [Reg; 10] = [
    Reg(19),
    Reg(20),
    Reg(21),
    Reg(22),
    Reg(23),
    Reg(24),
    Reg(25),
    Reg(26),
    Reg(27),
    Reg(28),
];

const PRESERVE_MOST: [Reg; 17] = [
    Reg(0),
    Reg(1),
    Reg(2),
    Reg(3),
    Reg(4),
    Reg(5),
    Reg(6),
    Reg(7),
    Reg(8),
    Reg(9),
    Reg(10),
    Reg(11),
    Reg(12),
    Reg(13),
    Reg(14),
    Reg(15),
    Reg(17),
];

/// Slots from the first callee save to the end of the entry header
pub const CPP_TO_ASM_INTERP_SLOTS: usize = CALLEE_SAVED.len() + 1 + 4 + 1;
/// Slots popped after the entry header
pub const ASM_INTERP_TO_CPP_SLOTS: usize = 1 + CALLEE_SAVED.len();

/// AArch64
#[derive(Debug, Clone, Copy, Default)]
pub struct AArch64Backend;

impl ArchBackend for AArch64Backend {
    fn target(&self) -> TargetArch {
        TargetArch::AArch64
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
        Some(LR)
    }

    fn preserve_most_saved(&self) -> &'static [Reg] {
        &PRESERVE_MOST
    }

    fn barrier_scratch(&self) -> Reg {
        X16
    }

    fn barrier_spills(&self) -> &'static [Reg] {
        &[]
    }

    fn glue_in_entry_frame(&self) -> bool {
        true
    }

    fn frame_completion(&self) -> FrameCompletion {
        FrameCompletion {
            cpp_to_asm_interp: CPP_TO_ASM_INTERP_SLOTS,
            asm_interp_to_cpp: ASM_INTERP_TO_CPP_SLOTS,
        }
    }
}
