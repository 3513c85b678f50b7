//! Frame layout catalog
//!
//! Slot offsets are in words relative to the frame handle `H`; negative
//! offsets are below the handle (pushed later), positive ones above it
//! (pushed earlier, usually by the caller).
//!
//! # Interpreted frame
//!
//! ```text
//!            +--------------------------+
//!            |        fp (saved sp)     | ─┐
//!            +--------------------------+  │
//!            |    [argc]  (have-extra)  |  │
//!            |    undefined padding     |  │  pushed by the
//!            |    arg N-1 .. arg 0      |  │  argument adapter
//!            |    this        (have-this)  │
//!            |    new.target  (have-nt) |  │
//!            |    call target (have-func)  │
//!            |    vregs (undefined)     |  │
//!  H ──────► +--------------------------+ ─┘  frame handle
//!   H - 1    |    frame type            |
//!   H - 2    |    prev sp               |
//!   H - 3    |    pc                    |  BASELINE_PC_MARKER in baseline code
//!   H - 4    |    fp                    |
//!   H - 5    |    jump size after call  |
//!   H - 6    |    env                   |
//!   H - 7    |    acc                   |
//!   H - 8    |    this                  |
//!   H - 9    |    function              |
//!            +--------------------------+
//! ```
//!
//! # Entry and bridge frames
//!
//! ```text
//!            |  native callee saves     |  arch specific
//!  H ──────► |  saved fp                |
//!   H - 1    |  frame type              |
//!   H - 2    |  prev (glue.leave_frame) |
//!   H - 3    |  pc (0)                  |
//!            |  [glue]                  |  aarch64 only
//! ```
//!
//! # Builtin frames
//!
//! ```text
//!            |  args ...                |                     BuiltinWithArgv:
//!            |  this                    |            H ──────► | saved fp     |
//!            |  new.target              |             H - 1    | frame type   |
//!            |  call target             |             H - 2    | num args     |
//!   H + 2    |  argc (+3)               |                      | args (N) ... |
//!   H + 1    |  thread                  |  ◄─ call info        | this         |
//!  H ──────► |  saved fp                |                      | new.target   |
//!   H - 1    |  frame type              |                      | call target  |
//!                                                              | argc (+3)    |
//!                                                              | thread       | ◄─ call info
//! ```
//!
//! The stack-overflow variant reuses the builtin-with-argv header and
//! replaces the payload with `argc = 0` and three `undefined` placeholders.

use crate::frames::FrameType;

/// Value written into an interpreted frame's pc slot while the frame
/// executes baseline code. Walkers must test for it before treating the pc
/// slot as a bytecode address.
pub const BASELINE_PC_MARKER: u64 = u64::MAX;

/// Interpreted frame
pub struct InterpretedFrameSlots;

impl InterpretedFrameSlots {
    /// Frame type
    pub const TYPE: isize = -1;
    /// Previous frame handle
    pub const PREV_SP: isize = -2;
    /// Bytecode pc
    pub const PC: isize = -3;
    /// Stack pointer before the argument pushes
    pub const FP: isize = -4;
    /// Jump size applied to pc on return
    pub const JUMP_SIZE: isize = -5;
    /// Lexical environment
    pub const ENV: isize = -6;
    /// Accumulator
    pub const ACC: isize = -7;
    /// `this`
    pub const THIS: isize = -8;
    /// Function
    pub const FUNCTION: isize = -9;
    /// Frame state slots below the handle
    pub const STATE_SLOTS: usize = 9;
    /// Fixed this / new.target / call target slots
    pub const CALL_THIS_SLOTS: usize = 3;
}

/// Entry, bridge and asm-interpreter entry frames
pub struct EntryFrameSlots;

impl EntryFrameSlots {
    /// Native frame pointer saved on entry
    pub const SAVED_FP: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// Previous managed frame, captured from the glue leave frame
    pub const PREV: isize = -2;
    /// Always zero
    pub const PC: isize = -3;
    /// Header slots including the saved fp
    pub const HEADER_SLOTS: usize = 4;
}

/// Builtin and builtin-entry frames
pub struct BuiltinFrameSlots;

impl BuiltinFrameSlots {
    /// Saved frame pointer, doubling as the previous frame link
    pub const PREV: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// Call info begins just above the handle
    pub const CALL_INFO: isize = 1;
    /// Header slots
    pub const HEADER_SLOTS: usize = 2;
}

/// Builtin-with-argv frame
pub struct BuiltinWithArgvFrameSlots;

impl BuiltinWithArgvFrameSlots {
    /// Saved frame pointer
    pub const PREV: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// Number of arguments pushed below
    pub const NUM_ARGS: isize = -2;
    /// First argument slot (highest address)
    pub const ARGS_TOP: isize = -3;
    /// Slots between the handle and the call info for `n` arguments
    pub const fn payload_slots(num_args: usize) -> usize {
        // type, num args, args, this, new.target, call target
        1 + 1 + num_args + 3
    }
}

/// Stack-overflow variant of the builtin-with-argv frame
pub struct StackOverflowFrameSlots;

impl StackOverflowFrameSlots {
    /// Saved frame pointer
    pub const PREV: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// Always zero
    pub const ARGC: isize = -2;
    /// Placeholder `this`
    pub const THIS: isize = -3;
    /// Placeholder `new.target`
    pub const NEW_TARGET: isize = -4;
    /// Placeholder call target
    pub const CALL_TARGET: isize = -5;
    /// Slots below the handle
    pub const BODY_SLOTS: usize = 5;
}

/// Leave, leave-with-argv and builtin-call-leave frames
pub struct LeaveFrameSlots;

impl LeaveFrameSlots {
    /// Saved frame pointer
    pub const PREV: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// Runtime stub id or builtin id
    pub const CALLEE_ID: isize = -2;
    /// Argument count
    pub const ARGC: isize = -3;
    /// Inline arguments (leave) or argv pointer (leave-with-argv)
    pub const ARGS: isize = -4;
    /// Fixed slots below the handle
    pub const BODY_SLOTS: usize = 3;
}

/// Optimized-entry frame
pub struct OptimizedEntryFrameSlots;

impl OptimizedEntryFrameSlots {
    /// Native frame pointer saved on entry
    pub const SAVED_FP: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// Previous managed frame, captured from the glue leave frame
    pub const PREV: isize = -2;
    /// Header slots including the saved fp
    pub const HEADER_SLOTS: usize = 3;
}

/// Optimized, optimized-JS-function, args-config and asm-bridge frames
pub struct OptimizedFrameSlots;

impl OptimizedFrameSlots {
    /// Saved frame pointer
    pub const PREV: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// First slot below the header
    pub const BODY: isize = -2;
    /// Header slots
    pub const HEADER_SLOTS: usize = 2;
}

/// Optimized-unfold-argv frame
pub struct UnfoldArgvFrameSlots;

impl UnfoldArgvFrameSlots {
    /// Saved frame pointer
    pub const PREV: isize = 0;
    /// Frame type
    pub const TYPE: isize = -1;
    /// Argument count taken from the argv
    pub const ARGC: isize = -2;
    /// Original argv pointer
    pub const ARGV: isize = -3;
}

/// Call info block handed to builtins, ascending from its base address
pub struct RuntimeCallInfoSlots;

impl RuntimeCallInfoSlots {
    /// Thread marker
    pub const THREAD: isize = 0;
    /// Argument count including the three mandatory values
    pub const ARGC: isize = 1;
    /// Call target
    pub const CALL_TARGET: isize = 2;
    /// new.target
    pub const NEW_TARGET: isize = 3;
    /// this
    pub const THIS: isize = 4;
    /// First argument
    pub const ARGS: isize = 5;
    /// Call target, new.target and this
    pub const NUM_MANDATORY_ARGS: usize = 3;
}

/// Argument block pushed for optimized code, ascending from its base
pub struct OptimizedArgBlockSlots;

impl OptimizedArgBlockSlots {
    /// Actual argument count
    pub const ARGC: isize = 0;
    /// Argument slots pushed (including padding)
    pub const ARG_SLOTS: isize = 1;
    /// Function
    pub const FUNC: isize = 2;
    /// new.target
    pub const NEW_TARGET: isize = 3;
    /// this
    pub const THIS: isize = 4;
    /// First argument
    pub const ARGS: isize = 5;
    /// Slots before the arguments
    pub const HEADER_SLOTS: usize = 5;
}

// Every frame keeps its type tag directly below the handle, and frames that
// record a pc keep it at the same offset, so the walker needs no per-type
// special cases for either.
const _: () = assert!(InterpretedFrameSlots::TYPE == -1);
const _: () = assert!(EntryFrameSlots::TYPE == -1);
const _: () = assert!(BuiltinFrameSlots::TYPE == -1);
const _: () = assert!(BuiltinWithArgvFrameSlots::TYPE == -1);
const _: () = assert!(StackOverflowFrameSlots::TYPE == -1);
const _: () = assert!(LeaveFrameSlots::TYPE == -1);
const _: () = assert!(OptimizedEntryFrameSlots::TYPE == -1);
const _: () = assert!(OptimizedFrameSlots::TYPE == -1);
const _: () = assert!(UnfoldArgvFrameSlots::TYPE == -1);
const _: () = assert!(EntryFrameSlots::PC == InterpretedFrameSlots::PC);
const _: () = assert!(EntryFrameSlots::PREV == InterpretedFrameSlots::PREV_SP);
const _: () = assert!(OptimizedEntryFrameSlots::PREV == EntryFrameSlots::PREV);
const _: () = assert!(
    InterpretedFrameSlots::FUNCTION == -(InterpretedFrameSlots::STATE_SLOTS as isize)
);
// The overflow variant is written over a builtin-with-argv header in place.
const _: () = assert!(StackOverflowFrameSlots::PREV == BuiltinWithArgvFrameSlots::PREV);
const _: () = assert!(StackOverflowFrameSlots::ARGC == BuiltinWithArgvFrameSlots::NUM_ARGS);
const _: () = assert!(
    StackOverflowFrameSlots::CALL_TARGET
        == -(StackOverflowFrameSlots::BODY_SLOTS as isize)
);
const _: () = assert!(
    RuntimeCallInfoSlots::ARGS
        == RuntimeCallInfoSlots::CALL_TARGET + RuntimeCallInfoSlots::NUM_MANDATORY_ARGS as isize
);
const _: () = assert!(
    OptimizedArgBlockSlots::ARGS == OptimizedArgBlockSlots::HEADER_SLOTS as isize
);

/// Which slots of a frame the GC must treat as roots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSlots {
    /// No tagged values
    None,
    /// Fixed offsets below the handle
    Fixed(&'static [isize]),
    /// Interpreted frame state plus every register up to the saved fp
    Interpreted,
    /// Call info block above the handle
    CallInfoAbove,
    /// Arguments and mandatory values below the handle (builtin-with-argv)
    ArgvBelow,
    /// Inline runtime arguments below the handle
    LeaveArgs,
    /// Optimized argument block above the handle
    ArgBlockAbove,
}

/// Catalog entry for one frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Frame type
    pub frame_type: FrameType,
    /// Offset of the previous-frame link
    pub prev_slot: isize,
    /// Offset of the pc slot, if the frame records one
    pub pc_slot: Option<isize>,
    /// Slots written by the frame's push routine at or below the handle
    pub header_slots: usize,
    /// GC roots
    pub roots: RootSlots,
}

const INTERPRETED_ROOTS: &[isize] = &[
    InterpretedFrameSlots::ENV,
    InterpretedFrameSlots::ACC,
    InterpretedFrameSlots::THIS,
    InterpretedFrameSlots::FUNCTION,
];

const STACK_OVERFLOW_ROOTS: &[isize] = &[
    StackOverflowFrameSlots::THIS,
    StackOverflowFrameSlots::NEW_TARGET,
    StackOverflowFrameSlots::CALL_TARGET,
];

const fn entry(frame_type: FrameType, prev_slot: isize, header_slots: usize) -> FrameLayout {
    FrameLayout {
        frame_type,
        prev_slot,
        pc_slot: None,
        header_slots,
        roots: RootSlots::None,
    }
}

/// Catalog entry for a frame type
pub const fn layout_of(frame_type: FrameType) -> FrameLayout {
    match frame_type {
        FrameType::Interpreted => FrameLayout {
            frame_type,
            prev_slot: InterpretedFrameSlots::PREV_SP,
            pc_slot: Some(InterpretedFrameSlots::PC),
            header_slots: InterpretedFrameSlots::STATE_SLOTS,
            roots: RootSlots::Interpreted,
        },
        FrameType::InterpretedEntry | FrameType::InterpretedBridge => FrameLayout {
            frame_type,
            prev_slot: EntryFrameSlots::PREV,
            pc_slot: Some(EntryFrameSlots::PC),
            header_slots: EntryFrameSlots::HEADER_SLOTS,
            roots: RootSlots::None,
        },
        FrameType::OptimizedEntry => entry(
            frame_type,
            OptimizedEntryFrameSlots::PREV,
            OptimizedEntryFrameSlots::HEADER_SLOTS,
        ),
        FrameType::Builtin | FrameType::BuiltinEntry => FrameLayout {
            frame_type,
            prev_slot: BuiltinFrameSlots::PREV,
            pc_slot: None,
            header_slots: BuiltinFrameSlots::HEADER_SLOTS,
            roots: RootSlots::CallInfoAbove,
        },
        FrameType::BuiltinWithArgv => FrameLayout {
            frame_type,
            prev_slot: BuiltinWithArgvFrameSlots::PREV,
            pc_slot: None,
            header_slots: 2,
            roots: RootSlots::ArgvBelow,
        },
        FrameType::BuiltinWithArgvStackOverflow => FrameLayout {
            frame_type,
            prev_slot: StackOverflowFrameSlots::PREV,
            pc_slot: None,
            header_slots: 1 + StackOverflowFrameSlots::BODY_SLOTS,
            roots: RootSlots::Fixed(STACK_OVERFLOW_ROOTS),
        },
        FrameType::Leave => FrameLayout {
            frame_type,
            prev_slot: LeaveFrameSlots::PREV,
            pc_slot: None,
            header_slots: 1 + LeaveFrameSlots::BODY_SLOTS,
            roots: RootSlots::LeaveArgs,
        },
        FrameType::BuiltinCallLeave => FrameLayout {
            frame_type,
            prev_slot: LeaveFrameSlots::PREV,
            pc_slot: None,
            header_slots: 3,
            roots: RootSlots::CallInfoAbove,
        },
        FrameType::LeaveWithArgv => FrameLayout {
            frame_type,
            prev_slot: LeaveFrameSlots::PREV,
            pc_slot: None,
            header_slots: 2 + LeaveFrameSlots::BODY_SLOTS,
            roots: RootSlots::None,
        },
        FrameType::OptimizedJsFunction => FrameLayout {
            frame_type,
            prev_slot: OptimizedFrameSlots::PREV,
            pc_slot: None,
            header_slots: OptimizedFrameSlots::HEADER_SLOTS,
            roots: RootSlots::ArgBlockAbove,
        },
        FrameType::OptimizedUnfoldArgv => entry(frame_type, UnfoldArgvFrameSlots::PREV, 4),
        FrameType::Optimized | FrameType::OptimizedArgsConfig | FrameType::AsmBridge => entry(
            frame_type,
            OptimizedFrameSlots::PREV,
            OptimizedFrameSlots::HEADER_SLOTS,
        ),
    }
}

/// Roots of the interpreted frame's fixed state
pub fn interpreted_state_roots() -> &'static [isize] {
    INTERPRETED_ROOTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_layout() {
        for ty in FrameType::ALL {
            let layout = layout_of(ty);
            assert_eq!(layout.frame_type, ty);
            assert!(layout.header_slots >= 2 || ty == FrameType::BuiltinWithArgv);
            // The link is always at or below the handle.
            assert!(layout.prev_slot <= 0);
        }
    }

    #[test]
    fn test_interpreted_state_is_contiguous() {
        let offsets = [
            InterpretedFrameSlots::TYPE,
            InterpretedFrameSlots::PREV_SP,
            InterpretedFrameSlots::PC,
            InterpretedFrameSlots::FP,
            InterpretedFrameSlots::JUMP_SIZE,
            InterpretedFrameSlots::ENV,
            InterpretedFrameSlots::ACC,
            InterpretedFrameSlots::THIS,
            InterpretedFrameSlots::FUNCTION,
        ];
        for (i, off) in offsets.iter().enumerate() {
            assert_eq!(*off, -(i as isize) - 1);
        }
        assert_eq!(offsets.len(), InterpretedFrameSlots::STATE_SLOTS);
    }

    #[test]
    fn test_builtin_with_argv_payload() {
        assert_eq!(BuiltinWithArgvFrameSlots::payload_slots(0), 5);
        assert_eq!(BuiltinWithArgvFrameSlots::payload_slots(4), 9);
    }

    #[test]
    fn test_only_stack_overflow_frame_has_placeholders() {
        let fixed: Vec<_> = FrameType::ALL
            .iter()
            .filter(|ty| matches!(layout_of(**ty).roots, RootSlots::Fixed(_)))
            .collect();
        assert_eq!(fixed, vec![&FrameType::BuiltinWithArgvStackOverflow]);
    }
}
