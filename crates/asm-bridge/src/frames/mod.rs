//! Stack frames
//!
//! Every frame is identified by its *handle* `H`: the address the frame
//! chain points at. The frame-type tag always sits in the slot just below
//! the handle (`H - 8`), and the link to the previous frame sits at a fixed
//! per-type offset from `H` (see [`layout`]). Frames of every tier share
//! this shape, so a single walker ([`walker::FrameIterator`]) can visit the
//! whole stack.

pub mod layout;
pub mod walker;

use serde::Serialize;

use crate::stack::MachineStack;
use crate::value::TaggedValue;

pub use layout::{FrameLayout, InterpretedFrameSlots, BASELINE_PC_MARKER};
pub use walker::{FrameInfo, FrameIterator, PcLocation, StackSnapshot};

/// Marker in the upper bits of every frame-type tag. A slot without it is
/// never mistaken for a frame tag.
pub const FRAME_TYPE_MARK: u64 = 0xFA4E_0000_0000_0000;
const FRAME_TYPE_MARK_MASK: u64 = 0xFFFF_0000_0000_0000;

/// Frame type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum FrameType {
    /// Optimized code frame; also used by preserve-most calls
    Optimized = 0x00,
    /// Native code entering optimized code
    OptimizedEntry = 0x01,
    /// Optimized JS function frame
    OptimizedJsFunction = 0x02,
    /// Interpreter calling optimized code, argument block follows
    OptimizedArgsConfig = 0x03,
    /// Optimized call with an argv spread into slots
    OptimizedUnfoldArgv = 0x04,
    /// Optimized code calling a runtime stub
    Leave = 0x10,
    /// Optimized code calling a runtime stub with an argv pointer
    LeaveWithArgv = 0x11,
    /// Optimized code calling a builtin
    BuiltinCallLeave = 0x12,
    /// Bytecode frame
    Interpreted = 0x20,
    /// Native code entering the interpreter
    InterpretedEntry = 0x21,
    /// Native code calling the interpreter, result returned
    InterpretedBridge = 0x22,
    /// Interpreter calling a builtin with a fixed info block
    Builtin = 0x30,
    /// Native code calling a builtin
    BuiltinEntry = 0x31,
    /// Interpreter calling a builtin with an argv
    BuiltinWithArgv = 0x32,
    /// Stack overflow while building a builtin or interpreted frame
    BuiltinWithArgvStackOverflow = 0x33,
    /// Optimized code calling back into the interpreter
    AsmBridge = 0x40,
}

impl FrameType {
    /// Every frame type
    pub const ALL: [FrameType; 16] = [
        FrameType::Optimized,
        FrameType::OptimizedEntry,
        FrameType::OptimizedJsFunction,
        FrameType::OptimizedArgsConfig,
        FrameType::OptimizedUnfoldArgv,
        FrameType::Leave,
        FrameType::LeaveWithArgv,
        FrameType::BuiltinCallLeave,
        FrameType::Interpreted,
        FrameType::InterpretedEntry,
        FrameType::InterpretedBridge,
        FrameType::Builtin,
        FrameType::BuiltinEntry,
        FrameType::BuiltinWithArgv,
        FrameType::BuiltinWithArgvStackOverflow,
        FrameType::AsmBridge,
    ];

    /// Word stored in the type slot
    #[inline]
    pub const fn tag(self) -> u64 {
        FRAME_TYPE_MARK | self as u64
    }

    /// Decode a type slot
    pub fn from_tag(tag: u64) -> Option<FrameType> {
        if tag & FRAME_TYPE_MARK_MASK != FRAME_TYPE_MARK {
            return None;
        }
        let code = tag & !FRAME_TYPE_MARK_MASK;
        FrameType::ALL.iter().copied().find(|t| *t as u64 == code)
    }

    /// Frames that mark a transition out of native code
    pub fn is_entry(self) -> bool {
        matches!(
            self,
            FrameType::InterpretedEntry
                | FrameType::InterpretedBridge
                | FrameType::BuiltinEntry
                | FrameType::OptimizedEntry
        )
    }

    /// Frames built by the interpreter tier
    pub fn is_interpreted(self) -> bool {
        matches!(self, FrameType::Interpreted)
    }

    /// Builtin frames, including the overflow variant
    pub fn is_builtin(self) -> bool {
        matches!(
            self,
            FrameType::Builtin
                | FrameType::BuiltinEntry
                | FrameType::BuiltinWithArgv
                | FrameType::BuiltinWithArgvStackOverflow
        )
    }

    /// Leave frames
    pub fn is_leave(self) -> bool {
        matches!(
            self,
            FrameType::Leave | FrameType::LeaveWithArgv | FrameType::BuiltinCallLeave
        )
    }
}

impl TryFrom<u64> for FrameType {
    type Error = u64;

    fn try_from(tag: u64) -> Result<Self, Self::Error> {
        FrameType::from_tag(tag).ok_or(tag)
    }
}

/// Read-only view of an interpreted frame
#[derive(Clone, Copy)]
pub struct InterpretedFrame<'a> {
    stack: &'a MachineStack,
    handle: usize,
}

impl<'a> InterpretedFrame<'a> {
    /// View the frame whose handle is `handle`. The caller must know the
    /// handle belongs to an interpreted frame.
    pub fn new(stack: &'a MachineStack, handle: usize) -> Self {
        Self { stack, handle }
    }

    /// Frame handle
    pub fn handle(&self) -> usize {
        self.handle
    }

    fn slot(&self, offset: isize) -> u64 {
        self.stack.read_slot(self.handle, offset)
    }

    /// Type tag
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_tag(self.slot(InterpretedFrameSlots::TYPE))
    }

    /// Previous frame handle
    pub fn prev(&self) -> usize {
        self.slot(InterpretedFrameSlots::PREV_SP) as usize
    }

    /// Raw pc slot (may hold the baseline marker)
    pub fn raw_pc(&self) -> u64 {
        self.slot(InterpretedFrameSlots::PC)
    }

    /// Stack pointer before the frame's arguments were pushed
    pub fn fp(&self) -> usize {
        self.slot(InterpretedFrameSlots::FP) as usize
    }

    /// Jump size applied to the pc on return
    pub fn jump_size(&self) -> i64 {
        self.slot(InterpretedFrameSlots::JUMP_SIZE) as i64
    }

    /// Lexical environment
    pub fn env(&self) -> TaggedValue {
        TaggedValue::from_raw(self.slot(InterpretedFrameSlots::ENV))
    }

    /// Accumulator
    pub fn acc(&self) -> TaggedValue {
        TaggedValue::from_raw(self.slot(InterpretedFrameSlots::ACC))
    }

    /// `this`
    pub fn this(&self) -> TaggedValue {
        TaggedValue::from_raw(self.slot(InterpretedFrameSlots::THIS))
    }

    /// Function
    pub fn function(&self) -> TaggedValue {
        TaggedValue::from_raw(self.slot(InterpretedFrameSlots::FUNCTION))
    }

    /// Register slot `index`, counted upward from the handle: local
    /// registers first, then call target / new.target / this, then
    /// arguments, as the callee's call field laid them out.
    pub fn register(&self, index: usize) -> TaggedValue {
        TaggedValue::from_raw(self.stack.read_slot(self.handle, index as isize))
    }

    /// Number of register slots between the handle and the saved fp
    pub fn register_count(&self) -> usize {
        (self.fp() - self.handle) / crate::defaults::FRAME_SLOT_SIZE
    }

    /// All register slots
    pub fn registers(&self) -> Vec<TaggedValue> {
        (0..self.register_count()).map(|i| self.register(i)).collect()
    }
}

impl std::fmt::Debug for InterpretedFrame<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpretedFrame")
            .field("handle", &format_args!("{:#x}", self.handle))
            .field("prev", &format_args!("{:#x}", self.prev()))
            .field("pc", &format_args!("{:#x}", self.raw_pc()))
            .field("acc", &self.acc())
            .field("this", &self.this())
            .field("function", &self.function())
            .finish()
    }
}
