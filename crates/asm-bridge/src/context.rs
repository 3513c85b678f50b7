//! Register state handed across the bridge
//!
//! The interpreter keeps its hot state pinned in machine registers while a
//! bytecode handler runs. Here that state is an explicit value passed to
//! each handler. Builtins and optimized code receive a pointer into the
//! stack where their arguments were laid out.

use crate::frames::layout::{OptimizedArgBlockSlots, RuntimeCallInfoSlots};
use crate::frames::InterpretedFrame;
use crate::stack::MachineStack;
use crate::value::TaggedValue;

/// Pinned interpreter registers at handler entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterContext {
    /// Handle of the executing interpreted frame
    pub sp: usize,
    /// Address of the current instruction
    pub pc: usize,
    /// Constant pool of the executing method
    pub constant_pool: TaggedValue,
    /// Profile type info of the executing function
    pub profile_type_info: TaggedValue,
    /// Accumulator
    pub acc: TaggedValue,
    /// Hotness counter seeded from the method's literal info
    pub hotness_counter: u16,
}

impl InterpreterContext {
    /// View of the executing frame
    pub fn frame<'a>(&self, stack: &'a MachineStack) -> InterpretedFrame<'a> {
        InterpretedFrame::new(stack, self.sp)
    }
}

/// State handed to baseline code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaselineContext {
    /// Handle of the interpreted frame baseline code runs in
    pub sp: usize,
    /// Native offset to resume at; zero is the function entry
    pub native_pc_offset: usize,
    /// Function being executed
    pub function: TaggedValue,
    /// Accumulator
    pub acc: TaggedValue,
}

/// `EcmaRuntimeCallInfo`-style view of a builtin's arguments on the stack:
///
/// ```text
/// base + 5 + i  arg i
/// base + 4      this
/// base + 3      new.target
/// base + 2      call target
/// base + 1      argc (including the three above)
/// base          thread
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCallInfo {
    base: usize,
}

impl RuntimeCallInfo {
    /// View the block at `base`
    pub fn new(base: usize) -> Self {
        Self { base }
    }

    /// Block address
    pub fn base(&self) -> usize {
        self.base
    }

    fn slot(&self, stack: &MachineStack, offset: isize) -> u64 {
        stack.read_slot(self.base, offset)
    }

    /// Thread word
    pub fn thread(&self, stack: &MachineStack) -> u64 {
        self.slot(stack, RuntimeCallInfoSlots::THREAD)
    }

    /// Number of actual arguments
    pub fn num_args(&self, stack: &MachineStack) -> usize {
        let argc = self.slot(stack, RuntimeCallInfoSlots::ARGC) as usize;
        argc.saturating_sub(RuntimeCallInfoSlots::NUM_MANDATORY_ARGS)
    }

    /// Call target
    pub fn call_target(&self, stack: &MachineStack) -> TaggedValue {
        TaggedValue::from_raw(self.slot(stack, RuntimeCallInfoSlots::CALL_TARGET))
    }

    /// new.target
    pub fn new_target(&self, stack: &MachineStack) -> TaggedValue {
        TaggedValue::from_raw(self.slot(stack, RuntimeCallInfoSlots::NEW_TARGET))
    }

    /// this
    pub fn this(&self, stack: &MachineStack) -> TaggedValue {
        TaggedValue::from_raw(self.slot(stack, RuntimeCallInfoSlots::THIS))
    }

    /// Argument `index`, undefined past the end
    pub fn arg(&self, stack: &MachineStack, index: usize) -> TaggedValue {
        if index >= self.num_args(stack) {
            return TaggedValue::undefined();
        }
        TaggedValue::from_raw(self.slot(stack, RuntimeCallInfoSlots::ARGS + index as isize))
    }

    /// All arguments
    pub fn args(&self, stack: &MachineStack) -> Vec<TaggedValue> {
        (0..self.num_args(stack)).map(|i| self.arg(stack, i)).collect()
    }
}

/// View of the argument block optimized code receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizedCallInfo {
    block: usize,
}

impl OptimizedCallInfo {
    /// View the block at `block`
    pub fn new(block: usize) -> Self {
        Self { block }
    }

    /// Block address
    pub fn block(&self) -> usize {
        self.block
    }

    fn slot(&self, stack: &MachineStack, offset: isize) -> u64 {
        stack.read_slot(self.block, offset)
    }

    /// Actual argument count at the call site
    pub fn argc(&self, stack: &MachineStack) -> usize {
        self.slot(stack, OptimizedArgBlockSlots::ARGC) as usize
    }

    /// Argument slots present (declared count after padding, or more)
    pub fn arg_slots(&self, stack: &MachineStack) -> usize {
        self.slot(stack, OptimizedArgBlockSlots::ARG_SLOTS) as usize
    }

    /// Function
    pub fn function(&self, stack: &MachineStack) -> TaggedValue {
        TaggedValue::from_raw(self.slot(stack, OptimizedArgBlockSlots::FUNC))
    }

    /// new.target
    pub fn new_target(&self, stack: &MachineStack) -> TaggedValue {
        TaggedValue::from_raw(self.slot(stack, OptimizedArgBlockSlots::NEW_TARGET))
    }

    /// this
    pub fn this(&self, stack: &MachineStack) -> TaggedValue {
        TaggedValue::from_raw(self.slot(stack, OptimizedArgBlockSlots::THIS))
    }

    /// Argument slot `index`, undefined past the block
    pub fn arg(&self, stack: &MachineStack, index: usize) -> TaggedValue {
        if index >= self.arg_slots(stack) {
            return TaggedValue::undefined();
        }
        TaggedValue::from_raw(self.slot(stack, OptimizedArgBlockSlots::ARGS + index as isize))
    }

    /// Every argument slot
    pub fn args(&self, stack: &MachineStack) -> Vec<TaggedValue> {
        (0..self.arg_slots(stack)).map(|i| self.arg(stack, i)).collect()
    }
}

/// Arguments of a write-barrier slow path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierCall {
    /// Object written to
    pub obj: TaggedValue,
    /// Field offset in bytes
    pub offset: usize,
    /// Value stored
    pub value: TaggedValue,
}
