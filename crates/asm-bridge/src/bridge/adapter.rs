//! Argument adaptation
//!
//! The callee's argument area is laid out from the highest address down,
//! so that argument 0 ends up nearest the frame handle:
//!
//! ```text
//! high  ┌──────────────────────┐
//!       │ argc (have-extra)    │
//!       │ undefined padding    │  declared - actual, highest indexes
//!       │ arg n-1              │
//!       │ ...                  │
//!       │ arg 0                │
//!       │ this / new.target /  │  per call-field bits
//!       │ call target          │
//!       │ vregs                │
//!  H ─► ├──────────────────────┤
//!       │ frame state          │
//! low   └──────────────────────┘
//! ```
//!
//! Every variable-length push is preceded by a stack-limit check for the
//! slots it is about to write, in batches of the bridge's push batch. A
//! failed check writes nothing more and reports [`StackOverflowTrap`]; the
//! caller rolls back to its checkpoint and takes the overflow path.

use crate::defaults::FRAME_SLOT_SIZE;
use crate::heap::Heap;
use crate::stack::MachineStack;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::AsmBridge;

/// A stack-limit check failed; nothing past the check was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackOverflowTrap;

/// Where actual arguments are read from
#[derive(Debug, Clone, Copy)]
pub enum Argv<'a> {
    /// Native-side argument vector
    Slice(&'a [TaggedValue]),
    /// `len` values ascending from `base` on the machine stack
    Stack {
        /// Address of argument 0
        base: usize,
        /// Number of arguments
        len: usize,
    },
    /// First `len` elements of a heap tagged array
    Array {
        /// Tagged array
        array: TaggedValue,
        /// Number of elements to use
        len: usize,
    },
}

impl Argv<'static> {
    /// Empty argument list
    pub const EMPTY: Argv<'static> = Argv::Slice(&[]);
}

impl Argv<'_> {
    /// Number of arguments
    pub fn len(&self, heap: &Heap) -> usize {
        match *self {
            Argv::Slice(values) => values.len(),
            Argv::Stack { len, .. } => len,
            Argv::Array { array, len } => {
                len.min(heap.tagged_array(array).map_or(0, |values| values.len()))
            }
        }
    }

    /// No arguments?
    pub fn is_empty(&self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    /// Argument `index`; undefined past the end
    pub fn get(&self, stack: &MachineStack, heap: &Heap, index: usize) -> TaggedValue {
        match *self {
            Argv::Slice(values) => values.get(index).copied().unwrap_or_default(),
            Argv::Stack { base, len } => {
                if index < len {
                    stack.read_value(MachineStack::slot_addr(base, index as isize))
                } else {
                    TaggedValue::undefined()
                }
            }
            Argv::Array { array, len } => {
                if index < len {
                    heap.tagged_array(array)
                        .and_then(|values| values.get(index).copied())
                        .unwrap_or_default()
                } else {
                    TaggedValue::undefined()
                }
            }
        }
    }

    /// Address of the argument vector when it lives on the machine stack
    pub fn stack_base(&self) -> Option<usize> {
        match *self {
            Argv::Stack { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Copy the arguments out
    pub fn to_vec(&self, stack: &MachineStack, heap: &Heap) -> Vec<TaggedValue> {
        (0..self.len(heap)).map(|i| self.get(stack, heap, i)).collect()
    }
}

/// Reconciliation of declared and actual argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptPlan {
    /// Write the actual count above the arguments
    pub store_argc: bool,
    /// Undefined slots for missing declared parameters
    pub padding: usize,
    /// Actual arguments copied, starting at argument 0
    pub copied: usize,
}

impl AdaptPlan {
    /// Plan for a callee declaring `declared` parameters called with
    /// `actual` arguments
    pub fn new(declared: usize, actual: usize, have_extra: bool) -> Self {
        if actual < declared {
            return Self {
                store_argc: have_extra,
                padding: declared - actual,
                copied: actual,
            };
        }
        Self {
            store_argc: have_extra,
            padding: 0,
            copied: if have_extra { actual } else { declared },
        }
    }

    /// Value slots written for parameters
    pub fn value_slots(&self) -> usize {
        self.padding + self.copied
    }

    /// Every slot written, including the stored count
    pub fn total_slots(&self) -> usize {
        self.value_slots() + usize::from(self.store_argc)
    }
}

impl AsmBridge {
    /// Would pushing `count` more slots stay above the stack limit?
    pub fn stack_overflow_check(
        &self,
        thread: &VmThread,
        count: usize,
    ) -> Result<(), StackOverflowTrap> {
        let fits = count
            .checked_mul(FRAME_SLOT_SIZE)
            .and_then(|bytes| thread.stack.sp().checked_sub(bytes))
            .is_some_and(|after| after > thread.glue.stack_limit);
        if fits {
            Ok(())
        } else {
            log::debug!(
                "stack limit check failed: sp {:#x}, {} slots, limit {:#x}",
                thread.stack.sp(),
                count,
                thread.glue.stack_limit
            );
            Err(StackOverflowTrap)
        }
    }

    /// Push `argv[start..start + count]` so that `argv[start]` lands at the
    /// lowest address
    pub fn push_args_from_vector(
        &self,
        thread: &mut VmThread,
        argv: &Argv<'_>,
        start: usize,
        count: usize,
    ) -> Result<(), StackOverflowTrap> {
        let mut remaining = count;
        while remaining > 0 {
            let batch = remaining.min(self.arg_push_batch);
            self.stack_overflow_check(thread, batch)?;
            for _ in 0..batch {
                remaining -= 1;
                let value = argv.get(&thread.stack, &thread.heap, start + remaining);
                thread.stack.push_value(value);
            }
        }
        Ok(())
    }

    /// Push `count` undefined values
    pub fn push_undefined_padding(
        &self,
        thread: &mut VmThread,
        count: usize,
    ) -> Result<(), StackOverflowTrap> {
        let mut remaining = count;
        while remaining > 0 {
            let batch = remaining.min(self.arg_push_batch);
            self.stack_overflow_check(thread, batch)?;
            for _ in 0..batch {
                thread.stack.push_value(TaggedValue::undefined());
            }
            remaining -= batch;
        }
        Ok(())
    }

    /// Push the parameter area described by `plan`
    pub fn push_adapted_args(
        &self,
        thread: &mut VmThread,
        plan: AdaptPlan,
        argv: &Argv<'_>,
        actual: usize,
    ) -> Result<(), StackOverflowTrap> {
        if plan.store_argc {
            // A count past the small-int range can never fit the stack.
            let argc = i32::try_from(actual).map_err(|_| StackOverflowTrap)?;
            self.stack_overflow_check(thread, 1)?;
            thread.stack.push_value(TaggedValue::int(argc));
        }
        self.push_undefined_padding(thread, plan.padding)?;
        self.push_args_from_vector(thread, argv, 0, plan.copied)
    }

    /// Push `count` undefined virtual registers
    pub fn push_vregs(&self, thread: &mut VmThread, count: usize) -> Result<(), StackOverflowTrap> {
        self.push_undefined_padding(thread, count)
    }
}
