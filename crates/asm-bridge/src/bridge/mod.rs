//! Call-path routines
//!
//! [`AsmBridge`] carries one architecture backend and implements every
//! tier transition on top of it. The routines are split by concern:
//!
//! - [`call_mode`]: call modes and frame transition types
//! - [`adapter`]: argument adaptation and checked pushes
//! - [`builders`]: frame push/pop pairs
//! - [`overflow`]: the shared stack-overflow path
//! - [`interpreter`]: interpreted frame construction and bytecode dispatch
//! - [`dispatch`]: callee classification and the dispatch core
//! - [`entry`]: native code entering the interpreter
//! - [`native`]: builtin calls
//! - [`optimized`]: optimized-code calls, runtime calls, preserve-most calls
//! - [`resume`]: returning into, and unwinding, interpreted frames
//! - [`generator`]: generator re-entry
//! - [`deopt`]: rebuilding interpreted frames after deoptimization
//! - [`barrier`]: write-barrier fast path
//!
//! Internally every routine returns [`CallResult`]; only the public ABI
//! entries ([`AsmBridge::asm_interpreter_entry`] and friends) collapse a
//! [`Throw`] into the exception sentinel.

pub mod adapter;
pub mod barrier;
pub mod builders;
pub mod call_mode;
pub mod deopt;
pub mod dispatch;
pub mod entry;
pub mod generator;
pub mod interpreter;
pub mod native;
pub mod optimized;
pub mod overflow;
pub mod resume;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use crate::arch::{check_frame_completion, ArchBackend};
use crate::error::{CallResult, FrameLayoutError, Throw};
use crate::heap::Heap;
use crate::stack::MachineStack;
use crate::value::TaggedValue;

pub use adapter::{AdaptPlan, Argv, StackOverflowTrap};
pub use barrier::BarrierAction;
pub use builders::FrameMark;
pub use call_mode::{FrameTransitionType, JSCallMode};
pub use deopt::{DeoptFrame, DeoptStackContext};
pub use dispatch::CalleeClass;

/// Bridge routines bound to one architecture
#[derive(Clone)]
pub struct AsmBridge {
    arch: Arc<dyn ArchBackend>,
    arg_push_batch: usize,
}

impl AsmBridge {
    /// Bridge for `arch`, after checking the backend's frame completion
    /// constants. Layout drift is a build defect and aborts.
    pub fn new(arch: Arc<dyn ArchBackend>, arg_push_batch: usize) -> Self {
        match Self::try_new(arch, arg_push_batch) {
            Ok(bridge) => bridge,
            Err(e) => fatal(format_args!("{}", e)),
        }
    }

    /// Bridge for `arch`, reporting frame completion drift as an error
    pub fn try_new(
        arch: Arc<dyn ArchBackend>,
        arg_push_batch: usize,
    ) -> Result<Self, FrameLayoutError> {
        check_frame_completion(arch.as_ref())?;
        log::debug!(
            "asm bridge for {:?}, argument batch {}",
            arch.target(),
            arg_push_batch
        );
        Ok(Self {
            arch,
            arg_push_batch: arg_push_batch.max(1),
        })
    }

    /// Architecture backend
    pub fn arch(&self) -> &dyn ArchBackend {
        self.arch.as_ref()
    }

    /// Argument slots copied between two stack-limit checks
    pub fn arg_push_batch(&self) -> usize {
        self.arg_push_batch
    }
}

impl fmt::Debug for AsmBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsmBridge")
            .field("arch", &self.arch.target())
            .field("arg_push_batch", &self.arg_push_batch)
            .finish()
    }
}

/// One JS call: target, receiver, new.target and actual arguments
#[derive(Debug, Clone, Copy)]
pub struct JsCall<'a> {
    /// Callee
    pub call_target: TaggedValue,
    /// Receiver
    pub this: TaggedValue,
    /// new.target
    pub new_target: TaggedValue,
    /// Actual arguments
    pub args: Argv<'a>,
}

impl<'a> JsCall<'a> {
    /// Plain call with an undefined receiver
    pub fn new(call_target: TaggedValue, args: Argv<'a>) -> Self {
        Self {
            call_target,
            this: TaggedValue::undefined(),
            new_target: TaggedValue::undefined(),
            args,
        }
    }

    /// Method call
    pub fn with_this(call_target: TaggedValue, this: TaggedValue, args: Argv<'a>) -> Self {
        Self {
            this,
            ..Self::new(call_target, args)
        }
    }

    /// `new target(...args)` with `this` already allocated
    pub fn construct(call_target: TaggedValue, this: TaggedValue, args: Argv<'a>) -> Self {
        Self {
            call_target,
            this,
            new_target: call_target,
            args,
        }
    }

    /// Actual argument count, honouring a fixed-arity mode
    pub fn actual_argc(&self, mode: JSCallMode, heap: &Heap) -> usize {
        mode.fixed_argc().unwrap_or_else(|| self.args.len(heap))
    }
}

/// Stack and frame pointer to roll back to when a call is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackCheckpoint {
    /// Stack pointer
    pub sp: usize,
    /// Frame pointer
    pub fp: usize,
}

impl StackCheckpoint {
    /// Capture the current registers
    pub fn capture(stack: &MachineStack) -> Self {
        Self {
            sp: stack.sp(),
            fp: stack.fp(),
        }
    }
}

/// Log and abort on a broken runtime invariant
#[cold]
pub(crate) fn fatal(message: fmt::Arguments<'_>) -> ! {
    log::error!("{}", message);
    panic!("{}", message);
}

/// Collapse an internal result into an ABI return value
#[inline]
pub fn to_abi(result: CallResult<TaggedValue>) -> TaggedValue {
    result.unwrap_or_else(|_| TaggedValue::exception())
}

/// Lift an ABI return value into an internal result
#[inline]
pub fn from_abi(value: TaggedValue) -> CallResult<TaggedValue> {
    if value.is_exception() {
        Err(Throw::Pending)
    } else {
        Ok(value)
    }
}
