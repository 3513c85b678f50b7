//! Stack overflow path
//!
//! Every checked push routes a failed check here. The partially built
//! frame is discarded by resetting sp to the caller's checkpoint, and a
//! stack-overflow builtin frame is written in its place so the walker sees
//! a well-formed chain while the runtime raises the RangeError:
//!
//! ```text
//!  checkpoint sp ─► ┌──────────────────┐
//!                   │ prev fp          │ ◄─ H, glue.leave_frame
//!                   │ type (overflow)  │
//!                   │ argc = 0         │
//!                   │ this             │
//!                   │ new.target       │
//!                   │ call target      │
//!                   └──────────────────┘
//! ```

use crate::error::Throw;
use crate::frames::FrameType;
use crate::glue::RuntimeStubId;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::{fatal, AsmBridge, StackCheckpoint};

impl AsmBridge {
    /// Abandon the frame under construction and raise a stack overflow.
    /// On return sp and fp equal the checkpoint and the exception is
    /// pending in the runtime.
    pub fn throw_stack_overflow(&self, thread: &mut VmThread, checkpoint: StackCheckpoint) -> Throw {
        thread.stack.set_sp(checkpoint.sp);
        thread.stack.set_fp(checkpoint.fp);
        let saved_leave_frame = thread.glue.leave_frame;

        thread.stack.push(checkpoint.fp as u64);
        let handle = thread.stack.sp();
        thread.glue.leave_frame = handle;
        thread.stack.push(FrameType::BuiltinWithArgvStackOverflow.tag());
        thread.stack.push(0);
        for _ in 0..3 {
            thread.stack.push_value(TaggedValue::undefined());
        }
        thread.stack.set_fp(handle);
        log::debug!(
            "stack overflow: frame at {:#x}, limit {:#x}",
            handle,
            thread.glue.stack_limit
        );

        self.invoke_runtime_stub(thread, RuntimeStubId::ThrowStackOverflowException, &[]);

        thread.stack.set_sp(handle);
        let saved_fp = thread.stack.pop() as usize;
        thread.stack.set_fp(saved_fp);
        thread.glue.leave_frame = saved_leave_frame;
        debug_assert_eq!(thread.stack.sp(), checkpoint.sp);
        Throw::StackOverflow
    }

    /// Call a runtime stub directly, without a frame of its own.
    /// A missing stub is a runtime setup bug.
    pub(crate) fn invoke_runtime_stub(
        &self,
        thread: &mut VmThread,
        id: RuntimeStubId,
        args: &[TaggedValue],
    ) -> TaggedValue {
        match thread.glue.runtime_stub(id) {
            Some(stub) => stub(thread, args),
            None => fatal(format_args!("runtime stub {:?} is not installed", id)),
        }
    }
}
