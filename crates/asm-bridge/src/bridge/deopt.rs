//! Rebuilding interpreted frames after deoptimization
//!
//! The deoptimizer hands over a flattened description of the inlined
//! frames, outermost first. Each one becomes a real interpreted frame
//! linked to the previous one, the first linked to whatever frame was
//! current when deoptimization started:
//!
//! ```text
//!   caller ◄── prev ── frame 0 ◄── prev ── frame 1 ◄── ... ── frame k-1
//!                      (outermost)                            (innermost)
//! ```
//!
//! Execution resumes in the innermost frame, in baseline code when the
//! function has some installed and otherwise in the interpreter. Each
//! outer frame then picks up the inner frame's result as if its call had
//! returned normally.

use crate::frames::layout::InterpretedFrameSlots;
use crate::glue::RuntimeStubId;
use crate::heap::Method;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::adapter::Argv;
use super::interpreter::{installed_baseline, FrameState};
use super::{fatal, to_abi, AsmBridge, StackCheckpoint};

/// One logical frame to rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeoptFrame {
    /// Function the frame executes
    pub function: TaggedValue,
    /// Resume point, relative to the function's bytecode
    pub bytecode_offset: u32,
    /// Accumulator
    pub acc: TaggedValue,
    /// Lexical environment
    pub env: TaggedValue,
    /// Receiver
    pub this: TaggedValue,
    /// Register file, register 0 first
    pub registers: Vec<TaggedValue>,
    /// Size of the call instruction at the resume point, for outer frames
    /// that are waiting on an inlined callee
    pub jump_size: i64,
}

/// Deoptimizer output: `inline_depth` frames, outermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeoptStackContext {
    /// Number of frames to rebuild
    pub inline_depth: usize,
    /// Frame descriptions
    pub frames: Vec<DeoptFrame>,
    /// Resume the innermost frame in its exception handler
    pub has_pending_exception: bool,
}

impl AsmBridge {
    /// Rebuild the frames described by `context` and run them to
    /// completion. Returns the outermost frame's result or the exception
    /// sentinel.
    pub fn resume_after_deopt(
        &self,
        thread: &mut VmThread,
        context: &DeoptStackContext,
    ) -> TaggedValue {
        let depth = context.inline_depth;
        if depth == 0 || context.frames.len() != depth {
            fatal(format_args!(
                "deopt context claims {} frames but describes {}",
                depth,
                context.frames.len()
            ));
        }
        log::debug!(
            "deopt: rebuilding {} frames above {:#x}",
            depth,
            thread.stack.fp()
        );

        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let mut handles = Vec::with_capacity(depth);
        for frame in &context.frames[..depth] {
            match self.rebuild_frame(thread, frame) {
                Some(handle) => handles.push(handle),
                None => return to_abi(Err(self.throw_stack_overflow(thread, checkpoint))),
            }
        }

        let innermost = &context.frames[depth - 1];
        let handle = handles[depth - 1];
        let pc = self.frame_pc(thread, innermost);
        let baseline = installed_baseline(&thread.heap, innermost.function);
        let mut result = match baseline {
            Some(code) if !context.has_pending_exception => {
                // The runtime searches the method's bytecode range with the
                // absolute pc, so it travels as a raw word.
                let offset = self.invoke_runtime_stub(
                    thread,
                    RuntimeStubId::GetNativePcOfstForBaseline,
                    &[innermost.function, TaggedValue::from_raw(pc as u64)],
                );
                let native_pc_offset = offset.as_int().unwrap_or(0).max(0) as usize;
                log::debug!(
                    "deopt: innermost frame {:#x} enters baseline at {:#x}",
                    handle,
                    native_pc_offset
                );
                self.call_baseline_in_frame(thread, handle, code, native_pc_offset, innermost.acc)
            }
            _ => self.dispatch_in_frame(
                thread,
                handle,
                pc,
                innermost.acc,
                context.has_pending_exception,
            ),
        };

        for handle in handles[1..].iter().rev() {
            result = self.resume_rsp_and_dispatch(thread, *handle, result);
        }
        self.leave_interpreted_frame(thread, handles[0]);
        debug_assert_eq!(thread.stack.sp(), checkpoint.sp);
        result
    }

    /// Push one frame's registers and state block and make it current.
    /// `None` on stack overflow.
    fn rebuild_frame(&self, thread: &mut VmThread, frame: &DeoptFrame) -> Option<usize> {
        let fp = thread.stack.sp();
        let count = frame.registers.len();
        self.push_args_from_vector(thread, &Argv::Slice(&frame.registers), 0, count)
            .and_then(|()| self.stack_overflow_check(thread, InterpretedFrameSlots::STATE_SLOTS))
            .ok()?;
        let pc = self.frame_pc(thread, frame);
        let handle = self.push_frame_state(
            thread,
            &FrameState {
                function: frame.function,
                this: frame.this,
                env: frame.env,
                acc: frame.acc,
                pc,
                fp,
                jump_size: frame.jump_size,
            },
        );
        thread.stack.set_fp(handle);
        Some(handle)
    }

    fn frame_pc(&self, thread: &VmThread, frame: &DeoptFrame) -> usize {
        match thread
            .heap
            .function_method(frame.function)
            .and_then(Method::bytecode_base)
        {
            Some(base) => base + frame.bytecode_offset as usize,
            None => fatal(format_args!(
                "deopt frame for {:?} has no bytecode",
                frame.function
            )),
        }
    }
}
