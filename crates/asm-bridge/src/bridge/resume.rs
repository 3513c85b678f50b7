//! Returning into interpreted frames
//!
//! A returning frame hands its result to the caller's frame and dispatches
//! the caller's next opcode. The caller recorded the size of its call
//! instruction in its jump slot before calling; a non-positive size marks a
//! `new` call whose result still has to be checked:
//!
//! ```text
//!  result         callee kind         caller sees
//!  ─────────────  ──────────────────  ─────────────────────────────
//!  undefined      any                 this
//!  ECMA object    any                 result
//!  other          base / class ctor   this
//!  other          derived ctor        NewObjectRangeThrowException
//! ```

use crate::error::{CallResult, MessageId, Throw};
use crate::frames::layout::InterpretedFrameSlots;
use crate::frames::{FrameType, InterpretedFrame};
use crate::glue::{BytecodeStubId, RuntimeStubId};
use crate::heap::Heap;
use crate::stack::MachineStack;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::interpreter::{frame_bottom, opcode_at};
use super::{fatal, AsmBridge};

/// Value a `new` call produces when the constructor body returned `value`,
/// or `None` when a derived constructor returned a non-object
pub fn construct_result(
    heap: &Heap,
    this: TaggedValue,
    function: TaggedValue,
    value: TaggedValue,
) -> Option<TaggedValue> {
    if value.is_undefined() {
        return Some(this);
    }
    if heap.is_ecma_object(value) {
        return Some(value);
    }
    let base = heap
        .function_method(function)
        .map(|m| m.extra_literal_info.function_kind().is_base_constructor_kind())
        .unwrap_or(true);
    if base {
        Some(this)
    } else {
        None
    }
}

/// Caller's resume point, read before the returning frame is released
#[derive(Debug, Clone, Copy)]
struct ReturnSite {
    caller: usize,
    pc: usize,
    jump_size: i64,
    this: TaggedValue,
    function: TaggedValue,
}

impl ReturnSite {
    fn read(thread: &VmThread, handle: usize) -> Self {
        let frame = InterpretedFrame::new(&thread.stack, handle);
        let caller = frame.prev();
        let caller_type = thread
            .stack
            .try_read(MachineStack::slot_addr(caller, InterpretedFrameSlots::TYPE))
            .and_then(FrameType::from_tag);
        if caller_type != Some(FrameType::Interpreted) {
            fatal(format_args!(
                "frame {:#x} returns into {:?} frame {:#x}",
                handle, caller_type, caller
            ));
        }
        let caller_frame = InterpretedFrame::new(&thread.stack, caller);
        Self {
            caller,
            pc: caller_frame.raw_pc() as usize,
            jump_size: caller_frame.jump_size(),
            this: frame.this(),
            function: frame.function(),
        }
    }

    fn next_pc(&self) -> usize {
        self.pc + self.jump_size.unsigned_abs() as usize
    }
}

impl AsmBridge {
    /// Resolve the value of a `new` call, raising the derived-constructor
    /// TypeError through the runtime
    pub fn resolve_construct_return(
        &self,
        thread: &mut VmThread,
        this: TaggedValue,
        function: TaggedValue,
        value: TaggedValue,
    ) -> CallResult<TaggedValue> {
        match construct_result(&thread.heap, this, function, value) {
            Some(result) => Ok(result),
            None => {
                let id = MessageId::DerivedMustReturnObjectOrUndefined;
                self.call_runtime(thread, RuntimeStubId::ThrowTypeError, &[TaggedValue::int(id as i32)]);
                Err(Throw::TypeError(id))
            }
        }
    }

    /// Pop the returning frame at `handle` and continue its interpreted
    /// caller with `ret`
    pub fn resume_rsp_and_dispatch(
        &self,
        thread: &mut VmThread,
        handle: usize,
        ret: TaggedValue,
    ) -> TaggedValue {
        let site = ReturnSite::read(thread, handle);
        self.leave_interpreted_frame(thread, handle);
        if ret.is_exception() {
            return self.dispatch_in_frame(thread, site.caller, site.pc, ret, true);
        }
        if site.jump_size > 0 {
            return self.dispatch_in_frame(thread, site.caller, site.next_pc(), ret, false);
        }
        match construct_result(&thread.heap, site.this, site.function, ret) {
            Some(value) => self.dispatch_in_frame(thread, site.caller, site.next_pc(), value, false),
            None => {
                log::debug!("derived constructor {:?} returned {:?}", site.function, ret);
                self.dispatch_stub_in_frame(
                    thread,
                    site.caller,
                    site.pc,
                    ret,
                    BytecodeStubId::NewObjectRangeThrowException,
                )
            }
        }
    }

    /// Pop the frame at `handle` and continue its caller past the call with
    /// the popped function in the accumulator
    pub fn resume_rsp_and_rollback(&self, thread: &mut VmThread, handle: usize) -> TaggedValue {
        let site = ReturnSite::read(thread, handle);
        self.leave_interpreted_frame(thread, handle);
        self.dispatch_in_frame(thread, site.caller, site.next_pc(), site.function, false)
    }

    /// Continue at a catch handler in the frame at `handle`. sp comes from
    /// the glue's last fp when the unwinder recorded one.
    pub fn resume_caught_frame_and_dispatch(
        &self,
        thread: &mut VmThread,
        handle: usize,
        pc: usize,
        acc: TaggedValue,
    ) -> TaggedValue {
        let sp = match thread.glue.last_fp {
            0 => frame_bottom(handle),
            last_fp => last_fp,
        };
        let index = opcode_at(&thread.heap, pc);
        self.run_bytecode_handler(thread, handle, sp, pc, acc, index)
    }

    /// Leave the interpreter with `acc` after an uncaught exception
    pub fn resume_uncaught_frame_and_return(
        &self,
        thread: &mut VmThread,
        acc: TaggedValue,
    ) -> TaggedValue {
        if thread.glue.last_fp != 0 {
            thread.stack.set_sp(thread.glue.last_fp);
        }
        acc
    }
}
