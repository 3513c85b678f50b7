//! Interpreted frames and bytecode dispatch
//!
//! `JSCallCommonEntry` builds the callee's frame on top of the caller's
//! stack. With `H` the new frame's handle:
//!
//! ```text
//!        ┌──────────────────┐ ◄─ frame fp (sp before the call)
//!        │ adapted args     │
//!        │ this/nt/func     │
//!        │ vregs            │
//!  H ──► ├──────────────────┤
//!        │ type             │ H-1
//!        │ prev (caller H)  │ H-2
//!        │ pc               │ H-3
//!        │ fp               │ H-4
//!        │ jump size        │ H-5
//!        │ env              │ H-6
//!        │ acc              │ H-7
//!        │ this             │ H-8
//!        │ function         │ H-9  ◄─ sp while the frame executes
//!        └──────────────────┘
//! ```
//!
//! Returning from a frame is O(1): sp comes from the fp slot and fp from
//! the prev slot, whatever the argument count was.

use crate::context::{BaselineContext, InterpreterContext};
use crate::error::{CallResult, NotCallableKind};
use crate::frames::layout::{InterpretedFrameSlots, BASELINE_PC_MARKER};
use crate::frames::{FrameType, InterpretedFrame};
use crate::glue::{BaselineCodeId, BytecodeStubId};
use crate::heap::{CallField, Heap};
use crate::stack::MachineStack;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::adapter::{AdaptPlan, StackOverflowTrap};
use super::{
    fatal, from_abi, AsmBridge, FrameTransitionType, JSCallMode, JsCall, StackCheckpoint,
};

/// Initial contents of an interpreted frame's state block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    /// Executing function
    pub function: TaggedValue,
    /// Receiver
    pub this: TaggedValue,
    /// Lexical environment
    pub env: TaggedValue,
    /// Accumulator
    pub acc: TaggedValue,
    /// Bytecode address
    pub pc: usize,
    /// sp before the frame's first slot; restored on return
    pub fp: usize,
    /// Size of the call instruction the frame is executing
    pub jump_size: i64,
}

/// What a fresh interpreted frame needs from its function
#[derive(Debug, Clone, Copy)]
struct InterpretedCallee {
    call_field: CallField,
    bytecode: usize,
    env: TaggedValue,
}

fn interpreted_callee(heap: &Heap, function: TaggedValue) -> Option<InterpretedCallee> {
    let f = heap.function(function)?;
    let method = heap.method(f.method)?;
    Some(InterpretedCallee {
        call_field: method.call_field,
        bytecode: method.bytecode_base()?,
        env: f.lexical_env,
    })
}

impl AsmBridge {
    // ========================================================================
    // Frame construction
    // ========================================================================

    /// Call an interpreted function: adapt arguments, push the frame and
    /// either enter baseline code or dispatch the first opcode.
    pub fn js_call_common_entry(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        call: &JsCall<'_>,
        transition: FrameTransitionType,
    ) -> CallResult<TaggedValue> {
        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let function = call.call_target;
        let Some(callee) = interpreted_callee(&thread.heap, function) else {
            return Err(self.throw_not_callable(thread, function, NotCallableKind::Generic));
        };
        let call_field = callee.call_field;
        let actual = call.actual_argc(mode, &thread.heap);
        let plan = AdaptPlan::new(call_field.declared_num_args(), actual, call_field.have_extra());
        let this = mode.resolve_this(call);
        let new_target = mode.resolve_new_target(call);

        let pushed = self
            .push_adapted_args(thread, plan, &call.args, actual)
            .and_then(|()| self.push_call_this(thread, call_field, this, new_target, function))
            .and_then(|()| self.push_vregs(thread, call_field.num_vregs()))
            .and_then(|()| self.stack_overflow_check(thread, InterpretedFrameSlots::STATE_SLOTS));
        if pushed.is_err() {
            return Err(self.throw_stack_overflow(thread, checkpoint));
        }

        let handle = self.push_frame_state(
            thread,
            &FrameState {
                function,
                this,
                env: callee.env,
                acc: TaggedValue::hole(),
                pc: callee.bytecode,
                fp: checkpoint.sp,
                jump_size: 0,
            },
        );
        log::trace!(
            "{:?}: frame {:#x}, {} args for {} declared",
            mode,
            handle,
            actual,
            call_field.declared_num_args()
        );
        self.enter_frame(thread, handle, mode, transition)
    }

    /// Push this, new.target and the call target as the call field asks.
    /// The three-slot check runs even when no slot is wanted.
    pub fn push_call_this(
        &self,
        thread: &mut VmThread,
        call_field: CallField,
        this: TaggedValue,
        new_target: TaggedValue,
        function: TaggedValue,
    ) -> Result<(), StackOverflowTrap> {
        self.stack_overflow_check(thread, InterpretedFrameSlots::CALL_THIS_SLOTS)?;
        if !call_field.has_call_type_bits() {
            return Ok(());
        }
        if call_field.have_this() {
            thread.stack.push_value(this);
        }
        if call_field.have_new_target() {
            thread.stack.push_value(new_target);
        }
        if call_field.have_func() {
            thread.stack.push_value(function);
        }
        Ok(())
    }

    /// Write the state block; the type tag and prev link go first. Returns
    /// the frame handle. The caller has already checked for room.
    pub fn push_frame_state(&self, thread: &mut VmThread, state: &FrameState) -> usize {
        let handle = thread.stack.sp();
        let prev = thread.stack.fp();
        thread.stack.push(FrameType::Interpreted.tag());
        thread.stack.push(prev as u64);
        thread.stack.push(state.pc as u64);
        thread.stack.push(state.fp as u64);
        thread.stack.push(state.jump_size as u64);
        thread.stack.push_value(state.env);
        thread.stack.push_value(state.acc);
        thread.stack.push_value(state.this);
        thread.stack.push_value(state.function);
        handle
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a freshly pushed frame to completion and pop it
    pub(crate) fn enter_frame(
        &self,
        thread: &mut VmThread,
        handle: usize,
        mode: JSCallMode,
        transition: FrameTransitionType,
    ) -> CallResult<TaggedValue> {
        let function = InterpretedFrame::new(&thread.stack, handle).function();
        let baseline = if transition.checks_baseline() {
            installed_baseline(&thread.heap, function)
        } else {
            None
        };
        let result = match baseline {
            Some(code) => {
                self.call_baseline_in_frame(thread, handle, code, 0, TaggedValue::hole())
            }
            None => {
                let pc = InterpretedFrame::new(&thread.stack, handle).raw_pc() as usize;
                self.dispatch_in_frame(thread, handle, pc, TaggedValue::hole(), false)
            }
        };
        self.finish_frame(thread, handle, mode, result)
    }

    /// Pop a finished frame and resolve a constructor's return value
    pub(crate) fn finish_frame(
        &self,
        thread: &mut VmThread,
        handle: usize,
        mode: JSCallMode,
        result: TaggedValue,
    ) -> CallResult<TaggedValue> {
        let frame = InterpretedFrame::new(&thread.stack, handle);
        let (this, function) = (frame.this(), frame.function());
        self.leave_interpreted_frame(thread, handle);
        let value = from_abi(result)?;
        if mode.is_construct() {
            self.resolve_construct_return(thread, this, function, value)
        } else {
            Ok(value)
        }
    }

    /// Load the pinned registers for the frame at `handle` and run the
    /// handler for the opcode at `pc`, or the exception handler stub.
    /// The frame stays on the stack.
    pub fn dispatch_in_frame(
        &self,
        thread: &mut VmThread,
        handle: usize,
        pc: usize,
        acc: TaggedValue,
        has_exception: bool,
    ) -> TaggedValue {
        let index = if has_exception {
            BytecodeStubId::ExceptionHandler as usize
        } else {
            opcode_at(&thread.heap, pc)
        };
        let sp = frame_bottom(handle);
        self.run_bytecode_handler(thread, handle, sp, pc, acc, index)
    }

    /// Run a bytecode stub instead of the opcode at `pc`
    pub fn dispatch_stub_in_frame(
        &self,
        thread: &mut VmThread,
        handle: usize,
        pc: usize,
        acc: TaggedValue,
        stub: BytecodeStubId,
    ) -> TaggedValue {
        let sp = frame_bottom(handle);
        self.run_bytecode_handler(thread, handle, sp, pc, acc, stub as usize)
    }

    /// Pin the registers for the frame at `handle` with sp at `sp`, then
    /// jump through the bytecode table at `index`
    pub(crate) fn run_bytecode_handler(
        &self,
        thread: &mut VmThread,
        handle: usize,
        sp: usize,
        pc: usize,
        acc: TaggedValue,
        index: usize,
    ) -> TaggedValue {
        thread.stack.set_sp(sp);
        thread.stack.set_fp(handle);
        thread
            .stack
            .write_slot(handle, InterpretedFrameSlots::PC, pc as u64);

        let function = InterpretedFrame::new(&thread.stack, handle).function();
        let context = self.interpreter_context(&thread.heap, function, handle, pc, acc);
        let Some(handler) = thread.glue.bytecode_handler(index) else {
            fatal(format_args!("no bytecode handler at index {}", index))
        };
        log::trace!("dispatch {:#04x} at pc {:#x} in frame {:#x}", index, pc, handle);
        handler(thread, context)
    }

    /// Enter baseline code for the frame at `handle`. The pc slot gets the
    /// baseline marker first.
    pub fn call_baseline_in_frame(
        &self,
        thread: &mut VmThread,
        handle: usize,
        code: BaselineCodeId,
        native_pc_offset: usize,
        acc: TaggedValue,
    ) -> TaggedValue {
        thread
            .stack
            .write_slot(handle, InterpretedFrameSlots::PC, BASELINE_PC_MARKER);
        thread.stack.set_fp(handle);
        let function = InterpretedFrame::new(&thread.stack, handle).function();
        let Some(entry) = thread.glue.baseline(code) else {
            fatal(format_args!("baseline code {:?} is not registered", code))
        };
        log::trace!("frame {:#x} enters baseline code {:?}", handle, code);
        entry(
            thread,
            BaselineContext {
                sp: handle,
                native_pc_offset,
                function,
                acc,
            },
        )
    }

    /// Pop an interpreted frame: sp from its fp slot, fp from its prev slot
    pub fn leave_interpreted_frame(&self, thread: &mut VmThread, handle: usize) {
        let frame = InterpretedFrame::new(&thread.stack, handle);
        let (sp, prev) = (frame.fp(), frame.prev());
        thread.stack.set_sp(sp);
        thread.stack.set_fp(prev);
    }

    fn interpreter_context(
        &self,
        heap: &Heap,
        function: TaggedValue,
        handle: usize,
        pc: usize,
        acc: TaggedValue,
    ) -> InterpreterContext {
        let f = heap.function(function);
        let method = f.and_then(|f| heap.method(f.method));
        let profile_type_info = f
            .and_then(|f| heap.profile_cell_value(f.raw_profile_type_info))
            .unwrap_or_default();
        InterpreterContext {
            sp: handle,
            pc,
            constant_pool: method.map(|m| m.constant_pool).unwrap_or_default(),
            profile_type_info,
            acc,
            hotness_counter: method.map(|m| m.hotness_counter()).unwrap_or(0),
        }
    }
}

/// Lowest slot of the frame state block
#[inline]
pub(crate) fn frame_bottom(handle: usize) -> usize {
    MachineStack::slot_addr(handle, -(InterpretedFrameSlots::STATE_SLOTS as isize))
}

pub(crate) fn opcode_at(heap: &Heap, pc: usize) -> usize {
    match heap.read_bytecode(pc) {
        Some(opcode) => opcode as usize,
        None => fatal(format_args!("pc {:#x} is outside every bytecode array", pc)),
    }
}

/// Baseline entry of `function` if real code is installed. The field is
/// read once: undefined means none, hole means compiling.
pub(crate) fn installed_baseline(heap: &Heap, function: TaggedValue) -> Option<BaselineCodeId> {
    let baseline_code = heap.function(function)?.baseline_code;
    if baseline_code.is_undefined() || baseline_code.is_hole() {
        return None;
    }
    heap.machine_code(baseline_code).map(|code| code.entry)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bridge::Argv;
    use crate::heap::{
        ExtraLiteralInfo, FunctionKind, HClass, JsFunction, MachineCode, Method, MethodCode,
    };

    const OP_RETURN_ARG0: u8 = 0x01;

    fn install_return_arg0(thread: &mut VmThread) {
        thread.glue.set_bytecode_handler(
            OP_RETURN_ARG0,
            Arc::new(|thread: &mut VmThread, ctx: InterpreterContext| {
                let frame = ctx.frame(&thread.stack);
                frame.register(0)
            }),
        );
    }

    fn function(thread: &mut VmThread, declared: u32, vregs: u32) -> TaggedValue {
        let pc = thread.heap.load_bytecode(&[OP_RETURN_ARG0]);
        let method = thread.heap.new_method(Method {
            call_field: CallField::new(declared, vregs),
            extra_literal_info: ExtraLiteralInfo::new(FunctionKind::NormalFunction, None),
            code: MethodCode::Bytecode(pc),
            constant_pool: TaggedValue::undefined(),
            literal_info: 5,
        });
        thread
            .heap
            .new_function(JsFunction::new(method), HClass::function())
    }

    #[test]
    fn test_frame_state_layout() {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        let f = function(&mut thread, 0, 0);
        let sp = thread.stack.sp();
        let handle = bridge.push_frame_state(
            &mut thread,
            &FrameState {
                function: f,
                this: TaggedValue::null(),
                env: TaggedValue::int(1),
                acc: TaggedValue::int(2),
                pc: 0x4000,
                fp: sp,
                jump_size: -3,
            },
        );
        let frame = InterpretedFrame::new(&thread.stack, handle);
        assert_eq!(frame.frame_type(), Some(FrameType::Interpreted));
        assert_eq!(frame.fp(), sp);
        assert_eq!(frame.raw_pc(), 0x4000);
        assert_eq!(frame.jump_size(), -3);
        assert_eq!(frame.env(), TaggedValue::int(1));
        assert_eq!(frame.acc(), TaggedValue::int(2));
        assert_eq!(frame.this(), TaggedValue::null());
        assert_eq!(frame.function(), f);
        assert_eq!(thread.stack.sp(), MachineStack::slot_addr(handle, -9));
    }

    #[test]
    fn test_common_entry_runs_and_unwinds() {
        let mut thread = VmThread::with_defaults();
        install_return_arg0(&mut thread);
        let bridge = thread.bridge();
        let f = function(&mut thread, 1, 0);
        let before = StackCheckpoint::capture(&thread.stack);
        let args = [TaggedValue::int(42)];
        let result = bridge.js_call_common_entry(
            &mut thread,
            JSCallMode::CallArg1,
            &JsCall::new(f, Argv::Slice(&args)),
            FrameTransitionType::OtherToOther,
        );
        assert_eq!(result, Ok(TaggedValue::int(42)));
        assert_eq!(StackCheckpoint::capture(&thread.stack), before);
    }

    #[test]
    fn test_hotness_seeded_from_literal_info() {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        thread.glue.set_bytecode_handler(
            OP_RETURN_ARG0,
            Arc::new(|_thread: &mut VmThread, ctx: InterpreterContext| {
                assert!(ctx.acc.is_hole());
                TaggedValue::int(ctx.hotness_counter as i32)
            }),
        );
        let f = function(&mut thread, 0, 0);
        let result = bridge.js_call_common_entry(
            &mut thread,
            JSCallMode::CallArg0,
            &JsCall::new(f, Argv::EMPTY),
            FrameTransitionType::OtherToOther,
        );
        assert_eq!(result, Ok(TaggedValue::int(5)));
    }

    #[test]
    fn test_baseline_code_is_entered_with_marker() {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        let code = thread.glue.register_baseline(Arc::new(
            |thread: &mut VmThread, ctx: BaselineContext| {
                let frame = InterpretedFrame::new(&thread.stack, ctx.sp);
                assert_eq!(frame.raw_pc(), BASELINE_PC_MARKER);
                assert_eq!(ctx.native_pc_offset, 0);
                TaggedValue::int(9)
            },
        ));
        let f = function(&mut thread, 0, 0);
        let machine_code = thread.heap.new_machine_code(MachineCode { entry: code });
        if let Some(func) = thread.heap.function_mut(f) {
            func.baseline_code = machine_code;
        }
        let call = JsCall::new(f, Argv::EMPTY);
        let result = bridge.js_call_common_entry(
            &mut thread,
            JSCallMode::CallArg0,
            &call,
            FrameTransitionType::OtherToBaselineCheck,
        );
        assert_eq!(result, Ok(TaggedValue::int(9)));
    }

    #[test]
    fn test_compiling_baseline_falls_back_to_dispatch() {
        let mut thread = VmThread::with_defaults();
        install_return_arg0(&mut thread);
        let f = function(&mut thread, 1, 0);
        if let Some(func) = thread.heap.function_mut(f) {
            func.baseline_code = TaggedValue::hole();
        }
        assert_eq!(installed_baseline(&thread.heap, f), None);
        let bridge = thread.bridge();
        let args = [TaggedValue::int(3)];
        let result = bridge.js_call_common_entry(
            &mut thread,
            JSCallMode::CallArg1,
            &JsCall::new(f, Argv::Slice(&args)),
            FrameTransitionType::OtherToBaselineCheck,
        );
        assert_eq!(result, Ok(TaggedValue::int(3)));
    }
}
