//! Optimized code, runtime calls and preserve-most calls
//!
//! Optimized code gets its arguments as one ascending block above an
//! optimized-JS-function frame, padded to the declared count:
//!
//! ```text
//!        │ outer frame       │  optimized-entry / args-config / unfold-argv
//!        ├───────────────────┤
//!        │ undefined padding │
//!        │ arg n-1 .. arg 0  │
//!        │ this              │
//!        │ new.target        │
//!        │ function          │
//!        │ arg slots         │
//!        │ argc              │ ◄─ block (H + 1)
//!  H ──► │ saved fp          │
//!        │ type              │
//! ```
//!
//! Calls out of optimized code go through leave frames, which the walker
//! uses to find the last managed frame below the runtime.

use crate::context::OptimizedCallInfo;
use crate::defaults::MAX_INLINE_RUNTIME_ARGS;
use crate::error::CallResult;
use crate::frames::layout::{LeaveFrameSlots, OptimizedArgBlockSlots};
use crate::frames::FrameType;
use crate::glue::{NativeFnId, OptimizedCodeId, RuntimeStubId};
use crate::stack::MachineStack;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::adapter::{Argv, StackOverflowTrap};
use super::builders::FrameMark;
use super::{fatal, from_abi, AsmBridge, JSCallMode, JsCall, StackCheckpoint};

/// Frame an optimized call is entered through
#[derive(Debug, Clone, Copy)]
enum OuterFrame {
    Entry(FrameMark),
    Linked(FrameMark),
}

impl AsmBridge {
    // ========================================================================
    // Into optimized code
    // ========================================================================

    /// Call optimized code. Calls from native code enter through an
    /// optimized-entry frame, calls from the interpreter through an
    /// args-config frame.
    pub fn call_optimized(
        &self,
        thread: &mut VmThread,
        code: OptimizedCodeId,
        call: &JsCall<'_>,
        mode: JSCallMode,
    ) -> CallResult<TaggedValue> {
        let outer = if mode.is_from_native() {
            OuterFrame::Entry(self.push_optimized_entry_frame(thread))
        } else {
            OuterFrame::Linked(self.push_linked_frame(thread, FrameType::OptimizedArgsConfig))
        };
        let result = self.enter_optimized(thread, code, call, mode);
        match outer {
            OuterFrame::Entry(mark) => self.pop_optimized_entry_frame(thread, mark),
            OuterFrame::Linked(mark) => self.pop_linked_frame(thread, mark),
        }
        result
    }

    /// Call optimized code whose arguments are an argv, recording the argv
    /// in an unfold-argv frame
    pub fn call_optimized_with_unfolded_argv(
        &self,
        thread: &mut VmThread,
        code: OptimizedCodeId,
        call: &JsCall<'_>,
        mode: JSCallMode,
    ) -> CallResult<TaggedValue> {
        let argc = call.actual_argc(mode, &thread.heap);
        let argv = call.args.stack_base().unwrap_or(0);
        let mark = self.push_unfold_argv_frame(thread, argc, argv);
        let result = self.enter_optimized(thread, code, call, mode);
        self.pop_unfold_argv_frame(thread, mark);
        result
    }

    fn enter_optimized(
        &self,
        thread: &mut VmThread,
        code: OptimizedCodeId,
        call: &JsCall<'_>,
        mode: JSCallMode,
    ) -> CallResult<TaggedValue> {
        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let function = call.call_target;
        let actual = call.actual_argc(mode, &thread.heap);
        let declared = thread
            .heap
            .function_method(function)
            .map(|m| m.call_field.declared_num_args())
            .unwrap_or(0);
        let arg_slots = actual.max(declared);
        let this = mode.resolve_this(call);
        let new_target = mode.resolve_new_target(call);

        let pushed = self
            .push_undefined_padding(thread, arg_slots - actual)
            .and_then(|()| self.push_args_from_vector(thread, &call.args, 0, actual))
            .and_then(|()| {
                self.stack_overflow_check(thread, OptimizedArgBlockSlots::HEADER_SLOTS)
            });
        if pushed.is_err() {
            return Err(self.throw_stack_overflow(thread, checkpoint));
        }
        thread.stack.push_value(this);
        thread.stack.push_value(new_target);
        thread.stack.push_value(function);
        thread.stack.push(arg_slots as u64);
        thread.stack.push(actual as u64);
        let block = thread.stack.sp();

        let mark = self.push_linked_frame(thread, FrameType::OptimizedJsFunction);
        debug_assert_eq!(MachineStack::slot_addr(mark.handle, 1), block);
        let Some(entry) = thread.glue.optimized(code) else {
            fatal(format_args!("optimized code {:?} is not registered", code))
        };
        log::trace!(
            "optimized {:?}: {} args in {} slots, block {:#x}",
            code,
            actual,
            arg_slots,
            block
        );
        let result = entry(thread, OptimizedCallInfo::new(block));
        self.pop_linked_frame(thread, mark);
        thread.stack.set_sp(checkpoint.sp);

        let value = from_abi(result)?;
        if mode.is_construct() {
            self.resolve_construct_return(thread, this, function, value)
        } else {
            Ok(value)
        }
    }

    /// Optimized code calling any JS value through an asm-bridge frame
    pub fn call_from_optimized(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        call: &JsCall<'_>,
    ) -> CallResult<TaggedValue> {
        let mark = self.push_linked_frame(thread, FrameType::AsmBridge);
        let result = self.call(thread, mode, call);
        self.pop_linked_frame(thread, mark);
        result
    }

    // ========================================================================
    // Out of optimized code
    // ========================================================================

    /// Call a runtime function with its arguments inline in a leave frame.
    /// Returns the raw result, which may be the exception sentinel.
    pub fn call_runtime(
        &self,
        thread: &mut VmThread,
        id: RuntimeStubId,
        args: &[TaggedValue],
    ) -> TaggedValue {
        debug_assert!(args.len() <= MAX_INLINE_RUNTIME_ARGS);
        let mark = self.push_leave_frame(thread, FrameType::Leave, id.code());
        thread.stack.push(args.len() as u64);
        for arg in args {
            thread.stack.push_value(*arg);
        }
        let h = mark.handle;
        let values: Vec<TaggedValue> = (0..args.len())
            .map(|i| {
                TaggedValue::from_raw(thread.stack.read_slot(h, LeaveFrameSlots::ARGS - i as isize))
            })
            .collect();
        log::trace!("runtime {:?} with {} args", id, values.len());
        let result = self.invoke_runtime_stub(thread, id, &values);
        self.pop_leave_frame(thread, mark);
        result
    }

    /// Call a runtime function with an argv. Arguments already on the
    /// machine stack are passed in place.
    pub fn call_runtime_with_argv(
        &self,
        thread: &mut VmThread,
        id: RuntimeStubId,
        argv: &Argv<'_>,
    ) -> CallResult<TaggedValue> {
        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let argc = argv.len(&thread.heap);
        let base = match argv.stack_base() {
            Some(base) => base,
            None => {
                if self.push_args_from_vector(thread, argv, 0, argc).is_err() {
                    return Err(self.throw_stack_overflow(thread, checkpoint));
                }
                thread.stack.sp()
            }
        };
        let mark = self.push_leave_frame(thread, FrameType::LeaveWithArgv, id.code());
        thread.stack.push(argc as u64);
        thread.stack.push(base as u64);
        let values: Vec<TaggedValue> = (0..argc)
            .map(|i| thread.stack.read_value(MachineStack::slot_addr(base, i as isize)))
            .collect();
        let result = self.invoke_runtime_stub(thread, id, &values);
        self.pop_leave_frame(thread, mark);
        thread.stack.set_sp(checkpoint.sp);
        from_abi(result)
    }

    /// Optimized code calling a builtin: call info first, then a
    /// builtin-call-leave frame below it
    pub fn call_builtin_from_optimized(
        &self,
        thread: &mut VmThread,
        id: NativeFnId,
        call: &JsCall<'_>,
        mode: JSCallMode,
    ) -> CallResult<TaggedValue> {
        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let argc = call.actual_argc(mode, &thread.heap);
        let info = self.push_call_info(
            thread,
            call,
            mode.resolve_this(call),
            mode.resolve_new_target(call),
            argc,
        );
        let info = match info {
            Ok(info) => info,
            Err(StackOverflowTrap) => return Err(self.throw_stack_overflow(thread, checkpoint)),
        };
        let mark = self.push_leave_frame(thread, FrameType::BuiltinCallLeave, u64::from(id.0));
        debug_assert_eq!(MachineStack::slot_addr(mark.handle, 1), info);
        let result = self.invoke_native(thread, id, info);
        self.pop_leave_frame(thread, mark);
        thread.stack.set_sp(checkpoint.sp);
        from_abi(result)
    }

    /// Run `f` under the preserve-most convention: every register the
    /// backend lists is saved in an optimized frame and restored after.
    pub fn preserve_most_call<F>(&self, thread: &mut VmThread, f: F)
    where
        F: FnOnce(&mut VmThread),
    {
        let mark = self.push_linked_frame(thread, FrameType::Optimized);
        let saved = self.arch.preserve_most_saved();
        for reg in saved {
            let value = thread.cpu.get(*reg);
            thread.stack.push(value);
        }
        let pad = saved.len() % 2 == 1;
        if pad {
            thread.stack.push(0);
        }
        let sp = thread.stack.sp();

        f(thread);

        debug_assert_eq!(thread.stack.sp(), sp);
        thread.stack.set_sp(sp);
        if pad {
            thread.stack.pop();
        }
        for reg in saved.iter().rev() {
            let value = thread.stack.pop();
            thread.cpu.set(*reg, value);
        }
        self.pop_linked_frame(thread, mark);
    }
}
