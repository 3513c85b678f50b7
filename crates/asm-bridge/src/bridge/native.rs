//! Builtin calls
//!
//! A builtin receives a pointer to a call info block (thread, argc, call
//! target, new.target, this, arguments, ascending). Two frame shapes carry
//! it. The fixed shape puts the block above the frame handle:
//!
//! ```text
//!        │ arg n-1 .. arg 0  │
//!        │ this              │
//!        │ new.target        │
//!        │ call target       │
//!        │ argc + 3          │
//!        │ thread            │ ◄─ call info (H + 1)
//!  H ──► │ saved fp          │
//!        │ type              │
//! ```
//!
//! The argv shape writes its header first, so the frame is walkable while
//! an unbounded argument list is copied, and the block ends up below the
//! handle at the new sp.
//!
//! Teardown is O(1) in the argument count: sp returns to the checkpoint
//! taken before the first push.

use crate::context::RuntimeCallInfo;
use crate::error::CallResult;
use crate::frames::FrameType;
use crate::glue::NativeFnId;
use crate::stack::MachineStack;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::adapter::StackOverflowTrap;
use super::dispatch::is_new_call;
use super::{fatal, from_abi, AsmBridge, JSCallMode, JsCall, StackCheckpoint};

/// Slots of a call info block other than the arguments
const CALL_INFO_FIXED_SLOTS: usize = 5;

impl AsmBridge {
    /// Call a builtin through a builtin or builtin-entry frame
    pub fn call_native(
        &self,
        thread: &mut VmThread,
        frame_type: FrameType,
        id: NativeFnId,
        call: &JsCall<'_>,
        mode: JSCallMode,
    ) -> CallResult<TaggedValue> {
        debug_assert!(matches!(frame_type, FrameType::Builtin | FrameType::BuiltinEntry));
        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let info = match self.push_call_info(
            thread,
            call,
            mode.resolve_this(call),
            mode.resolve_new_target(call),
            call.actual_argc(mode, &thread.heap),
        ) {
            Ok(info) => info,
            Err(StackOverflowTrap) => return Err(self.throw_stack_overflow(thread, checkpoint)),
        };
        let mark = self.push_builtin_frame(thread, frame_type);
        debug_assert_eq!(MachineStack::slot_addr(mark.handle, 1), info);
        let result = self.invoke_native(thread, id, info);
        self.pop_builtin_frame(thread, mark);
        thread.stack.set_sp(checkpoint.sp);
        from_abi(result)
    }

    /// Call a builtin through a builtin-with-argv frame. `new` forms pass
    /// the call target as new.target when none was given.
    pub fn call_native_with_argv(
        &self,
        thread: &mut VmThread,
        id: NativeFnId,
        call: &JsCall<'_>,
        mode: JSCallMode,
    ) -> CallResult<TaggedValue> {
        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let argc = call.actual_argc(mode, &thread.heap);
        let new_target = if !is_new_call(mode, call) {
            TaggedValue::undefined()
        } else if call.new_target.is_undefined() {
            call.call_target
        } else {
            call.new_target
        };

        let mark = self.push_builtin_frame(thread, FrameType::BuiltinWithArgv);
        thread.stack.push(argc as u64);
        let info = self.push_call_info(thread, call, mode.resolve_this(call), new_target, argc);
        let info = match info {
            Ok(info) => info,
            Err(StackOverflowTrap) => {
                let throw = self.throw_stack_overflow(thread, checkpoint);
                thread.glue.leave_frame = mark.saved_leave_frame;
                return Err(throw);
            }
        };
        self.complete_builtin_frame(thread, &mark);
        let result = self.invoke_native(thread, id, info);
        self.pop_builtin_frame(thread, mark);
        thread.stack.set_sp(checkpoint.sp);
        from_abi(result)
    }

    /// Push arguments (reversed) and the fixed part of a call info block;
    /// returns the block's base
    pub(crate) fn push_call_info(
        &self,
        thread: &mut VmThread,
        call: &JsCall<'_>,
        this: TaggedValue,
        new_target: TaggedValue,
        argc: usize,
    ) -> Result<usize, StackOverflowTrap> {
        self.push_args_from_vector(thread, &call.args, 0, argc)?;
        self.stack_overflow_check(thread, CALL_INFO_FIXED_SLOTS)?;
        thread.stack.push_value(this);
        thread.stack.push_value(new_target);
        thread.stack.push_value(call.call_target);
        thread.stack.push((argc + 3) as u64);
        let thread_word = thread.thread_word();
        thread.stack.push(thread_word);
        Ok(thread.stack.sp())
    }

    /// Jump to a builtin with its call info block
    pub(crate) fn invoke_native(
        &self,
        thread: &mut VmThread,
        id: NativeFnId,
        info: usize,
    ) -> TaggedValue {
        let Some(native) = thread.glue.native(id) else {
            fatal(format_args!("builtin {:?} is not registered", id))
        };
        log::trace!("builtin {:?}, call info at {:#x}", id, info);
        native(thread, RuntimeCallInfo::new(info))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::bridge::Argv;
    use crate::error::Throw;
    use crate::frames::walker::walk;

    #[derive(Debug, Default, Clone)]
    struct Seen {
        frame: Option<FrameType>,
        handle: usize,
        leave_frame: usize,
        info: usize,
        this: TaggedValue,
        new_target: TaggedValue,
        target: TaggedValue,
        args: Vec<TaggedValue>,
    }

    fn recording_native(thread: &mut VmThread) -> (NativeFnId, Arc<Mutex<Seen>>) {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let record = Arc::clone(&seen);
        let id = thread.glue.register_native(Arc::new(
            move |thread: &mut VmThread, info: RuntimeCallInfo| {
                let frames = walk(&thread.stack).unwrap();
                *record.lock() = Seen {
                    frame: Some(frames[0].frame_type),
                    handle: frames[0].handle,
                    leave_frame: thread.glue.leave_frame,
                    info: info.base(),
                    this: info.this(&thread.stack),
                    new_target: info.new_target(&thread.stack),
                    target: info.call_target(&thread.stack),
                    args: info.args(&thread.stack),
                };
                TaggedValue::int(info.num_args(&thread.stack) as i32)
            },
        ));
        (id, seen)
    }

    fn registers(thread: &VmThread) -> (usize, usize, usize) {
        (thread.stack.sp(), thread.stack.fp(), thread.glue.leave_frame)
    }

    #[test]
    fn test_fixed_frame_puts_call_info_above_handle() {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        let (id, seen) = recording_native(&mut thread);
        let target = thread.heap.new_object(Some(id));
        let args = [TaggedValue::int(1), TaggedValue::int(2)];
        let before = registers(&thread);
        let call = JsCall::new(target, Argv::Slice(&args));
        let out = bridge.call_native(&mut thread, FrameType::Builtin, id, &call, JSCallMode::CallArgs2);
        assert_eq!(out, Ok(TaggedValue::int(2)));
        assert_eq!(registers(&thread), before);

        let seen = seen.lock().clone();
        assert_eq!(seen.frame, Some(FrameType::Builtin));
        assert_eq!(seen.info, MachineStack::slot_addr(seen.handle, 1));
        assert_eq!(seen.leave_frame, seen.handle);
        assert_eq!(seen.target, target);
        assert_eq!(seen.this, TaggedValue::undefined());
        assert_eq!(seen.args, args.to_vec());
    }

    #[test]
    fn test_argv_frame_synthesizes_new_target() {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        let (id, seen) = recording_native(&mut thread);
        let target = thread.heap.new_object(Some(id));
        let args = [TaggedValue::int(7)];
        let before = registers(&thread);
        let call = JsCall {
            new_target: TaggedValue::undefined(),
            ..JsCall::construct(target, TaggedValue::null(), Argv::Slice(&args))
        };
        let out = bridge.call_native_with_argv(
            &mut thread,
            id,
            &call,
            JSCallMode::CallConstructorWithArgv,
        );
        assert_eq!(out, Ok(TaggedValue::int(1)));
        assert_eq!(registers(&thread), before);

        let seen = seen.lock().clone();
        assert_eq!(seen.frame, Some(FrameType::BuiltinWithArgv));
        assert_eq!(seen.new_target, target);
        assert_eq!(seen.this, TaggedValue::null());
        assert_eq!(seen.args, vec![TaggedValue::int(7)]);
        assert!(seen.info < seen.handle);
    }

    #[test]
    fn test_argv_frame_plain_call_has_undefined_new_target() {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        let (id, seen) = recording_native(&mut thread);
        let target = thread.heap.new_object(Some(id));
        let call = JsCall::with_this(target, TaggedValue::int(4), Argv::EMPTY);
        let out = bridge.call_native_with_argv(&mut thread, id, &call, JSCallMode::CallThisWithArgv);
        assert_eq!(out, Ok(TaggedValue::int(0)));
        assert_eq!(seen.lock().new_target, TaggedValue::undefined());
        assert_eq!(seen.lock().this, TaggedValue::int(4));
    }

    #[test]
    fn test_argv_overflow_restores_registers() {
        let mut thread = crate::bridge::testing::thread();
        let bridge = thread.bridge();
        let (id, _) = recording_native(&mut thread);
        let target = thread.heap.new_object(Some(id));
        thread.glue.stack_limit = thread.stack.sp() - 12 * crate::defaults::FRAME_SLOT_SIZE;
        let args: Vec<_> = (0..32).map(TaggedValue::int).collect();
        let before = registers(&thread);
        let call = JsCall::with_this(target, TaggedValue::undefined(), Argv::Slice(&args));
        let out = bridge.call_native_with_argv(&mut thread, id, &call, JSCallMode::CallThisWithArgv);
        assert_eq!(out, Err(Throw::StackOverflow));
        assert_eq!(registers(&thread), before);
    }

    #[test]
    fn test_exception_sentinel_becomes_pending() {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        let id = thread.glue.register_native(Arc::new(
            |_: &mut VmThread, _: RuntimeCallInfo| TaggedValue::exception(),
        ));
        let target = thread.heap.new_object(Some(id));
        let call = JsCall::new(target, Argv::EMPTY);
        let out =
            bridge.call_native(&mut thread, FrameType::BuiltinEntry, id, &call, JSCallMode::CallEntry);
        assert_eq!(out, Err(Throw::Pending));
    }
}
