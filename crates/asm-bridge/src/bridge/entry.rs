//! Entry points called by the runtime
//!
//! Native code enters the bridge in one of two ways. The interpreter entry
//! pushes an interpreted-entry frame and calls with `CallEntry`; the
//! getter, setter and container helpers push an interpreted-bridge frame
//! and call with a fixed mode. Both return the callee's value in a register,
//! with the exception sentinel standing in for a thrown error.

use crate::error::CallResult;
use crate::frames::layout::InterpretedFrameSlots;
use crate::frames::FrameType;
use crate::stack::MachineStack;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::adapter::Argv;
use super::{to_abi, AsmBridge, FrameTransitionType, JSCallMode, JsCall};

impl AsmBridge {
    /// Enter the interpreter from native code. A non-undefined new.target
    /// makes this a construct call.
    pub fn asm_interpreter_entry(
        &self,
        thread: &mut VmThread,
        call_target: TaggedValue,
        this: TaggedValue,
        new_target: TaggedValue,
        args: &[TaggedValue],
    ) -> TaggedValue {
        let mark = self.push_entry_frame(thread, FrameType::InterpretedEntry);
        let call = JsCall {
            call_target,
            this,
            new_target,
            args: Argv::Slice(args),
        };
        let result = self.call(thread, JSCallMode::CallEntry, &call);
        self.pop_entry_frame(thread, mark);
        if let Err(throw) = &result {
            log::debug!("interpreter entry {:?} threw {:?}", call_target, throw);
        }
        to_abi(result)
    }

    fn bridge_call(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        call: &JsCall<'_>,
        transition: FrameTransitionType,
    ) -> TaggedValue {
        let mark = self.push_entry_frame(thread, FrameType::InterpretedBridge);
        let result = self.call_with_transition(thread, mode, call, transition);
        self.pop_entry_frame(thread, mark);
        to_abi(result)
    }

    // ========================================================================
    // Accessors and container callbacks
    // ========================================================================

    /// Call a getter with its receiver
    pub fn call_getter(
        &self,
        thread: &mut VmThread,
        getter: TaggedValue,
        receiver: TaggedValue,
    ) -> TaggedValue {
        let call = JsCall::with_this(getter, receiver, Argv::EMPTY);
        self.bridge_call(thread, JSCallMode::CallGetter, &call, FrameTransitionType::OtherToOther)
    }

    /// [`AsmBridge::call_getter`], entering baseline code if installed
    pub fn call_getter_to_baseline(
        &self,
        thread: &mut VmThread,
        getter: TaggedValue,
        receiver: TaggedValue,
    ) -> TaggedValue {
        let call = JsCall::with_this(getter, receiver, Argv::EMPTY);
        self.bridge_call(
            thread,
            JSCallMode::CallGetter,
            &call,
            FrameTransitionType::OtherToBaselineCheck,
        )
    }

    /// Call a setter with its receiver and the stored value
    pub fn call_setter(
        &self,
        thread: &mut VmThread,
        setter: TaggedValue,
        receiver: TaggedValue,
        value: TaggedValue,
    ) -> TaggedValue {
        let args = [value];
        let call = JsCall::with_this(setter, receiver, Argv::Slice(&args));
        self.bridge_call(thread, JSCallMode::CallSetter, &call, FrameTransitionType::OtherToOther)
    }

    /// [`AsmBridge::call_setter`], entering baseline code if installed
    pub fn call_setter_to_baseline(
        &self,
        thread: &mut VmThread,
        setter: TaggedValue,
        receiver: TaggedValue,
        value: TaggedValue,
    ) -> TaggedValue {
        let args = [value];
        let call = JsCall::with_this(setter, receiver, Argv::Slice(&args));
        self.bridge_call(
            thread,
            JSCallMode::CallSetter,
            &call,
            FrameTransitionType::OtherToBaselineCheck,
        )
    }

    /// Container callback with two arguments (e.g. `Map.prototype.forEach`
    /// passing value and key)
    pub fn call_containers_args2(
        &self,
        thread: &mut VmThread,
        target: TaggedValue,
        this: TaggedValue,
        args: [TaggedValue; 2],
    ) -> TaggedValue {
        let call = JsCall::with_this(target, this, Argv::Slice(&args));
        self.bridge_call(
            thread,
            JSCallMode::CallThisArg2WithReturn,
            &call,
            FrameTransitionType::OtherToOther,
        )
    }

    /// [`AsmBridge::call_containers_args2`], entering baseline code if
    /// installed
    pub fn call_containers_args2_to_baseline(
        &self,
        thread: &mut VmThread,
        target: TaggedValue,
        this: TaggedValue,
        args: [TaggedValue; 2],
    ) -> TaggedValue {
        let call = JsCall::with_this(target, this, Argv::Slice(&args));
        self.bridge_call(
            thread,
            JSCallMode::CallThisArg2WithReturn,
            &call,
            FrameTransitionType::OtherToBaselineCheck,
        )
    }

    /// Container callback with three arguments
    pub fn call_containers_args3(
        &self,
        thread: &mut VmThread,
        target: TaggedValue,
        this: TaggedValue,
        args: [TaggedValue; 3],
    ) -> TaggedValue {
        let call = JsCall::with_this(target, this, Argv::Slice(&args));
        self.bridge_call(
            thread,
            JSCallMode::CallThisArg3WithReturn,
            &call,
            FrameTransitionType::OtherToOther,
        )
    }

    /// [`AsmBridge::call_containers_args3`], entering baseline code if
    /// installed
    pub fn call_containers_args3_to_baseline(
        &self,
        thread: &mut VmThread,
        target: TaggedValue,
        this: TaggedValue,
        args: [TaggedValue; 3],
    ) -> TaggedValue {
        let call = JsCall::with_this(target, this, Argv::Slice(&args));
        self.bridge_call(
            thread,
            JSCallMode::CallThisArg3WithReturn,
            &call,
            FrameTransitionType::OtherToBaselineCheck,
        )
    }

    /// Call with a receiver and an argument list of any length
    pub fn call_return_with_argv(
        &self,
        thread: &mut VmThread,
        target: TaggedValue,
        this: TaggedValue,
        args: &[TaggedValue],
    ) -> TaggedValue {
        let call = JsCall::with_this(target, this, Argv::Slice(args));
        self.bridge_call(
            thread,
            JSCallMode::CallThisArgvWithReturn,
            &call,
            FrameTransitionType::OtherToOther,
        )
    }

    /// [`AsmBridge::call_return_with_argv`], entering baseline code if
    /// installed
    pub fn call_return_with_argv_to_baseline(
        &self,
        thread: &mut VmThread,
        target: TaggedValue,
        this: TaggedValue,
        args: &[TaggedValue],
    ) -> TaggedValue {
        let call = JsCall::with_this(target, this, Argv::Slice(args));
        self.bridge_call(
            thread,
            JSCallMode::CallThisArgvWithReturn,
            &call,
            FrameTransitionType::OtherToBaselineCheck,
        )
    }

    // ========================================================================
    // Interpreter call sites
    // ========================================================================

    /// A call opcode in the running interpreted frame. The caller's jump
    /// size is recorded first so that resuming knows where the next
    /// instruction is.
    pub fn push_call_and_dispatch(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        call: &JsCall<'_>,
        jump_size: i64,
    ) -> CallResult<TaggedValue> {
        let fp = thread.stack.fp();
        let caller_tag = thread
            .stack
            .try_read(MachineStack::slot_addr(fp, InterpretedFrameSlots::TYPE));
        if fp != 0 && caller_tag == Some(FrameType::Interpreted.tag()) {
            thread
                .stack
                .write_slot(fp, InterpretedFrameSlots::JUMP_SIZE, jump_size as u64);
        } else {
            log::warn!("{:?} call site without an interpreted caller frame", mode);
        }
        self.call_with_transition(thread, mode, call, FrameTransitionType::OtherToOther)
    }
}
