//! Dispatch core
//!
//! One call attempt is a small state machine:
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ classify     │
//!                 └──────┬───────┘
//!     ┌──────────┬───────┼─────────┬───────────┬──────────────┐
//!     ▼          ▼       ▼         ▼           ▼              ▼
//!  native   interpreted optimized bound      proxy        not callable
//!                                  │
//!                                  └─► flatten args, classify target
//! ```
//!
//! The function-range check runs before the callable bit is looked at, so
//! a class constructor called without `new` reports its own message rather
//! than the generic one.

use crate::error::{CallResult, NotCallableKind, Throw};
use crate::frames::FrameType;
use crate::glue::{NativeFnId, OptimizedCodeId, RuntimeStubId};
use crate::heap::{HClass, Heap, JsType, Method};
use crate::stack::MachineStack;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::adapter::Argv;
use super::{AsmBridge, FrameTransitionType, JSCallMode, JsCall, StackCheckpoint};

/// Where a call goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeClass {
    /// Native builtin
    Native(NativeFnId),
    /// Bytecode function
    Interpreted,
    /// Function with installed optimized code
    Optimized(OptimizedCodeId),
    /// Bound function; flattened and re-dispatched
    Bound,
    /// Callable proxy; goes to its native trampoline
    Proxy(NativeFnId),
    /// Rejected
    NotCallable(NotCallableKind),
}

impl CalleeClass {
    /// Classify `callee` for a plain call or, with `construct`, a `new`
    /// call. Never allocates.
    pub fn classify(heap: &Heap, callee: TaggedValue, construct: bool) -> CalleeClass {
        let hclass = HClass::from_bit_field(heap.hclass_bit_field(callee));
        if hclass.js_type.is_function() {
            let allowed = if construct {
                hclass.constructor
            } else {
                hclass.callable
            };
            if !allowed {
                let kind = if construct {
                    NotCallableKind::Generic
                } else {
                    NotCallableKind::ClassConstructor
                };
                return CalleeClass::NotCallable(kind);
            }
            let Some(function) = heap.function(callee) else {
                return CalleeClass::NotCallable(NotCallableKind::Generic);
            };
            if let Some(entry) = heap.method(function.method).and_then(Method::native_entry) {
                return CalleeClass::Native(entry);
            }
            return match function.optimized_code {
                Some(code) => CalleeClass::Optimized(code),
                None => CalleeClass::Interpreted,
            };
        }
        match hclass.js_type {
            JsType::JsBoundFunction => CalleeClass::Bound,
            JsType::JsProxy => match heap.proxy(callee) {
                Some(proxy) => CalleeClass::Proxy(proxy.call_trampoline),
                None => CalleeClass::NotCallable(NotCallableKind::Generic),
            },
            _ => match heap.native_call(callee) {
                Some(entry) if hclass.callable => CalleeClass::Native(entry),
                _ => CalleeClass::NotCallable(NotCallableKind::Generic),
            },
        }
    }
}

/// Is this a `new` call? Entry modes construct when a new.target is given.
pub fn is_new_call(mode: JSCallMode, call: &JsCall<'_>) -> bool {
    mode.is_construct() || (mode.has_new_target_arg() && !call.new_target.is_undefined())
}

impl AsmBridge {
    /// Classify and call, considering installed baseline code
    pub fn call(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        call: &JsCall<'_>,
    ) -> CallResult<TaggedValue> {
        self.call_with_transition(thread, mode, call, FrameTransitionType::OtherToBaselineCheck)
    }

    /// Classify and call
    pub fn call_with_transition(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        call: &JsCall<'_>,
        transition: FrameTransitionType,
    ) -> CallResult<TaggedValue> {
        let class = CalleeClass::classify(&thread.heap, call.call_target, is_new_call(mode, call));
        log::trace!("{:?} {:?}: {:?}", mode, call.call_target, class);
        match class {
            CalleeClass::Native(entry) | CalleeClass::Proxy(entry) => {
                self.call_builtin(thread, mode, entry, call)
            }
            CalleeClass::Interpreted => self.js_call_common_entry(thread, mode, call, transition),
            CalleeClass::Optimized(code) => self.call_optimized(thread, code, call, mode),
            CalleeClass::Bound => self.call_bound(thread, mode, call, transition),
            CalleeClass::NotCallable(kind) => {
                Err(self.throw_not_callable(thread, call.call_target, kind))
            }
        }
    }

    fn call_builtin(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        entry: NativeFnId,
        call: &JsCall<'_>,
    ) -> CallResult<TaggedValue> {
        match mode.native_frame_type() {
            FrameType::BuiltinWithArgv => self.call_native_with_argv(thread, entry, call, mode),
            frame_type => self.call_native(thread, frame_type, entry, call, mode),
        }
    }

    /// Raise the TypeError for a rejected callee through the runtime
    pub fn throw_not_callable(
        &self,
        thread: &mut VmThread,
        target: TaggedValue,
        kind: NotCallableKind,
    ) -> Throw {
        let stub = match kind {
            NotCallableKind::Generic => RuntimeStubId::ThrowNotCallableException,
            NotCallableKind::ClassConstructor => RuntimeStubId::ThrowCallConstructorException,
        };
        log::debug!("{:?} is not callable ({:?})", target, kind);
        self.call_runtime(thread, stub, &[target]);
        Throw::NotCallable(kind)
    }

    /// Flatten `bound ++ actual` into fresh slots and re-dispatch on the
    /// bound target with the bound `this`
    fn call_bound(
        &self,
        thread: &mut VmThread,
        mode: JSCallMode,
        call: &JsCall<'_>,
        transition: FrameTransitionType,
    ) -> CallResult<TaggedValue> {
        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let Some(bound) = thread.heap.bound_function(call.call_target).cloned() else {
            return Err(self.throw_not_callable(thread, call.call_target, NotCallableKind::Generic));
        };
        let bound_args = thread
            .heap
            .tagged_array(bound.bound_arguments)
            .map(<[TaggedValue]>::to_vec)
            .unwrap_or_default();
        let actual = call.actual_argc(mode, &thread.heap);
        let total = bound_args.len() + actual;
        if self.stack_overflow_check(thread, total).is_err() {
            return Err(self.throw_stack_overflow(thread, checkpoint));
        }

        let base = thread.stack.reserve(total);
        for i in 0..actual {
            let value = call.args.get(&thread.stack, &thread.heap, i);
            let slot = MachineStack::slot_addr(base, (bound_args.len() + i) as isize);
            thread.stack.write_value(slot, value);
        }
        for (j, value) in bound_args.iter().enumerate() {
            thread
                .stack
                .write_value(MachineStack::slot_addr(base, j as isize), *value);
        }
        let new_target = if is_new_call(mode, call) {
            call.new_target
        } else {
            TaggedValue::undefined()
        };
        let flattened = JsCall {
            call_target: bound.target,
            this: bound.bound_this,
            new_target,
            args: Argv::Stack { base, len: total },
        };
        log::trace!(
            "bound call: {} bound + {} actual arguments",
            bound_args.len(),
            actual
        );
        let result =
            self.call_with_transition(thread, mode.for_bound_target(), &flattened, transition);
        thread.stack.set_sp(checkpoint.sp);
        result
    }
}
