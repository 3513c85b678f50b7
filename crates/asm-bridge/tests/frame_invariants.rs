//! Property tests for frame construction
//!
//! Tests cover:
//! - Frame chains built by arbitrary nestings of interpreted and builtin calls
//! - Argument adaptation slot counts and padding order
//! - Rollback when the stack limit is hit mid-push
//! - Bound function argument flattening
//! - Push/pop round trips for every frame builder

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use asm_bridge::bridge::{to_abi, AdaptPlan};
use asm_bridge::defaults::FRAME_SLOT_SIZE;
use asm_bridge::heap::{CallField, FunctionKind};
use asm_bridge::{
    Argv, BridgeOptions, FrameType, InterpreterContext, JSCallMode, JsCall, MachineStack,
    RuntimeCallInfo, TaggedValue, Throw, VmThread,
};

use common::*;

const OP_NEST: u8 = 0x40;
const OP_REGISTERS: u8 = 0x41;

/// One level of a nested call chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Interpreted code calling an interpreted function
    Interpreted,
    /// Interpreted code calling a builtin that re-enters the interpreter
    ThroughBuiltin,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::Interpreted), Just(Step::ThroughBuiltin)]
}

/// Interpreted function that recurses through `steps`, innermost last, and
/// records the frame chain at the bottom
fn nesting_thread(steps: Vec<Step>) -> (VmThread, TaggedValue, Arc<Mutex<Vec<FrameType>>>) {
    let mut thread = thread();
    let bridge = thread.bridge();
    let chain = Arc::new(Mutex::new(Vec::new()));
    let f = function(&mut thread, 1, 0, OP_NEST);

    let reenter = bridge.clone();
    let native = thread.glue.register_native(Arc::new(
        move |thread: &mut VmThread, info: RuntimeCallInfo| {
            let args = info.args(&thread.stack);
            reenter.asm_interpreter_entry(
                thread,
                f,
                TaggedValue::undefined(),
                TaggedValue::undefined(),
                &args,
            )
        },
    ));
    let builtin = thread.heap.new_object(Some(native));

    let record = Arc::clone(&chain);
    let nested = bridge.clone();
    thread.glue.set_bytecode_handler(
        OP_NEST,
        Arc::new(move |thread: &mut VmThread, ctx: InterpreterContext| {
            let remaining = ctx.frame(&thread.stack).register(0).as_int().unwrap_or(0) as usize;
            if remaining == 0 {
                *record.lock() = frame_types(thread);
                return TaggedValue::int(0);
            }
            let target = match steps[remaining - 1] {
                Step::Interpreted => f,
                Step::ThroughBuiltin => builtin,
            };
            let args = [TaggedValue::int(remaining as i32 - 1)];
            let call = JsCall::new(target, Argv::Slice(&args));
            let result = nested.call(thread, JSCallMode::CallArg1, &call);
            to_abi(result.map(|v| TaggedValue::int(v.as_int().unwrap_or(0) + 1)))
        }),
    );
    (thread, f, chain)
}

fn expected_chain(steps: &[Step]) -> Vec<FrameType> {
    let mut chain = vec![FrameType::InterpretedEntry, FrameType::Interpreted];
    for step in steps.iter().rev() {
        match step {
            Step::Interpreted => chain.push(FrameType::Interpreted),
            Step::ThroughBuiltin => chain.extend([
                FrameType::Builtin,
                FrameType::InterpretedEntry,
                FrameType::Interpreted,
            ]),
        }
    }
    chain.reverse();
    chain
}

/// Function whose body reports its register file
fn register_reporter(
    thread: &mut VmThread,
    call_field: CallField,
) -> (TaggedValue, Arc<Mutex<Vec<TaggedValue>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    thread.glue.set_bytecode_handler(
        OP_REGISTERS,
        Arc::new(move |thread: &mut VmThread, ctx: InterpreterContext| {
            *record.lock() = ctx.frame(&thread.stack).registers();
            TaggedValue::undefined()
        }),
    );
    let f = function_with(thread, call_field, FunctionKind::NormalFunction, &[OP_REGISTERS]);
    (f, seen)
}

fn call_with(
    thread: &mut VmThread,
    target: TaggedValue,
    args: &[TaggedValue],
) -> Result<TaggedValue, Throw> {
    let bridge = thread.bridge();
    let call = JsCall::with_this(target, TaggedValue::undefined(), Argv::Slice(args));
    bridge.call(thread, JSCallMode::CallThisWithArgv, &call)
}

fn ints(n: usize, base: i32) -> Vec<TaggedValue> {
    (0..n as i32).map(|i| TaggedValue::int(base + i)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn frame_chain_has_one_frame_per_call(steps in prop::collection::vec(step(), 0..12)) {
        let depth = steps.len();
        let (mut thread, f, chain) = nesting_thread(steps.clone());
        let bridge = thread.bridge();
        let before = registers(&thread);

        let out = bridge.asm_interpreter_entry(
            &mut thread,
            f,
            TaggedValue::undefined(),
            TaggedValue::undefined(),
            &[TaggedValue::int(depth as i32)],
        );
        prop_assert_eq!(out, TaggedValue::int(depth as i32));
        prop_assert_eq!(registers(&thread), before);

        let chain = chain.lock().clone();
        prop_assert_eq!(&chain, &expected_chain(&steps));
        if steps.iter().all(|s| *s == Step::Interpreted) {
            prop_assert_eq!(chain.len(), depth + 2);
        }
    }

    #[test]
    fn adapter_slot_counts(declared in 0usize..=8, actual in 0usize..=8, extra in any::<bool>()) {
        let plan = AdaptPlan::new(declared, actual, extra);
        if extra && actual >= declared {
            prop_assert_eq!(plan.value_slots(), actual);
            prop_assert_eq!(plan.padding, 0);
        } else if actual <= declared {
            prop_assert_eq!(plan.value_slots(), declared.max(actual));
        } else {
            prop_assert_eq!(plan.value_slots(), declared);
        }
        prop_assert_eq!(plan.store_argc, extra);
        prop_assert_eq!(plan.total_slots(), plan.value_slots() + usize::from(extra));

        let mut thread = thread();
        let (f, seen) = register_reporter(
            &mut thread,
            CallField::new(declared as u32, 0).with_extra(extra),
        );
        let args = ints(actual, 100);
        call_with(&mut thread, f, &args).unwrap();
        prop_assert_eq!(seen.lock().len(), plan.total_slots());
    }

    #[test]
    fn padding_follows_actual_arguments(declared in 1usize..=8, missing in 1usize..=8) {
        let missing = missing.min(declared);
        let actual = declared - missing;
        let mut thread = thread();
        let (f, seen) = register_reporter(&mut thread, CallField::new(declared as u32, 0));
        let args = ints(actual, 100);
        call_with(&mut thread, f, &args).unwrap();

        let registers = seen.lock().clone();
        prop_assert_eq!(registers.len(), declared);
        prop_assert_eq!(&registers[..actual], &args[..]);
        prop_assert!(registers[actual..].iter().all(|v| v.is_undefined()));
    }

    #[test]
    fn overflow_rolls_back_to_checkpoint(
        argc in 1usize..48,
        vregs in 0u32..32,
        room in 0usize..64,
        batch in 1usize..6,
    ) {
        let mut options = BridgeOptions::default();
        options.arg_push_batch = batch;
        let mut thread = thread_with(&options);
        let bridge = thread.bridge();
        let f = function(&mut thread, argc as u32, vregs, OP_RETURN_ARG0);

        let entry = bridge.push_entry_frame(&mut thread, FrameType::InterpretedEntry);
        let before = registers(&thread);
        thread.glue.stack_limit = thread.stack.sp() - room * FRAME_SLOT_SIZE;
        let args = ints(argc, 0);
        let out = call_with(&mut thread, f, &args);
        let expected = if vregs == 0 {
            TaggedValue::int(0)
        } else {
            TaggedValue::undefined()
        };
        match out {
            Ok(v) => prop_assert_eq!(v, expected),
            Err(e) => prop_assert_eq!(e, Throw::StackOverflow),
        }
        prop_assert_eq!(registers(&thread), before);
        bridge.pop_entry_frame(&mut thread, entry);
    }

    #[test]
    fn bound_call_sees_bound_arguments_first(
        bound_count in 0usize..5,
        actual in 0usize..5,
        caller_this in any::<i32>(),
    ) {
        let mut thread = thread();
        let (target, calls) = recording_native(&mut thread);
        let bound_this = thread.heap.new_object(None);
        let bound = thread
            .heap
            .new_bound_function(target, bound_this, ints(bound_count, 0));
        let bridge = thread.bridge();
        let before = registers(&thread);

        let args = ints(actual, 100);
        let call = JsCall::with_this(bound, TaggedValue::int(caller_this), Argv::Slice(&args));
        let out = bridge.call(&mut thread, JSCallMode::CallThisWithArgv, &call);
        prop_assert_eq!(out, Ok(TaggedValue::int((bound_count + actual) as i32)));
        prop_assert_eq!(registers(&thread), before);

        let calls = calls.lock();
        let mut expected = ints(bound_count, 0);
        expected.extend(args);
        prop_assert_eq!(&calls[0].args, &expected);
        prop_assert_eq!(calls[0].this, bound_this);
    }

    #[test]
    fn frame_builders_round_trip(
        prefix in prop::collection::vec(any::<u64>(), 0..16),
        leave_frame in any::<usize>(),
        builder in 0usize..9,
    ) {
        let mut thread = VmThread::with_defaults();
        let bridge = thread.bridge();
        for word in &prefix {
            thread.stack.push(*word);
        }
        let fp = thread.stack.sp();
        thread.stack.set_fp(fp);
        thread.glue.leave_frame = leave_frame;
        let before = registers(&thread);

        match builder {
            0 | 1 => {
                let frame_type = if builder == 0 {
                    FrameType::InterpretedEntry
                } else {
                    FrameType::InterpretedBridge
                };
                let mark = bridge.push_entry_frame(&mut thread, frame_type);
                let tag = thread.stack.read(MachineStack::slot_addr(mark.handle, -1));
                prop_assert_eq!(FrameType::from_tag(tag), Some(frame_type));
                bridge.pop_entry_frame(&mut thread, mark);
            }
            2 => {
                let mark = bridge.push_optimized_entry_frame(&mut thread);
                bridge.pop_optimized_entry_frame(&mut thread, mark);
            }
            3 | 4 => {
                let frame_type = if builder == 3 {
                    FrameType::Builtin
                } else {
                    FrameType::BuiltinEntry
                };
                let mark = bridge.push_builtin_frame(&mut thread, frame_type);
                prop_assert_eq!(thread.glue.leave_frame, mark.handle);
                bridge.pop_builtin_frame(&mut thread, mark);
            }
            5 => {
                let mark = bridge.push_builtin_frame(&mut thread, FrameType::BuiltinWithArgv);
                bridge.complete_builtin_frame(&mut thread, &mark);
                bridge.pop_builtin_frame(&mut thread, mark);
            }
            6 => {
                let mark = bridge.push_leave_frame(&mut thread, FrameType::Leave, 7);
                prop_assert_eq!(thread.glue.leave_frame, mark.handle);
                bridge.pop_leave_frame(&mut thread, mark);
            }
            7 => {
                let mark = bridge.push_linked_frame(&mut thread, FrameType::AsmBridge);
                bridge.pop_linked_frame(&mut thread, mark);
            }
            _ => {
                let mark = bridge.push_unfold_argv_frame(&mut thread, 3, fp);
                bridge.pop_unfold_argv_frame(&mut thread, mark);
            }
        }
        prop_assert_eq!(registers(&thread), before);
    }
}

#[test]
fn test_overflow_inside_builtin_argument_copy_restores_registers() {
    let mut options = BridgeOptions::default();
    options.arg_push_batch = 1;
    let mut thread = thread_with(&options);
    let bridge = thread.bridge();
    let (target, calls) = recording_native(&mut thread);
    let entry = bridge.push_entry_frame(&mut thread, FrameType::InterpretedEntry);
    let before = registers(&thread);
    thread.glue.stack_limit = thread.stack.sp() - 8 * FRAME_SLOT_SIZE;

    let args = ints(20, 0);
    let out = call_with(&mut thread, target, &args);
    assert_eq!(out, Err(Throw::StackOverflow));
    assert_eq!(registers(&thread), before);
    assert!(calls.lock().is_empty());
    bridge.pop_entry_frame(&mut thread, entry);
}
