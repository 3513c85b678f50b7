//! Shared fixtures for the integration tests
//!
//! A thread with a handful of test opcodes and runtime stubs installed,
//! plus builders for interpreted functions and recording builtins.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use asm_bridge::frames::walker::walk;
use asm_bridge::heap::{CallField, ExtraLiteralInfo, FunctionKind, Method, MethodCode};
use asm_bridge::{
    BridgeOptions, FrameType, HClass, InterpreterContext, JsFunction, NativeFnId,
    RuntimeCallInfo, RuntimeStubId, TaggedValue, VmThread,
};

/// Returns register 0
pub const OP_RETURN_ARG0: u8 = 0x01;
/// Returns the frame's `this`
pub const OP_RETURN_THIS: u8 = 0x02;
/// Returns the accumulator
pub const OP_RETURN_ACC: u8 = 0x03;
/// Returns the number of register slots in the frame
pub const OP_RETURN_REG_COUNT: u8 = 0x04;

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Thread with the test opcodes and runtime stubs installed
pub fn thread() -> VmThread {
    thread_with(&BridgeOptions::default())
}

/// Same as [`thread`] with custom options
pub fn thread_with(options: &BridgeOptions) -> VmThread {
    init_logging();
    let mut thread = VmThread::new(options).unwrap();
    install_handlers(&mut thread);
    install_runtime_stubs(&mut thread);
    thread
}

fn install_handlers(thread: &mut VmThread) {
    thread.glue.set_bytecode_handler(
        OP_RETURN_ARG0,
        Arc::new(|thread: &mut VmThread, ctx: InterpreterContext| {
            ctx.frame(&thread.stack).register(0)
        }),
    );
    thread.glue.set_bytecode_handler(
        OP_RETURN_THIS,
        Arc::new(|thread: &mut VmThread, ctx: InterpreterContext| {
            ctx.frame(&thread.stack).this()
        }),
    );
    thread.glue.set_bytecode_handler(
        OP_RETURN_ACC,
        Arc::new(|_: &mut VmThread, ctx: InterpreterContext| ctx.acc),
    );
    thread.glue.set_bytecode_handler(
        OP_RETURN_REG_COUNT,
        Arc::new(|thread: &mut VmThread, ctx: InterpreterContext| {
            TaggedValue::int(ctx.frame(&thread.stack).register_count() as i32)
        }),
    );
}

fn install_runtime_stubs(thread: &mut VmThread) {
    for id in [
        RuntimeStubId::ThrowNotCallableException,
        RuntimeStubId::ThrowStackOverflowException,
        RuntimeStubId::ThrowCallConstructorException,
        RuntimeStubId::ThrowTypeError,
    ] {
        thread.glue.set_runtime_stub(
            id,
            Arc::new(|_: &mut VmThread, _: &[TaggedValue]| TaggedValue::exception()),
        );
    }
    thread.glue.set_runtime_stub(
        RuntimeStubId::GetNativePcOfstForBaseline,
        Arc::new(|_: &mut VmThread, _: &[TaggedValue]| TaggedValue::int(0)),
    );
}

/// Interpreted function running `code`
pub fn function_with(
    thread: &mut VmThread,
    call_field: CallField,
    kind: FunctionKind,
    code: &[u8],
) -> TaggedValue {
    let pc = thread.heap.load_bytecode(code);
    let method = thread.heap.new_method(Method {
        call_field,
        extra_literal_info: ExtraLiteralInfo::new(kind, None),
        code: MethodCode::Bytecode(pc),
        constant_pool: TaggedValue::undefined(),
        literal_info: 0,
    });
    thread.heap.new_function(JsFunction::new(method), HClass::function())
}

/// Plain function whose body is a single opcode
pub fn function(thread: &mut VmThread, declared: u32, vregs: u32, opcode: u8) -> TaggedValue {
    function_with(
        thread,
        CallField::new(declared, vregs),
        FunctionKind::NormalFunction,
        &[opcode],
    )
}

/// Bytecode base of an interpreted function
pub fn bytecode_base(thread: &VmThread, function: TaggedValue) -> usize {
    thread
        .heap
        .function_method(function)
        .and_then(Method::bytecode_base)
        .unwrap()
}

/// What a builtin saw when it ran
#[derive(Debug, Clone, Default)]
pub struct NativeCall {
    pub frames: Vec<FrameType>,
    pub this: TaggedValue,
    pub new_target: TaggedValue,
    pub args: Vec<TaggedValue>,
}

/// Builtin that records its call and returns its argument count
pub fn recording_native(thread: &mut VmThread) -> (TaggedValue, Arc<Mutex<Vec<NativeCall>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&calls);
    let id: NativeFnId = thread.glue.register_native(Arc::new(
        move |thread: &mut VmThread, info: RuntimeCallInfo| {
            record.lock().push(NativeCall {
                frames: frame_types(thread),
                this: info.this(&thread.stack),
                new_target: info.new_target(&thread.stack),
                args: info.args(&thread.stack),
            });
            TaggedValue::int(info.num_args(&thread.stack) as i32)
        },
    ));
    let target = thread.heap.new_object(Some(id));
    (target, calls)
}

/// Frame types from the top of the chain down
pub fn frame_types(thread: &VmThread) -> Vec<FrameType> {
    walk(&thread.stack)
        .unwrap()
        .iter()
        .map(|f| f.frame_type)
        .collect()
}

/// sp, fp and the glue leave frame
pub fn registers(thread: &VmThread) -> (usize, usize, usize) {
    (thread.stack.sp(), thread.stack.fp(), thread.glue.leave_frame)
}
