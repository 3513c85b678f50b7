//! Fixtures shared by the bridge unit tests

use std::sync::Arc;

use crate::context::InterpreterContext;
use crate::glue::RuntimeStubId;
use crate::heap::{
    CallField, ExtraLiteralInfo, FunctionKind, HClass, JsFunction, Method, MethodCode,
};
use crate::thread::VmThread;
use crate::value::TaggedValue;

/// Returns register 0
pub const OP_RETURN_ARG0: u8 = 0x01;
/// Returns the frame's `this`
pub const OP_RETURN_THIS: u8 = 0x02;
/// Returns the accumulator
pub const OP_RETURN_ACC: u8 = 0x03;
/// Returns the number of register slots in the frame
pub const OP_RETURN_REG_COUNT: u8 = 0x04;

/// Thread with the test opcodes and every runtime stub installed. Throwing
/// stubs return the exception sentinel.
pub fn thread() -> VmThread {
    let mut thread = VmThread::with_defaults();
    install_handlers(&mut thread);
    install_runtime_stubs(&mut thread);
    thread
}

pub fn install_handlers(thread: &mut VmThread) {
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
        Arc::new(|_thread: &mut VmThread, ctx: InterpreterContext| ctx.acc),
    );
    thread.glue.set_bytecode_handler(
        OP_RETURN_REG_COUNT,
        Arc::new(|thread: &mut VmThread, ctx: InterpreterContext| {
            TaggedValue::int(ctx.frame(&thread.stack).register_count() as i32)
        }),
    );
}

pub fn install_runtime_stubs(thread: &mut VmThread) {
    for id in [
        RuntimeStubId::ThrowNotCallableException,
        RuntimeStubId::ThrowStackOverflowException,
        RuntimeStubId::ThrowCallConstructorException,
        RuntimeStubId::ThrowTypeError,
    ] {
        thread
            .glue
            .set_runtime_stub(id, Arc::new(|_: &mut VmThread, _: &[TaggedValue]| TaggedValue::exception()));
    }
    thread.glue.set_runtime_stub(
        RuntimeStubId::GetNativePcOfstForBaseline,
        Arc::new(|_: &mut VmThread, _: &[TaggedValue]| TaggedValue::int(0)),
    );
}

/// Ordinary function running `code`
pub fn function_with(
    thread: &mut VmThread,
    call_field: CallField,
    kind: FunctionKind,
    code: &[u8],
    hclass: HClass,
) -> TaggedValue {
    let pc = thread.heap.load_bytecode(code);
    let method = thread.heap.new_method(Method {
        call_field,
        extra_literal_info: ExtraLiteralInfo::new(kind, None),
        code: MethodCode::Bytecode(pc),
        constant_pool: TaggedValue::undefined(),
        literal_info: 0,
    });
    thread.heap.new_function(JsFunction::new(method), hclass)
}

/// Plain function with one opcode body
pub fn function(thread: &mut VmThread, declared: u32, vregs: u32, opcode: u8) -> TaggedValue {
    function_with(
        thread,
        CallField::new(declared, vregs),
        FunctionKind::NormalFunction,
        &[opcode],
        HClass::function(),
    )
}

/// Bytecode base of an interpreted function
pub fn bytecode_base(thread: &VmThread, function: TaggedValue) -> usize {
    thread
        .heap
        .function_method(function)
        .and_then(Method::bytecode_base)
        .unwrap_or(0)
}
