//! Generator re-entry
//!
//! A suspended generator's frame is rebuilt from its saved context: the
//! register file goes through the same checked push loop as call
//! arguments, then a fresh state block resumes at
//! `bytecode base + saved offset` with the saved accumulator and
//! environment.

use crate::error::CallResult;
use crate::frames::layout::InterpretedFrameSlots;
use crate::frames::FrameType;
use crate::heap::Method;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::adapter::Argv;
use super::interpreter::FrameState;
use super::{fatal, from_abi, to_abi, AsmBridge, StackCheckpoint};

impl AsmBridge {
    /// Resume a suspended generator from native code
    pub fn generator_reenter(&self, thread: &mut VmThread, context: TaggedValue) -> TaggedValue {
        let mark = self.push_entry_frame(thread, FrameType::InterpretedEntry);
        let result = self.generator_reenter_in_frame(thread, context);
        self.pop_entry_frame(thread, mark);
        to_abi(result)
    }

    /// Rebuild the generator's frame on top of the current one and run it
    /// until it returns or suspends again
    pub fn generator_reenter_in_frame(
        &self,
        thread: &mut VmThread,
        context: TaggedValue,
    ) -> CallResult<TaggedValue> {
        let Some(saved) = thread.heap.generator_context(context).cloned() else {
            fatal(format_args!("{:?} is not a generator context", context))
        };
        let Some(base) = thread
            .heap
            .function_method(saved.method)
            .and_then(Method::bytecode_base)
        else {
            fatal(format_args!("generator {:?} has no bytecode", saved.method))
        };

        let checkpoint = StackCheckpoint::capture(&thread.stack);
        let nregs = saved.nregs as usize;
        let regs = Argv::Array {
            array: saved.regs_array,
            len: nregs,
        };
        let pushed = self
            .push_args_from_vector(thread, &regs, 0, nregs)
            .and_then(|()| self.stack_overflow_check(thread, InterpretedFrameSlots::STATE_SLOTS));
        if pushed.is_err() {
            return Err(self.throw_stack_overflow(thread, checkpoint));
        }

        let pc = base + saved.bc_offset as usize;
        let handle = self.push_frame_state(
            thread,
            &FrameState {
                function: saved.method,
                this: saved.this,
                env: saved.lexical_env,
                acc: saved.acc,
                pc,
                fp: checkpoint.sp,
                jump_size: 0,
            },
        );
        log::trace!(
            "generator {:?} resumes at offset {} with {} registers",
            saved.method,
            saved.bc_offset,
            nregs
        );
        let result = self.dispatch_in_frame(thread, handle, pc, saved.acc, false);
        self.leave_interpreted_frame(thread, handle);
        from_abi(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::bridge::testing;
    use crate::context::InterpreterContext;
    use crate::error::Throw;
    use crate::frames::walker::walk;
    use crate::heap::{CallField, FunctionKind, GeneratorContext, HClass};

    const OP_SNAPSHOT: u8 = 0x30;

    #[derive(Debug, Default, Clone)]
    struct Snapshot {
        pc: usize,
        acc: TaggedValue,
        env: TaggedValue,
        this: TaggedValue,
        registers: Vec<TaggedValue>,
        chain: Vec<FrameType>,
    }

    fn snapshot_handler(thread: &mut VmThread) -> Arc<Mutex<Snapshot>> {
        let seen = Arc::new(Mutex::new(Snapshot::default()));
        let record = Arc::clone(&seen);
        thread.glue.set_bytecode_handler(
            OP_SNAPSHOT,
            Arc::new(move |thread: &mut VmThread, ctx: InterpreterContext| {
                let frame = ctx.frame(&thread.stack);
                *record.lock() = Snapshot {
                    pc: frame.raw_pc() as usize,
                    acc: frame.acc(),
                    env: frame.env(),
                    this: frame.this(),
                    registers: frame.registers(),
                    chain: walk(&thread.stack)
                        .unwrap()
                        .iter()
                        .map(|f| f.frame_type)
                        .collect(),
                };
                ctx.acc
            }),
        );
        seen
    }

    /// Generator whose resume point is at byte 42
    fn suspended(thread: &mut VmThread, nregs: u32) -> (TaggedValue, TaggedValue) {
        let mut code = vec![0u8; 42];
        code.push(OP_SNAPSHOT);
        let function = testing::function_with(
            thread,
            CallField::new(0, nregs),
            FunctionKind::GeneratorFunction,
            &code,
            HClass::function(),
        );
        let regs = (0..nregs as i32).map(|i| TaggedValue::int(100 + i)).collect();
        let regs_array = thread.heap.new_tagged_array(regs);
        let env = thread.heap.new_tagged_array(Vec::new());
        let context = thread.heap.new_generator_context(GeneratorContext {
            method: function,
            this: TaggedValue::null(),
            regs_array,
            nregs,
            bc_offset: 42,
            acc: TaggedValue::int(7),
            lexical_env: env,
        });
        (function, context)
    }

    #[test]
    fn test_reenter_rebuilds_saved_frame() {
        let mut thread = testing::thread();
        let bridge = thread.bridge();
        let seen = snapshot_handler(&mut thread);
        let (function, context) = suspended(&mut thread, 3);
        let before = (thread.stack.sp(), thread.stack.fp(), thread.glue.leave_frame);

        let out = bridge.generator_reenter(&mut thread, context);
        assert_eq!(out, TaggedValue::int(7));
        assert_eq!(
            (thread.stack.sp(), thread.stack.fp(), thread.glue.leave_frame),
            before
        );

        let seen = seen.lock().clone();
        assert_eq!(seen.pc, testing::bytecode_base(&thread, function) + 42);
        assert_eq!(seen.acc, TaggedValue::int(7));
        assert_eq!(seen.this, TaggedValue::null());
        assert!(seen.env.is_heap_object());
        assert_eq!(
            seen.registers,
            vec![TaggedValue::int(100), TaggedValue::int(101), TaggedValue::int(102)]
        );
        assert_eq!(
            seen.chain,
            vec![FrameType::Interpreted, FrameType::InterpretedEntry]
        );
    }

    #[test]
    fn test_reenter_overflow_goes_through_runtime() {
        let mut thread = testing::thread();
        let bridge = thread.bridge();
        let _seen = snapshot_handler(&mut thread);
        let (_, context) = suspended(&mut thread, 64);
        thread.glue.stack_limit = thread.stack.sp() - 32 * crate::defaults::FRAME_SLOT_SIZE;
        let before = (thread.stack.sp(), thread.stack.fp());
        let out = bridge.generator_reenter_in_frame(&mut thread, context);
        assert_eq!(out, Err(Throw::StackOverflow));
        assert_eq!((thread.stack.sp(), thread.stack.fp()), before);
    }
}
