//! Frame push/pop pairs
//!
//! Each push writes the frame-type tag and the previous-frame link
//! back-to-back before anything that can call out, and returns a
//! [`FrameMark`]. The matching pop restores sp, fp and the glue leave frame
//! to the values captured at push time.

use crate::frames::layout::{EntryFrameSlots, OptimizedEntryFrameSlots};
use crate::frames::FrameType;
use crate::stack::MachineStack;
use crate::thread::VmThread;

use super::AsmBridge;

/// A pushed frame and the state its pop restores
#[must_use = "a pushed frame must be popped by its matching routine"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMark {
    /// Frame type written
    pub frame_type: FrameType,
    /// Frame handle
    pub handle: usize,
    /// sp before the push
    pub saved_sp: usize,
    /// fp before the push
    pub saved_fp: usize,
    /// Glue leave frame before the push
    pub saved_leave_frame: usize,
}

impl FrameMark {
    fn begin(thread: &VmThread, frame_type: FrameType) -> Self {
        Self {
            frame_type,
            handle: 0,
            saved_sp: thread.stack.sp(),
            saved_fp: thread.stack.fp(),
            saved_leave_frame: thread.glue.leave_frame,
        }
    }
}

impl AsmBridge {
    // ========================================================================
    // Entry frames
    // ========================================================================

    /// Native code entering the interpreter: callee saves, then
    /// `[saved fp | type | prev | pc]` with prev taken from the glue leave
    /// frame.
    pub fn push_entry_frame(&self, thread: &mut VmThread, frame_type: FrameType) -> FrameMark {
        debug_assert!(matches!(
            frame_type,
            FrameType::InterpretedEntry | FrameType::InterpretedBridge
        ));
        let mut mark = FrameMark::begin(thread, frame_type);
        let glue_word = thread.thread_word();
        self.arch
            .push_native_prologue(&mut thread.stack, &thread.cpu, glue_word);
        thread.stack.push(mark.saved_fp as u64);
        mark.handle = thread.stack.sp();
        thread.stack.push(frame_type.tag());
        thread.stack.push(mark.saved_leave_frame as u64);
        thread.stack.push(0);
        self.arch.push_entry_tail(&mut thread.stack, glue_word);
        thread.stack.set_fp(mark.handle);
        log::trace!("push {:?} frame at {:#x}", frame_type, mark.handle);
        mark
    }

    /// Pop a frame pushed by [`AsmBridge::push_entry_frame`]
    pub fn pop_entry_frame(&self, thread: &mut VmThread, mark: FrameMark) {
        let h = mark.handle;
        thread.glue.leave_frame = thread.stack.read_slot(h, EntryFrameSlots::PREV) as usize;
        let saved_fp = thread.stack.read_slot(h, EntryFrameSlots::SAVED_FP) as usize;
        thread
            .stack
            .set_sp(MachineStack::slot_addr(h, EntryFrameSlots::SAVED_FP + 1));
        thread.stack.set_fp(saved_fp);
        self.arch
            .pop_native_epilogue(&mut thread.stack, &mut thread.cpu);
        debug_assert_eq!(thread.stack.sp(), mark.saved_sp);
        log::trace!("pop {:?} frame at {:#x}", mark.frame_type, h);
    }

    /// Native code entering optimized code
    pub fn push_optimized_entry_frame(&self, thread: &mut VmThread) -> FrameMark {
        let mut mark = FrameMark::begin(thread, FrameType::OptimizedEntry);
        let glue_word = thread.thread_word();
        self.arch
            .push_native_prologue(&mut thread.stack, &thread.cpu, glue_word);
        thread.stack.push(mark.saved_fp as u64);
        mark.handle = thread.stack.sp();
        thread.stack.push(FrameType::OptimizedEntry.tag());
        thread.stack.push(mark.saved_leave_frame as u64);
        thread.stack.set_fp(mark.handle);
        mark
    }

    /// Pop a frame pushed by [`AsmBridge::push_optimized_entry_frame`]
    pub fn pop_optimized_entry_frame(&self, thread: &mut VmThread, mark: FrameMark) {
        let h = mark.handle;
        thread.glue.leave_frame =
            thread.stack.read_slot(h, OptimizedEntryFrameSlots::PREV) as usize;
        thread
            .stack
            .set_sp(MachineStack::slot_addr(h, OptimizedEntryFrameSlots::SAVED_FP));
        let saved_fp = thread.stack.pop() as usize;
        thread.stack.set_fp(saved_fp);
        self.arch
            .pop_native_epilogue(&mut thread.stack, &mut thread.cpu);
        debug_assert_eq!(thread.stack.sp(), mark.saved_sp);
    }

    // ========================================================================
    // Builtin and leave frames
    // ========================================================================

    /// `[prev fp | type]`, recording the handle as the glue leave frame.
    /// A builtin-with-argv frame leaves fp alone until
    /// [`AsmBridge::complete_builtin_frame`].
    pub fn push_builtin_frame(&self, thread: &mut VmThread, frame_type: FrameType) -> FrameMark {
        debug_assert!(frame_type.is_builtin());
        let mut mark = FrameMark::begin(thread, frame_type);
        thread.stack.push(mark.saved_fp as u64);
        mark.handle = thread.stack.sp();
        thread.glue.leave_frame = mark.handle;
        thread.stack.push(frame_type.tag());
        if frame_type != FrameType::BuiltinWithArgv {
            thread.stack.set_fp(mark.handle);
        }
        log::trace!("push {:?} frame at {:#x}", frame_type, mark.handle);
        mark
    }

    /// Point fp at a builtin frame whose body is now complete
    pub fn complete_builtin_frame(&self, thread: &mut VmThread, mark: &FrameMark) {
        thread.stack.set_fp(mark.handle);
    }

    /// Pop a builtin frame
    pub fn pop_builtin_frame(&self, thread: &mut VmThread, mark: FrameMark) {
        self.unlink_frame(thread, &mark);
    }

    /// `[prev fp | type | callee id]` for optimized code calling out
    pub fn push_leave_frame(
        &self,
        thread: &mut VmThread,
        frame_type: FrameType,
        callee_id: u64,
    ) -> FrameMark {
        debug_assert!(frame_type.is_leave());
        let mut mark = FrameMark::begin(thread, frame_type);
        thread.stack.push(mark.saved_fp as u64);
        mark.handle = thread.stack.sp();
        thread.glue.leave_frame = mark.handle;
        thread.stack.push(frame_type.tag());
        thread.stack.push(callee_id);
        thread.stack.set_fp(mark.handle);
        mark
    }

    /// Pop a leave frame
    pub fn pop_leave_frame(&self, thread: &mut VmThread, mark: FrameMark) {
        self.unlink_frame(thread, &mark);
    }

    // ========================================================================
    // Linked frames
    // ========================================================================

    /// `[prev fp | type]`: optimized, optimized-JS-function, args-config and
    /// asm-bridge frames
    pub fn push_linked_frame(&self, thread: &mut VmThread, frame_type: FrameType) -> FrameMark {
        let mut mark = FrameMark::begin(thread, frame_type);
        thread.stack.push(mark.saved_fp as u64);
        mark.handle = thread.stack.sp();
        thread.stack.push(frame_type.tag());
        thread.stack.set_fp(mark.handle);
        mark
    }

    /// Pop a frame pushed by [`AsmBridge::push_linked_frame`]
    pub fn pop_linked_frame(&self, thread: &mut VmThread, mark: FrameMark) {
        self.unlink_frame(thread, &mark);
    }

    /// `[prev fp | type | argc | argv]`
    pub fn push_unfold_argv_frame(
        &self,
        thread: &mut VmThread,
        argc: usize,
        argv: usize,
    ) -> FrameMark {
        let mut mark = FrameMark::begin(thread, FrameType::OptimizedUnfoldArgv);
        thread.stack.push(mark.saved_fp as u64);
        mark.handle = thread.stack.sp();
        thread.stack.push(FrameType::OptimizedUnfoldArgv.tag());
        thread.stack.push(argc as u64);
        thread.stack.push(argv as u64);
        thread.stack.set_fp(mark.handle);
        mark
    }

    /// Pop a frame pushed by [`AsmBridge::push_unfold_argv_frame`]
    pub fn pop_unfold_argv_frame(&self, thread: &mut VmThread, mark: FrameMark) {
        self.unlink_frame(thread, &mark);
    }

    /// sp to the handle, fp from the saved slot, leave frame as captured
    pub(crate) fn unlink_frame(&self, thread: &mut VmThread, mark: &FrameMark) {
        thread.stack.set_sp(mark.handle);
        let saved_fp = thread.stack.pop() as usize;
        thread.stack.set_fp(saved_fp);
        thread.glue.leave_frame = mark.saved_leave_frame;
        log::trace!("pop {:?} frame at {:#x}", mark.frame_type, mark.handle);
    }
}
