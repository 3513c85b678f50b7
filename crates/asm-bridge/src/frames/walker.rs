//! Frame chain walker
//!
//! Walks from a frame handle through the previous-frame links until the
//! link is zero. This is the view the GC and the exception unwinder have of
//! the stack: every step reads only the type tag and the link, so a frame
//! is walkable as soon as those two slots are written.

use serde::Serialize;

use crate::defaults::FRAME_SLOT_SIZE;
use crate::error::FrameError;
use crate::frames::layout::{
    interpreted_state_roots, layout_of, BuiltinWithArgvFrameSlots, InterpretedFrameSlots,
    LeaveFrameSlots, OptimizedArgBlockSlots, RootSlots, RuntimeCallInfoSlots, BASELINE_PC_MARKER,
};
use crate::frames::FrameType;
use crate::stack::MachineStack;

/// Where a frame's pc points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PcLocation {
    /// No pc recorded
    None,
    /// Bytecode address
    Bytecode(usize),
    /// Frame is executing baseline code
    Baseline,
}

/// One step of the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    /// Frame type
    pub frame_type: FrameType,
    /// Frame handle
    pub handle: usize,
    /// Previous frame handle, zero at the bottom of the chain
    pub prev: usize,
    /// Pc slot, decoded
    pub pc: PcLocation,
}

impl FrameInfo {
    /// Addresses of every slot the GC must treat as a root
    pub fn root_slots(&self, stack: &MachineStack) -> Vec<usize> {
        let h = self.handle;
        let at = |slots: isize| MachineStack::slot_addr(h, slots);
        let mut roots = Vec::new();
        match layout_of(self.frame_type).roots {
            RootSlots::None => {}
            RootSlots::Fixed(offsets) => roots.extend(offsets.iter().map(|o| at(*o))),
            RootSlots::Interpreted => {
                roots.extend(interpreted_state_roots().iter().map(|o| at(*o)));
                let fp = stack.read_slot(h, InterpretedFrameSlots::FP) as usize;
                roots.extend((h..fp).step_by(FRAME_SLOT_SIZE));
            }
            RootSlots::CallInfoAbove => {
                let info = at(1);
                let argc = stack.read_slot(info, RuntimeCallInfoSlots::ARGC) as usize;
                let first = MachineStack::slot_addr(info, RuntimeCallInfoSlots::CALL_TARGET);
                roots.extend((0..argc).map(|i| first + i * FRAME_SLOT_SIZE));
            }
            RootSlots::ArgvBelow => {
                let n = stack.read_slot(h, BuiltinWithArgvFrameSlots::NUM_ARGS) as isize;
                // args, this, new.target, call target
                roots.extend((0..n + 3).map(|i| at(BuiltinWithArgvFrameSlots::ARGS_TOP - i)));
            }
            RootSlots::LeaveArgs => {
                let argc = stack.read_slot(h, LeaveFrameSlots::ARGC) as isize;
                roots.extend((0..argc).map(|i| at(LeaveFrameSlots::ARGS - i)));
            }
            RootSlots::ArgBlockAbove => {
                let block = at(1);
                let slots = stack.read_slot(block, OptimizedArgBlockSlots::ARG_SLOTS) as usize;
                let first = MachineStack::slot_addr(block, OptimizedArgBlockSlots::FUNC);
                roots.extend((0..slots + 3).map(|i| first + i * FRAME_SLOT_SIZE));
            }
        }
        roots
    }
}

/// Iterator over the frame chain
pub struct FrameIterator<'a> {
    stack: &'a MachineStack,
    next: usize,
    failed: bool,
}

impl<'a> FrameIterator<'a> {
    /// Walk starting at `handle`
    pub fn new(stack: &'a MachineStack, handle: usize) -> Self {
        Self {
            stack,
            next: handle,
            failed: false,
        }
    }

    /// Walk starting at the current frame pointer
    pub fn from_top(stack: &'a MachineStack) -> Self {
        Self::new(stack, stack.fp())
    }

    fn decode(&self, handle: usize) -> Result<FrameInfo, FrameError> {
        let tag_addr = MachineStack::slot_addr(handle, -1);
        if !self.stack.contains(handle) && !self.stack.contains(tag_addr) {
            return Err(FrameError::OutOfBounds(handle));
        }
        let tag = self
            .stack
            .try_read(tag_addr)
            .ok_or(FrameError::OutOfBounds(handle))?;
        let frame_type =
            FrameType::from_tag(tag).ok_or(FrameError::UnknownTag { handle, tag })?;
        let layout = layout_of(frame_type);
        let prev = self
            .stack
            .try_read(MachineStack::slot_addr(handle, layout.prev_slot))
            .ok_or(FrameError::OutOfBounds(handle))? as usize;
        if prev != 0 && (prev <= handle || !self.stack.contains(prev - FRAME_SLOT_SIZE)) {
            return Err(FrameError::BrokenLink { handle, prev });
        }
        let pc = match layout.pc_slot {
            Some(slot) => {
                match self.stack.try_read(MachineStack::slot_addr(handle, slot)) {
                    Some(BASELINE_PC_MARKER) => PcLocation::Baseline,
                    Some(0) | None => PcLocation::None,
                    Some(addr) => PcLocation::Bytecode(addr as usize),
                }
            }
            None => PcLocation::None,
        };
        Ok(FrameInfo {
            frame_type,
            handle,
            prev,
            pc,
        })
    }
}

impl Iterator for FrameIterator<'_> {
    type Item = Result<FrameInfo, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == 0 || self.failed {
            return None;
        }
        match self.decode(self.next) {
            Ok(info) => {
                self.next = info.prev;
                Some(Ok(info))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Walk the whole chain from the current frame pointer
pub fn walk(stack: &MachineStack) -> Result<Vec<FrameInfo>, FrameError> {
    FrameIterator::from_top(stack).collect()
}

/// Serializable dump of a frame chain
#[derive(Debug, Clone, Serialize)]
pub struct StackSnapshot {
    /// Stack pointer at capture time
    pub sp: usize,
    /// Frame pointer at capture time
    pub fp: usize,
    /// Frames from the top of the chain down
    pub frames: Vec<FrameInfo>,
}

impl StackSnapshot {
    /// Capture the chain starting at the current frame pointer
    pub fn capture(stack: &MachineStack) -> Result<Self, FrameError> {
        Ok(Self {
            sp: stack.sp(),
            fp: stack.fp(),
            frames: walk(stack)?,
        })
    }

    /// Frame types from top to bottom
    pub fn frame_types(&self) -> Vec<FrameType> {
        self.frames.iter().map(|f| f.frame_type).collect()
    }

    /// JSON rendering
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}
