//! Write-barrier fast path
//!
//! Called after a tagged value is stored into a heap object. The fast path
//! decides from region flag bytes alone whether the store needs recording:
//!
//! ```text
//!   value flag >= shared sweepable begin?
//!   ├── yes: read-only shared ─────────────────────────► skip
//!   │        obj shared ───────────────► shared marking? ► Shared slow path
//!   │        obj local, no set yet ───────────────────► Shared slow path
//!   │        obj local ──► set bit inline ► shared marking? ► Shared slow path
//!   └── no:  value young, obj young ──────────────────► skip
//!            value young, obj old ────────────────────► NonShared slow path
//!            otherwise ───────────────► marking? ──────► NonShared slow path
//! ```
//!
//! Only the backend's scratch register may change across the fast path.
//! The inline bit set spills the backend's spill registers around its
//! work, and slow paths run under the preserve-most convention.

use crate::context::BarrierCall;
use crate::defaults::REGION_SIZE;
use crate::glue::BarrierKind;
use crate::heap::region_base;
use crate::thread::VmThread;
use crate::value::TaggedValue;

use super::{fatal, AsmBridge};

/// What the fast path did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierAction {
    /// Nothing to record
    Skip,
    /// Slot recorded in the local-to-share set without a call
    Recorded,
    /// Slow path called
    SlowPath(BarrierKind),
}

impl AsmBridge {
    /// Barrier for `obj[offset] = value`
    pub fn write_barrier(
        &self,
        thread: &mut VmThread,
        obj: TaggedValue,
        offset: usize,
        value: TaggedValue,
    ) -> BarrierAction {
        let (Some(obj_addr), Some(value_addr)) = (obj.address(), value.address()) else {
            return BarrierAction::Skip;
        };
        let scheme = *thread.heap.scheme();
        let value_flag = thread.heap.region_flag(value_addr);
        let scratch = self.arch.barrier_scratch();
        thread.cpu.set(scratch, u64::from(value_flag));

        let action = if scheme.is_shared_sweepable_or_read_only(value_flag) {
            if value_flag == scheme.shared_read_only {
                return BarrierAction::Skip;
            }
            self.shared_barrier(thread, obj_addr, offset)
        } else {
            let obj_flag = thread.heap.region_flag(obj_addr);
            thread.cpu.set(scratch, u64::from(obj_flag));
            if scheme.is_young(value_flag) {
                if scheme.is_young(obj_flag) {
                    return BarrierAction::Skip;
                }
                BarrierAction::SlowPath(BarrierKind::NonShared)
            } else if thread.glue.is_concurrent_marking() {
                BarrierAction::SlowPath(BarrierKind::NonShared)
            } else {
                BarrierAction::Skip
            }
        };

        if let BarrierAction::SlowPath(kind) = action {
            self.call_barrier_slow_path(thread, kind, BarrierCall { obj, offset, value });
        }
        action
    }

    /// Shared value stored into `obj`: record local-to-shared slots and
    /// decide whether the shared slow path runs
    fn shared_barrier(&self, thread: &mut VmThread, obj_addr: usize, offset: usize) -> BarrierAction {
        let scheme = *thread.heap.scheme();
        let obj_flag = thread.heap.region_flag(obj_addr);
        if scheme.is_shared(obj_flag) {
            return self.check_shared_marking(thread, BarrierAction::Skip);
        }

        let has_set = thread
            .heap
            .region(obj_addr)
            .map(|r| r.local_to_share_set.is_some())
            .unwrap_or(false);
        if !has_set {
            return BarrierAction::SlowPath(BarrierKind::Shared);
        }

        let slot_offset = (obj_addr - region_base(obj_addr)) + offset;
        if slot_offset >= REGION_SIZE {
            fatal(format_args!(
                "barrier slot {:#x}+{:#x} is outside its region",
                obj_addr, offset
            ));
        }
        let spills = self.arch.barrier_spills();
        for reg in spills {
            let saved = thread.cpu.get(*reg);
            thread.stack.push(saved);
        }
        let fresh = thread
            .heap
            .region_mut(obj_addr)
            .and_then(|r| r.local_to_share_set.as_mut())
            .map(|set| set.insert(slot_offset))
            .unwrap_or(false);
        for reg in spills.iter().rev() {
            let saved = thread.stack.pop();
            thread.cpu.set(*reg, saved);
        }
        log::trace!(
            "barrier: local-to-share slot {:#x} {}",
            slot_offset,
            if fresh { "recorded" } else { "already set" }
        );
        self.check_shared_marking(thread, BarrierAction::Recorded)
    }

    fn check_shared_marking(&self, thread: &VmThread, otherwise: BarrierAction) -> BarrierAction {
        if thread.glue.is_shared_concurrent_marking() {
            BarrierAction::SlowPath(BarrierKind::Shared)
        } else {
            otherwise
        }
    }

    fn call_barrier_slow_path(&self, thread: &mut VmThread, kind: BarrierKind, call: BarrierCall) {
        let Some(stub) = thread.glue.barrier_slow_path(kind) else {
            fatal(format_args!("{:?} barrier slow path is not installed", kind))
        };
        log::trace!("barrier: {:?} slow path for {:?}+{:#x}", kind, call.obj, call.offset);
        self.preserve_most_call(thread, |thread| stub(thread, call));
    }
}
