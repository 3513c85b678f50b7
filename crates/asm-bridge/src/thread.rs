//! Execution context
//!
//! One `VmThread` per JS thread: its glue block, machine stack, heap view
//! and register file. Everything the bridge touches is reached through it.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::arch::CpuState;
use crate::bridge::AsmBridge;
use crate::config::BridgeOptions;
use crate::defaults::{FRAME_SLOT_SIZE, STACK_TOP_ADDRESS};
use crate::error::ConfigError;
use crate::glue::Glue;
use crate::heap::Heap;
use crate::stack::MachineStack;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// One execution context
#[derive(Debug)]
pub struct VmThread {
    /// Glue state block
    pub glue: Glue,
    /// Machine stack
    pub stack: MachineStack,
    /// Heap
    pub heap: Heap,
    /// General-purpose registers
    pub cpu: CpuState,
    bridge: AsmBridge,
    id: u64,
}

impl VmThread {
    /// Build a thread from validated options
    pub fn new(options: &BridgeOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let mut stack = MachineStack::new(STACK_TOP_ADDRESS, options.stack_slots);
        stack.set_scrub_released(options.scrub_released_slots);
        let stack_limit = stack.bottom() + options.reserved_slots * FRAME_SLOT_SIZE;
        let arch = options.arch.backend();
        let cpu = CpuState::new(arch.register_count());
        let bridge = AsmBridge::new(arch, options.arg_push_batch);
        Ok(Self {
            glue: Glue::new(stack_limit),
            stack,
            heap: Heap::new(options.region_scheme),
            cpu,
            bridge,
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Thread with default options
    pub fn with_defaults() -> Self {
        let options = BridgeOptions::default();
        // Default options always validate.
        match Self::new(&options) {
            Ok(thread) => thread,
            Err(e) => panic!("default bridge options rejected: {}", e),
        }
    }

    /// Bridge routines for this thread's architecture
    pub fn bridge(&self) -> AsmBridge {
        self.bridge.clone()
    }

    /// Thread id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Word written into the thread slot of call info blocks
    pub fn thread_word(&self) -> u64 {
        self.id
    }
}
