//! Bridge configuration
//!
//! ```toml
//! arch = "x64"
//! stack_slots = 131072
//! reserved_slots = 256
//! arg_push_batch = 8
//!
//! [region_scheme]
//! young = 9
//! old = 10
//! shared_space_begin = 18
//! shared_sweepable_begin = 18
//! shared_old = 18
//! shared_sweepable_end = 20
//! shared_read_only = 21
//! ```

use serde::{Deserialize, Serialize};

use crate::arch::TargetArch;
use crate::defaults::{
    DEFAULT_ARG_PUSH_BATCH, DEFAULT_RESERVED_SLOTS, DEFAULT_STACK_SLOTS, MIN_RESERVED_SLOTS,
};
use crate::error::ConfigError;
use crate::heap::RegionFlagScheme;

/// Options for one execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Target instruction set
    pub arch: TargetArch,
    /// Machine stack size in slots
    pub stack_slots: usize,
    /// Headroom between the stack limit and the physical bottom
    pub reserved_slots: usize,
    /// Argument slots copied between two stack-limit checks
    pub arg_push_batch: usize,
    /// Poison stack slots when they are released
    pub scrub_released_slots: bool,
    /// Region flags the heap allocator tags regions with
    pub region_scheme: RegionFlagScheme,
}

impl BridgeOptions {
    /// Parse options from TOML; missing keys take their defaults
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let options: BridgeOptions = toml::from_str(src)?;
        options.validate()?;
        Ok(options)
    }

    /// Check invariants the bridge depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reserved_slots < MIN_RESERVED_SLOTS {
            return Err(ConfigError::HeadroomTooSmall {
                reserved_slots: self.reserved_slots,
                minimum: MIN_RESERVED_SLOTS,
            });
        }
        if self.reserved_slots >= self.stack_slots {
            return Err(ConfigError::StackTooSmall {
                stack_slots: self.stack_slots,
                reserved_slots: self.reserved_slots,
            });
        }
        if self.arg_push_batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        self.region_scheme.validate()
    }

    /// Builder-style stack size
    pub fn with_stack_slots(mut self, slots: usize) -> Self {
        self.stack_slots = slots;
        self
    }

    /// Builder-style architecture
    pub fn with_arch(mut self, arch: TargetArch) -> Self {
        self.arch = arch;
        self
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            arch: TargetArch::host(),
            stack_slots: DEFAULT_STACK_SLOTS,
            reserved_slots: DEFAULT_RESERVED_SLOTS,
            arg_push_batch: DEFAULT_ARG_PUSH_BATCH,
            scrub_released_slots: true,
            region_scheme: RegionFlagScheme::default(),
        }
    }
}
