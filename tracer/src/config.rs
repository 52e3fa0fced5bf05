//! Tracer and container configuration.

use std::{env, path::PathBuf, str::FromStr};

use crate::{container::SlotPolicy, memory::MemorySpaceType};

/// Fixed per-container overhead added to every container's total size.
pub const DEFAULT_CONTAINER_OVERHEAD: u64 = 8;

/// Where the root context is written when its [`Session`](crate::Session)
/// ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DumpTarget {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
    Off,
}

impl FromStr for DumpTarget {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "" | "stdout" | "-" => DumpTarget::Stdout,
            "stderr" => DumpTarget::Stderr,
            "off" | "none" => DumpTarget::Off,
            path => DumpTarget::File(PathBuf::from(path)),
        })
    }
}

/// Per-thread tracer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Target of the root context dump.
    pub output: DumpTarget,
    /// Append the memory space manifest to the root dump.
    pub manifest: bool,
    /// Append the dependency export to the root dump.
    pub dependencies: bool,
    /// Device class of freshly assigned root spaces.
    pub space_type: MemorySpaceType,
    /// Slot policy of sparse containers that do not pick their own.
    pub slot_policy: SlotPolicy,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            output: DumpTarget::Stdout,
            manifest: false,
            dependencies: false,
            space_type: MemorySpaceType::Cpu,
            slot_policy: SlotPolicy::LowestFree,
        }
    }
}

impl TraceConfig {
    /// Reads `MEMTRACE_OUTPUT`, `MEMTRACE_MANIFEST`, `MEMTRACE_DEPS`,
    /// `MEMTRACE_SPACE` and `MEMTRACE_SEED` on top of the defaults.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(output) = env::var("MEMTRACE_OUTPUT") {
            config.output = output.parse().unwrap_or_default();
        }
        if let Some(flag) = env_flag("MEMTRACE_MANIFEST") {
            config.manifest = flag;
        }
        if let Some(flag) = env_flag("MEMTRACE_DEPS") {
            config.dependencies = flag;
        }
        if let Ok(space) = env::var("MEMTRACE_SPACE") {
            match space.parse() {
                Ok(space_type) => config.space_type = space_type,
                Err(_) => tracing::warn!(%space, "ignoring unknown MEMTRACE_SPACE"),
            }
        }
        if let Ok(seed) = env::var("MEMTRACE_SEED") {
            match seed.as_str() {
                "random" => config.slot_policy = SlotPolicy::Random,
                seed => match seed.parse() {
                    Ok(seed) => config.slot_policy = SlotPolicy::Seeded(seed),
                    Err(_) => tracing::warn!(%seed, "ignoring invalid MEMTRACE_SEED"),
                },
            }
        }

        config
    }

    pub fn with_output(mut self, output: DumpTarget) -> Self {
        self.output = output;
        self
    }

    pub fn with_manifest(mut self, manifest: bool) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_dependencies(mut self, dependencies: bool) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_space_type(mut self, space_type: MemorySpaceType) -> Self {
        self.space_type = space_type;
        self
    }

    pub fn with_slot_policy(mut self, slot_policy: SlotPolicy) -> Self {
        self.slot_policy = slot_policy;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(name, %value, "ignoring non-boolean flag");
            None
        }
    }
}

/// How a container's element size is determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ElementSize {
    /// The largest element ever stored.
    #[default]
    Inferred,
    /// At least `bytes`; larger elements are handled per `overflow`.
    Fixed { bytes: u64, overflow: Overflow },
}

/// What happens when an element is larger than a fixed element size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Overflow {
    /// Grow the element size to fit.
    #[default]
    Widen,
    /// Fail the insertion with [`TraceError::ElementTooLarge`](crate::TraceError::ElementTooLarge).
    Reject,
}

/// Construction options of a tracked container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Per-key slot addressing instead of `index * element_size`.
    pub sparse: bool,
    /// Number of slots of a sparse container; grows with the container when
    /// unset.
    pub capacity: Option<u64>,
    /// Elements covered by each read event emitted during iteration.
    pub batch: u64,
    /// Initial contents are already materialized: no synthetic writes.
    pub pre_resident: bool,
    /// Slot choice of a sparse container; the tracer default when unset.
    pub slot_policy: Option<SlotPolicy>,
    pub element_size: ElementSize,
    /// Bytes added to the container's total size.
    pub overhead: u64,
    /// Device class of the container's space if it becomes a root; the tracer
    /// default when unset.
    pub space_type: Option<MemorySpaceType>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self::dense()
    }
}

impl ContainerConfig {
    pub fn dense() -> Self {
        Self {
            sparse: false,
            capacity: None,
            batch: 1,
            pre_resident: false,
            slot_policy: None,
            element_size: ElementSize::Inferred,
            overhead: DEFAULT_CONTAINER_OVERHEAD,
            space_type: None,
        }
    }

    pub fn sparse() -> Self {
        Self {
            sparse: true,
            ..Self::dense()
        }
    }

    /// Declares the number of sparse slots.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the iteration batch granularity, clamped to at least one element.
    pub fn batch(mut self, batch: u64) -> Self {
        self.batch = batch.max(1);
        self
    }

    pub fn pre_resident(mut self) -> Self {
        self.pre_resident = true;
        self
    }

    pub fn slot_policy(mut self, policy: SlotPolicy) -> Self {
        self.slot_policy = Some(policy);
        self
    }

    pub fn element_size(mut self, element_size: ElementSize) -> Self {
        self.element_size = element_size;
        self
    }

    pub fn overhead(mut self, overhead: u64) -> Self {
        self.overhead = overhead;
        self
    }

    pub fn space_type(mut self, space_type: MemorySpaceType) -> Self {
        self.space_type = Some(space_type);
        self
    }
}
