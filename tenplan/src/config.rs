//! Planner configuration and debug switches.

use nanoserde::DeJson;

use crate::runtime::DummyConfig;

/// Bitmask of enabled diagnostics, usually set by `TENPLAN_DEBUG` env variable.
/// ```text
/// 0000 0001 DEBUG_GRAPH
/// 0000 0010 DEBUG_SCHED
/// 0000 0100 DEBUG_OPT
/// 0000 1000 DEBUG_MEM
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugMask(pub u32);

impl DebugMask {
    /// Operator construction and shape updates
    #[must_use]
    pub const fn graph(&self) -> bool {
        self.0 % 2 == 1
    }

    /// Topological sort
    #[must_use]
    pub const fn sched(&self) -> bool {
        (self.0 >> 1) % 2 == 1
    }

    /// Rewrite passes
    #[must_use]
    pub const fn opt(&self) -> bool {
        (self.0 >> 2) % 2 == 1
    }

    /// Allocator and memory plan
    #[must_use]
    pub const fn mem(&self) -> bool {
        (self.0 >> 3) % 2 == 1
    }
}

/// Planner configuration, read from `tenplan/config.json` in xdg config directories
#[derive(Debug, Clone, PartialEq, Eq, DeJson)]
pub struct PlanConfig {
    /// Each tensor reserves `byte_size * over_allocation` bytes, 0 is treated as 1
    #[nserde(default)]
    pub over_allocation: usize,
    /// Free intermediate tensors after their last consumer, so that tensors
    /// with disjoint lifetimes can share bytes
    #[nserde(default)]
    pub reuse_memory: bool,
    /// Maximum arena size in bytes, 0 means unbounded
    #[nserde(default)]
    pub arena_limit: usize,
    /// Debug bitmask, see [`DebugMask`]
    #[nserde(default)]
    pub debug: u32,
    /// Dummy runtime used for planning without a device
    #[nserde(default)]
    pub dummy: DummyConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        PlanConfig {
            over_allocation: 1,
            reuse_memory: false,
            arena_limit: 0,
            debug: 0,
            dummy: DummyConfig::default(),
        }
    }
}

impl PlanConfig {
    /// Searches config directories for tenplan/config.json.
    /// If not found or failed to parse, uses defaults.
    /// `TENPLAN_DEBUG` overrides the debug mask.
    #[must_use]
    pub fn load() -> PlanConfig {
        let env_debug = std::env::var("TENPLAN_DEBUG").ok().and_then(|x| x.parse::<u32>().ok());
        let debug = DebugMask(env_debug.unwrap_or(0));

        let mut config = xdg::BaseDirectories::new()
            .map_err(|e| {
                if debug.graph() {
                    println!("Failed to find config directories for config.json, {e}");
                }
            })
            .ok()
            .map(|bd| {
                let mut dirs = bd.get_config_dirs();
                dirs.push(bd.get_config_home());
                dirs
            })
            .and_then(|paths| {
                paths.into_iter().find_map(|mut path| {
                    path.push("tenplan/config.json");
                    std::fs::read_to_string(&path).ok()
                })
            })
            .and_then(|file| {
                PlanConfig::deserialize_json(&file)
                    .map_err(|e| {
                        if debug.graph() {
                            println!("Failed to parse config.json, {e}");
                        }
                    })
                    .ok()
            })
            .inspect(|_| {
                if debug.graph() {
                    println!("Config successfully read and parsed.");
                }
            })
            .unwrap_or_else(|| {
                if debug.graph() {
                    println!("Failed to get config, using defaults.");
                }
                PlanConfig::default()
            });
        if let Some(d) = env_debug {
            config.debug = d;
        }
        config
    }

    #[must_use]
    pub const fn debug_mask(&self) -> DebugMask {
        DebugMask(self.debug)
    }

    pub(crate) fn over_allocation(&self) -> usize {
        self.over_allocation.max(1)
    }
}

#[test]
fn debug_bits() {
    let mask = DebugMask(0b1010);
    assert!(!mask.graph());
    assert!(mask.sched());
    assert!(!mask.opt());
    assert!(mask.mem());
}

#[test]
fn parse_partial_config() {
    let config = PlanConfig::deserialize_json(r#"{"reuse_memory": true, "over_allocation": 8}"#).unwrap();
    assert!(config.reuse_memory);
    assert_eq!(config.over_allocation(), 8);
    assert_eq!(config.arena_limit, 0);
    let config = PlanConfig::deserialize_json("{}").unwrap();
    assert_eq!(config.over_allocation(), 1);
    assert_eq!(config.dummy, DummyConfig::default());
}

#[test]
fn dummy_capacity_from_config() {
    use crate::runtime::{DummyRuntime, Runtime};
    let config = PlanConfig::deserialize_json(r#"{"arena_limit": 64, "dummy": {"capacity": 100}}"#).unwrap();
    assert_eq!(config.dummy.capacity, 100);
    assert_eq!(DummyRuntime::new(&config.dummy).free_bytes(), 100);
    assert!(PlanConfig::deserialize_json(r#"{"dummy": {}}"#).is_err());
}
