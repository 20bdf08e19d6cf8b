//! Shared harness for the end-to-end tests

#![allow(dead_code)]

use std::sync::Arc;

use burnbox::{Burnbox, BurnboxConfig, Engine, HasherConfig};
use burnbox_core::ManualClock;
use tempfile::TempDir;

pub const SIGN_KEY: &str = "stew-pub-barcan-scatty-daimio-wicker-yakona";
pub const PIN: &str = "12345";

pub const ENGINES: [(Engine, bool); 5] = [
    (Engine::Memory, false),
    (Engine::Sled, true),
    (Engine::Sled, false),
    (Engine::Sqlite, true),
    (Engine::Sqlite, false),
];

pub struct Harness {
    pub burnbox: Burnbox,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

pub fn config(engine: Engine, in_memory: bool, dir: &TempDir) -> BurnboxConfig {
    let mut config = BurnboxConfig::with_sign_key(SIGN_KEY);
    config.storage.engine = engine;
    config.storage.in_memory = in_memory;
    config.storage.path = Some(dir.path().join(format!("burnbox-{engine}")));
    // tests that exercise the sweeper shorten this themselves
    config.storage.cleanup_interval_secs = 3600;
    config.hasher = HasherConfig {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    };
    config
}

pub fn harness_with(
    config_fn: impl FnOnce(&mut BurnboxConfig),
    engine: Engine,
    in_memory: bool,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(engine, in_memory, &dir);
    config_fn(&mut config);

    let clock = Arc::new(ManualClock::default());
    let burnbox = Burnbox::open_with_clock(&config, clock.clone()).unwrap();
    Harness {
        burnbox,
        clock,
        _dir: dir,
    }
}

pub fn harness(engine: Engine, in_memory: bool) -> Harness {
    harness_with(|_| {}, engine, in_memory)
}
