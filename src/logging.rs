//! Logging initialization: `env_logger` honoring `RUST_LOG`, defaulting to
//! `info` (spec.md's ambient logging section), matching the teacher's
//! `log`/`env_logger` stack.

pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
