//! Shared helpers for integration tests

use hostctx_core::Engine;
use wasmtime::Module;

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Compile a module from its text form
#[allow(dead_code)]
pub fn compile(engine: &Engine, wat: &str) -> Module {
    Module::new(engine.native_handle(), wat).expect("test module should compile")
}
