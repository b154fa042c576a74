//! Integration tests for stores running real modules

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{compile, init_tracing};
use hostctx_core::{
    Caller, ContextTag, Engine, EngineConfig, EpochAction, RegistryError, StoreError,
    StoreLike, StoreWithData,
};
use wasmtime::{Func, Instance, Trap};

const WASM_PAGE: i64 = 64 * 1024;

const THREE_PAGE_MEMORY: &str = r#"
    (module
      (memory 3))
"#;

#[test]
fn test_store_with_data_interrupt_wasm() {
    init_tracing();
    let engine = Engine::new(EngineConfig::with_epoch_interruption()).unwrap();
    let mut store = StoreWithData::new(&engine, ()).unwrap();
    store.set_epoch_deadline(1).unwrap();

    let module = compile(
        &engine,
        r#"
        (module
          (import "" "" (func))
          (func
            call 0
            (loop br 0))
          (start 1))
        "#,
    );

    let ticker = engine.clone();
    let tick = Func::wrap(&mut store, move || ticker.increment_epoch());

    let err = Instance::new(&mut store, &module, &[tick.into()]).unwrap_err();
    assert_eq!(err.downcast_ref::<Trap>(), Some(&Trap::Interrupt));
}

#[test]
fn test_store_with_data_fuel_not_enabled() {
    let engine = Engine::default();
    let store = StoreWithData::new(&engine, ()).unwrap();

    assert!(matches!(
        store.get_fuel(),
        Err(StoreError::ConfigMismatch(_))
    ));
}

#[test]
fn test_store_with_data_add_fuel() {
    let engine = Engine::new(EngineConfig::with_fuel()).unwrap();
    let mut store = StoreWithData::new(&engine, ()).unwrap();

    assert_eq!(store.get_fuel().unwrap(), 0);

    store.set_fuel(3).unwrap();
    assert_eq!(store.get_fuel().unwrap(), 3);
}

#[test]
fn test_fuel_exhaustion_traps() {
    let engine = Engine::new(EngineConfig::with_fuel()).unwrap();
    let mut store = StoreWithData::new(&engine, ()).unwrap();
    store.set_fuel(10_000).unwrap();

    let module = compile(
        &engine,
        r#"
        (module
          (func (export "spin")
            (loop br 0)))
        "#,
    );
    let instance = Instance::new(&mut store, &module, &[]).unwrap();
    let spin = instance
        .get_typed_func::<(), ()>(&mut store, "spin")
        .unwrap();

    let err = spin.call(&mut store, ()).unwrap_err();
    assert_eq!(err.downcast_ref::<Trap>(), Some(&Trap::OutOfFuel));
}

#[test]
fn test_store_with_data_limiter_memory_size_fail() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, ()).unwrap();
    store.limiter(2 * WASM_PAGE, -1, -1, -1, -1).unwrap();

    let module = compile(&engine, THREE_PAGE_MEMORY);
    match Instance::new(&mut store, &module, &[]) {
        Ok(_) => panic!("instantiation must fail above the memory limit"),
        Err(err) => assert!(
            err.to_string().contains("exceeds memory limits"),
            "unexpected error: {err:#}"
        ),
    }
}

#[test]
fn test_store_with_data_limiter_memory_size_success() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, ()).unwrap();
    store.limiter(4 * WASM_PAGE, -1, -1, -1, -1).unwrap();

    let module = compile(&engine, THREE_PAGE_MEMORY);
    assert!(Instance::new(&mut store, &module, &[]).is_ok());
}

#[test]
fn test_limiter_instance_count() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, ()).unwrap();
    store.limiter(-1, -1, 1, -1, -1).unwrap();

    let module = compile(&engine, "(module)");
    assert!(Instance::new(&mut store, &module, &[]).is_ok());
    assert!(Instance::new(&mut store, &module, &[]).is_err());
}

#[derive(Debug, PartialEq)]
struct TestStruct {
    x: i32,
}

#[test]
fn test_store_with_data_retrieval() {
    let engine = Engine::default();
    let store = StoreWithData::new(&engine, TestStruct { x: 1 }).unwrap();

    assert_eq!(*store.data().unwrap(), TestStruct { x: 1 });
}

#[test]
fn test_caller_recovers_store_data() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, TestStruct { x: 41 }).unwrap();

    let module = compile(
        &engine,
        r#"
        (module
          (import "host" "x" (func $x (result i32)))
          (func (export "next") (result i32)
            call $x
            i32.const 1
            i32.add))
        "#,
    );
    let host_x = Func::wrap(
        &mut store,
        |caller: wasmtime::Caller<'_, ContextTag>| -> wasmtime::Result<i32> {
            let caller = Caller::<TestStruct>::new(caller);
            Ok(caller.data()?.x)
        },
    );

    let instance = Instance::new(&mut store, &module, &[host_x.into()]).unwrap();
    let next = instance
        .get_typed_func::<(), i32>(&mut store, "next")
        .unwrap();
    assert_eq!(next.call(&mut store, ()).unwrap(), 42);
}

#[test]
fn test_caller_with_wrong_type_reports_mismatch() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, 7u32).unwrap();

    let read_data = Func::wrap(
        &mut store,
        |caller: wasmtime::Caller<'_, ContextTag>| -> i32 {
            let caller = Caller::<String>::new(caller);
            let mismatch = matches!(
                caller.data(),
                Err(StoreError::Registry(RegistryError::TypeMismatch { .. }))
            );
            i32::from(mismatch)
        },
    );

    let typed = read_data.typed::<(), i32>(&store).unwrap();
    assert_eq!(typed.call(&mut store, ()).unwrap(), 1);
}

/// Reads data through anything store-like
fn read_x<S: StoreLike<TestStruct>>(store: &S) -> i32 {
    store.data().map(|data| data.x).unwrap_or(-1)
}

#[test]
fn test_store_like_accepts_store_and_caller() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, TestStruct { x: 9 }).unwrap();
    assert_eq!(read_x(&store), 9);

    let through_caller = Func::wrap(
        &mut store,
        |caller: wasmtime::Caller<'_, ContextTag>| -> i32 {
            read_x(&Caller::<TestStruct>::from(caller))
        },
    );
    let typed = through_caller.typed::<(), i32>(&store).unwrap();
    assert_eq!(typed.call(&mut store, ()).unwrap(), 9);
}

struct Ticks {
    seen: AtomicUsize,
}

#[test]
fn test_epoch_callback_sees_data_and_interrupts() {
    init_tracing();
    let engine = Engine::new(EngineConfig::with_epoch_interruption()).unwrap();
    let ticks = Ticks {
        seen: AtomicUsize::new(0),
    };
    let mut store = StoreWithData::new(&engine, ticks).unwrap();
    store.set_epoch_deadline(1).unwrap();
    store
        .epoch_deadline_callback(|ticks: &Ticks| {
            if ticks.seen.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                EpochAction::Continue(1)
            } else {
                EpochAction::Interrupt
            }
        })
        .unwrap();

    let module = compile(
        &engine,
        r#"
        (module
          (import "" "tick" (func $tick))
          (func (export "run")
            (loop
              call $tick
              br 0)))
        "#,
    );
    let ticker = engine.clone();
    let tick = Func::wrap(&mut store, move || ticker.increment_epoch());
    let instance = Instance::new(&mut store, &module, &[tick.into()]).unwrap();
    let run = instance.get_typed_func::<(), ()>(&mut store, "run").unwrap();

    let err = run.call(&mut store, ()).unwrap_err();
    assert_eq!(err.downcast_ref::<Trap>(), Some(&Trap::Interrupt));
    assert_eq!(store.data().unwrap().seen.load(Ordering::SeqCst), 3);
}

#[test]
fn test_epoch_deadline_requires_config() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, ()).unwrap();

    assert!(matches!(
        store.set_epoch_deadline(1),
        Err(StoreError::ConfigMismatch("epoch interruption"))
    ));
}

#[test]
fn test_epoch_callback_requires_config() {
    let engine = Engine::default();
    let mut store = StoreWithData::new(&engine, ()).unwrap();

    assert!(matches!(
        store.epoch_deadline_callback(|_: &()| EpochAction::Interrupt),
        Err(StoreError::ConfigMismatch("epoch interruption"))
    ));
}

#[test]
fn test_engine_outlives_dropped_handle() {
    let engine = Engine::new(EngineConfig::with_fuel()).unwrap();
    let mut store = StoreWithData::new(&engine, Arc::new(5u8)).unwrap();
    drop(engine);

    store.set_fuel(1).unwrap();
    assert_eq!(store.engine().live_stores(), 1);
    assert_eq!(**store.data().unwrap(), 5);
}
