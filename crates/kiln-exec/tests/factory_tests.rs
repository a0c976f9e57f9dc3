//! Kernel factory integration tests over the host reference queue.

mod common;

use std::sync::Arc;
use std::thread;

use kiln_core::{codes, ExecError, ExecutionTarget, FaultKind};
use kiln_exec::{Backend, ExecConfig, ExecutionContext, HostQueue};

use common::{context, vector_queue, VECTOR_SRC};

// ============================================================================
// Program cache
// ============================================================================

#[test]
fn test_build_get_kernel_scenario() {
    let ctx = context(vector_queue());
    let factory = ctx.kernel_factory();

    factory.build(ExecutionTarget::Gpu, "P1", VECTOR_SRC, "").unwrap();
    assert_eq!(factory.program_count(), 1);

    factory.build(ExecutionTarget::Gpu, "P1", VECTOR_SRC, "").unwrap();
    assert_eq!(factory.program_count(), 1);

    let first = factory.get_kernel("k1").unwrap();
    assert_eq!(factory.kernel_count(), 1);

    let second = factory.get_kernel("k1").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.kernel_count(), 1);

    match factory.get_kernel("missing") {
        Err(ExecError::KernelNotFound { program, kernel, .. }) => {
            assert_eq!(program, "P1");
            assert_eq!(kernel, "missing");
        }
        other => panic!("expected KernelNotFound, got {:?}", other),
    }
    assert_eq!(factory.kernel_count(), 1);
}

#[test]
fn test_rebuild_does_not_recompile() {
    let ctx = context(vector_queue());
    let factory = ctx.kernel_factory();

    let first = factory.build(ExecutionTarget::Gpu, "P1", VECTOR_SRC, "").unwrap();
    // A different source under a cached name is not compiled.
    let second = factory.build(ExecutionTarget::Cpu, "P1", "__kernel void other() {}", "").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.source(), VECTOR_SRC);
    assert_eq!(ctx.queue().stats().native_compiles, 1);
}

#[test]
fn test_rebuild_updates_current_program_and_target() {
    let ctx = context(vector_queue());
    let factory = ctx.kernel_factory();

    factory.build(ExecutionTarget::Gpu, "A", VECTOR_SRC, "").unwrap();
    factory.build(ExecutionTarget::Gpu, "B", VECTOR_SRC, "").unwrap();
    assert_eq!(factory.current_program().unwrap().name(), "B");

    factory.build(ExecutionTarget::Cpu, "A", VECTOR_SRC, "").unwrap();
    assert_eq!(factory.current_program().unwrap().name(), "A");

    let kernel = factory.get_kernel("k1").unwrap();
    assert_eq!(kernel.program_name(), "A");
    assert_eq!(kernel.target(), ExecutionTarget::Cpu);
}

#[test]
fn test_get_kernel_before_build() {
    let ctx = context(vector_queue());
    assert_eq!(ctx.kernel_factory().get_kernel("k1").unwrap_err(), ExecError::NoActiveProgram);
    assert!(ctx.kernel_factory().current_program().is_none());
}

#[test]
fn test_failed_build_is_not_cached() {
    let ctx = context(vector_queue());
    let factory = ctx.kernel_factory();

    let err = factory
        .build(ExecutionTarget::Gpu, "broken", "__kernel void k1(__global float* x) {\n  x[0] = (1;\n}\n", "")
        .unwrap_err();
    match err {
        ExecError::BuildError { program, log } => {
            assert_eq!(program, "broken");
            assert!(log.contains("line 2"), "{}", log);
        }
        other => panic!("expected BuildError, got {:?}", other),
    }
    assert_eq!(factory.program_count(), 0);
    assert!(!factory.contains_program("broken"));
    assert_eq!(factory.get_kernel("k1").unwrap_err(), ExecError::NoActiveProgram);

    // Retrying with fixed source succeeds.
    factory.build(ExecutionTarget::Gpu, "broken", VECTOR_SRC, "").unwrap();
    assert!(factory.contains_program("broken"));
}

#[test]
fn test_bad_options_are_build_errors() {
    let ctx = context(vector_queue());
    let err = ctx.kernel_factory().build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "-D N=1 fast").unwrap_err();
    assert!(matches!(err, ExecError::BuildError { ref log, .. } if log.contains("'fast'")));
}

#[test]
fn test_program_cache_capacity() {
    let config = ExecConfig { program_cache_capacity: 2, ..ExecConfig::default() };
    let ctx = ExecutionContext::with_config(Arc::new(vector_queue().build()), config).unwrap();
    let factory = ctx.kernel_factory();

    factory.build(ExecutionTarget::Gpu, "a", VECTOR_SRC, "").unwrap();
    factory.build(ExecutionTarget::Gpu, "b", VECTOR_SRC, "").unwrap();
    let err = factory.build(ExecutionTarget::Gpu, "c", VECTOR_SRC, "").unwrap_err();
    assert_eq!(err, ExecError::CapacityExceeded { table: "program", capacity: 2 });

    // No compile was spent on the rejected program and cached names still resolve.
    assert_eq!(ctx.queue().stats().native_compiles, 2);
    assert!(factory.build(ExecutionTarget::Gpu, "a", VECTOR_SRC, "").is_ok());
}

#[test]
fn test_kernel_cache_capacity() {
    let config = ExecConfig { kernel_cache_capacity: 1, ..ExecConfig::default() };
    let ctx = ExecutionContext::with_config(Arc::new(vector_queue().build()), config).unwrap();
    let factory = ctx.kernel_factory();

    factory.build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "").unwrap();
    factory.get_kernel("k1").unwrap();
    let err = factory.get_kernel("vadd").unwrap_err();
    assert_eq!(err, ExecError::CapacityExceeded { table: "kernel", capacity: 1 });
    assert!(factory.get_kernel("k1").is_ok());
}

#[test]
fn test_invalid_config_rejected() {
    let config = ExecConfig { kernel_cache_capacity: 0, ..ExecConfig::default() };
    let err = ExecutionContext::with_config(Arc::new(HostQueue::new()), config).unwrap_err();
    assert!(matches!(err, ExecError::InvalidConfig(_)));
}

// ============================================================================
// Kernel extraction
// ============================================================================

#[test]
fn test_kernel_keys_are_per_program() {
    let ctx = context(vector_queue());
    let factory = ctx.kernel_factory();

    let p1 = factory.build(ExecutionTarget::Gpu, "P1", VECTOR_SRC, "").unwrap();
    let p2 = factory.build(ExecutionTarget::Gpu, "P2", VECTOR_SRC, "").unwrap();

    let from_p1 = factory.kernel(&p1, "k1").unwrap();
    let from_p2 = factory.kernel(&p2, "k1").unwrap();
    assert!(!Arc::ptr_eq(&from_p1, &from_p2));
    assert_eq!(factory.kernel_count(), 2);

    // The explicit-handle form and the current-program form share entries.
    let current = factory.get_kernel("k1").unwrap();
    assert!(Arc::ptr_eq(&current, &from_p2));
    assert!(Arc::ptr_eq(&from_p1.program().unwrap(), &p1));
}

#[test]
fn test_kernel_target_is_recorded_target_in_both_forms() {
    let ctx = context(vector_queue());
    let factory = ctx.kernel_factory();

    let p1 = factory.build(ExecutionTarget::Gpu, "P1", VECTOR_SRC, "").unwrap();
    factory.build(ExecutionTarget::Cpu, "P2", VECTOR_SRC, "").unwrap();

    // P1 was built for Gpu, but the factory now records Cpu.
    assert_eq!(p1.target(), ExecutionTarget::Gpu);
    let explicit = factory.kernel(&p1, "k1").unwrap();
    assert_eq!(explicit.target(), ExecutionTarget::Cpu);

    let current = factory.get_kernel("vadd").unwrap();
    assert_eq!(current.target(), ExecutionTarget::Cpu);
}

#[test]
fn test_kernel_from_foreign_program_rejected() {
    let ours = context(vector_queue());
    let theirs = context(vector_queue());
    let foreign = theirs.kernel_factory().build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "").unwrap();

    assert!(matches!(
        ours.kernel_factory().kernel(&foreign, "k1"),
        Err(ExecError::NotFound { .. })
    ));

    ours.kernel_factory().build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "").unwrap();
    assert!(matches!(
        ours.kernel_factory().kernel(&foreign, "k1"),
        Err(ExecError::NotFound { .. })
    ));
}

#[test]
fn test_declared_kernel_without_body() {
    let ctx = context(vector_queue());
    ctx.kernel_factory().build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "").unwrap();
    let err = ctx.kernel_factory().get_kernel("unbound").unwrap_err();
    assert!(matches!(err, ExecError::KernelNotFound { ref reason, .. } if reason.contains("host implementation")));
    assert_eq!(ctx.kernel_factory().kernel_count(), 0);
}

// ============================================================================
// Backend selection
// ============================================================================

#[test]
fn test_native_backend_when_supported() {
    let ctx = context(vector_queue());
    let factory = ctx.kernel_factory();

    let program = factory.build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "").unwrap();
    assert_eq!(program.backend(), Backend::Native);
    assert_eq!(factory.get_kernel("k1").unwrap().backend(), Backend::Native);
    assert_eq!(factory.get_kernel("vadd").unwrap().backend(), Backend::Native);
    assert!(!factory.has_interop_context());
    assert_eq!(ctx.queue().stats().interop_contexts, 0);
}

#[test]
fn test_interop_backend_when_native_unsupported() {
    let ctx = context(vector_queue().native_supported(false));
    let factory = ctx.kernel_factory();

    let p1 = factory.build(ExecutionTarget::Gpu, "P1", VECTOR_SRC, "").unwrap();
    let p2 = factory.build(ExecutionTarget::Gpu, "P2", VECTOR_SRC, "").unwrap();
    assert_eq!(p1.backend(), Backend::Interop);
    assert_eq!(p2.backend(), Backend::Interop);
    assert_eq!(factory.kernel(&p1, "k1").unwrap().backend(), Backend::Interop);
    assert_eq!(factory.kernel(&p2, "vadd").unwrap().backend(), Backend::Interop);

    let stats = ctx.queue().stats();
    assert!(factory.has_interop_context());
    assert_eq!(stats.interop_contexts, 1);
    assert_eq!(stats.interop_compiles, 2);
    assert_eq!(stats.native_compiles, 0);
}

#[test]
fn test_interop_disabled_forces_native() {
    let config = ExecConfig { interop_enabled: false, ..ExecConfig::default() };
    let queue = Arc::new(vector_queue().native_supported(false).build());
    let ctx = ExecutionContext::with_config(queue, config).unwrap();

    let program = ctx.kernel_factory().build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "").unwrap();
    assert_eq!(program.backend(), Backend::Native);
    assert!(!ctx.kernel_factory().has_interop_context());
}

#[test]
fn test_interop_context_failure_is_backend_fault() {
    let ctx = context(vector_queue().native_supported(false).interop_available(false));
    let factory = ctx.kernel_factory();

    let err = factory.build(ExecutionTarget::Gpu, "P", VECTOR_SRC, "").unwrap_err();
    assert_eq!(err.fault_kind(), Some(FaultKind::DeviceUnavailable));
    assert!(matches!(err, ExecError::BackendFault { code, .. } if code == codes::DEVICE_NOT_AVAILABLE));
    assert!(!factory.has_interop_context());
    assert_eq!(factory.program_count(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_builds_compile_once() {
    let ctx = Arc::new(context(vector_queue().native_supported(false)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                let program = ctx.kernel_factory().build(ExecutionTarget::Gpu, "shared", VECTOR_SRC, "").unwrap();
                let kernel = ctx.kernel_factory().kernel(&program, "vadd").unwrap();
                (program, kernel)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (program, kernel) in &results[1..] {
        assert!(Arc::ptr_eq(program, &results[0].0));
        assert!(Arc::ptr_eq(kernel, &results[0].1));
    }
    let stats = ctx.queue().stats();
    assert_eq!(stats.interop_compiles, 1);
    assert_eq!(stats.interop_contexts, 1);
    assert_eq!(ctx.kernel_factory().kernel_count(), 1);
}
