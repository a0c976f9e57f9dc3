#![allow(dead_code)]

use std::sync::{Arc, Once};

use kiln_core::{codes, QueueFault};
use kiln_exec::host::{HostLaunch, HostQueueBuilder};
use kiln_exec::{ExecutionContext, HostQueue};

pub const VECTOR_SRC: &str = r#"
// Element-wise kernels over float buffers.
__kernel void k1(__global float* x) { x[get_global_id(0)] += 1.0f; }

__kernel void vadd(__global const float* a, __global const float* b, __global float* out) {
    size_t i = get_global_id(0);
    out[i] = a[i] + b[i];
}

/* Declared but never given a host body. */
__kernel void unbound(__global float* x) { }
"#;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

fn expect_f32() -> QueueFault {
    QueueFault::new(codes::INVALID_ARG_VALUE, "expected an f32 buffer")
}

fn k1(launch: &HostLaunch<'_>) -> Result<(), QueueFault> {
    let n = launch.global_size();
    launch
        .buffer(0)?
        .with_mut::<f32, _>(|x| x.iter_mut().take(n).for_each(|v| *v += 1.0))
        .ok_or_else(expect_f32)
}

fn vadd(launch: &HostLaunch<'_>) -> Result<(), QueueFault> {
    let n = launch.global_size();
    let a = launch.buffer(0)?.to_vec::<f32>().ok_or_else(expect_f32)?;
    let b = launch.buffer(1)?.to_vec::<f32>().ok_or_else(expect_f32)?;
    launch
        .buffer(2)?
        .with_mut::<f32, _>(|out| {
            for i in 0..n {
                out[i] = a[i] + b[i];
            }
        })
        .ok_or_else(expect_f32)
}

/// Host queue builder with the kernels of [`VECTOR_SRC`] registered.
pub fn vector_queue() -> HostQueueBuilder {
    HostQueue::builder().kernel("k1", k1).kernel("vadd", vadd)
}

pub fn context(builder: HostQueueBuilder) -> ExecutionContext<HostQueue> {
    init_tracing();
    ExecutionContext::new(Arc::new(builder.build()))
}

pub fn assert_close(a: &[f64], b: &[f64], tol: f64) {
    assert_eq!(a.len(), b.len(), "length mismatch: {} vs {}", a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!((x - y).abs() < tol, "element {} differs: {} vs {} (tol={})", i, x, y, tol);
    }
}
