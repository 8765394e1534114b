use std::time::Duration;

use anyhow::Result;

/// Everything the tracker mutates lives on one thread, so a current thread runtime is all it
/// needs.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Reading stdin parks a blocking thread that can't be interrupted, so shutdown must not wait on
/// it forever.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
