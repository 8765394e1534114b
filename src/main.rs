use anyhow::Result;
use codeclock::{
    cli::run_cli,
    utils::runtime::{single_thread_runtime, SHUTDOWN_GRACE},
};
use tracing::error;

fn main() -> Result<()> {
    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(run_cli()).inspect_err(|e| {
        error!("Error running cli {e:?}");
    });
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}
