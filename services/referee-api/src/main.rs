use std::sync::Arc;

use anyhow::Result;
use referee_api::{compat, DetectionStack, OnnxStack};
use referee_core::{init_tracing, load_config, shutdown_tracing, WARNING_FILTERS};

fn main() -> Result<()> {
    let cfg = load_config("referee-api")?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    let stack: Arc<dyn DetectionStack> = Arc::new(OnnxStack);
    // before any worker thread exists and before the stack is imported
    let shim = compat::apply(&cfg.compat, &WARNING_FILTERS, stack.as_ref());
    let served = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(referee_api::run(cfg, stack, shim.patches));
    shutdown_tracing();
    served
}
