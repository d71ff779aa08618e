use tracing::info;

use crate::cli::{CliContext, OverrideArgs};
use crate::error::CliResult;
use crate::output::render_options;

/// Resolve the layered options and print them.
pub(crate) fn handle_check_config(ctx: &CliContext, args: OverrideArgs) -> CliResult<()> {
    let options = ctx.resolve_options(args)?;
    info!(
        exec_root = options.exec_root.as_str(),
        tool = %options.tool,
        "options resolved"
    );
    render_options(&options, ctx.output)
}
