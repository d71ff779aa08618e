use anyhow::anyhow;
use tracing::debug;

use crate::cli::{CliContext, OutputFormat, TargetArgs};
use crate::commands::build_request;
use crate::error::{CliError, CliResult};
use crate::output::print_json;

/// Print the command a provision run would execute. Nothing is staged or spawned.
pub(crate) fn handle_render_command(ctx: &CliContext, args: TargetArgs) -> CliResult<()> {
    let request = build_request(ctx, args)?;
    let (invoker, command) = request
        .command(request.options.use_vault_password)
        .map_err(CliError::from_pipeline)?;
    let rendered = invoker
        .render(&command)
        .map_err(|err| CliError::failure(anyhow!(err).context("failed to render command")))?;
    debug!(program = command.program(), "rendered provisioning command");

    match ctx.output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "command": rendered,
            "argv": invoker.launch_argv(&command),
        })),
        OutputFormat::Table => {
            println!("{rendered}");
            Ok(())
        }
    }
}
