//! Command handlers grouped by concern.

pub(crate) mod check_config;
pub(crate) mod provision;
pub(crate) mod render;

use provisor_app::ProvisioningRequest;

use crate::cli::{CliContext, TargetArgs};
use crate::error::CliResult;

/// Resolve options and assemble the request shared by `provision` and `render-command`.
pub(crate) fn build_request(ctx: &CliContext, args: TargetArgs) -> CliResult<ProvisioningRequest> {
    let options = ctx.resolve_options(args.overrides)?;
    Ok(ProvisioningRequest::new(args.target, args.package, options))
}
