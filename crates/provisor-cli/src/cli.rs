//! Argument parsing and command dispatch for the `provisor` binary.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use provisor_config::{ExecRoot, MissingSecretPolicy, OptionsBuilder, OptionsDocument};
use provisor_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, init_logging};

use crate::commands::check_config::handle_check_config;
use crate::commands::provision::handle_provision;
use crate::commands::render::handle_render_command;
use crate::error::{CliError, CliResult};

/// Parses CLI arguments, installs logging, executes the requested command and
/// reports any error. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    let format = match cli.log_format.as_deref().map(LogFormat::from_str).transpose() {
        Ok(format) => format.unwrap_or_else(LogFormat::infer),
        Err(err) => {
            eprintln!("error: {err}");
            return CliError::validation(err.to_string()).exit_code();
        }
    };
    let logging = LoggingConfig {
        format,
        ..LoggingConfig::default()
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err}");
    }
    let _context = GlobalContextGuard::new(command_label(&cli.command));

    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let ctx = CliContext {
        config: cli.config,
        output: cli.output,
    };
    match cli.command {
        Command::Provision(args) => handle_provision(&ctx, args).await,
        Command::RenderCommand(args) => handle_render_command(&ctx, args),
        Command::CheckConfig(args) => handle_check_config(&ctx, args),
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Provision(_) => "provision",
        Command::RenderCommand(_) => "render-command",
        Command::CheckConfig(_) => "check-config",
    }
}

/// Options shared by every command handler.
pub(crate) struct CliContext {
    pub(crate) config: Option<PathBuf>,
    pub(crate) output: OutputFormat,
}

impl CliContext {
    /// Resolve options from defaults, the optional config file and `overrides`.
    pub(crate) fn resolve_options(
        &self,
        overrides: OverrideArgs,
    ) -> CliResult<provisor_config::Options> {
        let mut builder = OptionsBuilder::new();
        if let Some(path) = &self.config {
            builder = builder.with_file(path).map_err(CliError::from_config)?;
        }
        builder
            .with_document(overrides.into_document())
            .resolve()
            .map_err(CliError::from_config)
    }
}

#[derive(Parser)]
#[command(
    name = "provisor",
    version,
    about = "Provision a mounted target root by running Ansible playbooks inside it"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "PROVISOR_CONFIG",
        help = "YAML options document layered over the built-in defaults"
    )]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "PROVISOR_LOG_FORMAT",
        help = "Log format: json or pretty (defaults by build profile)"
    )]
    log_format: Option<String>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stage playbooks, run the tool inside the target and clean up.
    Provision(ProvisionArgs),
    /// Print the command line a provision run would execute.
    RenderCommand(TargetArgs),
    /// Resolve and print the effective options.
    CheckConfig(OverrideArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

/// Overrides applied on top of the config file.
#[derive(Args, Default)]
pub(crate) struct OverrideArgs {
    #[arg(long, help = "Extra key=value variables passed to the tool")]
    extra_vars: Option<String>,
    #[arg(long, help = "Application version recorded in provenance metadata")]
    app_version: Option<String>,
    #[arg(long, help = "Host directory holding the playbooks to stage")]
    playbooks_path: Option<PathBuf>,
    #[arg(long, help = "Pass the vault password file to the tool")]
    vault_password: bool,
    #[arg(long, help = "Leave staged playbooks in the target after the run")]
    keep_playbooks: bool,
    #[arg(long, value_parser = parse_exec_root, help = "Where the tool runs: chroot or host")]
    exec_root: Option<ExecRoot>,
    #[arg(
        long,
        value_parser = parse_secret_policy,
        help = "Behaviour when the vault password is unavailable: abort or continue"
    )]
    missing_secret: Option<MissingSecretPolicy>,
    #[arg(long, help = "Kill the tool after this many seconds")]
    timeout_secs: Option<u64>,
}

impl OverrideArgs {
    fn into_document(self) -> OptionsDocument {
        OptionsDocument {
            extra_vars: self.extra_vars,
            app_version: self.app_version,
            playbooks_source_path: self.playbooks_path,
            use_vault_password: self.vault_password.then_some(true),
            keep_playbooks_after_run: self.keep_playbooks.then_some(true),
            exec_root: self.exec_root,
            missing_secret_policy: self.missing_secret,
            command_timeout_secs: self.timeout_secs,
            ..OptionsDocument::default()
        }
    }
}

/// A target mount and the playbook to run against it.
#[derive(Args)]
pub(crate) struct TargetArgs {
    #[arg(long, help = "Host path where the target root is mounted")]
    pub(crate) target: PathBuf,
    #[arg(long, help = "Playbook file name inside the playbook directory")]
    pub(crate) package: String,
    #[command(flatten)]
    pub(crate) overrides: OverrideArgs,
}

#[derive(Args)]
pub(crate) struct ProvisionArgs {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    #[arg(long, help = "Write the provenance record as JSON to this file")]
    pub(crate) record_out: Option<PathBuf>,
    #[arg(long, help = "Write Prometheus metrics to this node-exporter textfile")]
    pub(crate) metrics_textfile: Option<PathBuf>,
}

fn parse_exec_root(value: &str) -> Result<ExecRoot, String> {
    value.parse().map_err(|_| format!("unknown exec root `{value}`"))
}

fn parse_secret_policy(value: &str) -> Result<MissingSecretPolicy, String> {
    value
        .parse()
        .map_err(|_| format!("unknown missing secret policy `{value}`"))
}
