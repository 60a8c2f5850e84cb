//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names, aliases,
//! help text, and value enums.  No business logic lives here.

use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

pub mod global;
pub use global::{GlobalArgs, OutputFormat};

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "kubegen",
    bin_name = "kubegen",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "Declarative Kubernetes manifest and apply-script generator",
    long_about = "kubegen builds a Traefik 2 ingress and a Loki or Prometheus \
                  monitoring stack for a deployment target and writes the manifests \
                  together with an apply script.",
    after_help = "EXAMPLES:\n\
        \x20 kubegen generate --provider k3d\n\
        \x20 kubegen generate --provider amazon-eks --values prod.yaml --output deploy\n\
        \x20 kubegen providers --format json\n\
        \x20 kubegen completions bash > /usr/share/bash-completion/completions/kubegen",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate manifests and the apply script for a provider.
    #[command(
        visible_alias = "gen",
        about = "Generate manifests and apply script",
        after_help = "EXAMPLES:\n\
            \x20 kubegen generate -p k3d\n\
            \x20 kubegen generate -p google-gke --no-timestamp -o out\n\
            \x20 kubegen generate -p amazon-eks --patches patches.yaml --stdout\n\
            \x20 kubegen generate -p k3d --stack prometheus\n\
            \x20 kubegen generate -p digitalocean-kubernetes --dry-run"
    )]
    Generate(GenerateArgs),

    /// List supported providers.
    #[command(
        visible_alias = "ls",
        about = "List supported providers",
        after_help = "EXAMPLES:\n\
            \x20 kubegen providers\n\
            \x20 kubegen providers --format json"
    )]
    Providers(ProvidersArgs),

    /// Initialise a kubegen configuration file.
    #[command(
        about = "Initialise configuration",
        after_help = "EXAMPLES:\n\
            \x20 kubegen init           # default location\n\
            \x20 kubegen init --local   # .kubegen.toml in CWD"
    )]
    Init(InitArgs),

    /// Generate shell completion scripts.
    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n\
            \x20 kubegen completions bash > ~/.local/share/bash-completion/completions/kubegen\n\
            \x20 kubegen completions zsh  > ~/.zfunc/_kubegen\n\
            \x20 kubegen completions fish > ~/.config/fish/completions/kubegen.fish"
    )]
    Completions(CompletionsArgs),

    /// Inspect the kubegen configuration.
    #[command(
        about = "Configuration management",
        subcommand,
        after_help = "EXAMPLES:\n\
            \x20 kubegen config get generate.provider\n\
            \x20 kubegen config list\n\
            \x20 kubegen config path"
    )]
    Config(ConfigCommands),
}

// ── generate ──────────────────────────────────────────────────────────────────

/// Arguments for `kubegen generate`.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Deployment target. Defaults to `generate.provider` from the config.
    #[arg(
        short = 'p',
        long = "provider",
        value_name = "PROVIDER",
        help = "Provider: k3d, google-gke, amazon-eks, digitalocean-kubernetes"
    )]
    pub provider: Option<String>,

    /// Monitoring stack. Defaults to `generate.stack` from the config.
    #[arg(long = "stack", value_enum, value_name = "STACK", help = "Monitoring stack")]
    pub stack: Option<Stack>,

    /// Parent directory of the generated output directory.
    #[arg(
        short = 'o',
        long = "output",
        value_name = "DIR",
        help = "Output parent directory (default: generate.output_dir)"
    )]
    pub output: Option<PathBuf>,

    /// YAML values overlaid onto the root options, in order.
    #[arg(
        long = "values",
        value_name = "FILE",
        help = "Values file overlaid onto the root options (repeatable)"
    )]
    pub values: Vec<PathBuf>,

    /// YAML patch rules applied after the provider's own rules.
    #[arg(
        long = "patches",
        value_name = "FILE",
        help = "Patch rule file (repeatable)"
    )]
    pub patches: Vec<PathBuf>,

    /// Name used in the local cluster setup hint.
    #[arg(long = "cluster-name", value_name = "NAME", help = "Local cluster name")]
    pub cluster_name: Option<String>,

    /// Write into `<output>/<provider>` instead of a timestamped directory.
    #[arg(long = "no-timestamp", help = "Do not timestamp the output directory")]
    pub no_timestamp: bool,

    /// Print every file to stdout instead of writing a directory.
    #[arg(long = "stdout", conflicts_with = "dry_run", help = "Print files to stdout")]
    pub stdout: bool,

    /// Render everything, write nothing.
    #[arg(long = "dry-run", help = "Show what would be written without writing")]
    pub dry_run: bool,

    /// Reject duplicate object identities and forward file references.
    #[arg(long = "strict", help = "Enable strict identity and reference checks")]
    pub strict: bool,
}

/// Monitoring stack deployed behind the ingress controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stack {
    /// Loki with Promtail collectors and Grafana.
    #[default]
    Loki,
    /// Prometheus with Grafana dashboards.
    Prometheus,
}

impl Stack {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loki => "loki",
            Self::Prometheus => "prometheus",
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── providers ─────────────────────────────────────────────────────────────────

/// Arguments for `kubegen providers`.
#[derive(Debug, Args)]
pub struct ProvidersArgs {
    /// Output format.
    #[arg(
        long = "format",
        value_enum,
        default_value = "table",
        help = "Output format"
    )]
    pub format: ListFormat,
}

/// Output format for the `providers` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// Human-readable table.
    Table,
    /// One name per line.
    List,
    /// JSON array.
    Json,
}

// ── init ──────────────────────────────────────────────────────────────────────

/// Arguments for `kubegen init`.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Write to `.kubegen.toml` in the current directory.
    #[arg(
        long = "local",
        help = "Create local configuration in current directory"
    )]
    pub local: bool,

    /// Overwrite an existing config file.
    #[arg(short = 'f', long = "force", help = "Overwrite existing configuration")]
    pub force: bool,
}

// ── completions ───────────────────────────────────────────────────────────────

/// Arguments for `kubegen completions`.
#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum, help = "Shell to generate completions for")]
    pub shell: Shell,
}

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ── config subcommands ────────────────────────────────────────────────────────

/// Subcommands for `kubegen config`.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the value of a configuration key.
    Get {
        /// Dotted key path, e.g. `generate.provider`.
        key: String,
    },
    /// Print all configuration values.
    List,
    /// Print the path to the active configuration file.
    Path,
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_generate_command() {
        let cli = Cli::parse_from([
            "kubegen",
            "generate",
            "--provider",
            "k3d",
            "--values",
            "a.yaml",
            "--values",
            "b.yaml",
        ]);
        let Commands::Generate(args) = cli.command else {
            panic!("expected Generate command");
        };
        assert_eq!(args.provider.as_deref(), Some("k3d"));
        assert_eq!(args.values.len(), 2);
        assert!(!args.strict);
        assert_eq!(args.stack, None);
    }

    #[test]
    fn stack_is_a_value_enum() {
        let cli = Cli::parse_from(["kubegen", "generate", "--stack", "prometheus"]);
        let Commands::Generate(args) = cli.command else {
            panic!("expected Generate command");
        };
        assert_eq!(args.stack, Some(Stack::Prometheus));
        assert!(Cli::try_parse_from(["kubegen", "generate", "--stack", "elk"]).is_err());
    }

    #[test]
    fn gen_alias() {
        let cli = Cli::parse_from(["kubegen", "gen", "-p", "eks"]);
        assert!(matches!(cli.command, Commands::Generate(_)));
    }

    #[test]
    fn stdout_conflicts_with_dry_run() {
        let result = Cli::try_parse_from(["kubegen", "generate", "--stdout", "--dry-run"]);
        assert!(result.is_err());
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        let result = Cli::try_parse_from(["kubegen", "--quiet", "--verbose", "providers"]);
        assert!(result.is_err());
    }
}
