//! Command-line surface and its mapping onto `BuildConfig`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use unify_core::{BuildConfig, ConfigWarning, LogLevel};

#[derive(Debug, Parser)]
#[command(
    name = "unify",
    version,
    about = "Convention-driven static site generator",
    propagate_version = true,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the default `build` command.
    #[command(flatten)]
    pub build: BuildArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render the site once (the default when no command is given)
    Build(BuildArgs),
    /// Build, rebuild on change, and serve the output over HTTP
    Serve(BuildArgs),
    /// Build and rebuild on change
    Watch(BuildArgs),
    /// Scaffold a starter site
    Init(InitArgs),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Source directory (defaults to `.` or the value in unify.toml)
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Output directory (defaults to `dist`)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Emit `X.html` as `X/index.html` (except index.html itself)
    #[arg(long)]
    pub pretty_urls: bool,

    /// Base URL carried in the configuration for external collaborators
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Remove the output directory before building
    #[arg(long)]
    pub clean: bool,

    /// Accepted for the sitemap collaborator; the engine emits none
    #[arg(long)]
    pub sitemap: bool,

    /// Accepted for the minifier collaborator; the engine minifies nothing
    #[arg(long)]
    pub minify: bool,

    /// Fail the build on: warning, error, security, or a Uxxx code
    #[arg(long, value_name = "CONDITION")]
    pub fail_on: Option<String>,

    /// Force COPY for files matching the glob (repeatable)
    #[arg(long = "copy", value_name = "GLOB")]
    pub copy: Vec<String>,

    /// Force IGNORED for files matching the glob (repeatable)
    #[arg(long = "ignore", value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Force IGNORED for renderable files matching the glob (repeatable)
    #[arg(long = "ignore-render", value_name = "GLOB")]
    pub ignore_render: Vec<String>,

    /// Force IGNORED for copyable files matching the glob (repeatable)
    #[arg(long = "ignore-copy", value_name = "GLOB")]
    pub ignore_copy: Vec<String>,

    /// Force EMIT for files matching the glob (repeatable, beats --copy)
    #[arg(long = "render", value_name = "GLOB")]
    pub render: Vec<String>,

    /// Default layout as `glob=layout` or a bare layout path (repeatable)
    #[arg(long = "default-layout", value_name = "GLOB=LAYOUT")]
    pub default_layout: Vec<String>,

    /// Extra ignore glob, merged into --ignore (repeatable)
    #[arg(long = "exclude-pattern", value_name = "GLOB")]
    pub exclude_pattern: Vec<String>,

    /// Directory searched for fallback layouts and short names
    #[arg(long, value_name = "DIR")]
    pub layouts: Option<String>,

    /// Underscore-prefixed files are ignored automatically
    #[arg(long, value_name = "BOOL")]
    pub auto_ignore: Option<bool>,

    /// Log verbosity: error, warn, info, debug
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    pub verbose: bool,

    /// Classify and report without writing output
    #[arg(long)]
    pub dry_run: bool,

    /// Report format on stdout
    #[arg(long, value_enum, default_value = "human")]
    pub report: ReportFormat,

    /// Port for `serve`
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Host for `serve`
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,
}

impl BuildArgs {
    /// Build the engine configuration: defaults, then `unify.toml` at the
    /// source root, then these flags.
    pub fn to_config(&self) -> anyhow::Result<(BuildConfig, Vec<ConfigWarning>)> {
        let mut config = BuildConfig::default();
        let source = self
            .source
            .clone()
            .unwrap_or_else(|| config.source.clone());
        let warnings = config.load_project_file(&source)?;

        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if self.pretty_urls {
            config.pretty_urls = true;
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if self.clean {
            config.clean = true;
        }
        if self.sitemap {
            config.sitemap = true;
        }
        if self.minify {
            config.minify = true;
        }
        if let Some(fail_on) = &self.fail_on {
            config.fail_on = Some(fail_on.parse()?);
        }
        if let Some(auto_ignore) = self.auto_ignore {
            config.auto_ignore = auto_ignore;
        }
        if self.verbose {
            config.log_level = LogLevel::Debug;
        } else if let Some(level) = &self.log_level {
            config.log_level = level.parse()?;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(layouts) = &self.layouts {
            config.layouts_dir = layouts.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }

        config.patterns.copy.extend(self.copy.iter().cloned());
        config.patterns.ignore.extend(self.ignore.iter().cloned());
        config
            .patterns
            .ignore
            .extend(self.exclude_pattern.iter().cloned());
        config
            .patterns
            .ignore_render
            .extend(self.ignore_render.iter().cloned());
        config
            .patterns
            .ignore_copy
            .extend(self.ignore_copy.iter().cloned());
        config.patterns.render.extend(self.render.iter().cloned());
        config
            .patterns
            .default_layout
            .extend(self.default_layout.iter().cloned());

        Ok((config, warnings))
    }
}

#[derive(Debug, Clone, Args)]
pub struct InitArgs {
    /// Directory to scaffold into (created if missing)
    #[arg(default_value = ".")]
    pub directory: PathBuf,

    /// Scaffold even into a non-empty directory
    #[arg(long)]
    pub force: bool,
}
