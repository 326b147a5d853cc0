pub mod config_cmd;
pub mod scans;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use specfile::{McaLayout, ParseOptions, ScanId};

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "specfile", version, about = "Browse scans in SPEC data files")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Args, Clone)]
pub struct GlobalArgs {
    /// How detector spectra are laid out (overrides config).
    #[arg(long, global = true, value_enum, env = "SPECFILE_MCA_LAYOUT")]
    pub layout: Option<LayoutArg>,

    /// Reject data rows with more values than declared columns.
    #[arg(long, global = true)]
    pub strict: bool,
}

impl GlobalArgs {
    /// Saved options with command-line overrides applied.
    pub fn parse_options(&self) -> anyhow::Result<ParseOptions> {
        let saved = CliConfig::load_or_default()?.parse;
        Ok(self.apply(saved))
    }

    fn apply(&self, mut options: ParseOptions) -> ParseOptions {
        if let Some(layout) = self.layout {
            options.mca_layout = layout.into();
        }
        if self.strict {
            options.strict_columns = true;
        }
        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// All samples of a point on one line.
    SingleLine,
    /// Samples may continue on following lines.
    Continuation,
}

impl From<LayoutArg> for McaLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::SingleLine => McaLayout::SingleLine,
            LayoutArg::Continuation => McaLayout::Continuation,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the scans of a file.
    List { path: PathBuf },

    /// Show file-level metadata.
    Info { path: PathBuf },

    /// Print a scan summary as JSON.
    Show {
        path: PathBuf,
        /// Scan number, or `<number>.<order>` for repeated numbers.
        scan: ScanId,
    },

    /// Print the data rows of a scan.
    Data {
        path: PathBuf,
        scan: ScanId,
        /// Emit the data block as JSON.
        #[arg(long)]
        json: bool,
    },

    /// View / edit configuration.
    Config(ConfigArgs),
}

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Display the current configuration.
    Show,
    /// Set a configuration value.
    Set { key: String, value: String },
}
