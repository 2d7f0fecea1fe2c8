use clap::{Args, Subcommand};
use kiln_config::{BundlerOverrides, ConfigOverrides, DevOverrides};
use std::path::PathBuf;

use crate::cli::enums::*;

/// Available kiln subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development server
    ///
    /// Starts the bundler's build server and serves the project through a
    /// proxy in front of it until interrupted with Ctrl+C.
    Dev(DevArgs),
}

/// Arguments for the dev command (development server)
#[derive(Args, Debug, Default)]
pub struct DevArgs {
    /// Port for the development server
    ///
    /// Overrides `devOptions.port` (default 8080).
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Directory to serve
    ///
    /// Relative paths are resolved against the current directory.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Path to a config file
    ///
    /// Used instead of searching for kiln.toml, kiln.config.json or the
    /// `kiln` field of package.json.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Build mode; production minifies the bundler output
    #[arg(long, value_enum, value_name = "MODE")]
    pub mode: Option<ModeArg>,

    /// Disable the change notification stream
    #[arg(long)]
    pub no_hmr: bool,

    /// Browser to open once the server is running, or `none`
    #[arg(long, value_name = "BROWSER")]
    pub open: Option<String>,

    /// How progress is rendered
    #[arg(long, value_enum, value_name = "OUTPUT")]
    pub output: Option<OutputArg>,

    /// Bundler executable to run
    #[arg(long, value_name = "COMMAND")]
    pub bundler: Option<String>,

    /// Entry points handed to the bundler
    #[arg(long = "entry", value_name = "PATH", num_args = 1..)]
    pub entry: Vec<String>,
}

impl DevArgs {
    /// Settings given on the command line, as the top config layer.
    ///
    /// Flags that were not passed leave the lower layers untouched.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            mode: self.mode.map(Into::into),
            dev_options: DevOverrides {
                port: self.port,
                root: self.root.clone(),
                output: self.output.map(Into::into),
                open: self.open.clone(),
                hmr: self.no_hmr.then_some(false),
            },
            bundler: BundlerOverrides {
                command: self.bundler.clone(),
                entry_points: (!self.entry.is_empty()).then(|| self.entry.clone()),
            },
        }
    }
}
