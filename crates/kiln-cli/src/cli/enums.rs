use clap::ValueEnum;
use kiln_config::{Mode, OutputMode};

/// Build mode passed to the bundler
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum ModeArg {
    /// Unminified output for local development
    #[value(name = "development")]
    Development,

    /// Minified output, as it would ship
    #[value(name = "production")]
    Production,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Development => Mode::Development,
            ModeArg::Production => Mode::Production,
        }
    }
}

/// How server progress is rendered
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum OutputArg {
    /// Interactive output with spinners
    #[value(name = "dashboard")]
    Dashboard,

    /// Plain line-oriented output, for CI or piping
    #[value(name = "stream")]
    Stream,
}

impl From<OutputArg> for OutputMode {
    fn from(output: OutputArg) -> Self {
        match output {
            OutputArg::Dashboard => OutputMode::Dashboard,
            OutputArg::Stream => OutputMode::Stream,
        }
    }
}
