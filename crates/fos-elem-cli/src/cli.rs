//! Command-line interface definitions.

use clap::{Parser, Subcommand, ValueEnum};
use fos_elem::{ElemConfig, Mode, StyleMode};
use std::path::PathBuf;

/// Mirror a component build directory and resolve references against it
#[derive(Parser, Debug, Clone)]
#[command(name = "elem", version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Build directory containing index.json
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Public base path the build is served from
    #[arg(short, long, default_value = "/")]
    pub base: String,

    /// Loading strategy
    #[arg(short, long, value_enum, default_value_t = ModeArg::Lazy)]
    pub mode: ModeArg,

    /// Inline stylesheets instead of linking them
    #[arg(long)]
    pub inline_styles: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the mirrored tree
    Tree,

    /// Print the tag registry
    Tags,

    /// Resolve a reference and print its content or exports
    Resolve {
        /// Reference, e.g. `/widgets/button` or `./util`
        reference: String,

        /// Extension to look for
        #[arg(short, long, default_value = "js")]
        ext: String,

        /// File the reference is relative to
        #[arg(short, long, default_value = "/")]
        from: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Eager,
    Lazy,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Eager => Mode::Eager,
            ModeArg::Lazy => Mode::Lazy,
        }
    }
}

impl Cli {
    pub fn config(&self) -> ElemConfig {
        let styles = if self.inline_styles {
            StyleMode::Inlined
        } else {
            StyleMode::Linked
        };

        ElemConfig::new(self.mode.into())
            .base_path(&self.base)
            .styles(styles)
    }
}
