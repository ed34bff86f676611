use std::path::PathBuf;

use clap::{Parser, ValueHint};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[clap(version,about="a design-space exploration driver for memory arrays",long_about=None)]
pub struct Args {
    /// Generate completion for the given shell
    #[clap(long = "generate", short = 'g', arg_enum)]
    pub generator: Option<Shell>,
    /// the path of the run configuration file
    #[clap(long = "config", short = 'c', parse(from_os_str), value_hint = ValueHint::FilePath)]
    pub config: PathBuf,
}
