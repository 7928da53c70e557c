//! Subcommands: `run` feeds events through the transports, `validate` and
//! `info` only inspect the configuration.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;
