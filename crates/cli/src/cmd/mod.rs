mod compile;
mod run;

pub use compile::cmd_compile;
pub use run::{RunArgs, cmd_run};
