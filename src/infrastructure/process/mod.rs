pub mod git_command_line;

pub use git_command_line::{ExecResult, GitCommandLine};
