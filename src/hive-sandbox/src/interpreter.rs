//! Interpreter selection.

use serde::{Deserialize, Serialize};

/// How a code unit is turned into a process.
///
/// The code is written to `file_name` inside the run's work directory and
/// launched as `program [args...] file_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
    pub file_name: String,
}

impl Interpreter {
    pub fn new(program: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            file_name: file_name.into(),
        }
    }

    /// Python 3 from `PATH`.
    pub fn python() -> Self {
        Self::new("python3", "main.py")
    }

    /// POSIX shell.
    pub fn shell() -> Self {
        Self::new("sh", "script.sh")
    }

    /// Node.js from `PATH`.
    pub fn node() -> Self {
        Self::new("node", "main.js")
    }

    /// Append an argument placed before the script path.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::python()
    }
}
