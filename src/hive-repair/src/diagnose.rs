//! Failure classification for sandbox results.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use hive_sandbox::SandboxResult;

/// Final `Name: message` line of a traceback, e.g. `NameError: name 'x' is not defined`.
static EXCEPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:Uncaught )?([A-Za-z_][A-Za-z0-9_.]*(?:Error|Exception))(?::\s*(.*))?$")
        .expect("exception regex pattern is valid")
});

/// Source location inside a traceback, e.g. `File "main.py", line 3`.
static LINE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bline (\d+)").expect("line number regex pattern is valid"));

/// Broad failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Import,
    FileNotFound,
    Name,
    Type,
    Reference,
    PermissionDenied,
    Timeout,
    Connection,
    Unknown,
}

impl ErrorKind {
    /// First thing to try for this kind of failure.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Syntax => Some("Check brackets, commas, quotes and indentation"),
            ErrorKind::Import => Some("Use an available module or fix the module name"),
            ErrorKind::FileNotFound => Some("Check the file path or create the file first"),
            ErrorKind::Name => Some("Define the name before it is used or fix its spelling"),
            ErrorKind::Type => Some("Check the types of the values involved"),
            ErrorKind::Reference => Some("Declare the variable before it is used"),
            ErrorKind::PermissionDenied => Some("Avoid paths outside the working directory"),
            ErrorKind::Timeout => Some("Remove blocking calls or reduce the amount of work"),
            ErrorKind::Connection => Some("Avoid network access; use local data instead"),
            ErrorKind::Unknown => None,
        }
    }

    fn from_exception_name(name: &str) -> Option<Self> {
        let short = name.rsplit('.').next().unwrap_or(name);
        let kind = match short {
            "SyntaxError" | "IndentationError" | "TabError" => ErrorKind::Syntax,
            "ImportError" | "ModuleNotFoundError" => ErrorKind::Import,
            "FileNotFoundError" => ErrorKind::FileNotFound,
            "NameError" | "UnboundLocalError" => ErrorKind::Name,
            "TypeError" => ErrorKind::Type,
            "ReferenceError" => ErrorKind::Reference,
            "PermissionError" => ErrorKind::PermissionDenied,
            "TimeoutError" => ErrorKind::Timeout,
            "ConnectionError" | "ConnectionRefusedError" | "ConnectionResetError" => {
                ErrorKind::Connection
            }
            _ => return None,
        };
        Some(kind)
    }

    fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("syntax error") || lower.contains("syntaxerror") {
            ErrorKind::Syntax
        } else if lower.contains("permission denied") {
            ErrorKind::PermissionDenied
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ErrorKind::Timeout
        } else if lower.contains("connection") {
            ErrorKind::Connection
        } else if lower.contains("no such file") || lower.contains("not found") {
            ErrorKind::FileNotFound
        } else {
            ErrorKind::Unknown
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Import => "import error",
            ErrorKind::FileNotFound => "file not found",
            ErrorKind::Name => "undefined name",
            ErrorKind::Type => "type error",
            ErrorKind::Reference => "reference error",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection error",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// What went wrong in a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub kind: ErrorKind,
    /// Exception name as printed, e.g. `ZeroDivisionError`.
    pub exception: Option<String>,
    pub message: Option<String>,
    /// Innermost line number mentioned in the traceback.
    pub line: Option<u32>,
}

impl Diagnosis {
    pub fn suggestion(&self) -> Option<&'static str> {
        self.kind.suggestion()
    }

    /// One-line summary for prompts and logs.
    pub fn summary(&self) -> String {
        let mut out = match &self.exception {
            Some(name) => name.clone(),
            None => self.kind.to_string(),
        };
        if let Some(line) = self.line {
            out.push_str(&format!(" at line {line}"));
        }
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            out.push_str(": ");
            out.push_str(message);
        }
        if let Some(suggestion) = self.suggestion() {
            out.push_str(". Hint: ");
            out.push_str(suggestion);
        }
        out
    }
}

/// Classify a failed sandbox run.
pub fn diagnose(result: &SandboxResult) -> Diagnosis {
    let mut diagnosis = diagnose_output(result.error_output());
    if result.timed_out {
        diagnosis.kind = ErrorKind::Timeout;
    }
    diagnosis
}

/// Classify raw error output.
///
/// The last exception line wins, since tracebacks print the innermost error
/// last. Output without a recognizable exception is classified by keywords.
pub fn diagnose_output(output: &str) -> Diagnosis {
    let exception = EXCEPTION_LINE.captures_iter(output).last();
    let line = LINE_NUMBER
        .captures_iter(output)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());

    match exception {
        Some(caps) => {
            let name = caps.get(1).map(|m| m.as_str().to_string());
            let message = caps.get(2).map(|m| m.as_str().trim().to_string());
            let kind = name
                .as_deref()
                .and_then(ErrorKind::from_exception_name)
                .unwrap_or_else(|| ErrorKind::from_text(output));
            Diagnosis {
                kind,
                exception: name,
                message,
                line,
            }
        }
        None => {
            let message = output
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string);
            Diagnosis {
                kind: ErrorKind::from_text(output),
                exception: None,
                message,
                line,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const NAME_ERROR: &str = "Traceback (most recent call last):\n  File \"/tmp/hive-sandbox-x/main.py\", line 3, in <module>\n    print(y)\nNameError: name 'y' is not defined\n";

    #[test]
    fn test_python_name_error() {
        let d = diagnose_output(NAME_ERROR);
        assert_eq!(d.kind, ErrorKind::Name);
        assert_eq!(d.exception.as_deref(), Some("NameError"));
        assert_eq!(d.message.as_deref(), Some("name 'y' is not defined"));
        assert_eq!(d.line, Some(3));
    }

    #[test]
    fn test_syntax_error() {
        let output = "  File \"main.py\", line 1\n    print(\n         ^\nSyntaxError: '(' was never closed\n";
        let d = diagnose_output(output);
        assert_eq!(d.kind, ErrorKind::Syntax);
        assert_eq!(d.line, Some(1));
    }

    #[test]
    fn test_module_not_found_is_import() {
        let d = diagnose_output("ModuleNotFoundError: No module named 'numpyy'");
        assert_eq!(d.kind, ErrorKind::Import);
    }

    #[test]
    fn test_chained_traceback_uses_last_exception() {
        let output = "KeyError: 'a'\n\nDuring handling of the above exception, another exception occurred:\n\nTypeError: unsupported operand\n";
        let d = diagnose_output(output);
        assert_eq!(d.kind, ErrorKind::Type);
        assert_eq!(d.exception.as_deref(), Some("TypeError"));
    }

    #[test]
    fn test_unlisted_exception_keeps_name() {
        let d = diagnose_output("ZeroDivisionError: division by zero");
        assert_eq!(d.kind, ErrorKind::Unknown);
        assert_eq!(d.exception.as_deref(), Some("ZeroDivisionError"));
        assert!(d.summary().starts_with("ZeroDivisionError: division by zero"));
    }

    #[test]
    fn test_node_reference_error() {
        let d = diagnose_output("Uncaught ReferenceError: foo is not defined");
        assert_eq!(d.kind, ErrorKind::Reference);
    }

    #[test]
    fn test_keyword_fallbacks() {
        assert_eq!(
            diagnose_output("sh: 1: cat: Permission denied").kind,
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            diagnose_output("script.sh: 2: foo: not found").kind,
            ErrorKind::FileNotFound
        );
        assert_eq!(diagnose_output("something odd").kind, ErrorKind::Unknown);
        assert_eq!(
            diagnose_output("something odd\n").message.as_deref(),
            Some("something odd")
        );
    }

    #[test]
    fn test_timed_out_result_is_timeout() {
        let mut result = SandboxResult::launch_failure("partial output", Duration::from_secs(1));
        result.timed_out = true;
        assert_eq!(diagnose(&result).kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_summary_includes_hint() {
        let summary = diagnose_output(NAME_ERROR).summary();
        assert_eq!(
            summary,
            "NameError at line 3: name 'y' is not defined. Hint: Define the name before it is used or fix its spelling"
        );
    }
}
