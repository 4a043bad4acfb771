//! Repair prompt construction.

use hive_sandbox::SandboxResult;

use crate::diagnose::Diagnosis;

/// Build the prompt sent to the repair agent for a failed run.
///
/// Error output falls back to stdout when the program wrote nothing to
/// stderr. The diagnosis line is omitted when nothing useful was recognized.
pub fn build_prompt(
    language: &str,
    code: &str,
    result: &SandboxResult,
    diagnosis: Option<&Diagnosis>,
) -> String {
    let mut prompt = format!(
        "The following {language} code failed with an error.\nCODE:\n{code}\n\nERROR (STDERR):\n{}\n",
        result.error_output().trim_end()
    );

    if let Some(diagnosis) = diagnosis {
        prompt.push_str(&format!("\nDIAGNOSIS:\n{}\n", diagnosis.summary()));
    }

    prompt.push_str(&format!(
        "\nPlease analyze the stack trace, identify the bug, and provide the FULL FIXED {language} code."
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::diagnose_output;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn failed(stderr: &str) -> SandboxResult {
        let mut result = SandboxResult::launch_failure(stderr, Duration::ZERO);
        result.exit_code = 1;
        result
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("python", "print(y)", &failed("NameError: y\n"), None);
        assert_eq!(
            prompt,
            "The following python code failed with an error.\nCODE:\nprint(y)\n\nERROR (STDERR):\nNameError: y\n\nPlease analyze the stack trace, identify the bug, and provide the FULL FIXED python code."
        );
    }

    #[test]
    fn test_prompt_includes_diagnosis() {
        let result = failed("NameError: name 'y' is not defined");
        let diagnosis = diagnose_output(&result.stderr);
        let prompt = build_prompt("python", "print(y)", &result, Some(&diagnosis));
        assert!(prompt.contains("DIAGNOSIS:\nNameError: name 'y' is not defined. Hint:"));
    }

    #[test]
    fn test_prompt_uses_stdout_when_stderr_empty() {
        let mut result = failed("");
        result.stdout = "fatal: bad input".to_string();
        let prompt = build_prompt("sh", "exit 1", &result, None);
        assert!(prompt.contains("ERROR (STDERR):\nfatal: bad input\n"));
    }
}
