//! One-shot result classification

use regex::Regex;
use std::sync::LazyLock;

use crate::runner::types::{ExecutionResult, FailureKind};

/// Output used when a program succeeds without printing anything
pub const EMPTY_OUTPUT_MESSAGE: &str = "Program ran successfully (no output was produced)";

/// Output used when a program with imports succeeds without printing anything
pub const EMPTY_OUTPUT_WITH_IMPORTS_MESSAGE: &str =
    "Program ran successfully but produced no output. If you expected output, \
     make sure your code calls print() and that every imported module is installed";

static MODULE_NOT_FOUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"No module named ['"]([^'"]+)['"]"#).expect("module-not-found regex is valid")
});

/// Captured streams of a finished process
#[derive(Debug, Clone, Default)]
pub struct CapturedRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Turn a finished process into the caller-facing result
pub fn classify(run: CapturedRun, session_id: &str, has_imports: bool) -> ExecutionResult {
    let success = run.exit_code == 0;
    let stdout = run.stdout.trim_end();

    let (output, error) = if success {
        let output = if stdout.trim().is_empty() {
            if has_imports {
                EMPTY_OUTPUT_WITH_IMPORTS_MESSAGE.to_string()
            } else {
                EMPTY_OUTPUT_MESSAGE.to_string()
            }
        } else {
            stdout.to_string()
        };
        (output, run.stderr)
    } else {
        let error = if run.stderr.trim().is_empty() {
            exit_code_message(run.exit_code)
        } else {
            run.stderr
        };
        (stdout.to_string(), error)
    };

    let hint = missing_module(&error).map(|module| install_hint(&module));

    ExecutionResult {
        success,
        output,
        error,
        exit_code: run.exit_code,
        session_id: session_id.to_string(),
        missing_modules: Vec::new(),
        hint,
        failure_kind: (!success).then_some(FailureKind::Runtime),
    }
}

/// Generic failure text for a non-zero exit with nothing on stderr
pub fn exit_code_message(code: i32) -> String {
    format!(
        "Process exited with code {}. This often means missing packages or syntax errors",
        code
    )
}

/// Top-level module named in a "No module named 'x'" error, if any
pub fn missing_module(error_text: &str) -> Option<String> {
    MODULE_NOT_FOUND_RE
        .captures(error_text)
        .and_then(|caps| caps[1].split('.').next().map(str::to_string))
        .filter(|name| !name.is_empty())
}

/// Remediation text for one missing module
pub fn install_hint(module: &str) -> String {
    format!("Module '{}' is not installed. Install it with: pip install {}", module, module)
}

/// Remediation text for several missing modules
pub fn install_hint_for(modules: &[String]) -> Option<String> {
    match modules {
        [] => None,
        [single] => Some(install_hint(single)),
        many => Some(format!(
            "Modules {} are not installed. Install them with: pip install {}",
            many.iter().map(|m| format!("'{}'", m)).collect::<Vec<_>>().join(", "),
            many.join(" ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stdout: &str, stderr: &str, exit_code: i32) -> CapturedRun {
        CapturedRun {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    #[test]
    fn test_success_passes_output_through() {
        let result = classify(run("hi\n", "", 0), "s1", false);
        assert!(result.success);
        assert_eq!(result.output, "hi");
        assert_eq!(result.exit_code, 0);
        assert!(result.failure_kind.is_none());
    }

    #[test]
    fn test_silent_success_gets_placeholder() {
        let plain = classify(run("", "", 0), "s1", false);
        assert!(plain.success);
        assert_eq!(plain.output, EMPTY_OUTPUT_MESSAGE);

        let with_imports = classify(run("  \n", "", 0), "s1", true);
        assert_eq!(with_imports.output, EMPTY_OUTPUT_WITH_IMPORTS_MESSAGE);
        assert_ne!(plain.output, with_imports.output);
    }

    #[test]
    fn test_failure_with_empty_streams() {
        let result = classify(run("", "", 2), "s1", false);
        assert!(!result.success);
        assert!(result.error.contains("exited with code 2"));
        assert_eq!(result.failure_kind, Some(FailureKind::Runtime));
    }

    #[test]
    fn test_failure_passes_stderr_verbatim() {
        let stderr = "Traceback (most recent call last):\n  ZeroDivisionError: division by zero\n";
        let result = classify(run("partial", stderr, 1), "s1", false);
        assert_eq!(result.error, stderr);
        assert_eq!(result.output, "partial");
        assert!(result.hint.is_none());
    }

    #[test]
    fn test_missing_module_hint() {
        let stderr = "ModuleNotFoundError: No module named 'numpy.linalg'";
        let result = classify(run("", stderr, 1), "s1", true);
        assert_eq!(
            result.hint.as_deref(),
            Some("Module 'numpy' is not installed. Install it with: pip install numpy")
        );
    }

    #[test]
    fn test_missing_module_extraction() {
        assert_eq!(missing_module("No module named \"yaml\""), Some("yaml".to_string()));
        assert_eq!(missing_module("NameError: name 'x' is not defined"), None);
    }

    #[test]
    fn test_install_hint_for_many() {
        assert!(install_hint_for(&[]).is_none());
        let hint = install_hint_for(&["a".to_string(), "b".to_string()]).unwrap();
        assert!(hint.ends_with("pip install a b"));
    }
}
