//! Dependency audit
//!
//! Scans source text for `import x` / `from x import y`, drops standard
//! library names, and asks the interpreter to import each remaining module.
//! The audit is advisory: a check that cannot be carried out never blocks
//! execution.

use moka::future::Cache;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AuditConfig;
use crate::runner::interpreter::InterpreterLocator;
use crate::runner::types::ModuleStatus;

/// Printed by the check program when the import succeeded
pub const IMPORT_SENTINEL: &str = "__CODERUN_IMPORT_OK__";

/// Standard library modules that never need an import check
pub const BUILTIN_MODULES: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "binascii",
    "bisect", "builtins", "calendar", "cmath", "codecs", "collections", "colorsys",
    "configparser", "contextlib", "copy", "csv", "ctypes", "dataclasses", "datetime",
    "decimal", "difflib", "dis", "doctest", "email", "enum", "errno", "fnmatch",
    "fractions", "functools", "gc", "getpass", "glob", "gzip", "hashlib", "heapq",
    "hmac", "html", "http", "importlib", "inspect", "io", "ipaddress", "itertools",
    "json", "keyword", "locale", "logging", "math", "multiprocessing", "numbers",
    "operator", "os", "pathlib", "pickle", "platform", "pprint", "queue", "random",
    "re", "secrets", "select", "shlex", "shutil", "signal", "socket", "sqlite3",
    "ssl", "statistics", "string", "struct", "subprocess", "sys", "tempfile",
    "textwrap", "threading", "time", "timeit", "tkinter", "traceback", "turtle",
    "types", "typing", "unicodedata", "unittest", "urllib", "uuid", "warnings",
    "weakref", "xml", "zipfile", "zlib", "zoneinfo",
];

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").expect("import regex is valid"));

static FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+(\S+)\s+import\b").expect("from-import regex is valid"));

static MODULE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("module path regex is valid")
});

/// Outcome of checking one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleCheck {
    /// The module imported
    Installed,
    /// The import failed
    Missing(String),
    /// The check itself could not run
    Unverified(String),
}

impl From<ModuleCheck> for ModuleStatus {
    fn from(check: ModuleCheck) -> Self {
        match check {
            ModuleCheck::Installed => ModuleStatus { installed: true, error: None },
            ModuleCheck::Missing(error) => ModuleStatus { installed: false, error: Some(error) },
            ModuleCheck::Unverified(reason) => ModuleStatus {
                installed: false,
                error: Some(format!("could not verify: {}", reason)),
            },
        }
    }
}

/// Top-level module names referenced by the source, in first-seen order
pub fn referenced_modules(source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut modules = Vec::new();

    for raw_line in source.lines() {
        let line = raw_line.split('#').next().unwrap_or_default();
        for statement in line.split(';').map(str::trim) {
            for name in statement_modules(statement) {
                if seen.insert(name.clone()) {
                    modules.push(name);
                }
            }
        }
    }

    modules
}

fn statement_modules(statement: &str) -> Vec<String> {
    if let Some(caps) = FROM_IMPORT_RE.captures(statement) {
        let path = &caps[1];
        if path.starts_with('.') {
            return Vec::new();
        }
        return top_level(path).into_iter().collect();
    }

    if let Some(caps) = IMPORT_RE.captures(statement) {
        return caps[1]
            .split(',')
            .filter_map(|part| part.split_whitespace().next())
            .filter_map(top_level)
            .collect();
    }

    Vec::new()
}

fn top_level(path: &str) -> Option<String> {
    if !MODULE_PATH_RE.is_match(path) {
        return None;
    }
    path.split('.').next().map(str::to_string)
}

/// Whether the source contains any import statement
pub fn has_import_syntax(source: &str) -> bool {
    !referenced_modules(source).is_empty()
}

/// Checks that modules referenced by submitted source can be imported
pub struct DependencyAuditor {
    locator: Arc<InterpreterLocator>,
    enabled: bool,
    check_timeout: Duration,
    builtins: HashSet<String>,
    installed: Cache<String, ()>,
}

impl DependencyAuditor {
    /// Create an auditor sharing the service's interpreter locator
    pub fn new(locator: Arc<InterpreterLocator>, config: &AuditConfig) -> Self {
        let builtins = BUILTIN_MODULES
            .iter()
            .map(|s| s.to_string())
            .chain(config.extra_builtins.iter().cloned())
            .collect();

        DependencyAuditor {
            locator,
            enabled: config.enabled,
            check_timeout: config.check_timeout,
            builtins,
            installed: Cache::builder()
                .max_capacity(1000)
                .time_to_live(config.cache_ttl)
                .build(),
        }
    }

    /// Referenced modules that are not builtins
    pub fn candidates(&self, source: &str) -> Vec<String> {
        referenced_modules(source)
            .into_iter()
            .filter(|name| !self.builtins.contains(name))
            .collect()
    }

    /// Check a single module by importing it in a disposable process
    pub async fn check_module(&self, name: &str) -> ModuleCheck {
        if !MODULE_PATH_RE.is_match(name) {
            return ModuleCheck::Missing(format!("invalid module name: {}", name));
        }

        if self.installed.get(name).await.is_some() {
            return ModuleCheck::Installed;
        }

        let interpreter = self.locator.locate().await;
        if !interpreter.available {
            return ModuleCheck::Unverified("no working interpreter".to_string());
        }

        let program = format!("import {}\nprint({:?})", name, IMPORT_SENTINEL);
        let mut command = Command::new(&interpreter.program);
        command
            .arg("-c")
            .arg(program)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.check_timeout, command.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if output.status.success() && stdout.contains(IMPORT_SENTINEL) {
                    debug!("Module {} is importable", name);
                    self.installed.insert(name.to_string(), ()).await;
                    ModuleCheck::Installed
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let reason = stderr
                        .lines()
                        .rev()
                        .find(|l| !l.trim().is_empty())
                        .map(|l| l.trim().to_string())
                        .unwrap_or_else(|| format!("import exited with {}", output.status));
                    debug!("Module {} is missing: {}", name, reason);
                    ModuleCheck::Missing(reason)
                }
            }
            Ok(Err(e)) => {
                warn!("Import check for {} could not start: {}", name, e);
                ModuleCheck::Unverified(e.to_string())
            }
            Err(_) => {
                warn!("Import check for {} timed out after {:?}", name, self.check_timeout);
                ModuleCheck::Unverified(format!("timed out after {:?}", self.check_timeout))
            }
        }
    }

    /// Check each named module in turn
    pub async fn check_modules(&self, names: &[String]) -> BTreeMap<String, ModuleStatus> {
        let mut results = BTreeMap::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() || results.contains_key(name) {
                continue;
            }
            let status: ModuleStatus = self.check_module(name).await.into();
            results.insert(name.to_string(), status);
        }
        results
    }

    /// Modules referenced by the source that failed their import check
    pub async fn audit(&self, source: &str) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }

        let mut missing = Vec::new();
        for candidate in self.candidates(source) {
            match self.check_module(&candidate).await {
                ModuleCheck::Installed => {}
                ModuleCheck::Missing(_) => missing.push(candidate),
                ModuleCheck::Unverified(reason) => {
                    debug!("Skipping unverifiable module {}: {}", candidate, reason);
                }
            }
        }
        missing
    }
}
