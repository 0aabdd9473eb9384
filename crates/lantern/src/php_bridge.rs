//
// php_bridge.rs
//
// PHP subprocess bridge. Executes code fragments inside the project's
// bootstrapped Laravel context and extracts structured results from noisy
// process output via sentinel markers.
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use crate::error::Fault;

/// Start of intended output.
pub const BEGIN_MARKER: &str = "__LANTERN_BEGIN__";
/// End of intended output.
pub const END_MARKER: &str = "__LANTERN_END__";
/// Precedes the message of an uncaught Throwable.
pub const ERROR_MARKER: &str = "__LANTERN_ERROR__";

/// Default wall-clock timeout for bridge calls.
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Cap on captured output. Bridge payloads are route/config tables, not
/// bulk data; anything past this indicates a runaway fragment.
const MAX_OUTPUT_BYTES: usize = 2 * 1024 * 1024;

/// PHP subprocess interface for runtime metadata queries.
///
/// Holds no cross-call state; concurrent calls are independent subprocess
/// invocations and safe from multiple repositories at once.
pub struct PhpBridge {
    php_path: PathBuf,
    project_root: PathBuf,
    timeout: Duration,
}

impl PhpBridge {
    /// Creates a bridge when a PHP executable can be validated or discovered.
    ///
    /// An explicit `php_path` is validated and used on success; `None`
    /// triggers discovery through PATH and common install locations.
    pub fn new(php_path: Option<PathBuf>, project_root: PathBuf) -> Option<Self> {
        let path = match php_path {
            Some(p) => {
                if is_valid_php_executable(&p) {
                    Some(p)
                } else {
                    log::trace!("Provided PHP path is not valid: {:?}", p);
                    None
                }
            }
            None => discover_php_path(),
        };

        path.map(|php_path| {
            log::trace!("Using PHP executable at: {:?}", php_path);
            Self {
                php_path,
                project_root,
                timeout: BRIDGE_TIMEOUT,
            }
        })
    }

    pub fn php_path(&self) -> &Path {
        &self.php_path
    }

    /// Run a PHP fragment inside the bootstrapped application and return the
    /// marker-delimited output.
    pub async fn run(&self, code: &str) -> Result<String, Fault> {
        let script = self.bootstrap_template(code);
        let raw = self
            .execute(&[
                "-d",
                "display_errors=Off",
                "-d",
                "error_reporting=0",
                "-r",
                script.as_str(),
            ])
            .await?;
        extract_output(&raw)
    }

    /// Run an artisan command with the same timeout and size discipline but
    /// no marker extraction, for output that is already well-formed.
    pub async fn run_artisan(&self, args: &[&str]) -> Result<String, Fault> {
        let mut full = vec!["artisan"];
        full.extend_from_slice(args);
        self.execute(&full).await
    }

    /// Query the application's framework version via artisan.
    ///
    /// Output looks like `Laravel Framework 11.9.2`; returns the trailing
    /// version token.
    pub async fn runtime_version(&self) -> Result<String, Fault> {
        let output = self.run_artisan(&["--version"]).await?;
        parse_version_output(&output)
            .ok_or_else(|| Fault::Parse(format!("unrecognized version output: {}", output.trim())))
    }

    async fn execute(&self, args: &[&str]) -> Result<String, Fault> {
        let mut cmd = Command::new(&self.php_path);
        cmd.args(args)
            .current_dir(&self.project_root)
            .env("LANTERN_BRIDGE", "1")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Fault::Process(format!("failed to spawn PHP subprocess: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| Fault::Process(format!("failed to run PHP subprocess: {e}")))?
            }
            Err(_) => {
                return Err(Fault::Process(format!(
                    "PHP subprocess timed out after {:?}",
                    self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Fault::Process(format!(
                "PHP subprocess failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        if output.stdout.len() > MAX_OUTPUT_BYTES {
            return Err(Fault::Process(format!(
                "PHP subprocess output exceeded {} bytes",
                MAX_OUTPUT_BYTES
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Wrap a fragment in the application bootstrap.
    ///
    /// Inline error display is disabled so stray warnings cannot corrupt the
    /// output stream; the fragment runs inside a local fault boundary that
    /// reports uncaught Throwables through the error marker. The end marker
    /// is always emitted.
    fn bootstrap_template(&self, code: &str) -> String {
        let root = escape_php_string(&self.project_root.to_string_lossy());
        format!(
            r#"
ini_set('display_errors', 'Off');
error_reporting(0);
require '{root}/vendor/autoload.php';
$app = require_once '{root}/bootstrap/app.php';
$kernel = $app->make(Illuminate\Contracts\Console\Kernel::class);
$kernel->bootstrap();
echo '{begin}';
try {{
{code}
}} catch (\Throwable $e) {{
    echo '{error}' . $e->getMessage();
}}
echo '{end}';
"#,
            root = root,
            begin = BEGIN_MARKER,
            error = ERROR_MARKER,
            end = END_MARKER,
            code = code,
        )
    }
}

/// Extract the marker-delimited slice from captured process output.
///
/// This is the single choke point that raises rather than swallows:
/// - markers present, no error marker: the delimited slice
/// - error marker present between the markers: `Fault::Runtime` with the
///   captured message
/// - no markers at all: the raw output unchanged, as a degraded fallback
///   (callers must tolerate malformed results)
pub fn extract_output(raw: &str) -> Result<String, Fault> {
    let Some(start) = raw.find(BEGIN_MARKER) else {
        return Ok(raw.to_string());
    };
    let after = &raw[start + BEGIN_MARKER.len()..];
    let delimited = match after.find(END_MARKER) {
        Some(end) => &after[..end],
        // Missing end marker: treat the remainder as the payload.
        None => after,
    };

    if let Some(err_at) = delimited.find(ERROR_MARKER) {
        let message = delimited[err_at + ERROR_MARKER.len()..].trim();
        return Err(Fault::Runtime(message.to_string()));
    }

    Ok(delimited.to_string())
}

/// Escape a value for interpolation into a single-quoted PHP string.
///
/// Guards against injection through unusual project paths.
pub fn escape_php_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn parse_version_output(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains("Laravel Framework"))?;
    line.rsplit(' ')
        .next()
        .filter(|v| v.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(String::from)
}

/// Locate a PHP executable via PATH, then common install locations.
fn discover_php_path() -> Option<PathBuf> {
    if let Some(path) = find_php_in_path() {
        return Some(path);
    }
    find_php_in_common_locations()
}

fn find_php_in_path() -> Option<PathBuf> {
    #[cfg(unix)]
    {
        let output = std::process::Command::new("which").arg("php").output().ok()?;
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout);
            let path = PathBuf::from(path_str.trim());
            if is_valid_php_executable(&path) {
                return Some(path);
            }
        }
    }

    #[cfg(windows)]
    {
        let output = std::process::Command::new("where").arg("php").output().ok()?;
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout);
            // `where` may return multiple lines; take the first one
            if let Some(first_line) = path_str.lines().next() {
                let path = PathBuf::from(first_line.trim());
                if is_valid_php_executable(&path) {
                    return Some(path);
                }
            }
        }
    }

    None
}

fn find_php_in_common_locations() -> Option<PathBuf> {
    get_common_php_paths()
        .into_iter()
        .find(|p| is_valid_php_executable(p))
}

fn get_common_php_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/opt/homebrew/bin/php"));
        paths.push(PathBuf::from("/usr/local/bin/php"));
        // Laravel Herd bundles its own PHP
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(format!(
                "{}/Library/Application Support/Herd/bin/php",
                home
            )));
        }
        paths.push(PathBuf::from("/usr/bin/php"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin/php"));
        paths.push(PathBuf::from("/usr/local/bin/php"));
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(format!("{}/.local/bin/php", home)));
        }
    }

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from("C:\\php\\php.exe"));
        paths.push(PathBuf::from("C:\\tools\\php\\php.exe"));
        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            paths.push(PathBuf::from(format!(
                "{}\\.config\\herd\\bin\\php.exe",
                userprofile
            )));
        }
    }

    paths
}

/// Check that a path points at a working PHP interpreter.
fn is_valid_php_executable(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    let result = std::process::Command::new(path).arg("--version").output();
    match result {
        Ok(output) => {
            let version_output = String::from_utf8_lossy(&output.stdout);
            output.status.success() && version_output.contains("PHP")
        }
        Err(_) => false,
    }
}
