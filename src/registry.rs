use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde_json::Value;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;
use walkdir::WalkDir;

/// 30 seconds per invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An implementation that can be called with positional arguments.
pub trait Callable: Send + Sync {
    fn call(&self, args: Vec<Value>) -> Result<Value>;
}

impl<F> Callable for F
where
    F: Fn(Vec<Value>) -> Result<Value> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<Value> {
        self(args)
    }
}

/// Name -> implementation lookup, built by the host before evaluation.
/// The evaluator only ever reads from it.
#[derive(Default, Clone)]
pub struct CallableRegistry {
    entries: IndexMap<String, Arc<dyn Callable>>,
}

impl std::fmt::Debug for CallableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callable` under `name`, replacing any earlier entry.
    pub fn register(&mut self, name: impl Into<String>, callable: impl Callable + 'static) {
        self.entries.insert(name.into(), Arc::new(callable));
    }

    /// Closure form of [`register`](Self::register), so argument and return
    /// types are inferred at the call site.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, f);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Callable>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers every executable file directly inside `dir` under its file
    /// stem, so `dir/countClumps.py` becomes the `countClumps` function.
    pub fn from_dir(dir: &Path, timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Could not read '{}'", dir.display()))?;
            if !entry.file_type().is_file() || !is_executable(entry.path()) {
                continue;
            }
            let Some(stem) = entry.path().file_stem().map(|s| s.to_string_lossy().into_owned())
            else {
                continue;
            };
            debug!("registering {} -> {}", stem, entry.path().display());
            registry.register(
                stem,
                ProcessCallable {
                    program: entry.path().to_path_buf(),
                    timeout: Some(timeout),
                },
            );
        }
        Ok(registry)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Runs an external program per call: the arguments go to stdin as a JSON
/// array, the result is read from stdout as one JSON value.
#[derive(Debug, Clone)]
pub struct ProcessCallable {
    pub program: PathBuf,
    pub timeout: Option<Duration>,
}

impl Callable for ProcessCallable {
    fn call(&self, args: Vec<Value>) -> Result<Value> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Could not start '{}'", self.program.display()))?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("Missing stdin"))?;
        let mut payload = serde_json::to_vec(&Value::Array(args))?;
        payload.push(b'\n');
        // Every pipe gets its own thread so the child never blocks on us.
        thread::spawn(move || feed(stdin, &payload));
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("Timed out after {} ms", timeout.as_millis()));
            }
        };

        let stdout = join_output(stdout)?;
        if !status.success() {
            let stderr = join_output(stderr).unwrap_or_default();
            return Err(anyhow!("Exited with {}: {}", status, stderr.trim()));
        }

        serde_json::from_str(stdout.trim())
            .with_context(|| format!("Output is not JSON: {}", stdout.trim()))
    }
}

/// Writes the arguments and closes stdin. A program that exits without
/// reading its input is not an error.
fn feed(mut stdin: ChildStdin, payload: &[u8]) {
    match stdin.write_all(payload) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("program closed stdin before reading all arguments");
        }
        Err(e) => debug!("writing arguments failed: {e}"),
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_string(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_output(reader: JoinHandle<io::Result<String>>) -> Result<String> {
    reader
        .join()
        .map_err(|_| anyhow!("Output reader panicked"))?
        .context("Could not read program output")
}
