//! GPU detection methods backed by external tools
//!
//! Each method reports how many accelerators it can see. Methods never retry;
//! a failure is returned to the caller, which moves on to the next method.

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Python snippet printing the device count the ML runtime sees
const TORCH_DEVICE_COUNT: &str =
    "import torch; print(torch.cuda.device_count() if torch.cuda.is_available() else 0)";

/// A single way of counting visible GPUs
pub trait DetectionMethod {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Count visible GPUs; external calls must finish within `timeout`
    fn detect(&self, timeout: Duration) -> Result<u32>;
}

/// Run a program and capture its stdout, killing it once `timeout` elapses
///
/// Stdout is drained on a helper thread so a chatty tool cannot stall on a
/// full pipe.
pub fn run_with_timeout(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    let mut stdout = child
        .stdout
        .take()
        .with_context(|| format!("No stdout handle for {}", program))?;
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            bail!("{} timed out after {:?}", program, timeout);
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = reader
        .join()
        .map_err(|_| anyhow!("stdout reader for {} panicked", program))?
        .with_context(|| format!("Failed to collect output of {}", program))?;
    if !status.success() {
        bail!("{} exited with {}", program, status);
    }

    Ok(String::from_utf8(output)?)
}

/// Device count printed by the torch snippet (last non-empty line)
pub fn parse_torch_count(stdout: &str) -> Result<u32> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .context("empty output from device count query")?;
    Ok(line.parse()?)
}

static ROCM_GPU_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^GPU\[(\d+)\]").unwrap());

/// Count distinct `GPU[n]` indices in `rocm-smi --showproductname` output
pub fn parse_rocm_smi(stdout: &str) -> u32 {
    let indices: BTreeSet<&str> = stdout
        .lines()
        .filter_map(|line| ROCM_GPU_LINE.captures(line.trim()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    indices.len() as u32
}

/// Count `GPU n: ...` lines in `nvidia-smi --list-gpus` output
pub fn parse_nvidia_smi(stdout: &str) -> u32 {
    stdout
        .lines()
        .filter(|line| line.trim_start().starts_with("GPU "))
        .count() as u32
}

/// Number of devices listed in a `*_VISIBLE_DEVICES` style value
///
/// Empty values and the conventional `-1`/`none` masks yield `None`.
pub fn visible_devices_count(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    if value.is_empty() || value == "-1" || value.eq_ignore_ascii_case("none") {
        return None;
    }
    let count = value.split(',').filter(|d| !d.trim().is_empty()).count() as u32;
    (count > 0).then_some(count)
}

/// Ask the ML runtime through a Python subprocess
#[derive(Debug, Clone)]
pub struct TorchDeviceCount {
    python: String,
}

impl TorchDeviceCount {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl DetectionMethod for TorchDeviceCount {
    fn name(&self) -> &str {
        "torch"
    }

    fn detect(&self, timeout: Duration) -> Result<u32> {
        let stdout = run_with_timeout(&self.python, &["-c", TORCH_DEVICE_COUNT], timeout)?;
        parse_torch_count(&stdout)
    }
}

/// AMD inventory through `rocm-smi`
#[derive(Debug, Clone, Default)]
pub struct RocmSmi;

impl DetectionMethod for RocmSmi {
    fn name(&self) -> &str {
        "rocm-smi"
    }

    fn detect(&self, timeout: Duration) -> Result<u32> {
        let stdout = run_with_timeout("rocm-smi", &["--showproductname"], timeout)?;
        Ok(parse_rocm_smi(&stdout))
    }
}

/// NVIDIA inventory through `nvidia-smi`
#[derive(Debug, Clone, Default)]
pub struct NvidiaSmi;

impl DetectionMethod for NvidiaSmi {
    fn name(&self) -> &str {
        "nvidia-smi"
    }

    fn detect(&self, timeout: Duration) -> Result<u32> {
        let stdout = run_with_timeout("nvidia-smi", &["--list-gpus"], timeout)?;
        Ok(parse_nvidia_smi(&stdout))
    }
}

/// Method with a fixed answer; `None` behaves like a missing tool
#[derive(Debug, Clone)]
pub struct StaticCount {
    name: String,
    count: Option<u32>,
}

impl StaticCount {
    pub fn new(name: impl Into<String>, count: Option<u32>) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

impl DetectionMethod for StaticCount {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, _timeout: Duration) -> Result<u32> {
        match self.count {
            Some(count) => Ok(count),
            None => bail!("{} unavailable", self.name),
        }
    }
}
