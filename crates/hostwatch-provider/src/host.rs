//! Host metrics from `/proc` and `df`.
//!
//! Linux only. Elsewhere the `/proc` reads fail and callers get a
//! [`CollectError`].

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use async_trait::async_trait;
use hostwatch_proto::{empty_object_schema, ToolDescriptor};
pub use hostwatch_proto::SYSTEM_INFO_TOOL;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::capability::Capability;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unexpected format in {0}")]
    Format(&'static str),

    #[error("failed to run {command}: {message}")]
    Command { command: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub system: PlatformInfo,
    pub uptime_hours: f64,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disks: Vec<DiskInfo>,
    /// RFC 3339, local time.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub platform: String,
    pub release: String,
    pub machine: String,
    pub processor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub cores: usize,
    pub usage_percent: f64,
    /// `None` when the kernel does not report a clock.
    pub frequency_mhz: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub device: String,
    pub mount_point: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percentage: f64,
}

/// Take a full snapshot. Blocks for the CPU sampling interval.
pub fn collect() -> Result<SystemSnapshot, CollectError> {
    let cpuinfo = read("/proc/cpuinfo")?;
    let cpu_details = parse_cpuinfo(&cpuinfo);

    let first = parse_cpu_times(&read("/proc/stat")?).ok_or(CollectError::Format("/proc/stat"))?;
    std::thread::sleep(CPU_SAMPLE_INTERVAL);
    let second = parse_cpu_times(&read("/proc/stat")?).ok_or(CollectError::Format("/proc/stat"))?;

    let memory =
        parse_meminfo(&read("/proc/meminfo")?).ok_or(CollectError::Format("/proc/meminfo"))?;
    let uptime_hours =
        parse_uptime(&read("/proc/uptime")?).ok_or(CollectError::Format("/proc/uptime"))?;

    let release = read("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    Ok(SystemSnapshot {
        system: PlatformInfo {
            platform: platform_name().to_string(),
            release,
            machine: std::env::consts::ARCH.to_string(),
            processor: cpu_details
                .model
                .unwrap_or_else(|| std::env::consts::ARCH.to_string()),
        },
        uptime_hours,
        cpu: CpuInfo {
            cores: cpu_details.cores.max(1),
            usage_percent: round1(cpu_usage(&first, &second)),
            frequency_mhz: cpu_details.mhz,
        },
        memory,
        disks: disks()?,
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}

fn read(path: &str) -> Result<String, CollectError> {
    std::fs::read_to_string(Path::new(path)).map_err(|e| CollectError::Read {
        path: PathBuf::from(path),
        source: e,
    })
}

fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        other => other,
    }
}

fn disks() -> Result<Vec<DiskInfo>, CollectError> {
    // -P: one line per filesystem, -k: 1K blocks
    let output = Command::new("df")
        .arg("-kP")
        .output()
        .map_err(|e| CollectError::Command {
            command: "df -kP".to_string(),
            message: e.to_string(),
        })?;

    // df exits non-zero when a single mount is unreadable but still prints
    // the rest, so only an empty listing is treated as failure.
    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
        return Err(CollectError::Command {
            command: "df -kP".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_df(&stdout))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Aggregate `cpu` line of `/proc/stat`. Idle includes iowait.
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();

    if values.len() < 4 {
        return None;
    }

    Some(CpuTimes {
        idle: values[3] + values.get(4).copied().unwrap_or(0),
        total: values.iter().sum(),
    })
}

/// Busy share between two samples, in percent.
pub fn cpu_usage(first: &CpuTimes, second: &CpuTimes) -> f64 {
    let total = second.total.saturating_sub(first.total);
    let idle = second.idle.saturating_sub(first.idle);
    if total == 0 {
        return 0.0;
    }
    (total.saturating_sub(idle)) as f64 / total as f64 * 100.0
}

#[derive(Debug, Default, PartialEq)]
pub struct CpuDetails {
    pub cores: usize,
    pub model: Option<String>,
    pub mhz: Option<f64>,
}

pub fn parse_cpuinfo(cpuinfo: &str) -> CpuDetails {
    let mut details = CpuDetails::default();

    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        match key {
            "processor" => details.cores += 1,
            "model name" if details.model.is_none() => details.model = Some(value.to_string()),
            "cpu MHz" if details.mhz.is_none() => details.mhz = value.parse().ok().map(round2),
            _ => {}
        }
    }

    details
}

/// Memory from `/proc/meminfo`. Used is total minus available.
pub fn parse_meminfo(meminfo: &str) -> Option<MemoryInfo> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name) && l[name.len()..].starts_with(':'))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok())
    };

    let total_kb = field("MemTotal")?;
    let available_kb = field("MemAvailable").or_else(|| field("MemFree"))?;
    if total_kb == 0 {
        return None;
    }
    let used_kb = total_kb.saturating_sub(available_kb);

    Some(MemoryInfo {
        total_gb: round2(kb_to_gb(total_kb)),
        used_gb: round2(kb_to_gb(used_kb)),
        available_gb: round2(kb_to_gb(available_kb)),
        usage_percent: round1(used_kb as f64 / total_kb as f64 * 100.0),
    })
}

/// Hours since boot, one decimal.
pub fn parse_uptime(uptime: &str) -> Option<f64> {
    let seconds: f64 = uptime.split_whitespace().next()?.parse().ok()?;
    Some(round1(seconds / 3600.0))
}

/// Block-device filesystems from `df -kP` output.
pub fn parse_df(output: &str) -> Vec<DiskInfo> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 || !parts[0].starts_with("/dev/") {
                return None;
            }

            let total_kb: u64 = parts[1].parse().ok()?;
            let used_kb: u64 = parts[2].parse().ok()?;
            let free_kb: u64 = parts[3].parse().ok()?;
            if total_kb == 0 {
                return None;
            }

            Some(DiskInfo {
                device: parts[0].to_string(),
                // Mount points may contain spaces
                mount_point: parts[5..].join(" "),
                total_gb: round2(kb_to_gb(total_kb)),
                used_gb: round2(kb_to_gb(used_kb)),
                free_gb: round2(kb_to_gb(free_kb)),
                percentage: round2(used_kb as f64 / total_kb as f64 * 100.0),
            })
        })
        .collect()
}

fn kb_to_gb(kb: u64) -> f64 {
    kb as f64 * 1024.0 / GIB
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// The `get_system_info` tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInfoTool;

#[async_trait]
impl Capability for SystemInfoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            SYSTEM_INFO_TOOL,
            "Get comprehensive system information including CPU, memory, disk usage, and system details",
        )
        .with_input_schema(empty_object_schema())
    }

    async fn invoke(&self, _arguments: Map<String, Value>) -> anyhow::Result<Value> {
        let snapshot = tokio::task::spawn_blocking(collect).await??;
        Ok(serde_json::to_value(snapshot)?)
    }
}
