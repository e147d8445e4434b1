//! Local resource probe.
//!
//! Reads CPU and memory capability from procfs, with the clock falling
//! back to cpufreq in sysfs on hosts whose cpuinfo has no `cpu MHz`.
//! IPC and power draw are not measured; they are fixed placeholders.

use std::net::{IpAddr, UdpSocket};

use tracing::info;

use gridalloc_core::{LocalNode, NodeResources};

use crate::error::{ProbeError, ProbeResult};

/// Instructions per cycle reported for every node.
pub const PLACEHOLDER_IPC: f64 = 1.0;

/// Power draw (watts) reported for every node.
pub const PLACEHOLDER_POWER_WATTS: f64 = 400.0;

const CPUINFO: &str = "/proc/cpuinfo";
const MEMINFO: &str = "/proc/meminfo";
const CPUFREQ_MAX: &str = "/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq";

/// Raw text of the files the probe reads.
struct ProcfsText {
    cpuinfo: String,
    meminfo: String,
    /// `cpuinfo_max_freq` in kHz; absent when cpufreq is not exposed.
    max_freq_khz: Option<String>,
}

/// Clock and logical core count of the local CPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuInfo {
    pub mhz: f64,
    pub cores: u32,
}

/// Probe the local node's resources.
pub fn probe_local() -> ProbeResult<NodeResources> {
    let text = read_procfs()?;
    let cpu = parse_cpuinfo(&text.cpuinfo, text.max_freq_khz.as_deref())?;
    let total_bytes = parse_meminfo_total(&text.meminfo)?;
    Ok(resources_from(cpu, total_bytes))
}

/// Probe resources and resolve the IP this node advertises.
pub fn local_node(advertise_ip: Option<&str>) -> ProbeResult<LocalNode> {
    let resources = probe_local()?;
    let ip = match advertise_ip {
        Some(ip) => ip
            .parse::<IpAddr>()
            .map_err(|_| ProbeError::InvalidValue {
                field: "advertise_ip",
                value: ip.to_string(),
            })?,
        None => detect_local_ip()?,
    };

    info!(
        %ip,
        memory_mb = resources.total_memory_mb,
        computational_capacity = resources.computational_capacity,
        maximum_capacity = resources.maximum_capacity,
        "local node resources probed"
    );

    Ok(LocalNode {
        ip: ip.to_string(),
        resources,
    })
}

/// Combine parsed CPU and memory figures into a resource record.
pub fn resources_from(cpu: CpuInfo, total_memory_bytes: u64) -> NodeResources {
    NodeResources {
        total_memory_mb: total_memory_bytes / 1_000_000,
        computational_capacity: cpu.mhz * f64::from(cpu.cores),
        maximum_capacity: cpu.mhz,
        ipc: PLACEHOLDER_IPC,
        power_consumption: PLACEHOLDER_POWER_WATTS,
    }
}

#[cfg(target_os = "linux")]
fn read_procfs() -> ProbeResult<ProcfsText> {
    let cpuinfo = std::fs::read_to_string(CPUINFO)
        .map_err(|source| ProbeError::Read { path: CPUINFO, source })?;
    let meminfo = std::fs::read_to_string(MEMINFO)
        .map_err(|source| ProbeError::Read { path: MEMINFO, source })?;
    let max_freq_khz = std::fs::read_to_string(CPUFREQ_MAX).ok();
    Ok(ProcfsText {
        cpuinfo,
        meminfo,
        max_freq_khz,
    })
}

#[cfg(not(target_os = "linux"))]
fn read_procfs() -> ProbeResult<ProcfsText> {
    Err(ProbeError::Unsupported)
}

/// Parse `/proc/cpuinfo`: one `processor` stanza per logical CPU, clock
/// taken from the first `cpu MHz` line. Without one, the clock comes from
/// `max_freq_khz`, the contents of cpufreq's `cpuinfo_max_freq`.
pub fn parse_cpuinfo(content: &str, max_freq_khz: Option<&str>) -> ProbeResult<CpuInfo> {
    let mut cores = 0u32;
    let mut mhz = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "processor" => cores += 1,
            "cpu MHz" if mhz.is_none() => {
                let value = value.trim();
                let parsed = value.parse::<f64>().map_err(|_| ProbeError::InvalidValue {
                    field: "cpu MHz",
                    value: value.to_string(),
                })?;
                mhz = Some(parsed);
            }
            _ => {}
        }
    }

    if cores == 0 {
        return Err(ProbeError::MissingField {
            path: CPUINFO,
            field: "processor",
        });
    }
    let mhz = match (mhz, max_freq_khz) {
        (Some(mhz), _) => mhz,
        (None, Some(khz)) => parse_max_freq_mhz(khz)?,
        (None, None) => {
            return Err(ProbeError::MissingField {
                path: CPUINFO,
                field: "cpu MHz",
            });
        }
    };
    if mhz <= 0.0 {
        return Err(ProbeError::InvalidValue {
            field: "cpu MHz",
            value: mhz.to_string(),
        });
    }

    Ok(CpuInfo { mhz, cores })
}

/// Convert cpufreq's `cpuinfo_max_freq` (kHz) to MHz.
fn parse_max_freq_mhz(khz: &str) -> ProbeResult<f64> {
    let khz = khz.trim();
    let parsed = khz.parse::<u64>().map_err(|_| ProbeError::InvalidValue {
        field: "cpuinfo_max_freq",
        value: khz.to_string(),
    })?;
    Ok(parsed as f64 / 1000.0)
}

/// Parse `MemTotal` from `/proc/meminfo`, in bytes.
pub fn parse_meminfo_total(content: &str) -> ProbeResult<u64> {
    const KB_TO_BYTES: u64 = 1024;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 && parts[0] == "MemTotal:" {
            let kb = parts[1].parse::<u64>().map_err(|_| ProbeError::InvalidValue {
                field: "MemTotal",
                value: parts[1].to_string(),
            })?;
            return Ok(kb * KB_TO_BYTES);
        }
    }

    Err(ProbeError::MissingField {
        path: MEMINFO,
        field: "MemTotal",
    })
}

/// The source address the kernel would pick for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn detect_local_ip() -> ProbeResult<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| ProbeError::LocalIp(e.to_string()))?;
    socket
        .connect("8.8.8.8:80")
        .map_err(|e| ProbeError::LocalIp(e.to_string()))?;
    let addr = socket
        .local_addr()
        .map_err(|e| ProbeError::LocalIp(e.to_string()))?;
    Ok(addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO_SAMPLE: &str = "processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU @ 2.20GHz
cpu MHz\t\t: 2200.000
cache size\t: 56320 KB

processor\t: 1
vendor_id\t: GenuineIntel
cpu MHz\t\t: 2199.998

processor\t: 2
cpu MHz\t\t: 2200.000

processor\t: 3
cpu MHz\t\t: 2200.000
";

    #[test]
    fn cpuinfo_counts_processors_and_takes_first_clock() {
        let cpu = parse_cpuinfo(CPUINFO_SAMPLE, Some("3500000\n")).unwrap();
        assert_eq!(cpu.cores, 4);
        assert_eq!(cpu.mhz, 2200.0);
    }

    const CPUINFO_AARCH64: &str = "processor\t: 0
BogoMIPS\t: 243.75
Features\t: fp asimd evtstrm aes pmull sha1 sha2 crc32 atomics fphp asimdhp cpuid
CPU implementer\t: 0x41
CPU architecture: 8
CPU part\t: 0xd0c

processor\t: 1
BogoMIPS\t: 243.75
CPU implementer\t: 0x41
CPU part\t: 0xd0c
";

    #[test]
    fn aarch64_clock_comes_from_cpufreq() {
        let cpu = parse_cpuinfo(CPUINFO_AARCH64, Some("2500000\n")).unwrap();
        assert_eq!(cpu.cores, 2);
        assert_eq!(cpu.mhz, 2500.0);
    }

    #[test]
    fn bad_cpufreq_value_is_an_error() {
        let err = parse_cpuinfo(CPUINFO_AARCH64, Some("fast")).unwrap_err();
        assert!(matches!(err, ProbeError::InvalidValue { field: "cpuinfo_max_freq", .. }));
    }

    #[test]
    fn cpuinfo_without_any_clock_is_an_error() {
        let err = parse_cpuinfo(CPUINFO_AARCH64, None).unwrap_err();
        assert!(matches!(err, ProbeError::MissingField { field: "cpu MHz", .. }));
    }

    #[test]
    fn cpuinfo_empty_is_an_error() {
        assert!(parse_cpuinfo("", Some("2000000")).is_err());
    }

    #[test]
    fn meminfo_total_in_bytes() {
        let sample = "MemTotal:       16384000 kB
MemFree:         1234567 kB
MemAvailable:    8000000 kB
";
        assert_eq!(parse_meminfo_total(sample).unwrap(), 16_384_000 * 1024);
    }

    #[test]
    fn meminfo_missing_total_is_an_error() {
        assert!(parse_meminfo_total("MemFree: 10 kB\n").is_err());
    }

    #[test]
    fn resources_use_decimal_megabytes_and_placeholders() {
        let cpu = CpuInfo { mhz: 2400.0, cores: 8 };
        let res = resources_from(cpu, 16_000_000_000);

        assert_eq!(res.total_memory_mb, 16_000);
        assert_eq!(res.computational_capacity, 19_200.0);
        assert_eq!(res.maximum_capacity, 2400.0);
        assert_eq!(res.ipc, PLACEHOLDER_IPC);
        assert_eq!(res.power_consumption, PLACEHOLDER_POWER_WATTS);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn probe_reads_this_host() {
        // Some virtualized hosts expose no clock at all; only check consistency.
        if let Ok(res) = probe_local() {
            assert!(res.total_memory_mb > 0);
            assert!(res.computational_capacity >= res.maximum_capacity);
        }
    }
}
