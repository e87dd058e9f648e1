use serde::Serialize;
use sysinfo::System;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Host machine facts reported once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MachineSnapshot {
    pub platform: String,
    pub cpus: usize,
    /// Memory available for new allocations (`MemAvailable` on Linux).
    pub free_memory_bytes: u64,
    pub total_memory_bytes: u64,
}

impl MachineSnapshot {
    pub fn free_memory_mb(&self) -> u64 {
        to_megabytes(self.free_memory_bytes)
    }

    pub fn total_memory_mb(&self) -> u64 {
        to_megabytes(self.total_memory_bytes)
    }

    /// `Linux, 8 core, freemem=2048mb, totalmem=4096mb`
    pub fn summary(&self) -> String {
        format!(
            "{}, {} core, freemem={}mb, totalmem={}mb",
            self.platform,
            self.cpus,
            self.free_memory_mb(),
            self.total_memory_mb()
        )
    }
}

/// Binary megabytes, rounded to the nearest whole unit.
pub fn to_megabytes(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MEGABYTE).round() as u64
}

/// Read-only machine queries.
pub trait MachineFacts: Send + Sync {
    fn snapshot(&self) -> MachineSnapshot;
}

/// Queries the OS through `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoFacts;

impl MachineFacts for SysinfoFacts {
    fn snapshot(&self) -> MachineSnapshot {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        let cpus = match sys.cpus().len() {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };

        MachineSnapshot {
            platform: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            cpus,
            free_memory_bytes: sys.available_memory(),
            total_memory_bytes: sys.total_memory(),
        }
    }
}

// sysinfo는 동기 호출이라 블로킹 풀에서 실행
pub async fn snapshot_async(facts: std::sync::Arc<dyn MachineFacts>) -> MachineSnapshot {
    tokio::task::spawn_blocking(move || facts.snapshot())
        .await
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn megabytes_round_to_nearest() {
        assert_eq!(to_megabytes(2_097_152 * 1024), 2048);
        assert_eq!(to_megabytes(4_194_304 * 1024), 4096);
        assert_eq!(to_megabytes(1024 * 1024 + 512 * 1024), 2);
        assert_eq!(to_megabytes(1024 * 1024 + 511 * 1024), 1);
        assert_eq!(to_megabytes(0), 0);
    }

    #[test]
    fn summary_line() {
        let snapshot = MachineSnapshot {
            platform: "Linux".to_string(),
            cpus: 4,
            free_memory_bytes: 2_097_152 * 1024,
            total_memory_bytes: 4_194_304 * 1024,
        };
        assert_eq!(
            snapshot.summary(),
            "Linux, 4 core, freemem=2048mb, totalmem=4096mb"
        );
    }

    #[test]
    fn sysinfo_reports_something_sane() {
        let snapshot = SysinfoFacts.snapshot();
        assert!(snapshot.cpus >= 1);
        assert!(!snapshot.platform.is_empty());
        assert!(snapshot.free_memory_bytes <= snapshot.total_memory_bytes);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn free_memory_counts_reclaimable_pages() {
        let snapshot = SysinfoFacts.snapshot();

        let mut sys = System::new();
        sys.refresh_memory();
        // MemAvailable 기준, 측정 사이 변동 허용
        let slack = snapshot.total_memory_bytes / 20;
        assert!(
            snapshot.free_memory_bytes.abs_diff(sys.available_memory()) <= slack,
            "reported {} bytes, MemAvailable is {}",
            snapshot.free_memory_bytes,
            sys.available_memory()
        );
        assert!(snapshot.free_memory_bytes + slack >= sys.free_memory());
    }
}
