//! Running statistics and system health snapshots.
//!
//! Counters are written only by the pipeline thread but may be read at any
//! time by a reporting surface. Individual fields are atomic; a multi-field
//! snapshot may be torn across fields, which readers tolerate.

use crate::defaults;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use sysinfo::{Components, Disks, System};

/// Monotonic session counters plus the rolling audio window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunningStats {
    pub transcriptions: u64,
    pub words: u64,
    pub errors: u64,
    pub avg_audio_level: u8,
}

/// Host health: CPU, memory, disk, optional CPU temperature.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub disk_percent: f32,
    pub disk_free_gb: f64,
    pub temperature_c: Option<f32>,
}

/// Application-level counters and rates.
#[derive(Debug, Clone, Serialize)]
pub struct AppSnapshot {
    pub uptime: String,
    pub uptime_seconds: u64,
    pub transcriptions: u64,
    pub words: u64,
    pub errors: u64,
    pub avg_words_per_transcription: f64,
    pub transcriptions_per_minute: f64,
}

/// Audio level over the rolling window.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AudioSnapshot {
    pub current_level: u8,
    pub avg_level: u8,
    pub max_level: u8,
}

/// Session-wide statistics collector.
pub struct StatsAggregator {
    start: Instant,
    transcriptions: AtomicU64,
    words: AtomicU64,
    errors: AtomicU64,
    levels: Mutex<VecDeque<u8>>,
    system: Mutex<System>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            transcriptions: AtomicU64::new(0),
            words: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            levels: Mutex::new(VecDeque::with_capacity(defaults::LEVEL_WINDOW)),
            system: Mutex::new(System::new_all()),
        }
    }

    /// Count one finalized transcription.
    pub fn record(&self, text: &str, audio_level: u8) {
        self.transcriptions.fetch_add(1, Ordering::Relaxed);
        self.words
            .fetch_add(text.split_whitespace().count() as u64, Ordering::Relaxed);

        if audio_level > 0
            && let Ok(mut levels) = self.levels.lock()
        {
            if levels.len() == defaults::LEVEL_WINDOW {
                levels.pop_front();
            }
            levels.push_back(audio_level);
        }
    }

    /// Count one reported pipeline error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counters with the windowed audio average.
    pub fn running(&self) -> RunningStats {
        RunningStats {
            transcriptions: self.transcriptions.load(Ordering::Relaxed),
            words: self.words.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_audio_level: self.audio_snapshot().avg_level,
        }
    }

    /// Refresh and read host CPU/memory/disk/temperature.
    pub fn system_snapshot(&self) -> SystemSnapshot {
        let (cpu_percent, cpu_count, memory_percent, memory_used_mb, memory_total_mb) = {
            let mut system = match self.system.lock() {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner(),
            };
            // CPU usage is a delta between two refreshes.
            system.refresh_cpu_usage();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            system.refresh_cpu_usage();
            system.refresh_memory();

            let total = system.total_memory();
            let used = system.used_memory();
            let percent = if total > 0 {
                used as f32 / total as f32 * 100.0
            } else {
                0.0
            };
            (
                system.global_cpu_usage(),
                system.cpus().len(),
                percent,
                used / 1024 / 1024,
                total / 1024 / 1024,
            )
        };

        // Root filesystem, or the first disk when "/" is not mounted as such.
        let disks = Disks::new_with_refreshed_list();
        let (disk_percent, disk_free_gb) = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .or_else(|| disks.iter().next())
            .map(|disk| {
                let total = disk.total_space();
                let free = disk.available_space();
                let percent = if total > 0 {
                    (total - free) as f32 / total as f32 * 100.0
                } else {
                    0.0
                };
                (percent, free as f64 / 1024.0 / 1024.0 / 1024.0)
            })
            .unwrap_or((0.0, 0.0));

        // CPU thermal sensor when the platform exposes one (Raspberry Pi).
        let components = Components::new_with_refreshed_list();
        let temperature_c = components
            .iter()
            .find(|c| c.label().to_lowercase().contains("cpu"))
            .and_then(|c| c.temperature());

        SystemSnapshot {
            cpu_percent,
            cpu_count,
            memory_percent,
            memory_used_mb,
            memory_total_mb,
            disk_percent,
            disk_free_gb,
            temperature_c,
        }
    }

    /// Uptime, counters, and derived rates.
    pub fn app_snapshot(&self) -> AppSnapshot {
        let uptime_seconds = self.start.elapsed().as_secs();
        let transcriptions = self.transcriptions.load(Ordering::Relaxed);
        let words = self.words.load(Ordering::Relaxed);

        let avg_words_per_transcription = if transcriptions > 0 {
            words as f64 / transcriptions as f64
        } else {
            0.0
        };
        let transcriptions_per_minute = if uptime_seconds > 0 {
            transcriptions as f64 / (uptime_seconds as f64 / 60.0)
        } else {
            0.0
        };

        AppSnapshot {
            uptime: format_uptime(uptime_seconds),
            uptime_seconds,
            transcriptions,
            words,
            errors: self.errors.load(Ordering::Relaxed),
            avg_words_per_transcription,
            transcriptions_per_minute,
        }
    }

    /// Current/average/max over the rolling audio window.
    pub fn audio_snapshot(&self) -> AudioSnapshot {
        let levels = match self.levels.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        if levels.is_empty() {
            return AudioSnapshot {
                current_level: 0,
                avg_level: 0,
                max_level: 0,
            };
        }

        let sum: u32 = levels.iter().map(|&l| l as u32).sum();
        AudioSnapshot {
            current_level: *levels.back().unwrap_or(&0),
            avg_level: (sum / levels.len() as u32) as u8,
            max_level: *levels.iter().max().unwrap_or(&0),
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compact uptime: "2j 3h 4m", "3h 4m", "4m 5s", "5s".
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{days}j {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
