//! Mount view and shutdown reporting.

use std::fmt;
use std::time::Duration;

use score_common::{format_bytes, format_bytes_units, format_elapsed, format_size};
use score_vfs::{MetricsSnapshot, MountContext};
use tracing::info;

/// Totals of one mount session, produced when it is unmounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountSummary {
    pub elapsed: Duration,
    pub connect_count: u64,
    pub byte_count: u64,
}

impl MountSummary {
    pub fn new(elapsed: Duration, metrics: MetricsSnapshot) -> Self {
        Self {
            elapsed,
            connect_count: metrics.connect_count,
            byte_count: metrics.byte_count,
        }
    }
}

impl fmt::Display for MountSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Shut down mount after {} with a total of {} connects and {} {} read.",
            format_elapsed(self.elapsed),
            self.connect_count,
            format_bytes(self.byte_count),
            format_bytes_units(self.byte_count)
        )
    }
}

/// File count and total size of a mount view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountView {
    pub file_count: usize,
    pub total_size: u64,
}

/// Log every file about to be mounted, then the totals.
pub fn report_mount_view(context: &MountContext) -> MountView {
    let files = context.files();
    let file_count: usize = files.len();
    for file in files {
        info!("  {}", file);
    }

    let total_size: u64 = context.total_size();
    info!("Mounting {} files, {} in total", file_count, format_size(total_size));
    MountView {
        file_count,
        total_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display() {
        let summary = MountSummary::new(
            Duration::from_secs(125),
            MetricsSnapshot {
                connect_count: 7,
                byte_count: 3 * 1024 * 1024,
            },
        );
        assert_eq!(
            summary.to_string(),
            "Shut down mount after 2m 5s with a total of 7 connects and 3.00 MB read."
        );
    }
}
