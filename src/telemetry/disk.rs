//! Internal storage and SD card usage

use crate::protocol::DiskInfo;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Mount points smaller than this are not treated as SD cards
pub const MIN_SD_CARD_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

/// Path whose filesystem counts as internal storage
pub const INTERNAL_STORAGE_PATH: &str = "/home";

/// Removable media mount base: `/run/media/<user>/<label>`
pub const REMOVABLE_MEDIA_ROOT: &str = "/run/media";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Capacity figures for one mounted filesystem
#[derive(Debug, Clone, PartialEq)]
pub struct MountUsage {
    pub mount_point: PathBuf,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Usage of every mounted filesystem known to the system
pub fn list_mounts() -> Vec<MountUsage> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| MountUsage {
            mount_point: disk.mount_point().to_path_buf(),
            total_bytes: disk.total_space(),
            available_bytes: disk.available_space(),
        })
        .collect()
}

/// Build the disk payload from mount usage.
///
/// Internal storage is the filesystem holding `/home`, that is the deepest
/// mount point containing it. The SD card is the first mount directly under
/// `/run/media/<user>/` larger than 1 GiB.
pub fn summarize(mounts: &[MountUsage]) -> DiskInfo {
    let mut info = DiskInfo::default();

    let internal = containing_mount(mounts, Path::new(INTERNAL_STORAGE_PATH));
    if let Some(internal) = internal {
        info.internal_free_gb = Some(to_gb(internal.available_bytes));
        info.internal_total_gb = Some(to_gb(internal.total_bytes));
        info.internal_percent_used = Some(percent_used(internal));
    }

    let sd_card = mounts
        .iter()
        .find(|m| is_removable_media(&m.mount_point) && m.total_bytes > MIN_SD_CARD_SIZE_BYTES);
    if let Some(sd_card) = sd_card {
        info.sd_free_gb = Some(to_gb(sd_card.available_bytes));
        info.sd_total_gb = Some(to_gb(sd_card.total_bytes));
        info.sd_percent_used = Some(percent_used(sd_card));
        info.sd_mounted = true;
    }

    info
}

fn containing_mount<'a>(mounts: &'a [MountUsage], path: &Path) -> Option<&'a MountUsage> {
    mounts
        .iter()
        .filter(|m| path.starts_with(&m.mount_point))
        .max_by_key(|m| m.mount_point.components().count())
}

fn is_removable_media(mount_point: &Path) -> bool {
    mount_point
        .strip_prefix(REMOVABLE_MEDIA_ROOT)
        .map(|rest| rest.components().count() == 2)
        .unwrap_or(false)
}

fn to_gb(bytes: u64) -> f64 {
    round_to(bytes as f64 / BYTES_PER_GB, 2)
}

fn percent_used(mount: &MountUsage) -> f64 {
    if mount.total_bytes == 0 {
        return 0.0;
    }
    let used = mount.total_bytes.saturating_sub(mount.available_bytes);
    round_to(used as f64 / mount.total_bytes as f64 * 100.0, 1)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
