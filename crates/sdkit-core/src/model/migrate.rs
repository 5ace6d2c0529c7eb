//! One-time relocation of model files from legacy locations into the
//! per-category layout under the models root.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// A single legacy location and where its files belong now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMove {
    pub src: PathBuf,
    pub dest: PathBuf,
    /// Only files whose name contains this substring are moved
    pub filter: Option<&'static str>,
}

impl LegacyMove {
    fn new(src: PathBuf, dest: PathBuf, filter: Option<&'static str>) -> Self {
        Self { src, dest, filter }
    }
}

/// Outcome of [`move_files`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub moved: Vec<PathBuf>,
    pub removed_source: bool,
}

/// Legacy moves in the order they are applied.
pub fn legacy_moves(script_path: &Path, models_path: &Path) -> Vec<LegacyMove> {
    let stable_diffusion = models_path.join("Stable-diffusion");
    let esrgan = models_path.join("ESRGAN");

    vec![
        LegacyMove::new(models_path.to_path_buf(), stable_diffusion.clone(), Some(".ckpt")),
        LegacyMove::new(models_path.to_path_buf(), stable_diffusion, Some(".safetensors")),
        LegacyMove::new(script_path.join("ESRGAN"), esrgan.clone(), None),
        LegacyMove::new(models_path.join("BSRGAN"), esrgan, Some(".pth")),
        LegacyMove::new(script_path.join("gfpgan"), models_path.join("GFPGAN"), None),
        LegacyMove::new(script_path.join("SwinIR"), models_path.join("SwinIR"), None),
        LegacyMove::new(
            script_path.join("repositories/latent-diffusion/experiments/pretrained_models"),
            models_path.join("LDSR"),
            None,
        ),
    ]
}

/// Move every legacy model file into its canonical directory.
///
/// Never fails; problems with individual locations are logged and the
/// remaining locations are still processed.
pub fn migrate_legacy_layout(script_path: &Path, models_path: &Path) -> Vec<MoveReport> {
    legacy_moves(script_path, models_path)
        .into_iter()
        .map(|m| move_files(&m.src, &m.dest, m.filter))
        .collect()
}

/// Move regular files directly inside `src` into `dest`, then drop `src` if
/// it ended up empty. Errors are logged, never returned.
pub fn move_files(src: &Path, dest: &Path, filter: Option<&str>) -> MoveReport {
    let mut report = MoveReport::default();
    if let Err(e) = try_move_files(src, dest, filter, &mut report) {
        warn!(
            "Could not migrate {} to {}: {}",
            src.display(),
            dest.display(),
            e
        );
    }
    report
}

fn try_move_files(
    src: &Path,
    dest: &Path,
    filter: Option<&str>,
    report: &mut MoveReport,
) -> Result<()> {
    if !dest.exists() {
        fs::create_dir_all(dest)?;
    }
    if !src.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let full_path = entry.path();
        if !full_path.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if let Some(filter) = filter {
            if !name.contains(filter) {
                continue;
            }
        }

        info!(
            "Moving {} from {} to {}.",
            name,
            src.display(),
            dest.display()
        );
        let target = dest.join(&file_name);
        match move_file(&full_path, &target) {
            Ok(()) => report.moved.push(target),
            Err(e) => debug!("Failed to move {}: {}", full_path.display(), e),
        }
    }

    if fs::read_dir(src)?.next().is_none() {
        info!("Removing empty folder: {}", src.display());
        match fs::remove_dir_all(src) {
            Ok(()) => report.removed_source = true,
            Err(e) => debug!("Failed to remove {}: {}", src.display(), e),
        }
    }

    Ok(())
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("destination path {} already exists", to.display()),
        )
        .into());
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if crosses_devices(&e) => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn crosses_devices(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::CrossesDevices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn moves_all_files_and_removes_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("ESRGAN-old");
        let dest = dir.path().join("models/ESRGAN");
        touch(&src.join("a.pth"));
        touch(&src.join("b.pth"));

        let report = move_files(&src, &dest, None);

        assert!(dest.join("a.pth").is_file());
        assert!(dest.join("b.pth").is_file());
        assert_eq!(report.moved.len(), 2);
        assert!(report.removed_source);
        assert!(!src.exists());
    }

    #[test]
    fn filter_keeps_non_matching_files_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("models");
        let dest = src.join("Stable-diffusion");
        touch(&src.join("sd-v1-4.ckpt"));
        touch(&src.join("notes.txt"));

        let report = move_files(&src, &dest, Some(".ckpt"));

        assert_eq!(report.moved, vec![dest.join("sd-v1-4.ckpt")]);
        assert!(src.join("notes.txt").is_file());
        assert!(!report.removed_source);
        assert!(src.exists());
    }

    #[test]
    fn subdirectories_are_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("gfpgan");
        let dest = dir.path().join("models/GFPGAN");
        touch(&src.join("weights/GFPGANv1.4.pth"));

        let report = move_files(&src, &dest, None);

        assert!(report.moved.is_empty());
        assert!(src.join("weights/GFPGANv1.4.pth").is_file());
        assert!(src.exists());
    }

    #[test]
    fn missing_source_only_creates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("does-not-exist");
        let dest = dir.path().join("models/SwinIR");

        let report = move_files(&src, &dest, None);

        assert_eq!(report, MoveReport::default());
        assert!(dest.is_dir());
        assert!(!src.exists());
    }

    #[test]
    fn existing_destination_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("BSRGAN");
        let dest = dir.path().join("ESRGAN");
        touch(&src.join("x.pth"));
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("x.pth"), b"keep").unwrap();

        let report = move_files(&src, &dest, Some(".pth"));

        assert!(report.moved.is_empty());
        assert_eq!(fs::read(dest.join("x.pth")).unwrap(), b"keep");
        assert!(src.join("x.pth").is_file());
    }

    #[test]
    fn only_cross_device_renames_fall_back_to_copy() {
        use std::io::{Error, ErrorKind};

        assert!(crosses_devices(&Error::from(ErrorKind::CrossesDevices)));
        assert!(!crosses_devices(&Error::from(ErrorKind::PermissionDenied)));
        assert!(!crosses_devices(&Error::from(ErrorKind::NotFound)));
    }

    #[test]
    fn failed_rename_leaves_no_copy_behind() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("missing.pth");
        let to = dir.path().join("dest/missing.pth");

        assert!(move_file(&from, &to).is_err());
        assert!(!to.exists());
    }

    #[test]
    fn full_migration_uses_canonical_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let models = root.join("models");
        touch(&models.join("v1.ckpt"));
        touch(&models.join("v2.safetensors"));
        touch(&root.join("ESRGAN/4x.pth"));
        touch(&models.join("BSRGAN/BSRGAN.pth"));
        touch(&root.join("SwinIR/swin.pth"));
        touch(&root.join("repositories/latent-diffusion/experiments/pretrained_models/model.ckpt"));

        let reports = migrate_legacy_layout(root, &models);

        assert_eq!(reports.len(), 7);
        assert!(models.join("Stable-diffusion/v1.ckpt").is_file());
        assert!(models.join("Stable-diffusion/v2.safetensors").is_file());
        assert!(models.join("ESRGAN/4x.pth").is_file());
        assert!(models.join("ESRGAN/BSRGAN.pth").is_file());
        assert!(models.join("SwinIR/swin.pth").is_file());
        assert!(models.join("LDSR/model.ckpt").is_file());
        assert!(models.join("GFPGAN").is_dir());
        assert!(!root.join("ESRGAN").exists());
        assert!(!models.join("BSRGAN").exists());
        assert!(!root.join("SwinIR").exists());
        // the models root still holds the new category folders
        assert!(models.exists());
    }
}
