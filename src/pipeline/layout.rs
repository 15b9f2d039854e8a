// Output folder layout
//
// <destination>/<slot>/
//     TAI NGUYEN/  THUMB/  <slot>.docx  MO TA.docx
//     <safe_title>_<video_id>/sub.txt + info.txt     (success)
//     ERR_<nn>_<id>/info.txt                          (fetch failure)
//
// Every write is skipped when its target already exists, so re-runs are no-ops.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::errors::{PipelineError, PipelineResult};
use super::identifier::extract_video_id;
use super::models::VideoRecord;
use super::slots::{safe_title, sanitize, AssignmentSlot};

pub const SUBFOLDERS: [&str; 2] = ["TAI NGUYEN", "THUMB"];
pub const DESCRIPTION_DOC: &str = "MO TA.docx";
pub const CAPTIONS_FILE: &str = "sub.txt";
pub const INFO_FILE: &str = "info.txt";

/// Fallback written when a success record carries no caption text
const NO_CAPTIONS: &str = "No captions";

/// Result of ensuring slot folders exist
#[derive(Debug, Clone, Default)]
pub struct SlotBuildReport {
    pub total: usize,
    pub created: usize,
    pub existed: usize,
    /// Folder for each slot, same order as the input
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Written,
    AlreadyPresent,
}

/// Folder for a slot under `destination`
pub fn slot_dir(destination: &Path, slot: &AssignmentSlot) -> PathBuf {
    destination.join(sanitize(&slot.name))
}

/// Create one slot folder with its fixed contents. Returns true if the folder is new.
pub fn build_slot(dir: &Path, template: Option<&Path>) -> PipelineResult<bool> {
    let created = if dir.is_dir() {
        false
    } else {
        fs::create_dir_all(dir).map_err(|e| PipelineError::output(dir, e))?;
        true
    };

    for sub in SUBFOLDERS {
        let path = dir.join(sub);
        fs::create_dir_all(&path).map_err(|e| PipelineError::output(&path, e))?;
    }

    let slot_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for doc in [format!("{}.docx", slot_name), DESCRIPTION_DOC.to_string()] {
        let path = dir.join(doc);
        if !path.exists() {
            new_placeholder(&path, template)?;
        }
    }

    Ok(created)
}

/// Ensure every slot exists. Existing folders are counted, never an error.
pub fn build_slots(
    destination: &Path,
    slots: &[AssignmentSlot],
    template: Option<&Path>,
) -> PipelineResult<SlotBuildReport> {
    let mut report = SlotBuildReport {
        total: slots.len(),
        ..Default::default()
    };

    for slot in slots {
        let dir = slot_dir(destination, slot);
        if build_slot(&dir, template)? {
            debug!(slot = %slot.name, "created slot folder");
            report.created += 1;
        } else {
            debug!(slot = %slot.name, "slot folder already existed");
            report.existed += 1;
        }
        report.paths.push(dir);
    }

    info!(
        total = report.total,
        created = report.created,
        existed = report.existed,
        "slot folders ready"
    );
    Ok(report)
}

fn new_placeholder(path: &Path, template: Option<&Path>) -> PipelineResult<()> {
    match template.filter(|t| t.is_file()) {
        Some(t) => fs::copy(t, path).map(|_| ()),
        None => fs::File::create(path).map(|_| ()),
    }
    .map_err(|e| PipelineError::output(path, e))
}

/// Folder name for a success record inside its slot
pub fn video_folder_name(record: &VideoRecord) -> String {
    let title = safe_title(record.title.as_deref().unwrap_or("Video"));
    let id = record.video_id.as_deref().unwrap_or("unknown");
    format!("{}_{}", title, sanitize(id))
}

/// Folder name for a failed item at 0-based `position`
pub fn error_folder_name(position: usize, record: &VideoRecord) -> String {
    let id = record
        .video_id
        .clone()
        .or_else(|| extract_video_id(&record.url))
        .unwrap_or_else(|| "unknown_url".to_string());
    sanitize(&format!("ERR_{:02}_{}", position + 1, id))
}

/// Write captions and info for a success record, unless both already exist
pub fn write_video_artifacts(
    slot_dir: &Path,
    slot_name: &str,
    record: &VideoRecord,
) -> PipelineResult<ArtifactOutcome> {
    let folder = slot_dir.join(video_folder_name(record));
    let sub_path = folder.join(CAPTIONS_FILE);
    let info_path = folder.join(INFO_FILE);

    if sub_path.exists() && info_path.exists() {
        debug!(folder = %folder.display(), "artifacts already present");
        return Ok(ArtifactOutcome::AlreadyPresent);
    }

    fs::create_dir_all(&folder).map_err(|e| PipelineError::output(&folder, e))?;

    let captions = record
        .subtitles
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_CAPTIONS);
    fs::write(&sub_path, captions).map_err(|e| PipelineError::output(&sub_path, e))?;

    let duration = record
        .duration
        .map(|d| d.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let info = format!(
        "Title: {}\nVideo ID: {}\nURL: {}\nDuration: {} seconds\nMappedTo: {}\n",
        record.title.as_deref().unwrap_or("Video"),
        record.video_id.as_deref().unwrap_or("unknown"),
        record.url,
        duration,
        slot_name,
    );
    fs::write(&info_path, info).map_err(|e| PipelineError::output(&info_path, e))?;

    Ok(ArtifactOutcome::Written)
}

/// Write a diagnostic note for a failed item, unless one exists
pub fn write_error_note(
    slot_dir: &Path,
    position: usize,
    record: &VideoRecord,
) -> PipelineResult<ArtifactOutcome> {
    let folder = slot_dir.join(error_folder_name(position, record));
    let info_path = folder.join(INFO_FILE);

    if info_path.exists() {
        return Ok(ArtifactOutcome::AlreadyPresent);
    }

    fs::create_dir_all(&folder).map_err(|e| PipelineError::output(&folder, e))?;

    let note = format!(
        "URL: {}\nStatus: error\nError: {}\n",
        record.url,
        record.error.as_deref().unwrap_or(""),
    );
    fs::write(&info_path, note).map_err(|e| PipelineError::output(&info_path, e))?;

    Ok(ArtifactOutcome::Written)
}
