// File: src/persistence.rs
use crate::error::{Result, WpError};
use crate::lm::{ModelData, NgramEntry};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const MAGIC: [u8; 4] = *b"WPLM";
pub const FORMAT_VERSION: u32 = 1;
/// Highest n-gram order a model file may declare.
pub const MAX_ORDER: u32 = 10;

/// Leading record of every model file. Read on its own to decide which
/// model variant to construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
    order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Body {
    clock: u32,
    entries: Vec<NgramEntry>,
}

fn read_header(reader: &mut impl std::io::Read) -> Result<Header> {
    let header: Header = bincode::deserialize_from(reader)?;
    if header.magic != MAGIC {
        return Err(WpError::Format("not a model file".to_string()));
    }
    if header.version != FORMAT_VERSION {
        return Err(WpError::Format(format!("unsupported format version {}", header.version)));
    }
    if header.order == 0 || header.order > MAX_ORDER {
        return Err(WpError::Format(format!("model order {} out of range", header.order)));
    }
    Ok(header)
}

/// Reads only the n-gram order stored in a model file.
pub fn read_order(path: &Path) -> Result<usize> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(read_header(&mut reader)?.order as usize)
}

pub fn load_model_data(path: &Path) -> Result<ModelData> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header(&mut reader)?;
    let body: Body = bincode::deserialize_from(&mut reader)?;
    Ok(ModelData { order: header.order as usize, clock: body.clock, entries: body.entries })
}

/// A fully written model waiting to replace its target file.
/// Dropping it discards the temporary file and leaves the target alone.
pub struct StagedSave {
    temp_file: NamedTempFile,
    target: PathBuf,
}

/// Writes `data` to a temporary file next to `path` and syncs it.
pub fn stage_save(data: &ModelData, path: &Path) -> Result<StagedSave> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)?;

    let header = Header { magic: MAGIC, version: FORMAT_VERSION, order: data.order as u32 };
    let body = Body { clock: data.clock, entries: data.entries.clone() };

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(&temp_file);
        bincode::serialize_into(&mut writer, &header)?;
        bincode::serialize_into(&mut writer, &body)?;
        writer.flush()?;
    }
    temp_file.as_file().sync_all()?;
    debug!(target_file = %path.display(), entries = data.entries.len(), "staged model");
    Ok(StagedSave { temp_file, target: path.to_path_buf() })
}

impl StagedSave {
    pub fn temp_path(&self) -> &Path {
        self.temp_file.path()
    }

    /// Keeps the current target as `<file>.bak` and moves the new file
    /// into place. The target path holds a complete file throughout.
    pub fn commit(self) -> Result<()> {
        if self.target.exists() {
            let backup = backup_path(&self.target);
            match fs::remove_file(&backup) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
            if let Err(e) = fs::hard_link(&self.target, &backup) {
                warn!(error = %e, "hard link for backup failed, copying");
                fs::copy(&self.target, &backup)?;
            }
        }
        self.temp_file.persist(&self.target).map_err(|e| e.error)?;
        Ok(())
    }
}

pub fn save_model_data(data: &ModelData, path: &Path) -> Result<()> {
    stage_save(data, path)?.commit()
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// First free `<file>.broken-YYYY-MM-DD_NNN` name for today.
pub fn broken_path(path: &Path) -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    let mut counter = 1u32;
    loop {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".broken-{date}_{counter:03}"));
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
