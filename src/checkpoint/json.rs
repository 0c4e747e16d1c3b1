//! One JSON file per checkpoint in a directory.
//!
//! Layout: `parameters.json` plus `checkpoint_<batch_index>.json`. Files are
//! written under a hidden `.<name>.tmp` sibling and renamed into place, so a
//! crash mid-write never leaves a truncated checkpoint under its real name.
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Checkpoint, CheckpointStore};
use crate::error::{Error, Result};
use crate::primitives::Parameters;

const PARAMETERS_FILE: &str = "parameters.json";
const PREFIX: &str = "checkpoint_";
const SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Opens (creating if needed) the directory at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_path(&self, batch_index: u64) -> PathBuf {
        self.dir.join(format!("{PREFIX}{batch_index}{SUFFIX}"))
    }
}

fn write_json<T: Serialize>(file: File, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Write `value` next to `path` and rename it over `path`.
fn write_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidParameter(format!("bad path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    write_json(File::create(&tmp)?, value)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Result<T>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file)).map_err(Error::from))
}

impl CheckpointStore for JsonDirStore {
    fn save_parameters(&mut self, params: &Parameters) -> Result<()> {
        match self.load_parameters() {
            Ok(existing) if existing == *params => Ok(()),
            Ok(_) => Err(Error::ParametersMismatch),
            Err(Error::MissingParameters) => {
                write_atomically(&self.dir.join(PARAMETERS_FILE), params)
            }
            Err(e) => Err(e),
        }
    }

    fn load_parameters(&self) -> Result<Parameters> {
        match read_json(&self.dir.join(PARAMETERS_FILE)) {
            Ok(params) => params,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::MissingParameters),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.checkpoint_path(checkpoint.batch_index);
        if path.exists() {
            return Err(Error::CheckpointExists(checkpoint.batch_index));
        }
        write_atomically(&path, checkpoint)?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    fn load(&self, batch_index: u64) -> Result<Checkpoint> {
        match read_json(&self.checkpoint_path(batch_index)) {
            Ok(checkpoint) => checkpoint,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::CheckpointNotFound(batch_index))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn indices(&self) -> Result<Vec<u64>> {
        let mut indices = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let index = name
                .to_str()
                .and_then(|name| name.strip_prefix(PREFIX))
                .and_then(|rest| rest.strip_suffix(SUFFIX))
                .and_then(|digits| digits.parse::<u64>().ok());
            indices.extend(index);
        }
        indices.sort_unstable();
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::state::tests::PARAMS;
    use crate::checkpoint::tests::sample;

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::open(dir.path().join("ckpt")).unwrap();
        assert!(matches!(store.load_parameters(), Err(Error::MissingParameters)));
        store.save_parameters(&PARAMS).unwrap();
        store.save_parameters(&PARAMS).unwrap();
        store.save(&sample(10, 3)).unwrap();
        store.save(&sample(2, 1)).unwrap();
        fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        assert!(store.dir().join("checkpoint_10.json").is_file());
        assert_eq!(store.indices().unwrap(), vec![2, 10]);
        assert_eq!(store.latest().unwrap(), Some(10));

        let reopened = JsonDirStore::open(store.dir()).unwrap();
        assert_eq!(reopened.load_parameters().unwrap(), *PARAMS);
        assert_eq!(reopened.load(10).unwrap(), store.load(10).unwrap());
        assert!(matches!(reopened.load(3), Err(Error::CheckpointNotFound(3))));
    }

    #[test]
    fn test_no_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::open(dir.path()).unwrap();
        let first = sample(1, 2);
        store.save(&first).unwrap();
        assert!(matches!(store.save(&sample(1, 4)), Err(Error::CheckpointExists(1))));
        assert_eq!(store.load(1).unwrap(), first);

        store.save_parameters(&PARAMS).unwrap();
        let other = Parameters::new(3233.into(), 2.into()).unwrap();
        assert!(matches!(store.save_parameters(&other), Err(Error::ParametersMismatch)));
        assert_eq!(store.load_parameters().unwrap(), *PARAMS);
    }

    #[test]
    fn test_interrupted_write_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::open(dir.path()).unwrap();
        store.save(&sample(1, 2)).unwrap();
        fs::write(dir.path().join(".checkpoint_2.json.tmp"), "{\"batch_ind").unwrap();
        fs::write(dir.path().join(".parameters.json.tmp"), "{").unwrap();

        assert_eq!(store.indices().unwrap(), vec![1]);
        assert!(matches!(store.load_parameters(), Err(Error::MissingParameters)));
        store.save(&sample(2, 3)).unwrap();
        assert_eq!(store.load(2).unwrap().elements.len(), 3);
        assert!(!dir.path().join(".checkpoint_2.json.tmp").exists());
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 3);
    }
}
