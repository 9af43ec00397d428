// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use log::{debug, error, warn};

use sextant::rr::ResourceRecord;
use sextant::zone::{ChangeListener, ZoneStore};
use sextant::zone_file::{self, write_records, Parser};

/// Reads the records of the zone file at `path`. Lines that fail to
/// parse are skipped with a warning; only I/O errors are fatal.
pub fn read(path: &Path) -> Result<Vec<ResourceRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();
    let mut lines_skipped = 0;

    for result in Parser::new(BufReader::new(file)) {
        match result {
            Ok(record) => records.push(record),
            Err(zone_file::Error::Syntax(details)) => {
                warn!("Skipping {} line {}: {}", path.display(), details.line(), details.kind());
                lines_skipped += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        }
    }

    if lines_skipped > 0 {
        warn!(
            "Skipped {} unparseable line(s) of {}.",
            lines_skipped,
            path.display(),
        );
    }
    debug!("Read {} records from {}.", records.len(), path.display());
    Ok(records)
}

/// Replaces the content of `store` with the records of the zone file
/// at `path`. Returns the number of records loaded.
pub fn load(store: &ZoneStore, path: &Path) -> Result<usize> {
    let records = read(path)?;
    let count = records.len();
    store.load(records);
    Ok(count)
}

/// Writes `records` to the zone file at `path`. The file is replaced
/// only once the new content has been completely written.
pub fn save<'a>(path: &Path, records: impl IntoIterator<Item = &'a ResourceRecord>) -> Result<()> {
    let temp_path = temp_path(path);
    let file = File::create(&temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, records)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    drop(writer);
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move {} to {}",
            temp_path.display(),
            path.display()
        )
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A [`ChangeListener`] that saves the whole store back to a zone file
/// after every mutation.
///
/// Saves are serialized, and each snapshot is taken only once the
/// previous save has finished, so the last save to complete always
/// holds the newest data.
#[derive(Debug)]
pub struct PersistListener {
    path: PathBuf,
    saving: Mutex<()>,
}

impl PersistListener {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            saving: Mutex::new(()),
        }
    }
}

impl ChangeListener for PersistListener {
    fn zone_changed(&self, store: &ZoneStore) {
        let _saving = self.saving.lock().unwrap_or_else(PoisonError::into_inner);
        let records = store.snapshot();
        match save(&self.path, &records) {
            Ok(()) => debug!("Saved {} records to {}.", records.len(), self.path.display()),
            Err(e) => error!("Failed to save the zone: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use super::*;
    use sextant::rr::RecordData;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sextantd-{}-{}", std::process::id(), name))
    }

    #[test]
    fn read_skips_bad_lines() {
        let path = scratch_file("read.zone");
        fs::write(
            &path,
            "example.com. A 1.2.3.4 300\n\
             example.com. A not-an-address 300\n\
             # comment\n\
             www.example.com. CNAME example.com. 300\n",
        )
        .unwrap();
        let records = read(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].owner(), "www.example.com.");
    }

    #[test]
    fn read_fails_on_missing_file() {
        assert!(read(&scratch_file("missing.zone")).is_err());
    }

    #[test]
    fn persist_listener_saves_after_mutation() {
        let path = scratch_file("persist.zone");
        let store = ZoneStore::new();
        store.set_listener(Some(Arc::new(PersistListener::new(path.clone()))));
        store.insert(
            ResourceRecord::from_data(
                "example.com.",
                300,
                RecordData::A(Ipv4Addr::new(1, 2, 3, 4)),
            )
            .unwrap(),
        );

        let reloaded = ZoneStore::new();
        let count = load(&reloaded, &path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(count, 1);
        assert_eq!(reloaded.snapshot(), store.snapshot());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn concurrent_mutations_all_reach_the_file() {
        let path = scratch_file("concurrent.zone");
        let store = Arc::new(ZoneStore::new());
        store.set_listener(Some(Arc::new(PersistListener::new(path.clone()))));

        let writers: Vec<_> = (0..4u8)
            .map(|thread| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10u8 {
                        store.insert(
                            ResourceRecord::from_data(
                                format!("host{}.example.com.", thread),
                                300,
                                RecordData::A(Ipv4Addr::new(192, 0, thread, i)),
                            )
                            .unwrap(),
                        );
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let reloaded = ZoneStore::new();
        let count = load(&reloaded, &path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(count, 40);
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }
}
