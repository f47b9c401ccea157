//! Reading and writing the flat-file snapshot a [`KvStore`](crate::KvStore) persists to.
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use super::Store;
use crate::Result;

/// A flat-file snapshot of a [`Store`].
///
/// The file is newline delimited UTF-8 text: every entry takes two lines, the key followed by
/// its value. There is no escaping, so neither keys nor values may contain line breaks.
///
/// Every [`save`](Snapshot::save) rewrites the whole file. The new content is written to a
/// sibling `.tmp` file first and then renamed over the snapshot, so a reader of the file only
/// ever sees a complete snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    /// creates a snapshot handle for the file at `path`. Nothing is read or written yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Snapshot { path: path.into() }
    }

    /// the path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// loads the store from the snapshot file.
    ///
    /// A missing file is not an error, it yields an empty store.
    ///
    /// # Errors
    /// returns an IO error if the file exists but can't be read
    #[instrument(skip(self), fields(path = ?self.path))]
    pub fn load(&self) -> Result<Store> {
        match File::open(&self.path) {
            Ok(file) => {
                let store = read_from(BufReader::new(file))?;
                debug!(entries = store.len(), "snapshot loaded");
                Ok(store)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("snapshot file not found, starting with an empty store");
                Ok(Store::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// rewrites the snapshot file with every entry of `store`
    ///
    /// # Errors
    /// returns an IO error if the file could not be written or moved into place
    #[instrument(skip(self, store), fields(path = ?self.path, entries = store.len()))]
    pub fn save(&self, store: &Store) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp_path = self.tmp_path();
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        write_to(store, &mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        debug!("snapshot saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// reads (key, value) line pairs from `reader`. An incomplete trailing pair is ignored.
pub fn read_from<R: BufRead>(reader: R) -> Result<Store> {
    let mut store = Store::new();
    let mut lines = reader.lines();
    while let Some(key) = lines.next() {
        let key = key?;
        match lines.next() {
            Some(value) => store.put(key, value?),
            None => {
                debug!(%key, "ignoring trailing key without a value");
                break;
            }
        }
    }
    Ok(store)
}

/// writes every entry of `store` to `writer`, one key line followed by one value line
pub fn write_to<W: Write>(store: &Store, writer: &mut W) -> io::Result<()> {
    for (key, value) in store.iter() {
        writeln!(writer, "{}", key)?;
        writeln!(writer, "{}", value)?;
    }
    writer.flush()
}
