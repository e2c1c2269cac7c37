//! TeaFiles: a header describing fixed-width items, followed by the items.
//!
//! All numbers are little-endian. The item area runs from the end of the
//! header to the end of the file, so the item count follows from the file
//! size and any item is reachable by index.

mod field;
mod header;

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub use field::{Field, FieldType, FieldValue, ItemDescription};
pub use header::{Description, NameValue, TimeScale};

use crate::error::SeriesError;
use header::FIXED_HEADER_SIZE;

/// An open series file with a cursor over its items.
#[derive(Debug)]
pub struct TeaFile {
    path: PathBuf,
    file: File,
    description: Description,
    item_area_start: u64,
    item_area_end: u64,
}

impl TeaFile {
    /// Create (or truncate) `path` and write the header. The cursor is at the first item.
    pub fn create(path: impl AsRef<Path>, description: Description) -> Result<Self, SeriesError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = header::encode(&description);
        file.write_all(&header)?;
        file.sync_data()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            description,
            item_area_start: header.len() as u64,
            item_area_end: 0,
        })
    }

    /// Open for reading with the cursor at the first item.
    pub fn open_read(path: impl AsRef<Path>) -> Result<Self, SeriesError> {
        Self::open(path.as_ref(), OpenOptions::new().read(true))
    }

    /// Open for reading and writing with the cursor past the last item.
    pub fn open_write(path: impl AsRef<Path>) -> Result<Self, SeriesError> {
        let mut tf = Self::open(path.as_ref(), OpenOptions::new().read(true).write(true))?;
        tf.seek_end()?;
        Ok(tf)
    }

    fn open(path: &Path, options: &OpenOptions) -> Result<Self, SeriesError> {
        let mut file = options.open(path)?;

        let mut fixed = [0u8; FIXED_HEADER_SIZE];
        file.read_exact(&mut fixed)?;
        let (item_area_start, _, _) = header::decode_fixed(&fixed)?;
        let file_len = file.metadata()?.len();
        if item_area_start > file_len {
            return Err(SeriesError::HeaderSize {
                header: item_area_start,
                file: file_len,
            });
        }

        let mut bytes = vec![0u8; item_area_start as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut bytes)?;
        let header = header::decode(&bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            description: header.description,
            item_area_start: header.item_area_start,
            item_area_end: header.item_area_end,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    fn item_size(&self) -> u64 {
        self.description.item.size as u64
    }

    /// Number of whole items in the item area.
    pub fn item_count(&self) -> Result<u64, SeriesError> {
        let end = match self.item_area_end {
            0 => self.file.metadata()?.len(),
            end => end,
        };
        Ok(end.saturating_sub(self.item_area_start) / self.item_size())
    }

    /// Move the cursor to the item at `index`.
    pub fn seek_item(&mut self, index: u64) -> Result<(), SeriesError> {
        self.file
            .seek(SeekFrom::Start(self.item_area_start + index * self.item_size()))?;
        Ok(())
    }

    /// Move the cursor past the last whole item. Trailing bytes of a torn
    /// write are overwritten by the next item.
    pub fn seek_end(&mut self) -> Result<(), SeriesError> {
        let count = self.item_count()?;
        self.seek_item(count)
    }

    /// Write one item at the cursor, one value per field in declared order.
    pub fn write_item(&mut self, values: &[FieldValue]) -> Result<(), SeriesError> {
        let bytes = self.description.item.encode(values)?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    /// Read the item at the cursor, `None` past the last whole item.
    pub fn read_item(&mut self) -> Result<Option<Vec<FieldValue>>, SeriesError> {
        let mut bytes = vec![0u8; self.description.item.size];
        match self.file.read_exact(&mut bytes) {
            Ok(()) => Ok(Some(self.description.item.decode(&bytes))),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn read_item_at(&mut self, index: u64) -> Result<Option<Vec<FieldValue>>, SeriesError> {
        self.seek_item(index)?;
        self.read_item()
    }

    /// Make written items durable.
    pub fn flush(&mut self) -> Result<(), SeriesError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<(), SeriesError> {
        self.flush()
    }
}
