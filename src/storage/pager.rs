//! Fixed-size page I/O
//!
//! One `PageFile` per index file. All access is page-sized: page `id` lives
//! at byte offset `id × page_size`. The file counts every page read and
//! write through monotonic counters that the indexes snapshot to build
//! their `OperationResult`s. Files grow on demand and never shrink, except
//! for the explicit truncation the Sequential File performs on its
//! auxiliary area.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorCode, Result};
use crate::metrics::IoStats;
use crate::types::PageId;

/// Default page size for the B+-tree files
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// A paged file with read/write accounting
#[derive(Debug)]
pub struct PageFile {
    file: File,
    path: PathBuf,
    page_size: usize,
    n_reads: u64,
    n_writes: u64,
}

impl PageFile {
    /// Open (creating if missing) a paged file
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::with_message(ErrorCode::Internal, "zero page size"));
        }
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(PageFile {
            file,
            path,
            page_size,
            n_reads: 0,
            n_writes: 0,
        })
    }

    /// Open the file, discarding any existing content
    pub fn create(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let pf = Self::open(path, page_size)?;
        pf.file.set_len(0)?;
        Ok(pf)
    }

    /// The file's path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured page size in bytes
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of whole pages currently in the file
    pub fn page_count(&self) -> Result<u32> {
        let len = self.file.metadata()?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    /// Monotonic counter snapshot
    pub fn io_stats(&self) -> IoStats {
        IoStats::new(self.n_reads, self.n_writes)
    }

    /// Read page `id`. Pages past the end of the file read back as zeroes.
    pub fn read_page(&mut self, id: PageId) -> Result<Vec<u8>> {
        self.n_reads += 1;
        let mut buf = vec![0u8; self.page_size];
        let offset = id as u64 * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }

    /// Write page `id`, extending the file if needed
    pub fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(Error::with_message(
                ErrorCode::Internal,
                format!("page buffer is {} bytes, page size is {}", data.len(), self.page_size),
            ));
        }
        self.n_writes += 1;
        let offset = id as u64 * self.page_size as u64;
        let len = self.file.metadata()?.len();
        if len < offset {
            // zero-fill the gap so intermediate page ids stay readable
            self.file.set_len(offset)?;
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Append a page at the end of the file, returning its id
    pub fn append_page(&mut self, data: &[u8]) -> Result<PageId> {
        let id = self.page_count()?;
        self.write_page(id, data)?;
        Ok(id)
    }

    /// Zero out a page in place (freed pages are zeroed)
    pub fn zero_page(&mut self, id: PageId) -> Result<()> {
        let zeroes = vec![0u8; self.page_size];
        self.write_page(id, &zeroes)
    }

    /// Drop all pages from `n_pages` onward
    pub fn truncate(&mut self, n_pages: u32) -> Result<()> {
        self.file.set_len(n_pages as u64 * self.page_size as u64)?;
        Ok(())
    }

    /// Flush buffered writes to the OS
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Take over from a temporary file that was renamed over this one.
    ///
    /// Reopens the handle at this file's path and folds the donor's I/O
    /// counters in so delta accounting spans the rebuild.
    pub fn absorb_renamed(&mut self, donor: PageFile) -> Result<()> {
        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.n_reads += donor.n_reads;
        self.n_writes += donor.n_writes;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_and_counters() {
        let dir = TempDir::new().unwrap();
        let mut pf = PageFile::open(dir.path().join("t.dat"), 64).unwrap();

        let mut page = vec![0u8; 64];
        page[0] = 0xAB;
        pf.write_page(3, &page).unwrap();
        assert_eq!(pf.page_count().unwrap(), 4);

        let back = pf.read_page(3).unwrap();
        assert_eq!(back[0], 0xAB);

        let stats = pf.io_stats();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn test_read_past_eof_is_zeroes() {
        let dir = TempDir::new().unwrap();
        let mut pf = PageFile::open(dir.path().join("t.dat"), 32).unwrap();
        let page = pf.read_page(10).unwrap();
        assert_eq!(page, vec![0u8; 32]);
        assert_eq!(pf.io_stats().reads, 1);
    }

    #[test]
    fn test_gap_fill_keeps_intermediate_pages_readable() {
        let dir = TempDir::new().unwrap();
        let mut pf = PageFile::open(dir.path().join("t.dat"), 16).unwrap();
        pf.write_page(5, &[1u8; 16]).unwrap();
        assert_eq!(pf.read_page(2).unwrap(), vec![0u8; 16]);
        assert_eq!(pf.read_page(5).unwrap(), vec![1u8; 16]);
    }

    #[test]
    fn test_append_and_zero() {
        let dir = TempDir::new().unwrap();
        let mut pf = PageFile::open(dir.path().join("t.dat"), 16).unwrap();
        let id0 = pf.append_page(&[7u8; 16]).unwrap();
        let id1 = pf.append_page(&[9u8; 16]).unwrap();
        assert_eq!((id0, id1), (0, 1));
        pf.zero_page(0).unwrap();
        assert_eq!(pf.read_page(0).unwrap(), vec![0u8; 16]);
        assert_eq!(pf.read_page(1).unwrap(), vec![9u8; 16]);
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        let dir = TempDir::new().unwrap();
        let mut pf = PageFile::open(dir.path().join("t.dat"), 16).unwrap();
        let err = pf.write_page(0, &[0u8; 8]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
    }
}
