//! Shared result storage.
//!
//! Threads share one in-process buffer carved into disjoint regions by
//! [`split_regions`]. Worker processes instead reach the output through a
//! [`SharedSegment`]: a uniquely named file in `/dev/shm` mapped by the
//! dispatcher and re-mapped by each worker through an [`Attachment`].
//!
//! # Lifecycle
//!
//! ```text
//! dispatcher: SharedSegment::create ──────────────────────── destroy / drop
//! worker i:          Attachment::open ── write range ── drop
//! ```
//!
//! The backing file is removed when the owning `SharedSegment` is destroyed
//! or dropped, so no segment outlives a dispatch on any exit path.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use matmul_types::Matrix;
use memmap2::{MmapMut, MmapOptions};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::Granularity;
use crate::partition::WorkRange;

pub(crate) const WORD: usize = std::mem::size_of::<u64>();

const SHM_DIR: &str = "/dev/shm";

/// Directory used for segments when none is configured.
pub fn default_segment_dir() -> PathBuf {
    let shm = Path::new(SHM_DIR);
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Disjoint mutable views of `buffer`, one per range, in range order.
///
/// `ranges` must be the contiguous output of the partitioner.
pub fn split_regions<'a>(
    buffer: &'a mut [f64],
    ranges: &[WorkRange],
    granularity: Granularity,
    cols: usize,
) -> Vec<&'a mut [f64]> {
    let mut regions = Vec::with_capacity(ranges.len());
    let mut rest = buffer;
    let mut offset = 0;
    for range in ranges {
        let elements = range.elements(granularity, cols);
        assert_eq!(elements.start, offset, "ranges must be contiguous");
        let (region, tail) = std::mem::take(&mut rest).split_at_mut(elements.len());
        regions.push(region);
        rest = tail;
        offset = elements.end;
    }
    regions
}

/// Dispatcher-owned shared memory segment.
pub struct SharedSegment {
    map: MmapMut,
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl SharedSegment {
    /// Creates and maps a zeroed segment of `len` bytes under `dir`.
    pub fn create(dir: &Path, prefix: &str, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared segment must not be empty",
            ));
        }
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".shm")
            .tempfile_in(dir)?;
        file.as_file().set_len(len as u64)?;

        // SAFETY: the file was just created under a unique name and sized to
        // `len`. It is only mapped by this process and by the workers it
        // launches, each of which writes a disjoint region.
        let map = unsafe { MmapOptions::new().len(len).map_mut(file.as_file())? };

        let path = file.path().to_path_buf();
        debug!(path = %path.display(), len, "created shared segment");
        Ok(Self {
            map,
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Removes the segment. Call only once every attached worker has exited.
    pub fn destroy(mut self) -> io::Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            file.close()?;
            debug!(path = %self.path.display(), "destroyed shared segment");
        }
        Ok(())
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(path = %self.path.display(), error = %e, "failed to destroy shared segment");
        }
    }
}

/// A worker's mapping of a segment; dropping it detaches.
pub struct Attachment {
    map: MmapMut,
    path: PathBuf,
}

impl Attachment {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        // SAFETY: the dispatcher keeps the file alive and sized until this
        // worker has exited, and this worker only writes its own range.
        let map = unsafe { MmapMut::map_mut(&file)? };

        debug!(path = %path.display(), len = map.len(), "attached shared segment");
        Ok(Self {
            map,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "detached shared segment");
    }
}

fn read_word(bytes: &[u8], word: usize) -> u64 {
    let mut buf = [0u8; WORD];
    buf.copy_from_slice(&bytes[word * WORD..(word + 1) * WORD]);
    u64::from_le_bytes(buf)
}

fn write_word(bytes: &mut [u8], word: usize, value: u64) {
    bytes[word * WORD..(word + 1) * WORD].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_f64s(bytes: &[u8], word: usize, count: usize) -> Vec<f64> {
    bytes[word * WORD..(word + count) * WORD]
        .chunks_exact(WORD)
        .map(|chunk| {
            let mut buf = [0u8; WORD];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect()
}

pub(crate) fn write_f64s(bytes: &mut [u8], word: usize, values: &[f64]) {
    let target = &mut bytes[word * WORD..(word + values.len()) * WORD];
    for (chunk, value) in target.chunks_exact_mut(WORD).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

/// Layout of the control segment a worker process reads its job from.
///
/// ```text
/// word 0        magic
/// words 1..=5   a_rows, inner, b_cols, workers, granularity
/// words 6..8    reserved
/// slot i        unit_start, unit_end, status, elapsed_nanos   (4 words each)
/// A             a_rows * inner f64
/// B             inner * b_cols f64
/// ```
pub(crate) mod control {
    use super::*;

    const MAGIC: u64 = u64::from_le_bytes(*b"MATMCTL1");
    const HEADER_WORDS: usize = 8;
    const SLOT_WORDS: usize = 4;

    const STATUS_PENDING: u64 = 0;
    const STATUS_DONE: u64 = 1;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ControlHeader {
        pub a_rows: usize,
        pub inner: usize,
        pub b_cols: usize,
        pub workers: usize,
        pub granularity: Granularity,
    }

    impl ControlHeader {
        pub fn new(a: &Matrix, b: &Matrix, workers: usize, granularity: Granularity) -> Self {
            Self {
                a_rows: a.rows(),
                inner: a.cols(),
                b_cols: b.cols(),
                workers,
                granularity,
            }
        }

        fn slot_at(&self, id: usize) -> usize {
            HEADER_WORDS + id * SLOT_WORDS
        }

        fn a_at(&self) -> usize {
            HEADER_WORDS.saturating_add(self.workers.saturating_mul(SLOT_WORDS))
        }

        fn b_at(&self) -> usize {
            self.a_at()
                .saturating_add(self.a_rows.saturating_mul(self.inner))
        }

        pub fn byte_len(&self) -> usize {
            self.b_at()
                .saturating_add(self.inner.saturating_mul(self.b_cols))
                .saturating_mul(WORD)
        }

        pub fn result_len(&self) -> Option<usize> {
            self.a_rows.checked_mul(self.b_cols)
        }

        /// Exact size the result segment must have.
        pub fn result_bytes(&self) -> Option<usize> {
            self.result_len()?.checked_mul(WORD)
        }

        pub fn total_units(&self) -> Option<usize> {
            match self.granularity {
                Granularity::Rows => Some(self.a_rows),
                Granularity::Elements => self.result_len(),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Slot {
        pub range: WorkRange,
        pub done: bool,
        pub elapsed: Duration,
    }

    pub(crate) fn write_header(bytes: &mut [u8], header: &ControlHeader) {
        write_word(bytes, 0, MAGIC);
        write_word(bytes, 1, header.a_rows as u64);
        write_word(bytes, 2, header.inner as u64);
        write_word(bytes, 3, header.b_cols as u64);
        write_word(bytes, 4, header.workers as u64);
        write_word(bytes, 5, header.granularity.code());
    }

    pub(crate) fn write_job(
        bytes: &mut [u8],
        header: &ControlHeader,
        a: &Matrix,
        b: &Matrix,
        ranges: &[WorkRange],
    ) {
        write_header(bytes, header);
        for (id, range) in ranges.iter().enumerate() {
            let at = header.slot_at(id);
            write_word(bytes, at, range.start as u64);
            write_word(bytes, at + 1, range.end as u64);
            write_word(bytes, at + 2, STATUS_PENDING);
            write_word(bytes, at + 3, 0);
        }
        write_f64s(bytes, header.a_at(), a.as_slice());
        write_f64s(bytes, header.b_at(), b.as_slice());
    }

    /// Validates and decodes the header of a mapped control segment.
    pub(crate) fn read_header(bytes: &[u8]) -> Result<ControlHeader, String> {
        if bytes.len() < HEADER_WORDS * WORD {
            return Err(format!("control segment is only {} bytes", bytes.len()));
        }
        if read_word(bytes, 0) != MAGIC {
            return Err("control segment has a bad magic number".into());
        }
        let granularity = Granularity::from_code(read_word(bytes, 5))
            .ok_or_else(|| format!("unknown granularity code {}", read_word(bytes, 5)))?;
        let header = ControlHeader {
            a_rows: read_word(bytes, 1) as usize,
            inner: read_word(bytes, 2) as usize,
            b_cols: read_word(bytes, 3) as usize,
            workers: read_word(bytes, 4) as usize,
            granularity,
        };
        if header.a_rows == 0 || header.inner == 0 || header.b_cols == 0 || header.workers == 0 {
            return Err(format!(
                "control segment describes an empty job: {}x{} by {}x{} over {} workers",
                header.a_rows, header.inner, header.inner, header.b_cols, header.workers
            ));
        }
        if header.result_bytes().is_none() {
            return Err(format!(
                "a {}x{} result does not fit in memory",
                header.a_rows, header.b_cols
            ));
        }
        if header.byte_len() != bytes.len() {
            return Err(format!(
                "control segment is {} bytes, header describes {}",
                bytes.len(),
                header.byte_len()
            ));
        }
        Ok(header)
    }

    pub(crate) fn read_slot(bytes: &[u8], header: &ControlHeader, id: usize) -> Slot {
        let at = header.slot_at(id);
        Slot {
            range: WorkRange::new(
                read_word(bytes, at) as usize,
                read_word(bytes, at + 1) as usize,
            ),
            done: read_word(bytes, at + 2) == STATUS_DONE,
            elapsed: Duration::from_nanos(read_word(bytes, at + 3)),
        }
    }

    pub(crate) fn mark_done(bytes: &mut [u8], header: &ControlHeader, id: usize, elapsed: Duration) {
        let at = header.slot_at(id);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        write_word(bytes, at + 3, nanos);
        write_word(bytes, at + 2, STATUS_DONE);
    }

    pub(crate) fn read_inputs(
        bytes: &[u8],
        header: &ControlHeader,
    ) -> Result<(Matrix, Matrix), matmul_types::Error> {
        let a = Matrix::new(
            header.a_rows,
            header.inner,
            read_f64s(bytes, header.a_at(), header.a_rows * header.inner),
        )?;
        let b = Matrix::new(
            header.inner,
            header.b_cols,
            read_f64s(bytes, header.b_at(), header.inner * header.b_cols),
        )?;
        Ok((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::control::*;
    use super::*;

    fn sample() -> (Matrix, Matrix) {
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![7.0], vec![8.0]]).unwrap();
        (a, b)
    }

    #[test]
    fn regions_are_disjoint_and_cover_the_buffer() {
        let mut buffer = vec![0.0; 6];
        let ranges = [WorkRange::new(0, 2), WorkRange::new(2, 3)];
        let regions = split_regions(&mut buffer, &ranges, Granularity::Rows, 2);
        assert_eq!(regions.iter().map(|r| r.len()).collect::<Vec<_>>(), vec![4, 2]);

        for (id, region) in regions.into_iter().enumerate() {
            region.fill(id as f64 + 1.0);
        }
        assert_eq!(buffer, vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn segment_file_is_removed_on_destroy_and_on_drop() {
        let dir = tempfile::tempdir().unwrap();

        let segment = SharedSegment::create(dir.path(), "t-", 64).unwrap();
        let path = segment.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(segment.len(), 64);
        segment.destroy().unwrap();
        assert!(!path.exists());

        let segment = SharedSegment::create(dir.path(), "t-", 64).unwrap();
        let path = segment.path().to_path_buf();
        drop(segment);
        assert!(!path.exists());
    }

    #[test]
    fn empty_segment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SharedSegment::create(dir.path(), "t-", 0).is_err());
    }

    #[test]
    fn attachment_sees_owner_writes_and_owner_sees_attachment_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = SharedSegment::create(dir.path(), "t-", 4 * WORD).unwrap();
        write_f64s(segment.bytes_mut(), 0, &[1.5, 2.5]);

        {
            let mut attachment = Attachment::open(segment.path()).unwrap();
            assert_eq!(read_f64s(attachment.bytes(), 0, 2), vec![1.5, 2.5]);
            write_f64s(attachment.bytes_mut(), 2, &[3.5, 4.5]);
        }

        assert_eq!(read_f64s(segment.bytes(), 0, 4), vec![1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn control_block_round_trips_job_description() {
        let (a, b) = sample();
        let ranges = [WorkRange::new(0, 2), WorkRange::new(2, 3)];
        let header = ControlHeader::new(&a, &b, ranges.len(), Granularity::Elements);
        let mut bytes = vec![0u8; header.byte_len()];
        write_job(&mut bytes, &header, &a, &b, &ranges);

        let decoded = read_header(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.total_units(), Some(3));
        assert_eq!(decoded.result_len(), Some(3));

        let slot = read_slot(&bytes, &decoded, 1);
        assert_eq!(slot.range, WorkRange::new(2, 3));
        assert!(!slot.done);

        mark_done(&mut bytes, &decoded, 1, Duration::from_micros(42));
        let slot = read_slot(&bytes, &decoded, 1);
        assert!(slot.done);
        assert_eq!(slot.elapsed, Duration::from_micros(42));

        let (a2, b2) = read_inputs(&bytes, &decoded).unwrap();
        assert_eq!((a2, b2), (a, b));
    }

    #[test]
    fn corrupt_control_block_is_rejected() {
        let (a, b) = sample();
        let header = ControlHeader::new(&a, &b, 1, Granularity::Rows);
        let mut bytes = vec![0u8; header.byte_len()];
        write_job(&mut bytes, &header, &a, &b, &[WorkRange::new(0, 3)]);

        assert!(read_header(&bytes[..16]).is_err());
        assert!(read_header(&bytes[..bytes.len() - WORD]).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xff;
        assert!(read_header(&bad_magic).is_err());
    }

    #[test]
    fn header_with_empty_inner_dimension_is_rejected() {
        // With `inner == 0` the segment stays tiny while the result would not fit.
        let huge = ControlHeader {
            a_rows: 1 << 33,
            inner: 0,
            b_cols: 1 << 33,
            workers: 1,
            granularity: Granularity::Elements,
        };
        let mut bytes = vec![0u8; huge.byte_len()];
        assert_eq!(bytes.len(), 12 * WORD);
        write_header(&mut bytes, &huge);
        assert!(read_header(&bytes).is_err());

        let no_workers = ControlHeader {
            a_rows: 2,
            inner: 2,
            b_cols: 2,
            workers: 0,
            granularity: Granularity::Rows,
        };
        let mut bytes = vec![0u8; no_workers.byte_len()];
        write_header(&mut bytes, &no_workers);
        assert!(read_header(&bytes).is_err());
    }

    #[test]
    fn overflowing_result_size_is_none() {
        let header = ControlHeader {
            a_rows: usize::MAX,
            inner: 1,
            b_cols: 2,
            workers: 1,
            granularity: Granularity::Elements,
        };
        assert_eq!(header.result_len(), None);
        assert_eq!(header.total_units(), None);
        assert_eq!(header.result_bytes(), None);
    }
}
