//! On-disk persistence of full datasets.
//!
//! A dataset file is `[8-byte magic number][dataset bytes]`. The magic number
//! is written only once the body is complete, so a file whose generation was
//! interrupted never validates.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ethereum_types::H256;
use log::{debug, error, info};

use crate::error::IoError;

/// Bumped whenever the dataset format changes, so stale files never match.
pub const REVISION: u32 = 23;
pub const MAGIC_NUM: u64 = 0xFEE1_DEAD_BADD_CAFE;
pub const MAGIC_NUM_SIZE: usize = 8;

const FILE_PREFIX: &str = "full-R";

/// An open dataset file and where it lives.
#[derive(Debug)]
pub struct DagFile {
    pub path: PathBuf,
    pub file: File,
}

/// Outcome of [`prepare`].
#[derive(Debug)]
pub enum Prepared {
    /// A complete dataset file exists; its body can be used as-is.
    Match(DagFile),
    /// A fresh file of the right size, waiting for the dataset body and the
    /// magic number.
    Created(DagFile),
    /// A file exists but has the wrong length.
    SizeMismatch,
    /// A file of the right length exists but was never sealed.
    MagicMismatch,
}

/// File name of the dataset for `seed` under format `revision`.
pub fn mutable_name(revision: u32, seed: &H256) -> String {
    format!("{}{}-{}", FILE_PREFIX, revision, hex::encode(&seed.as_bytes()[..8]))
}

pub fn dataset_path(dir: &Path, seed: &H256) -> PathBuf {
    dir.join(mutable_name(REVISION, seed))
}

fn io_fail(op: &'static str, path: &Path, source: std::io::Error) -> IoError {
    error!("Could not {} {}: {}", op, path.display(), source);
    IoError {
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// Locate the dataset file for `seed` in `dir` and decide whether it can be
/// reused. With `force_create`, or when no file exists, a new file sized for
/// `full_size` bytes of dataset is created.
pub fn prepare(
    dir: &Path,
    seed: &H256,
    full_size: usize,
    force_create: bool,
) -> Result<Prepared, IoError> {
    fs::create_dir_all(dir).map_err(|e| io_fail("create directory", dir, e))?;
    let path = dataset_path(dir, seed);

    if !force_create {
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(mut file) => {
                let found = file
                    .metadata()
                    .map_err(|e| io_fail("query size of", &path, e))?
                    .len();
                if found < MAGIC_NUM_SIZE as u64
                    || found - MAGIC_NUM_SIZE as u64 != full_size as u64
                {
                    debug!(
                        "DAG file {} has {} bytes, expected {}",
                        path.display(),
                        found,
                        full_size + MAGIC_NUM_SIZE
                    );
                    return Ok(Prepared::SizeMismatch);
                }

                let mut magic = [0u8; MAGIC_NUM_SIZE];
                if let Err(e) = file.read_exact(&mut magic) {
                    error!("Could not read from DAG file {}: {}", path.display(), e);
                    return Ok(Prepared::SizeMismatch);
                }
                if u64::from_le_bytes(magic) != MAGIC_NUM {
                    debug!("DAG file {} is not sealed", path.display());
                    return Ok(Prepared::MagicMismatch);
                }
                return Ok(Prepared::Match(DagFile { path, file }));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_fail("open", &path, e)),
        }
    }

    create(dir, seed, full_size).map(Prepared::Created)
}

/// Create (or truncate) the dataset file for `seed` and extend it to hold
/// the magic number plus `full_size` bytes, without writing the body.
pub fn create(dir: &Path, seed: &H256, full_size: usize) -> Result<DagFile, IoError> {
    fs::create_dir_all(dir).map_err(|e| io_fail("create directory", dir, e))?;
    let path = dataset_path(dir, seed);

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| io_fail("create DAG file", &path, e))?;
    file.seek(SeekFrom::Start((full_size + MAGIC_NUM_SIZE - 1) as u64))
        .map_err(|e| io_fail("seek to the end of DAG file", &path, e))?;
    file.write_all(b"\n")
        .map_err(|e| io_fail("write the end of DAG file", &path, e))?;
    file.flush()
        .map_err(|e| io_fail("flush DAG file", &path, e))?;

    info!("Created DAG file {} ({} bytes)", path.display(), full_size + MAGIC_NUM_SIZE);
    Ok(DagFile { path, file })
}

/// Write the magic number into the header of a completed dataset buffer.
pub fn seal(header: &mut [u8]) {
    header[..MAGIC_NUM_SIZE].copy_from_slice(&MAGIC_NUM.to_le_bytes());
}

/// Remove every dataset file in `dir` except those for the `keep` seeds.
/// Returns the number of files removed.
pub fn prune(dir: &Path, keep: &[H256]) -> Result<usize, IoError> {
    let keep: HashSet<String> = keep.iter().map(|s| mutable_name(REVISION, s)).collect();
    let entries = fs::read_dir(dir).map_err(|e| io_fail("list", dir, e))?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| io_fail("list", dir, e))?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !name.starts_with(FILE_PREFIX) || keep.contains(name) {
            continue;
        }
        let path = entry.path();
        fs::remove_file(&path).map_err(|e| io_fail("remove", &path, e))?;
        info!("Removed stale DAG file {}", path.display());
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 4096;

    fn seed() -> H256 {
        H256::repeat_byte(0xab)
    }

    fn write_sealed(dir: &Path) {
        let f = create(dir, &seed(), SIZE).unwrap();
        let mut file = f.file;
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&MAGIC_NUM.to_le_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[test]
    fn file_name() {
        let mut s = [0u8; 32];
        s[..8].copy_from_slice(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        s[8] = 0xff;
        assert_eq!(mutable_name(23, &H256::from(s)), "full-R23-0123456789abcdef");
        assert_eq!(mutable_name(REVISION, &H256::zero()), "full-R23-0000000000000000");
    }

    #[test]
    fn absent_file_is_created_unsealed() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested").join("dags");
        let prepared = prepare(&sub, &seed(), SIZE, false).unwrap();
        let f = match prepared {
            Prepared::Created(f) => f,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(f.path, dataset_path(&sub, &seed()));
        assert_eq!(fs::metadata(&f.path).unwrap().len(), (SIZE + MAGIC_NUM_SIZE) as u64);

        // an unsealed file must not validate
        drop(f);
        assert!(matches!(
            prepare(&sub, &seed(), SIZE, false).unwrap(),
            Prepared::MagicMismatch
        ));
    }

    #[test]
    fn sealed_file_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_sealed(dir.path());
        assert!(matches!(
            prepare(dir.path(), &seed(), SIZE, false).unwrap(),
            Prepared::Match(_)
        ));
        // a different expected size must not reuse it
        assert!(matches!(
            prepare(dir.path(), &seed(), SIZE + 128, false).unwrap(),
            Prepared::SizeMismatch
        ));
    }

    #[test]
    fn force_create_ignores_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        write_sealed(dir.path());
        assert!(matches!(
            prepare(dir.path(), &seed(), SIZE, true).unwrap(),
            Prepared::Created(_)
        ));
        assert!(matches!(
            prepare(dir.path(), &seed(), SIZE, false).unwrap(),
            Prepared::MagicMismatch
        ));
    }

    #[test]
    fn truncated_file_is_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_sealed(dir.path());
        let path = dataset_path(dir.path(), &seed());
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len((SIZE + MAGIC_NUM_SIZE - 1) as u64).unwrap();
        drop(file);
        assert!(matches!(
            prepare(dir.path(), &seed(), SIZE, false).unwrap(),
            Prepared::SizeMismatch
        ));

        // shorter than the header itself
        fs::write(&path, [0u8; 3]).unwrap();
        assert!(matches!(
            prepare(dir.path(), &seed(), SIZE, false).unwrap(),
            Prepared::SizeMismatch
        ));
    }

    #[test]
    fn seal_writes_le_magic() {
        let mut header = [0u8; 16];
        seal(&mut header);
        assert_eq!(header[..8], [0xfe, 0xca, 0xdd, 0xba, 0xad, 0xde, 0xe1, 0xfe]);
        assert_eq!(header[8..], [0u8; 8]);
    }

    #[test]
    fn prune_keeps_listed_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let keep = H256::repeat_byte(1);
        for s in [keep, H256::repeat_byte(2), H256::repeat_byte(3)] {
            create(dir.path(), &s, 128).unwrap();
        }
        fs::write(dir.path().join("full-R22-0101010101010101"), b"old").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(prune(dir.path(), &[keep]).unwrap(), 3);
        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec![mutable_name(REVISION, &keep), "notes.txt".to_string()]);
    }
}
