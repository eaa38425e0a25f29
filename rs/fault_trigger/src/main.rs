use clap::error::ErrorKind;
use clap::Parser;
use dax_repro_sys::{SharedMmap, PAGE_SIZE, PMD_SIZE};
use slog::{info, o, warn, Drain, Logger};
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Twice the PMD size, so the allocation contains at least one fully
/// 2 MiB-aligned range wherever the filesystem places the blocks.
const FILE_SIZE: usize = 2 * PMD_SIZE;

/// Byte written across the mapping to fault every page in.
const FILL_BYTE: u8 = 0x42;

const AFTER_HELP: &str = "\
Example:
  # ndctl create-namespace -m fsdax -e namespace0.0
  # mkfs.xfs -f -d su=2m,sw=1 /dev/pmem0
  # mount -o dax /dev/pmem0 /mnt/pmem
  $ fault_trigger /mnt/pmem/testfile

Afterwards check dmesg for:
  WARNING: mm/memremap.c:NNN at free_zone_device_folio+0x.../0x...";

/// Drives a file on a DAX mount through create, grow, map, write, sync and
/// unmap, so that the unmap tears down the PMD mappings faulted in by the
/// write.
#[derive(Debug, Parser)]
#[clap(name = "fault_trigger", version, after_help = AFTER_HELP)]
struct CliArgs {
    /// File to create on a DAX mount; the filesystem must use 2 MiB-aligned
    /// allocation for the faults to be PMD-sized.
    path: PathBuf,
}

#[derive(Debug, Error)]
enum TriggerError {
    #[error("failed to create {path:?}: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to grow {path:?} to {len} bytes: {source}")]
    Grow {
        path: PathBuf,
        len: usize,
        source: io::Error,
    },
    #[error("failed to map {len} bytes of {path:?}: {source}")]
    Map {
        path: PathBuf,
        len: usize,
        source: io::Error,
    },
    #[error("failed to unmap {path:?}: {source}")]
    Unmap { path: PathBuf, source: io::Error },
}

/// Removes `path` when dropped, ignoring removal errors.
///
/// Armed right after the file is created, so the file is gone on every exit
/// path, including the fatal ones.
struct RemoveOnDrop<'a> {
    path: &'a Path,
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.path);
    }
}

fn run(log: &Logger, path: &Path) -> Result<(), TriggerError> {
    info!(
        log,
        "page size {} bytes, PMD size {} bytes", *PAGE_SIZE, PMD_SIZE
    );

    info!(log, "creating and opening {:?}", path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map_err(|source| TriggerError::Create {
            path: path.to_path_buf(),
            source,
        })?;
    let _cleanup = RemoveOnDrop { path };

    info!(
        log,
        "growing file to {} bytes ({} MiB)",
        FILE_SIZE,
        FILE_SIZE / (1024 * 1024)
    );
    file.set_len(FILE_SIZE as u64)
        .map_err(|source| TriggerError::Grow {
            path: path.to_path_buf(),
            len: FILE_SIZE,
            source,
        })?;

    info!(log, "mapping file read-write and shared");
    let mut mapping =
        SharedMmap::of_file(&file, FILE_SIZE).map_err(|source| TriggerError::Map {
            path: path.to_path_buf(),
            len: FILE_SIZE,
            source,
        })?;
    info!(log, "mapped at {:?}", mapping.addr());

    // Touch every byte in the region. With 2 MiB-aligned block placement the
    // kernel satisfies these faults with PMD mappings; otherwise it falls
    // back to PTE mappings and the teardown path under test is not taken.
    info!(
        log,
        "writing 0x{:02x} across the mapping to trigger PMD faults", FILL_BYTE
    );
    mapping.fill(FILL_BYTE);

    info!(log, "syncing to persistent memory");
    if let Err(err) = mapping.sync() {
        // Flush correctness is irrelevant to the unmap path under test.
        warn!(log, "msync failed: {}", err);
    }

    info!(log, "unmapping (this triggers free_zone_device_folio)");
    mapping
        .unmap()
        .map_err(|source| TriggerError::Unmap {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        log,
        "Done. Check dmesg for a free_zone_device_folio warning"
    );
    Ok(())
}

fn make_logger() -> Logger {
    // Synchronous stdout drain: the narration must be complete the moment
    // the process exits, whatever the exit path.
    let decorator = slog_term::PlainSyncDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    Logger::root(drain, o!())
}

fn real_main() -> i32 {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err)
            if err.kind() == ErrorKind::DisplayHelp
                || err.kind() == ErrorKind::DisplayVersion =>
        {
            let _ = err.print();
            return 0;
        }
        Err(err) => {
            // Usage errors exit with status 1, like every other failure.
            let _ = err.print();
            return 1;
        }
    };

    let log = make_logger();
    match run(&log, &args.path) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("fault_trigger: {}", err);
            1
        }
    }
}

fn main() {
    std::process::exit(real_main());
}
