//! Per-node append-only log file and the deterministic seed derived from
//! its name (§2 ambient stack, §4.4, §9).
//!
//! The original gives every node its own line-buffered, append-only log
//! file and seeds its mining PRNG from that file's name, so a run is
//! reproducible given the same node id. `NodeLog` layers that file sink
//! on top of an ordinary `env_logger` logger: console formatting and
//! `RUST_LOG` filtering still come from `env_logger`, while `NodeLog`
//! additionally appends every record to the node's own file so the
//! filename used to seed the mining PRNG stays meaningful.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use log::{Log, Metadata, Record};

pub struct NodeLog {
    inner: env_logger::Logger,
    file: Mutex<File>,
}

impl NodeLog {
    pub fn open(path: &Path, level: log::LevelFilter) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let inner = env_logger::Builder::from_default_env().filter_level(level).build();
        Ok(NodeLog {
            inner,
            file: Mutex::new(file),
        })
    }

    /// Opens the node's log file and installs it as the global logger.
    pub fn install(path: &Path, level: log::LevelFilter) -> std::io::Result<()> {
        let logger = Self::open(path, level)?;
        log::set_max_level(level);
        log::set_boxed_logger(Box::new(logger))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

impl Log for NodeLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.inner.log(record);
        let line = format!("[{}] {} - {}", record.level(), record.target(), record.args());
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    }

    fn flush(&self) {
        self.inner.flush();
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// A stable (non-cryptographic) FNV-1a hash of a log filename, used to
/// seed the mining PRNG so a node's nonce search is reproducible given the
/// same identity, reproducing `random.seed(node.get_log_filename())`.
pub fn seed_from_log_filename(path: &Path) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in path.to_string_lossy().as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic_for_same_path() {
        let a = seed_from_log_filename(Path::new("./logs/node-1.log"));
        let b = seed_from_log_filename(Path::new("./logs/node-1.log"));
        assert_eq!(a, b);
    }

    #[test]
    fn seed_differs_across_node_ids() {
        let a = seed_from_log_filename(Path::new("./logs/node-1.log"));
        let b = seed_from_log_filename(Path::new("./logs/node-2.log"));
        assert_ne!(a, b);
    }
}
