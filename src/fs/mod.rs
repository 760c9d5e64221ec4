pub mod local;
#[cfg(test)]
pub mod mock;
pub mod port;
pub mod watcher;

pub use local::{LocalFs, LocalFsOptions};
pub use port::{ChangeKind, FsChange, FsPort};
