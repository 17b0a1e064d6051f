pub mod package;
pub mod shell;
pub mod sync;

pub use sync::{DirEntry, FileStat};
