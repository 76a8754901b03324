pub mod filelist;

pub use filelist::{FilelistEntry, FilelistSource};
