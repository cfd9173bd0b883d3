use alloc::string::String;
use core::fmt;

/// Filesystem error types.
#[derive(Debug, Clone)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    NotADirectory,
    IsADirectory,
    InvalidPath,
    IoError,
    NoSpace,
    NotMounted,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "No such file or directory"),
            FsError::AlreadyExists => write!(f, "File exists"),
            FsError::NotADirectory => write!(f, "Not a directory"),
            FsError::IsADirectory => write!(f, "Is a directory"),
            FsError::InvalidPath => write!(f, "Invalid path"),
            FsError::IoError => write!(f, "I/O error"),
            FsError::NoSpace => write!(f, "No space left"),
            FsError::NotMounted => write!(f, "No filesystem mounted at path"),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

impl From<FsError> for crate::errno::Errno {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound => crate::errno::Errno::NoEnt,
            FsError::AlreadyExists => crate::errno::Errno::Exist,
            FsError::NotADirectory => crate::errno::Errno::NotDir,
            FsError::IsADirectory => crate::errno::Errno::Inval,
            FsError::InvalidPath => crate::errno::Errno::Inval,
            FsError::IoError => crate::errno::Errno::Io,
            FsError::NoSpace => crate::errno::Errno::NoSpc,
            FsError::NotMounted => crate::errno::Errno::NoEnt,
        }
    }
}
