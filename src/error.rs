//! The closed error taxonomy every engine operation reports through.
//!
//! Every fallible operation in the crate returns `Result<T>` = `Result<T,
//! Error>`. Each variant carries a stable name and a negated numeric code, so
//! a future FFI or mount front end can still hand back "0 or a negative error
//! kind" the way the original operation surface is specified, without the
//! engine itself ever matching on raw integers.

use std::{fmt, io};

/// Structural errors indicate the on-disk volume violates an invariant that
/// a well-formed volume must never violate. They are bugs, not expected
/// outcomes, and are never the result of ordinary misuse by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// Invalid argument (bad index, zero-length name where one is required, ...).
	Einval,
	/// A path component exceeded [`crate::layout::MAX_NAME`] or the whole path
	/// exceeded [`crate::layout::MAX_PATH`].
	Enametoolong,
	/// A path was not absolute where an absolute path was required.
	Erelpath,

	/// No free inodes remain.
	Enospc,
	/// A hard-link ceiling (directory or file/symlink) was reached.
	Emlink,
	/// `MAX_FILE_CLUSTERS` was reached for a file.
	Efbig,

	/// Name not found in directory / child inode or file does not exist.
	Enoent,
	/// Name already resolves to an entry.
	Eexist,
	/// Directory is not empty.
	Enotempty,
	/// A path component that should be a directory is not one.
	Enotdir,

	/// Read/execute permission denied.
	Eacces,
	/// Write permission denied.
	Eperm,

	/// Symbolic link resolution exceeded the allowed depth.
	Eloop,

	/// `readInode`/`writeInode` expected an in-use inode and found otherwise.
	Eiuininval,
	/// A free-inode list link pointed outside the valid inode range.
	Efininval,
	/// `readInode`/`cleanInode` expected a free-dirty inode and found otherwise.
	Efdininval,
	/// A free-cluster list link pointed outside the valid cluster range.
	Eldcininval,
	/// A data cluster header failed its consistency check.
	Edcinval,
	/// `ALLOC` was asked to populate a reference slot that is already in use.
	Edcarlyil,
	/// `FREE`/`CLEAN`/`FREE_CLEAN` was asked to vacate a reference slot that
	/// is not populated.
	Edcnotil,
	/// A reference-cluster table slot held a value outside the valid cluster
	/// range.
	Edcnalinval,
	/// A data cluster's `stat` field did not match the inode it was attached
	/// to or being attached to.
	Ewginodenb,
	/// Directory content failed its consistency check (size, `.`/`..`).
	Edirinval,
	/// A directory entry failed its consistency check.
	Edeinval,
	/// Double-indirect table bookkeeping (`cluCount` vs. populated slots)
	/// failed its consistency check.
	Edcminval,
	/// The superblock failed its consistency check.
	Elibbad,

	/// Lower-level I/O failure, propagated from the backend.
	Eio,
	/// Operation attempted on a backend that is not open for the access it
	/// requires (e.g. a write on a read-only volume).
	Ebadf,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// The stable name used in logs and in the textual mapping table, e.g.
	/// `"ENOENT"`.
	pub fn kind_name(&self) -> &'static str {
		use Error::*;
		match self {
			Einval => "EINVAL",
			Enametoolong => "ENAMETOOLONG",
			Erelpath => "ERELPATH",
			Enospc => "ENOSPC",
			Emlink => "EMLINK",
			Efbig => "EFBIG",
			Enoent => "ENOENT",
			Eexist => "EEXIST",
			Enotempty => "ENOTEMPTY",
			Enotdir => "ENOTDIR",
			Eacces => "EACCES",
			Eperm => "EPERM",
			Eloop => "ELOOP",
			Eiuininval => "EIUININVAL",
			Efininval => "EFININVAL",
			Efdininval => "EFDININVAL",
			Eldcininval => "ELDCININVAL",
			Edcinval => "EDCINVAL",
			Edcarlyil => "EDCARDYIL",
			Edcnotil => "EDCNOTIL",
			Edcnalinval => "EDCNALINVAL",
			Ewginodenb => "EWGINODENB",
			Edirinval => "EDIRINVAL",
			Edeinval => "EDEINVAL",
			Edcminval => "EDCMINVAL",
			Elibbad => "ELIBBAD",
			Eio => "EIO",
			Ebadf => "EBADF",
		}
	}

	/// The negative error kind a C-shaped operation surface would return.
	/// POSIX-named kinds reuse their `libc` errno; structural kinds (which
	/// have no libc equivalent) use a stable range above `libc`'s.
	pub fn code(&self) -> i32 {
		use Error::*;
		let positive = match self {
			Einval => libc::EINVAL,
			Enametoolong => libc::ENAMETOOLONG,
			Erelpath => libc::EINVAL,
			Enospc => libc::ENOSPC,
			Emlink => libc::EMLINK,
			Efbig => libc::EFBIG,
			Enoent => libc::ENOENT,
			Eexist => libc::EEXIST,
			Enotempty => libc::ENOTEMPTY,
			Enotdir => libc::ENOTDIR,
			Eacces => libc::EACCES,
			Eperm => libc::EPERM,
			Eloop => libc::ELOOP,
			Eio => libc::EIO,
			Ebadf => libc::EBADF,
			// Structural kinds: stable, crate-local codes with no libc
			// counterpart, starting past any plausible errno value.
			Eiuininval => 1000,
			Efininval => 1001,
			Efdininval => 1002,
			Eldcininval => 1003,
			Edcinval => 1004,
			Edcarlyil => 1005,
			Edcnotil => 1006,
			Edcnalinval => 1007,
			Ewginodenb => 1008,
			Edirinval => 1009,
			Edeinval => 1010,
			Edcminval => 1011,
			Elibbad => 1012,
		};
		-positive
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.kind_name(), self.code())
	}
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		log::error!("I/O error from backend: {e}");
		Error::Eio
	}
}

impl From<Error> for io::Error {
	fn from(e: Error) -> Self {
		io::Error::from_raw_os_error(e.code().unsigned_abs() as i32)
	}
}
