//! File cluster I/O: read/write a file's logical cluster index, allocating
//! lazily on write. `aTime`/`mTime` refresh is left to the surrounding
//! `read_inode`/`write_inode` calls made by the directory layer; no redundant
//! re-read/re-write of the inode happens here.

use super::{cluster_index::ClusterOp, Volume};
use crate::{
	blockreader::Backend,
	error::Result,
	layout::{InodeKind, InodeNum, BSLPC, CLUSTER_HEADER_SIZE, NULL_CLUSTER},
};

impl<B: Backend> Volume<B> {
	/// Read the byte-stream payload of logical cluster `clustInd` of
	/// `nInode` into `buf`. Sparse (never-written) regions read back as
	/// zeroes.
	pub fn read_file_cluster(&mut self, n_inode: InodeNum, clust_ind: usize, buf: &mut [u8; BSLPC]) -> Result<()> {
		log::trace!("read_file_cluster({n_inode}, {clust_ind})");
		self.assert_regular_or_symlink(n_inode)?;

		match self.handle_file_cluster(n_inode, clust_ind, ClusterOp::Get)? {
			Some(c) if c != NULL_CLUSTER => {
				let mut full = [0u8; crate::layout::CLUSTER_SIZE];
				self.read_cluster(c, &mut full)?;
				buf.copy_from_slice(&full[CLUSTER_HEADER_SIZE..]);
			}
			_ => buf.fill(0),
		}
		Ok(())
	}

	/// Write `buf` as the byte-stream payload of logical cluster `clustInd`
	/// of `nInode`, allocating the cluster first if it doesn't exist yet.
	/// The cluster header is preserved untouched.
	pub fn write_file_cluster(&mut self, n_inode: InodeNum, clust_ind: usize, buf: &[u8; BSLPC]) -> Result<()> {
		log::trace!("write_file_cluster({n_inode}, {clust_ind})");
		self.assert_regular_or_symlink(n_inode)?;

		let c = match self.handle_file_cluster(n_inode, clust_ind, ClusterOp::Get)? {
			Some(c) if c != NULL_CLUSTER => c,
			_ => self.handle_file_cluster(n_inode, clust_ind, ClusterOp::Alloc)?.unwrap(),
		};

		let mut full = [0u8; crate::layout::CLUSTER_SIZE];
		self.read_cluster(c, &mut full)?;
		full[CLUSTER_HEADER_SIZE..].copy_from_slice(buf);
		self.write_cluster(c, &full)
	}

	fn assert_regular_or_symlink(&mut self, n_inode: InodeNum) -> Result<()> {
		let inode = self.raw_read_inode(n_inode)?;
		match inode.mode().kind() {
			Some(InodeKind::File | InodeKind::Symlink) => Ok(()),
			_ => Err(crate::error::Error::Eiuininval),
		}
	}
}

#[cfg(test)]
mod test {
	use std::io::Cursor;

	use super::*;
	use crate::{format::format_volume, layout::InodeKind};

	fn harness() -> Volume<Cursor<Vec<u8>>> {
		let backend = Cursor::new(vec![0u8; 512 * 512]);
		format_volume(backend, 56).unwrap()
	}

	#[test]
	fn write_then_read_round_trips_payload() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		let mut payload = [0u8; BSLPC];
		payload[0] = 0xab;
		payload[BSLPC - 1] = 0xcd;
		vol.write_file_cluster(n, 3, &payload).unwrap();

		let mut out = [0u8; BSLPC];
		vol.read_file_cluster(n, 3, &mut out).unwrap();
		assert_eq!(out, payload);
	}

	#[test]
	fn sparse_read_is_zero_filled() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		let mut out = [0xffu8; BSLPC];
		vol.read_file_cluster(n, 5, &mut out).unwrap();
		assert_eq!(out, [0u8; BSLPC]);
	}
}
