//! Inode table access: translate an inode number to an on-disk address,
//! read/write inode records with timestamp refresh, and clean dirty inodes.

use super::Volume;
use crate::{
	blockreader::Backend,
	error::{Error, Result},
	layout::{Inode, InodeKind, InodeNum, INODE_SIZE, IPB},
};

/// What state `readInode`/`writeInode` expect the record to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedStatus {
	/// In use: DIR, FILE or SYMLINK.
	InUse,
	/// On the free list, cluster references still pending release.
	FreeDirty,
}

impl<B: Backend> Volume<B> {
	/// Integer-divide `nInode` by `IPB` to get a byte address in the inode
	/// table.
	fn convert_ref(&self, n_inode: InodeNum) -> Result<u64> {
		if n_inode >= self.sb.i_total {
			return Err(Error::Einval);
		}
		let block = self.sb.i_table_start + n_inode / IPB as u32;
		let offset = (n_inode as usize % IPB) * INODE_SIZE;
		Ok(self.block_addr(block) + offset as u64)
	}

	/// Decode the raw record with no status validation and no timestamp
	/// refresh. Used internally by components that need to inspect or
	/// rewrite an inode's state transition directly (free list, cluster
	/// index).
	pub(crate) fn raw_read_inode(&mut self, n_inode: InodeNum) -> Result<Inode> {
		let addr = self.convert_ref(n_inode)?;
		Ok(self.file.decode_at(addr)?)
	}

	pub(crate) fn raw_write_inode(&mut self, n_inode: InodeNum, inode: &Inode) -> Result<()> {
		self.assert_rw()?;
		let addr = self.convert_ref(n_inode)?;
		self.file.encode_at(addr, inode)?;
		Ok(())
	}

	fn validate_status(kind: Option<InodeKind>, expected: ExpectedStatus) -> Result<()> {
		match (kind, expected) {
			(Some(InodeKind::Dir | InodeKind::File | InodeKind::Symlink), ExpectedStatus::InUse) => Ok(()),
			(Some(InodeKind::FreeDirty), ExpectedStatus::FreeDirty) => Ok(()),
			(None, _) => Err(Error::Elibbad),
			(_, ExpectedStatus::InUse) => Err(Error::Eiuininval),
			(_, ExpectedStatus::FreeDirty) => Err(Error::Efdininval),
		}
	}

	/// Load `nInode`, validate its state, refresh `aTime` if in use, and
	/// write the refreshed record back.
	pub fn read_inode(&mut self, n_inode: InodeNum, expected: ExpectedStatus) -> Result<Inode> {
		log::trace!("read_inode({n_inode}, {expected:?})");
		let mut inode = self.raw_read_inode(n_inode)?;
		Self::validate_status(inode.mode().kind(), expected)?;

		if expected == ExpectedStatus::InUse {
			inode.set_a_time(Self::now());
			self.raw_write_inode(n_inode, &inode)?;
		}
		self.store_superblock()?;
		Ok(inode)
	}

	/// Overwrite `nInode` with `src`, after checking the record currently on
	/// disk is in the expected state. If `status = InUse`, `aTime`/`mTime`/
	/// `ctime` are bumped to now before writing, overriding whatever `src`
	/// carried for them.
	pub fn write_inode(&mut self, n_inode: InodeNum, mut src: Inode, expected: ExpectedStatus) -> Result<()> {
		log::trace!("write_inode({n_inode}, {expected:?})");
		let current = self.raw_read_inode(n_inode)?;
		Self::validate_status(current.mode().kind(), expected)?;

		if expected == ExpectedStatus::InUse {
			let now = Self::now();
			src.set_a_time(now);
			src.set_m_time(now);
			src.ctime = now;
		}
		self.raw_write_inode(n_inode, &src)?;
		self.store_superblock()?;
		Ok(())
	}

	/// Precondition: `nInode` is FREE-DIRTY and not inode 0. Releases every
	/// cluster still attached to it, then transitions it to FREE-CLEAN.
	pub fn clean_inode(&mut self, n_inode: InodeNum) -> Result<()> {
		log::trace!("clean_inode({n_inode})");
		if n_inode == 0 {
			log::warn!("clean_inode(): refusing to clean inode 0");
			return Err(Error::Einval);
		}

		let mut inode = self.raw_read_inode(n_inode)?;
		if inode.mode().kind() != Some(InodeKind::FreeDirty) {
			return Err(Error::Efdininval);
		}

		self.handle_file_clusters(n_inode, 0, super::cluster_index::ClusterOp::Clean)?;

		inode = self.raw_read_inode(n_inode)?;
		inode.mode = inode.mode().with_kind(InodeKind::FreeClean).0;
		self.raw_write_inode(n_inode, &inode)?;
		Ok(())
	}
}
