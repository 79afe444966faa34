//! Free-inode list: a doubly-linked list threaded through `vD1.next`/
//! `vD2.prev` of inodes in a FREE-* state, anchored by `iHead`/`iTail`.

use super::Volume;
use crate::{
	blockreader::Backend,
	error::{Error, Result},
	layout::{Inode, InodeKind, InodeNum, Mode, NULL_CLUSTER, NULL_INODE},
};

impl<B: Backend> Volume<B> {
	/// Allocate a FREE-* inode off the head of the free list, clean it if it
	/// was dirty, and reinitialize it as a fresh `kind` inode owned by
	/// `owner`/`group`.
	pub fn alloc_inode(&mut self, kind: InodeKind, owner: u32, group: u32) -> Result<InodeNum> {
		log::trace!("alloc_inode({kind:?})");
		if self.sb.i_free == 0 {
			return Err(Error::Enospc);
		}

		let n = self.sb.i_head;
		let mut inode = self.raw_read_inode(n)?;
		if inode.mode().kind() == Some(InodeKind::FreeDirty) {
			self.clean_inode(n)?;
			inode = self.raw_read_inode(n)?;
		}
		if inode.mode().kind() != Some(InodeKind::FreeClean) {
			log::error!("alloc_inode(): head inode {n} is not free");
			return Err(Error::Elibbad);
		}

		if self.sb.i_free == 1 {
			self.sb.i_head = NULL_INODE;
			self.sb.i_tail = NULL_INODE;
		} else {
			let new_head = inode.next_free();
			let mut head_inode = self.raw_read_inode(new_head)?;
			head_inode.set_prev_free(NULL_INODE);
			self.raw_write_inode(new_head, &head_inode)?;
			self.sb.i_head = new_head;
		}

		let now = Self::now();
		inode.mode = Mode::new(kind, 0).0;
		inode.owner = owner;
		inode.group = group;
		inode.size = 0;
		inode.clu_count = 0;
		inode.ref_count = 0;
		inode.set_a_time(now);
		inode.set_m_time(now);
		inode.ctime = now;
		inode.d = [NULL_CLUSTER; crate::layout::N_DIRECT];
		inode.i1 = NULL_CLUSTER;
		inode.i2 = NULL_CLUSTER;
		self.raw_write_inode(n, &inode)?;

		self.sb.i_free -= 1;
		self.store_superblock()?;
		Ok(n)
	}

	/// Precondition: `nInode` is in use, legal type, `refCount = 0`, and
	/// `nInode != 0`. Marks it FREE-DIRTY and appends it to the tail of the
	/// free list; the caller is responsible for a subsequent `clean_inode`.
	pub fn free_inode(&mut self, n_inode: InodeNum) -> Result<()> {
		log::trace!("free_inode({n_inode})");
		if n_inode == 0 {
			log::warn!("free_inode(): refusing to free inode 0");
			return Err(Error::Einval);
		}

		let mut inode = self.raw_read_inode(n_inode)?;
		match inode.mode().kind() {
			Some(InodeKind::Dir | InodeKind::File | InodeKind::Symlink) => {}
			_ => return Err(Error::Eiuininval),
		}
		if inode.ref_count != 0 {
			log::error!("free_inode(): refCount {} != 0", inode.ref_count);
			return Err(Error::Elibbad);
		}

		inode.mode = Mode::new(InodeKind::FreeDirty, 0).0;

		if self.sb.i_tail == NULL_INODE {
			self.sb.i_head = n_inode;
			self.sb.i_tail = n_inode;
			inode.set_prev_free(NULL_INODE);
			inode.set_next_free(NULL_INODE);
		} else {
			let tail = self.sb.i_tail;
			let mut tail_inode = self.raw_read_inode(tail)?;
			tail_inode.set_next_free(n_inode);
			self.raw_write_inode(tail, &tail_inode)?;

			inode.set_prev_free(tail);
			inode.set_next_free(NULL_INODE);
			self.sb.i_tail = n_inode;
		}

		self.raw_write_inode(n_inode, &inode)?;
		self.sb.i_free += 1;
		self.store_superblock()?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use std::io::Cursor;

	use super::*;
	use crate::format::format_volume;

	fn harness() -> Volume<Cursor<Vec<u8>>> {
		let backend = Cursor::new(vec![0u8; 512 * 512]);
		format_volume(backend, 56).unwrap()
	}

	#[test]
	fn alloc_then_free_then_clean_reuses_slot() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		assert_ne!(n, 0);
		vol.free_inode(n).unwrap();
		vol.clean_inode(n).unwrap();
		let n2 = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		assert_eq!(n, n2);
	}

	#[test]
	fn cannot_free_root() {
		let mut vol = harness();
		assert_eq!(vol.free_inode(0), Err(Error::Einval));
	}

	#[test]
	fn fresh_inode_has_no_perm_bits_set() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		let inode = vol.read_inode(n, super::inode_table::ExpectedStatus::InUse).unwrap();
		assert_eq!(inode.mode().perm(), 0);
	}
}
