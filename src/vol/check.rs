//! Consistency predicates: structural sanity checks a caller (or a future
//! `fsck`-style tool) can run against an inode, a directory's content or a
//! data cluster, independent of the superblock check already run at mount.

use super::{cluster_index::ClusterOp, Volume};
use crate::{
	blockreader::Backend,
	error::{Error, Result},
	layout::{ClusterNum, InodeKind, InodeNum, MAX_FILE_CLUSTERS, NULL_INODE},
};

impl<B: Backend> Volume<B> {
	/// An in-use inode must carry a legal kind, a `cluCount` within range,
	/// and — for directories — a `size` that is an exact multiple of one
	/// directory cluster's worth of entries.
	pub fn check_inode_in_use(&mut self, n_inode: InodeNum) -> Result<()> {
		let inode = self.raw_read_inode(n_inode)?;
		let kind = match inode.mode().kind() {
			Some(k @ (InodeKind::Dir | InodeKind::File | InodeKind::Symlink)) => k,
			_ => {
				log::error!("check_inode_in_use({n_inode}): not an in-use kind");
				return Err(Error::Eiuininval);
			}
		};
		if inode.clu_count as usize > MAX_FILE_CLUSTERS {
			log::error!("check_inode_in_use({n_inode}): cluCount {} exceeds MAX_FILE_CLUSTERS", inode.clu_count);
			return Err(Error::Edcminval);
		}
		if kind == InodeKind::Dir && inode.size % crate::layout::DIR_CONTENT_SIZE as u64 != 0 {
			log::error!("check_inode_in_use({n_inode}): directory size {} not cluster-aligned", inode.size);
			return Err(Error::Edirinval);
		}
		Ok(())
	}

	/// A FREE-DIRTY inode's free-list links, if present, must name inodes
	/// inside the table.
	pub fn check_free_inode_dirty(&mut self, n_inode: InodeNum) -> Result<()> {
		let inode = self.raw_read_inode(n_inode)?;
		if inode.mode().kind() != Some(InodeKind::FreeDirty) {
			return Err(Error::Efdininval);
		}
		let total = self.superblock().i_total;
		for link in [inode.next_free(), inode.prev_free()] {
			if link != NULL_INODE && link >= total {
				log::error!("check_free_inode_dirty({n_inode}): free-list link {link} out of range");
				return Err(Error::Efininval);
			}
		}
		Ok(())
	}

	/// A directory's `.`/`..` entries must resolve to itself and be
	/// IN-USE; every populated cluster beyond that must be readable as a
	/// `DirCluster`.
	pub fn check_directory_content(&mut self, n_inode_dir: InodeNum) -> Result<()> {
		self.check_inode_in_use(n_inode_dir)?;
		let inode = self.raw_read_inode(n_inode_dir)?;
		if inode.mode().kind() != Some(InodeKind::Dir) {
			return Err(Error::Enotdir);
		}
		if inode.clu_count == 0 {
			log::error!("check_directory_content({n_inode_dir}): no clusters allocated");
			return Err(Error::Edirinval);
		}

		let c0 = self.handle_file_cluster(n_inode_dir, 0, ClusterOp::Get)?.ok_or(Error::Edirinval)?;
		let addr = self.cluster_addr(c0);
		let dc: crate::layout::DirCluster = self.file.decode_at(addr)?;

		let dot = &dc.entries[0];
		let dotdot = &dc.entries[1];
		if !dot.is_in_use() || dot.n_inode != n_inode_dir || dot.name_bytes() != b"." {
			log::error!("check_directory_content({n_inode_dir}): malformed '.' entry");
			return Err(Error::Edeinval);
		}
		if !dotdot.is_in_use() || dotdot.name_bytes() != b".." {
			log::error!("check_directory_content({n_inode_dir}): malformed '..' entry");
			return Err(Error::Edeinval);
		}
		Ok(())
	}

	/// A data cluster's `stat` must name the inode the caller believes
	/// owns it.
	pub fn check_data_cluster_header(&mut self, n_clust: ClusterNum, expected_owner: InodeNum) -> Result<()> {
		let hdr = self.read_cluster_header(n_clust)?;
		if hdr.stat != expected_owner {
			log::error!("check_data_cluster_header({n_clust}): stat {} != expected {expected_owner}", hdr.stat);
			return Err(Error::Ewginodenb);
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use std::io::Cursor;

	use super::*;
	use crate::{format::format_volume, layout::Credentials};
	use super::super::dir::UnlinkOp;

	fn harness() -> Volume<Cursor<Vec<u8>>> {
		let backend = Cursor::new(vec![0u8; 512 * 512]);
		format_volume(backend, 56).unwrap()
	}

	#[test]
	fn root_directory_content_is_well_formed() {
		let mut vol = harness();
		vol.check_directory_content(0).unwrap();
	}

	#[test]
	fn fresh_file_passes_in_use_check() {
		let mut vol = harness();
		let n = vol.create_dir_entry(0, b"f", InodeKind::File, 0o644, Credentials::ROOT).unwrap();
		vol.check_inode_in_use(n).unwrap();
	}

	#[test]
	fn freed_inode_passes_free_dirty_check() {
		let mut vol = harness();
		let n = vol.create_dir_entry(0, b"f", InodeKind::File, 0o644, Credentials::ROOT).unwrap();
		vol.rem_detach_dir_entry(0, b"f", UnlinkOp::Detach).unwrap();
		vol.free_inode(n).unwrap();
		vol.check_free_inode_dirty(n).unwrap();
	}
}
