//! Directory operations: name lookup, entry ADD/ATTACH and REM/DETACH,
//! renaming, emptiness checking, path resolution and permission checks.
//!
//! A directory's content is just its regular cluster chain, read through
//! [`super::cluster_index`] like any other file, reinterpreted as
//! [`DirCluster`] blocks instead of a byte stream.

use super::{cluster_index::ClusterOp, Volume};
use crate::{
	blockreader::Backend,
	error::{Error, Result},
	layout::{
		AccessMask, Credentials, DirCluster, DirEntry, InodeKind, InodeNum, GRP_R, GRP_W, GRP_X, MAX_DIR_LINKS,
		MAX_FILE_LINKS, MAX_NAME, MAX_PATH, OTH_R, OTH_W, OTH_X, USR_R, USR_W, USR_X,
	},
};

/// Whether a new directory entry is a brand-new child needing `.`/`..`
/// initialized, or an additional link to one that already has them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
	/// Fresh inode: for a directory, `.`/`..` are written and the rest of
	/// its first cluster is CLEAN-filled.
	Add,
	/// Existing inode: for a directory, `..` is re-pointed at the new
	/// parent without touching the rest of its content.
	Attach,
}

/// Whether `remDetachDirEntry` marks the slot DELETED (preserving tombstone
/// state for readers iterating concurrently) or wipes it back to CLEAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkOp {
	Rem,
	Detach,
}

struct Scan {
	found:    Option<(InodeNum, usize)>,
	free_idx: usize,
	clu_count: usize,
}

fn validate_name(name: &[u8]) -> Result<()> {
	if name.is_empty() || name.len() > MAX_NAME || name.contains(&b'/') {
		return Err(Error::Einval);
	}
	Ok(())
}

impl<B: Backend> Volume<B> {
	fn read_dir_cluster(&mut self, clust: u32) -> Result<DirCluster> {
		let addr = self.cluster_addr(clust);
		Ok(self.file.decode_at(addr)?)
	}

	fn write_dir_cluster(&mut self, clust: u32, dc: &DirCluster) -> Result<()> {
		self.assert_rw()?;
		let addr = self.cluster_addr(clust);
		self.file.encode_at(addr, dc)?;
		Ok(())
	}

	fn assert_dir(&mut self, n_inode: InodeNum) -> Result<()> {
		let inode = self.raw_read_inode(n_inode)?;
		match inode.mode().kind() {
			Some(InodeKind::Dir) => Ok(()),
			_ => Err(Error::Enotdir),
		}
	}

	/// Scan every entry of `nInodeDir`'s cluster chain for `name`, recording
	/// both a match (if any) and the first CLEAN slot available for reuse.
	fn scan_dir(&mut self, n_inode_dir: InodeNum, name: &[u8]) -> Result<Scan> {
		let inode = self.raw_read_inode(n_inode_dir)?;
		let clu_count = inode.clu_count as usize;

		let mut found = None;
		let mut free_idx = None;

		for clu in 0..clu_count {
			let c = match self.handle_file_cluster(n_inode_dir, clu, ClusterOp::Get)? {
				Some(c) => c,
				None => continue,
			};
			let dc = self.read_dir_cluster(c)?;
			for (i, entry) in dc.entries.iter().enumerate() {
				let global = clu * crate::layout::DPC + i;
				if entry.is_in_use() && entry.name_bytes() == name {
					found = Some((entry.n_inode, global));
				} else if entry.is_clean() && free_idx.is_none() {
					free_idx = Some(global);
				}
			}
		}

		Ok(Scan { found, free_idx: free_idx.unwrap_or(clu_count * crate::layout::DPC), clu_count })
	}

	/// Look up `name` in `nInodeDir`. Requires execute permission on the
	/// directory. Returns `(childInode, entryIndex)` or `ENOENT`.
	pub fn dir_entry_by_name(&mut self, n_inode_dir: InodeNum, name: &[u8], cred: Credentials) -> Result<(InodeNum, usize)> {
		log::trace!("dir_entry_by_name({n_inode_dir}, {name:?})");
		validate_name(name)?;
		self.assert_dir(n_inode_dir)?;
		self.access_granted(n_inode_dir, AccessMask::X, cred)?;

		self.scan_dir(n_inode_dir, name)?.found.ok_or(Error::Enoent)
	}

	/// Write a single entry slot at logical index `idx` of `nInodeDir`,
	/// allocating a fresh cluster (and CLEAN-filling its remaining slots)
	/// when `idx` falls past the directory's current cluster count.
	fn write_dir_slot(&mut self, n_inode_dir: InodeNum, idx: usize, entry: DirEntry) -> Result<()> {
		let dpc = crate::layout::DPC;
		let clu = idx / dpc;
		let within = idx % dpc;

		let inode = self.raw_read_inode(n_inode_dir)?;
		let c = if clu >= inode.clu_count as usize {
			self.handle_file_cluster(n_inode_dir, clu, ClusterOp::Alloc)?.unwrap()
		} else {
			self.handle_file_cluster(n_inode_dir, clu, ClusterOp::Get)?.unwrap()
		};

		let fresh = clu >= inode.clu_count as usize;
		let mut dc = self.read_dir_cluster(c)?;
		// `handleFileCluster(ALLOC)` only zeroed the header; a freshly
		// allocated cluster's payload bytes are whatever the backend held,
		// so a brand-new directory cluster is CLEAN-filled explicitly.
		if fresh {
			dc.entries = [DirEntry::clean(); crate::layout::DPC];
		}
		dc.entries[within] = entry;
		self.write_dir_cluster(c, &dc)
	}

	fn read_dir_slot(&mut self, n_inode_dir: InodeNum, idx: usize) -> Result<(u32, usize, DirCluster)> {
		let dpc = crate::layout::DPC;
		let clu = idx / dpc;
		let within = idx % dpc;
		let c = self.handle_file_cluster(n_inode_dir, clu, ClusterOp::Get)?.unwrap();
		let dc = self.read_dir_cluster(c)?;
		Ok((c, within, dc))
	}

	/// ADD a brand-new child, or ATTACH an existing one, as `name` under
	/// `nInodeDir`. For a directory child, ADD initializes `.`/`..` and
	/// CLEAN-fills the rest of its first cluster; ATTACH only re-points
	/// `..` at the new parent. Bumps `refCount` on both child and (for
	/// directory children) parent.
	pub fn add_attach_dir_entry(
		&mut self, n_inode_dir: InodeNum, name: &[u8], n_inode_child: InodeNum, op: LinkOp,
	) -> Result<()> {
		log::trace!("add_attach_dir_entry({n_inode_dir}, {name:?}, {n_inode_child}, {op:?})");
		validate_name(name)?;
		self.assert_dir(n_inode_dir)?;

		let scan = self.scan_dir(n_inode_dir, name)?;
		if scan.found.is_some() {
			return Err(Error::Eexist);
		}

		let mut child = self.raw_read_inode(n_inode_child)?;
		let kind = child.mode().kind().filter(|k| !k.is_free()).ok_or(Error::Eiuininval)?;

		if kind == InodeKind::Dir {
			if child.ref_count >= MAX_DIR_LINKS {
				return Err(Error::Emlink);
			}
		} else if child.ref_count >= MAX_FILE_LINKS {
			return Err(Error::Emlink);
		}

		let mut entry = DirEntry::clean();
		entry.n_inode = n_inode_child;
		entry.set_name(name);
		self.write_dir_slot(n_inode_dir, scan.free_idx, entry)?;

		if scan.free_idx >= scan.clu_count * crate::layout::DPC {
			let mut dir_inode = self.raw_read_inode(n_inode_dir)?;
			dir_inode.size += crate::layout::DIR_CONTENT_SIZE as u64;
			self.raw_write_inode(n_inode_dir, &dir_inode)?;
		}

		if kind == InodeKind::Dir {
			let c0 = match op {
				LinkOp::Add => self.handle_file_cluster(n_inode_child, 0, ClusterOp::Alloc)?.unwrap(),
				LinkOp::Attach => self.handle_file_cluster(n_inode_child, 0, ClusterOp::Get)?.unwrap(),
			};
			let mut dc = self.read_dir_cluster(c0)?;
			if op == LinkOp::Add {
				dc.entries = [DirEntry::clean(); crate::layout::DPC];
			}
			let mut dot = DirEntry::clean();
			dot.n_inode = n_inode_child;
			dot.set_name(b".");
			let mut dotdot = DirEntry::clean();
			dotdot.n_inode = n_inode_dir;
			dotdot.set_name(b"..");
			dc.entries[0] = dot;
			dc.entries[1] = dotdot;
			self.write_dir_cluster(c0, &dc)?;

			if op == LinkOp::Add {
				child.size = crate::layout::DIR_CONTENT_SIZE as u64;
			}
			child.ref_count += 2;

			let mut dir_inode = self.raw_read_inode(n_inode_dir)?;
			dir_inode.ref_count += 1;
			self.raw_write_inode(n_inode_dir, &dir_inode)?;
		} else {
			child.ref_count += 1;
		}

		self.raw_write_inode(n_inode_child, &child)?;
		Ok(())
	}

	/// REM marks the slot DELETED and, once a directory's last link drops
	/// to zero, frees its clusters and the inode itself. DETACH wipes the
	/// slot straight back to CLEAN (used when the caller has already
	/// arranged for the inode's disposal some other way).
	pub fn rem_detach_dir_entry(&mut self, n_inode_dir: InodeNum, name: &[u8], op: UnlinkOp) -> Result<()> {
		log::trace!("rem_detach_dir_entry({n_inode_dir}, {name:?}, {op:?})");
		validate_name(name)?;
		self.assert_dir(n_inode_dir)?;

		let scan = self.scan_dir(n_inode_dir, name)?;
		let (n_inode_child, idx) = scan.found.ok_or(Error::Enoent)?;

		let mut child = self.raw_read_inode(n_inode_child)?;
		let kind = child.mode().kind().ok_or(Error::Elibbad)?;

		if kind == InodeKind::Dir {
			self.check_dir_is_empty(n_inode_child)?;
		}

		let (c, within, mut dc) = self.read_dir_slot(n_inode_dir, idx)?;
		match op {
			UnlinkOp::Rem => dc.entries[within].mark_deleted(),
			UnlinkOp::Detach => dc.entries[within] = DirEntry::clean(),
		}
		self.write_dir_cluster(c, &dc)?;

		if kind == InodeKind::Dir {
			child.ref_count -= 2;
			let mut dir_inode = self.raw_read_inode(n_inode_dir)?;
			dir_inode.ref_count -= 1;
			self.raw_write_inode(n_inode_dir, &dir_inode)?;
		} else {
			child.ref_count -= 1;
		}
		self.raw_write_inode(n_inode_child, &child)?;

		if op == UnlinkOp::Rem && child.ref_count == 0 {
			self.handle_file_clusters(n_inode_child, 0, ClusterOp::Free)?;
			self.free_inode(n_inode_child)?;
		}
		Ok(())
	}

	/// Rename `oldName` to `newName` in place, leaving the entry's
	/// `nInode` untouched. `newName` must not already resolve.
	pub fn rename_dir_entry(&mut self, n_inode_dir: InodeNum, old_name: &[u8], new_name: &[u8]) -> Result<()> {
		log::trace!("rename_dir_entry({n_inode_dir}, {old_name:?} -> {new_name:?})");
		validate_name(old_name)?;
		validate_name(new_name)?;
		self.assert_dir(n_inode_dir)?;

		if self.scan_dir(n_inode_dir, new_name)?.found.is_some() {
			return Err(Error::Eexist);
		}
		let (_, idx) = self.scan_dir(n_inode_dir, old_name)?.found.ok_or(Error::Enoent)?;

		let (c, within, mut dc) = self.read_dir_slot(n_inode_dir, idx)?;
		dc.entries[within].set_name(new_name);
		self.write_dir_cluster(c, &dc)
	}

	/// ENOTEMPTY unless every entry beyond `.`/`..` is CLEAN or DELETED.
	pub fn check_dir_is_empty(&mut self, n_inode_dir: InodeNum) -> Result<()> {
		let inode = self.raw_read_inode(n_inode_dir)?;
		let dpc = crate::layout::DPC;

		for clu in 0..inode.clu_count as usize {
			let c = match self.handle_file_cluster(n_inode_dir, clu, ClusterOp::Get)? {
				Some(c) => c,
				None => continue,
			};
			let dc = self.read_dir_cluster(c)?;
			for (i, entry) in dc.entries.iter().enumerate() {
				let global = clu * dpc + i;
				if global < 2 {
					continue;
				}
				if entry.is_in_use() {
					return Err(Error::Enotempty);
				}
			}
		}
		Ok(())
	}

	/// Check `cred` against `nInode`'s owner/group/other permission bits
	/// for `mask`. Root bypasses read/write entirely, but still needs at
	/// least one execute bit set to traverse a directory.
	pub fn access_granted(&mut self, n_inode: InodeNum, mask: AccessMask, cred: Credentials) -> Result<()> {
		let inode = self.raw_read_inode(n_inode)?;
		let perm = inode.mode().perm();

		if cred.uid == 0 {
			if mask.execute && perm & (USR_X | GRP_X | OTH_X) == 0 {
				return Err(Error::Eacces);
			}
			return Ok(());
		}

		let (r, w, x) = if cred.uid == inode.owner {
			(perm & USR_R != 0, perm & USR_W != 0, perm & USR_X != 0)
		} else if cred.gid == inode.group {
			(perm & GRP_R != 0, perm & GRP_W != 0, perm & GRP_X != 0)
		} else {
			(perm & OTH_R != 0, perm & OTH_W != 0, perm & OTH_X != 0)
		};

		if mask.write && !w {
			return Err(Error::Eperm);
		}
		if (mask.read && !r) || (mask.execute && !x) {
			return Err(Error::Eacces);
		}
		Ok(())
	}

	/// Allocate a fresh inode of `kind` and link it into `nInodeDir` as
	/// `name`, in one step. The usual entry point for creating new files,
	/// directories and symlinks.
	pub fn create_dir_entry(
		&mut self, n_inode_dir: InodeNum, name: &[u8], kind: InodeKind, perm: u16, cred: Credentials,
	) -> Result<InodeNum> {
		validate_name(name)?;
		self.access_granted(n_inode_dir, AccessMask::W, cred)?;

		let n_child = self.alloc_inode(kind, cred.uid, cred.gid)?;
		let mut inode = self.raw_read_inode(n_child)?;
		inode.mode = inode.mode().with_perm(perm).0;
		self.raw_write_inode(n_child, &inode)?;

		if let Err(e) = self.add_attach_dir_entry(n_inode_dir, name, n_child, LinkOp::Add) {
			let _ = self.free_inode(n_child);
			return Err(e);
		}
		Ok(n_child)
	}

	/// Write `target` as a freshly-created symlink's content.
	pub fn write_symlink_target(&mut self, n_inode: InodeNum, target: &[u8]) -> Result<()> {
		if target.len() > MAX_PATH {
			return Err(Error::Enametoolong);
		}
		let mut written = 0usize;
		let mut clu = 0usize;
		while written < target.len() {
			let mut buf = [0u8; crate::layout::BSLPC];
			let n = (target.len() - written).min(buf.len());
			buf[..n].copy_from_slice(&target[written..written + n]);
			self.write_file_cluster(n_inode, clu, &buf)?;
			written += n;
			clu += 1;
		}
		let mut inode = self.raw_read_inode(n_inode)?;
		inode.size = target.len() as u64;
		self.raw_write_inode(n_inode, &inode)?;
		Ok(())
	}

	/// Read back a symlink's target.
	pub fn read_symlink_target(&mut self, n_inode: InodeNum) -> Result<Vec<u8>> {
		let inode = self.raw_read_inode(n_inode)?;
		if inode.mode().kind() != Some(InodeKind::Symlink) {
			return Err(Error::Eiuininval);
		}
		let mut out = Vec::with_capacity(inode.size as usize);
		let mut clu = 0usize;
		while out.len() < inode.size as usize {
			let mut buf = [0u8; crate::layout::BSLPC];
			self.read_file_cluster(n_inode, clu, &mut buf)?;
			let remaining = inode.size as usize - out.len();
			out.extend_from_slice(&buf[..remaining.min(buf.len())]);
			clu += 1;
		}
		Ok(out)
	}

	/// Resolve an absolute path to `(parentInode, entryInode)`, following
	/// at most one symlink traversal along the way (`ELOOP` past that). The
	/// root itself resolves to `(0, 0)`.
	pub fn dir_entry_by_path(&mut self, path: &[u8], cred: Credentials) -> Result<(InodeNum, InodeNum)> {
		log::trace!("dir_entry_by_path({path:?})");
		if path.len() > MAX_PATH {
			return Err(Error::Enametoolong);
		}
		if path.first() != Some(&b'/') {
			return Err(Error::Erelpath);
		}
		if path == b"/" {
			return Ok((0, 0));
		}

		let mut stack: Vec<InodeNum> = vec![0];
		let mut pending: std::collections::VecDeque<Vec<u8>> =
			path.split(|&b| b == b'/').filter(|c| !c.is_empty()).map(|c| c.to_vec()).collect();
		let mut sym_links = 0u32;

		while let Some(comp) = pending.pop_front() {
			if comp.len() > MAX_NAME {
				return Err(Error::Enametoolong);
			}
			if comp == b"." {
				continue;
			}
			if comp == b".." {
				if stack.len() > 1 {
					stack.pop();
				}
				continue;
			}

			let cur = *stack.last().unwrap();
			let (child, _) = self.dir_entry_by_name(cur, &comp, cred)?;
			let is_last = pending.is_empty();
			let kind = self.raw_read_inode(child)?.mode().kind().ok_or(Error::Elibbad)?;

			match kind {
				InodeKind::Dir => stack.push(child),
				InodeKind::Symlink => {
					sym_links += 1;
					if sym_links > 1 {
						return Err(Error::Eloop);
					}
					let target = self.read_symlink_target(child)?;
					if target.first() == Some(&b'/') {
						stack = vec![0];
					}
					for c in target.split(|&b| b == b'/').filter(|c| !c.is_empty()).rev() {
						pending.push_front(c.to_vec());
					}
				}
				InodeKind::File => {
					if !is_last {
						return Err(Error::Enotdir);
					}
					stack.push(child);
				}
				InodeKind::FreeDirty | InodeKind::FreeClean => return Err(Error::Elibbad),
			}
		}

		let entry = *stack.last().unwrap();
		let dir = if stack.len() > 1 { stack[stack.len() - 2] } else { 0 };
		Ok((dir, entry))
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
	fn root_dot_and_dotdot_resolve_to_root() {
		let mut vol = harness();
		let (child, idx) = vol.dir_entry_by_name(0, b".", Credentials::ROOT).unwrap();
		assert_eq!(child, 0);
		assert_eq!(idx, 0);
		let (child, _) = vol.dir_entry_by_name(0, b"..", Credentials::ROOT).unwrap();
		assert_eq!(child, 0);
	}

	#[test]
	fn create_lookup_and_remove_round_trip() {
		let mut vol = harness();
		let n = vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, Credentials::ROOT).unwrap();
		let (found, _) = vol.dir_entry_by_name(0, b"ex", Credentials::ROOT).unwrap();
		assert_eq!(found, n);

		vol.rem_detach_dir_entry(0, b"ex", UnlinkOp::Rem).unwrap();
		assert_eq!(vol.dir_entry_by_name(0, b"ex", Credentials::ROOT), Err(Error::Enoent));
	}

	#[test]
	fn cannot_remove_nonempty_directory() {
		let mut vol = harness();
		vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, Credentials::ROOT).unwrap();
		let (ex, _) = vol.dir_entry_by_name(0, b"ex", Credentials::ROOT).unwrap();
		vol.create_dir_entry(ex, b"inner", InodeKind::Dir, 0o755, Credentials::ROOT).unwrap();
		assert_eq!(vol.rem_detach_dir_entry(0, b"ex", UnlinkOp::Rem), Err(Error::Enotempty));
	}

	#[test]
	fn hard_link_keeps_inode_alive_until_last_unlink() {
		let mut vol = harness();
		let n = vol.create_dir_entry(0, b"a", InodeKind::File, 0o644, Credentials::ROOT).unwrap();
		vol.add_attach_dir_entry(0, b"b", n, LinkOp::Add).unwrap();
		vol.rem_detach_dir_entry(0, b"a", UnlinkOp::Rem).unwrap();

		let inode = vol.raw_read_inode(n).unwrap();
		assert_eq!(inode.ref_count, 1);

		vol.rem_detach_dir_entry(0, b"b", UnlinkOp::Rem).unwrap();
		assert_eq!(vol.dir_entry_by_name(0, b"b", Credentials::ROOT), Err(Error::Enoent));
	}

	#[test]
	fn path_resolution_walks_nested_directories() {
		let mut vol = harness();
		let new_d = vol.create_dir_entry(0, b"new", InodeKind::Dir, 0o755, Credentials::ROOT).unwrap();
		let again = vol.create_dir_entry(new_d, b"newAgain", InodeKind::Dir, 0o755, Credentials::ROOT).unwrap();
		let (dir, entry) = vol.dir_entry_by_path(b"/new/newAgain", Credentials::ROOT).unwrap();
		assert_eq!(dir, new_d);
		assert_eq!(entry, again);
	}

	#[test]
	fn symlink_loop_past_one_traversal_is_eloop() {
		let mut vol = harness();
		let a = vol.create_dir_entry(0, b"a", InodeKind::Symlink, 0o777, Credentials::ROOT).unwrap();
		vol.write_symlink_target(a, b"/b").unwrap();
		let b = vol.create_dir_entry(0, b"b", InodeKind::Symlink, 0o777, Credentials::ROOT).unwrap();
		vol.write_symlink_target(b, b"/a").unwrap();

		assert_eq!(vol.dir_entry_by_path(b"/a", Credentials::ROOT), Err(Error::Eloop));
	}

	#[test]
	fn rename_preserves_target_inode() {
		let mut vol = harness();
		let n = vol.create_dir_entry(0, b"old", InodeKind::File, 0o644, Credentials::ROOT).unwrap();
		vol.rename_dir_entry(0, b"old", b"new").unwrap();
		let (found, _) = vol.dir_entry_by_name(0, b"new", Credentials::ROOT).unwrap();
		assert_eq!(found, n);
		assert_eq!(vol.dir_entry_by_name(0, b"old", Credentials::ROOT), Err(Error::Enoent));
	}
}
