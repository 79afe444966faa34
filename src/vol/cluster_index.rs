//! File-cluster index: `handleFileCluster`'s GET/ALLOC/FREE/FREE_CLEAN/CLEAN
//! over the direct, single-indirect and double-indirect reference tables,
//! `attachLogicalCluster`'s intra-file doubly-linked list maintenance, and
//! `handleFileClusters`' bulk reverse-order traversal.

use super::Volume;
use crate::{
	blockreader::Backend,
	error::{Error, Result},
	layout::{
		ClusterNum, Inode, InodeKind, InodeNum, RefCluster, MAX_FILE_CLUSTERS, N_DIRECT, NULL_CLUSTER, RPC,
	},
};

/// The five operations `handleFileCluster`/`handleFileClusters` dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOp {
	Get,
	Alloc,
	Free,
	FreeClean,
	Clean,
}

impl<B: Backend> Volume<B> {
	fn read_ref_cluster(&mut self, clust: ClusterNum) -> Result<RefCluster> {
		let addr = self.cluster_addr(clust);
		Ok(self.file.decode_at(addr)?)
	}

	fn write_ref_cluster(&mut self, clust: ClusterNum, table: &RefCluster) -> Result<()> {
		self.assert_rw()?;
		let addr = self.cluster_addr(clust);
		self.file.encode_at(addr, table)?;
		Ok(())
	}

	/// Free then immediately clean an internal bookkeeping cluster (a
	/// reference cluster collapsing to empty), bypassing `handleFileCluster`
	/// since it isn't addressed through the logical index.
	fn free_and_clean_cluster(&mut self, n_inode: InodeNum, n_clust: ClusterNum) -> Result<()> {
		self.free_data_cluster(n_clust)?;
		self.clean_data_cluster(n_inode, n_clust)
	}

	/// Read-only lookup of the cluster currently at logical index `idx`,
	/// using `inode`'s in-memory `d`/`i1`/`i2` rather than reloading the
	/// inode from disk — needed because `attachLogicalCluster` runs mid-ALLOC,
	/// before the in-memory inode is written back.
	fn peek_slot(&mut self, inode: &Inode, idx: usize) -> Result<ClusterNum> {
		if idx < N_DIRECT {
			Ok(inode.d[idx])
		} else if idx < N_DIRECT + RPC {
			if inode.i1 == NULL_CLUSTER {
				return Ok(NULL_CLUSTER);
			}
			let table = self.read_ref_cluster(inode.i1)?;
			Ok(table.slots[idx - N_DIRECT])
		} else {
			if inode.i2 == NULL_CLUSTER {
				return Ok(NULL_CLUSTER);
			}
			let outer = self.read_ref_cluster(inode.i2)?;
			let base = idx - N_DIRECT - RPC;
			let o = base / RPC;
			if outer.slots[o] == NULL_CLUSTER {
				return Ok(NULL_CLUSTER);
			}
			let inner = self.read_ref_cluster(outer.slots[o])?;
			Ok(inner.slots[base % RPC])
		}
	}

	/// Maintain the doubly-linked list over a file's allocated clusters in
	/// logical-index order: patch the newly-attached cluster's `prev`/`next`
	/// and its neighbors' reciprocal links.
	fn attach_logical_cluster(
		&mut self, inode: &Inode, n_inode: InodeNum, clust_ind: usize, n_lclust: ClusterNum,
	) -> Result<()> {
		let mut hdr = self.read_cluster_header(n_lclust)?;
		if hdr.stat != n_inode {
			return Err(Error::Ewginodenb);
		}

		let pred = if clust_ind > 0 { self.peek_slot(inode, clust_ind - 1)? } else { NULL_CLUSTER };
		// REDESIGN: `clust_ind < MAX_FILE_CLUSTERS - 1`, not `!= MAX_FILE_CLUSTERS`.
		let succ = if clust_ind < MAX_FILE_CLUSTERS - 1 { self.peek_slot(inode, clust_ind + 1)? } else { NULL_CLUSTER };

		hdr.prev = pred;
		hdr.next = succ;
		self.write_cluster_header(n_lclust, &hdr)?;

		if pred != NULL_CLUSTER {
			let mut phdr = self.read_cluster_header(pred)?;
			phdr.next = n_lclust;
			self.write_cluster_header(pred, &phdr)?;
		}
		if succ != NULL_CLUSTER {
			let mut shdr = self.read_cluster_header(succ)?;
			shdr.prev = n_lclust;
			self.write_cluster_header(succ, &shdr)?;
		}
		Ok(())
	}

	fn handle_direct(
		&mut self, inode: &mut Inode, n_inode: InodeNum, idx: usize, op: ClusterOp,
	) -> Result<Option<ClusterNum>> {
		match op {
			ClusterOp::Get => Ok(Some(inode.d[idx])),
			ClusterOp::Alloc => {
				if inode.d[idx] != NULL_CLUSTER {
					return Err(Error::Edcarlyil);
				}
				let c = self.alloc_data_cluster(n_inode)?;
				self.attach_logical_cluster(&*inode, n_inode, idx, c)?;
				inode.d[idx] = c;
				inode.clu_count += 1;
				Ok(Some(c))
			}
			ClusterOp::Free => {
				let c = inode.d[idx];
				if c == NULL_CLUSTER {
					return Err(Error::Edcnotil);
				}
				self.free_data_cluster(c)?;
				Ok(None)
			}
			ClusterOp::Clean | ClusterOp::FreeClean => {
				let c = inode.d[idx];
				if c == NULL_CLUSTER {
					return Err(Error::Edcnotil);
				}
				if op == ClusterOp::FreeClean {
					self.free_data_cluster(c)?;
				}
				self.clean_data_cluster(n_inode, c)?;
				inode.d[idx] = NULL_CLUSTER;
				inode.clu_count -= 1;
				Ok(None)
			}
		}
	}

	fn handle_single_indirect(
		&mut self, inode: &mut Inode, n_inode: InodeNum, clust_ind: usize, op: ClusterOp,
	) -> Result<Option<ClusterNum>> {
		let slot = clust_ind - N_DIRECT;

		if inode.i1 == NULL_CLUSTER {
			match op {
				ClusterOp::Get => return Ok(Some(NULL_CLUSTER)),
				ClusterOp::Alloc => {
					let ref_clust = self.alloc_data_cluster(n_inode)?;
					self.write_ref_cluster(ref_clust, &RefCluster::new(n_inode))?;
					inode.i1 = ref_clust;
					inode.clu_count += 1;
				}
				ClusterOp::Free | ClusterOp::FreeClean | ClusterOp::Clean => return Err(Error::Edcnotil),
			}
		}

		let i1 = inode.i1;
		let mut table = self.read_ref_cluster(i1)?;

		let out = match op {
			ClusterOp::Get => Some(table.slots[slot]),
			ClusterOp::Alloc => {
				if table.slots[slot] != NULL_CLUSTER {
					return Err(Error::Edcarlyil);
				}
				let c = self.alloc_data_cluster(n_inode)?;
				self.attach_logical_cluster(&*inode, n_inode, clust_ind, c)?;
				table.slots[slot] = c;
				inode.clu_count += 1;
				self.write_ref_cluster(i1, &table)?;
				Some(c)
			}
			ClusterOp::Free => {
				let c = table.slots[slot];
				if c == NULL_CLUSTER {
					return Err(Error::Edcnotil);
				}
				self.free_data_cluster(c)?;
				None
			}
			ClusterOp::Clean | ClusterOp::FreeClean => {
				let c = table.slots[slot];
				if c == NULL_CLUSTER {
					return Err(Error::Edcnotil);
				}
				if op == ClusterOp::FreeClean {
					self.free_data_cluster(c)?;
				}
				self.clean_data_cluster(n_inode, c)?;
				table.slots[slot] = NULL_CLUSTER;
				inode.clu_count -= 1;
				self.write_ref_cluster(i1, &table)?;

				if table.is_all_null() {
					self.free_and_clean_cluster(n_inode, i1)?;
					inode.i1 = NULL_CLUSTER;
					inode.clu_count -= 1;
				}
				None
			}
		};
		Ok(out)
	}

	fn handle_double_indirect(
		&mut self, inode: &mut Inode, n_inode: InodeNum, clust_ind: usize, op: ClusterOp,
	) -> Result<Option<ClusterNum>> {
		let base = clust_ind - N_DIRECT - RPC;
		let outer_slot = base / RPC;
		let inner_slot = base % RPC;

		if inode.i2 == NULL_CLUSTER {
			match op {
				ClusterOp::Get => return Ok(Some(NULL_CLUSTER)),
				ClusterOp::Alloc => {
					let c = self.alloc_data_cluster(n_inode)?;
					self.write_ref_cluster(c, &RefCluster::new(n_inode))?;
					inode.i2 = c;
					inode.clu_count += 1;
				}
				_ => return Err(Error::Edcnotil),
			}
		}

		let i2 = inode.i2;
		let mut outer = self.read_ref_cluster(i2)?;

		if outer.slots[outer_slot] == NULL_CLUSTER {
			match op {
				ClusterOp::Get => return Ok(Some(NULL_CLUSTER)),
				ClusterOp::Alloc => {
					let c = self.alloc_data_cluster(n_inode)?;
					self.write_ref_cluster(c, &RefCluster::new(n_inode))?;
					outer.slots[outer_slot] = c;
					self.write_ref_cluster(i2, &outer)?;
					inode.clu_count += 1;
				}
				_ => return Err(Error::Edcnotil),
			}
		}

		let inner_clust = outer.slots[outer_slot];
		let mut inner = self.read_ref_cluster(inner_clust)?;

		let out = match op {
			ClusterOp::Get => Some(inner.slots[inner_slot]),
			ClusterOp::Alloc => {
				if inner.slots[inner_slot] != NULL_CLUSTER {
					return Err(Error::Edcarlyil);
				}
				let c = self.alloc_data_cluster(n_inode)?;
				self.attach_logical_cluster(&*inode, n_inode, clust_ind, c)?;
				inner.slots[inner_slot] = c;
				inode.clu_count += 1;
				self.write_ref_cluster(inner_clust, &inner)?;
				Some(c)
			}
			ClusterOp::Free => {
				let c = inner.slots[inner_slot];
				if c == NULL_CLUSTER {
					return Err(Error::Edcnotil);
				}
				self.free_data_cluster(c)?;
				None
			}
			ClusterOp::Clean | ClusterOp::FreeClean => {
				let c = inner.slots[inner_slot];
				if c == NULL_CLUSTER {
					return Err(Error::Edcnotil);
				}
				if op == ClusterOp::FreeClean {
					self.free_data_cluster(c)?;
				}
				self.clean_data_cluster(n_inode, c)?;
				inner.slots[inner_slot] = NULL_CLUSTER;
				inode.clu_count -= 1;
				self.write_ref_cluster(inner_clust, &inner)?;

				if inner.is_all_null() {
					self.free_and_clean_cluster(n_inode, inner_clust)?;
					outer.slots[outer_slot] = NULL_CLUSTER;
					inode.clu_count -= 1;
					self.write_ref_cluster(i2, &outer)?;

					if outer.is_all_null() {
						self.free_and_clean_cluster(n_inode, i2)?;
						inode.i2 = NULL_CLUSTER;
						inode.clu_count -= 1;
					}
				}
				None
			}
		};
		Ok(out)
	}

	fn dispatch(
		&mut self, inode: &mut Inode, n_inode: InodeNum, idx: usize, op: ClusterOp,
	) -> Result<Option<ClusterNum>> {
		if idx < N_DIRECT {
			self.handle_direct(inode, n_inode, idx, op)
		} else if idx < N_DIRECT + RPC {
			self.handle_single_indirect(inode, n_inode, idx, op)
		} else {
			self.handle_double_indirect(inode, n_inode, idx, op)
		}
	}

	/// Unified entry point over the direct/single-indirect/double-indirect
	/// reference tree. Returns the cluster number for `GET`/`ALLOC`, `None`
	/// otherwise.
	pub fn handle_file_cluster(&mut self, n_inode: InodeNum, clust_ind: usize, op: ClusterOp) -> Result<Option<ClusterNum>> {
		log::trace!("handle_file_cluster({n_inode}, {clust_ind}, {op:?})");
		if clust_ind >= MAX_FILE_CLUSTERS {
			return Err(Error::Einval);
		}

		let mut inode = self.raw_read_inode(n_inode)?;
		match op {
			ClusterOp::Clean => {
				if inode.mode().kind() != Some(InodeKind::FreeDirty) {
					return Err(Error::Efdininval);
				}
			}
			_ => {
				if inode.mode().kind().map_or(true, InodeKind::is_free) {
					return Err(Error::Eiuininval);
				}
			}
		}

		let result = self.dispatch(&mut inode, n_inode, clust_ind, op)?;

		if op != ClusterOp::Get {
			self.raw_write_inode(n_inode, &inode)?;
		}
		Ok(result)
	}

	/// Bulk variant: walks from `clustIndIn` to `MAX_FILE_CLUSTERS`, but in
	/// reverse layout order (double-indirect region first, then
	/// single-indirect, then direct), applying `op` to every populated slot.
	/// Used by `free_inode`'s caller during REM and by `clean_inode`.
	pub fn handle_file_clusters(&mut self, n_inode: InodeNum, clust_ind_in: usize, op: ClusterOp) -> Result<()> {
		log::trace!("handle_file_clusters({n_inode}, {clust_ind_in}, {op:?})");
		let mut inode = self.raw_read_inode(n_inode)?;
		match op {
			ClusterOp::Clean => {
				if inode.mode().kind() != Some(InodeKind::FreeDirty) {
					return Err(Error::Efdininval);
				}
			}
			ClusterOp::Free | ClusterOp::FreeClean => {
				if inode.mode().kind().map_or(true, InodeKind::is_free) {
					return Err(Error::Eiuininval);
				}
			}
			ClusterOp::Get | ClusterOp::Alloc => return Err(Error::Einval),
		}

		for idx in (clust_ind_in..MAX_FILE_CLUSTERS).rev() {
			let populated = matches!(self.dispatch(&mut inode, n_inode, idx, ClusterOp::Get)?, Some(c) if c != NULL_CLUSTER);
			if !populated {
				continue;
			}
			self.dispatch(&mut inode, n_inode, idx, op)?;
		}

		self.raw_write_inode(n_inode, &inode)?;
		Ok(())
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
	fn get_is_pure() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		let a = vol.handle_file_cluster(n, 2, ClusterOp::Get).unwrap();
		let b = vol.handle_file_cluster(n, 2, ClusterOp::Get).unwrap();
		assert_eq!(a, b);
		assert_eq!(a, Some(NULL_CLUSTER));
	}

	#[test]
	fn alloc_at_zero_touches_only_direct() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		vol.handle_file_cluster(n, 0, ClusterOp::Alloc).unwrap();
		let inode = vol.raw_read_inode(n).unwrap();
		assert_ne!(inode.d[0], NULL_CLUSTER);
		assert_eq!(inode.i1, NULL_CLUSTER);
		assert_eq!(inode.i2, NULL_CLUSTER);
		assert_eq!(inode.clu_count, 1);
	}

	#[test]
	fn alloc_then_free_clean_round_trips_clu_count() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		vol.handle_file_cluster(n, 0, ClusterOp::Alloc).unwrap();
		vol.handle_file_cluster(n, 0, ClusterOp::FreeClean).unwrap();
		let inode = vol.raw_read_inode(n).unwrap();
		assert_eq!(inode.d[0], NULL_CLUSTER);
		assert_eq!(inode.clu_count, 0);
	}

	#[test]
	fn alloc_through_single_indirect_materializes_i1() {
		let mut vol = harness();
		let n = vol.alloc_inode(InodeKind::File, 0, 0).unwrap();
		let idx = N_DIRECT;
		vol.handle_file_cluster(n, idx, ClusterOp::Alloc).unwrap();
		let inode = vol.raw_read_inode(n).unwrap();
		assert_ne!(inode.i1, NULL_CLUSTER);
		assert_eq!(inode.clu_count, 2);
	}
}
