//! Free-cluster repository: an on-disk doubly-linked free list plus a
//! retrieval cache (served in reverse, refilled by `replenish`) and an
//! insertion cache (buffers frees, flushed by `deplete`).

use super::Volume;
use crate::{
	blockreader::Backend,
	error::{Error, Result},
	layout::{ClusterCache, ClusterHeader, ClusterNum, InodeNum, DZONE_CACHE_SIZE, NULL_CLUSTER, NULL_INODE},
};

impl<B: Backend> Volume<B> {
	/// Serve one cluster off the retrieval cache (refilling it if empty),
	/// clean it if it arrived dirty, and attach it to `nInode`.
	pub fn alloc_data_cluster(&mut self, n_inode: InodeNum) -> Result<ClusterNum> {
		log::trace!("alloc_data_cluster({n_inode})");
		if self.sb.d_zone_free == 0 {
			return Err(Error::Enospc);
		}
		if self.sb.d_zone_retriev.idx as usize == DZONE_CACHE_SIZE {
			self.replenish()?;
		}

		let idx = self.sb.d_zone_retriev.idx as usize;
		let n_clust = self.sb.d_zone_retriev.slots[idx];
		self.sb.d_zone_retriev.slots[idx] = NULL_CLUSTER;
		self.sb.d_zone_retriev.idx += 1;

		let mut hdr = self.read_cluster_header(n_clust)?;
		if hdr.stat != NULL_INODE {
			let old_owner = hdr.stat;
			self.clean_data_cluster(old_owner, n_clust)?;
			hdr = self.read_cluster_header(n_clust)?;
		}
		hdr.prev = NULL_CLUSTER;
		hdr.next = NULL_CLUSTER;
		hdr.stat = n_inode;
		self.write_cluster_header(n_clust, &hdr)?;

		self.sb.d_zone_free -= 1;
		self.store_superblock()?;
		Ok(n_clust)
	}

	/// Buffer the release of `nClust` (must not be cluster 0) in the
	/// insertion cache, depleting it to disk first if it is full. `stat` is
	/// left intact: the cluster becomes FREE-DIRTY until a later alloc or an
	/// explicit `clean_data_cluster` scrubs it.
	pub fn free_data_cluster(&mut self, n_clust: ClusterNum) -> Result<()> {
		log::trace!("free_data_cluster({n_clust})");
		if n_clust == 0 {
			log::warn!("free_data_cluster(): refusing to free cluster 0");
			return Err(Error::Einval);
		}

		let mut hdr = self.read_cluster_header(n_clust)?;
		if hdr.stat == NULL_INODE {
			log::error!("free_data_cluster(): cluster {n_clust} already free");
			return Err(Error::Edcinval);
		}
		hdr.prev = NULL_CLUSTER;
		hdr.next = NULL_CLUSTER;
		self.write_cluster_header(n_clust, &hdr)?;

		if self.sb.d_zone_insert.idx as usize == DZONE_CACHE_SIZE {
			self.deplete()?;
		}
		let idx = self.sb.d_zone_insert.idx as usize;
		self.sb.d_zone_insert.slots[idx] = n_clust;
		self.sb.d_zone_insert.idx += 1;

		self.sb.d_zone_free += 1;
		self.store_superblock()?;
		Ok(())
	}

	/// Refill the retrieval cache up to `min(dZoneFree, DZONE_CACHE_SIZE)`
	/// entries, walking the on-disk free list forward from `dHead`. Pulls
	/// the insertion cache onto disk (`deplete`) if the on-disk list runs
	/// out before the target is reached.
	fn replenish(&mut self) -> Result<()> {
		log::trace!("replenish()");
		let target = (self.sb.d_zone_free as usize).min(DZONE_CACHE_SIZE);
		let mut filled = 0;
		let mut cur = self.sb.d_head;
		let mut fresh = [NULL_CLUSTER; DZONE_CACHE_SIZE];

		while filled < target {
			if cur == NULL_CLUSTER {
				if self.sb.d_zone_insert.idx == 0 {
					log::error!("replenish(): free list exhausted but dZoneFree says otherwise");
					break;
				}
				// The on-disk list is fully consumed as of this call, so
				// whatever `deplete` appends is the entire remaining free
				// list; `dHead` in the superblock still names the
				// already-consumed original head, not these new entries.
				let resumed = self.sb.d_zone_insert.slots[0];
				self.deplete()?;
				cur = resumed;
			}

			let hdr = self.read_cluster_header(cur)?;
			let next = hdr.next;
			let cleared = ClusterHeader { stat: hdr.stat, prev: NULL_CLUSTER, next: NULL_CLUSTER };
			self.write_cluster_header(cur, &cleared)?;

			fresh[DZONE_CACHE_SIZE - target + filled] = cur;
			filled += 1;
			cur = next;
		}

		if cur != NULL_CLUSTER {
			let mut hdr = self.read_cluster_header(cur)?;
			hdr.prev = NULL_CLUSTER;
			self.write_cluster_header(cur, &hdr)?;
			self.sb.d_head = cur;
		} else {
			self.sb.d_head = NULL_CLUSTER;
			self.sb.d_tail = NULL_CLUSTER;
		}

		self.sb.d_zone_retriev = ClusterCache { slots: fresh, idx: (DZONE_CACHE_SIZE - target) as u32 };
		self.store_superblock()
	}

	/// Append the entire insertion cache, in order, to the tail of the
	/// on-disk free list, then reset it to empty.
	fn deplete(&mut self) -> Result<()> {
		log::trace!("deplete()");
		let n = self.sb.d_zone_insert.idx as usize;
		if n == 0 {
			return Ok(());
		}
		let slots = self.sb.d_zone_insert.slots;

		for i in 0..n {
			let prev = if i == 0 { self.sb.d_tail } else { slots[i - 1] };
			let next = if i + 1 < n { slots[i + 1] } else { NULL_CLUSTER };
			let mut hdr = self.read_cluster_header(slots[i])?;
			hdr.prev = prev;
			hdr.next = next;
			self.write_cluster_header(slots[i], &hdr)?;
		}

		if self.sb.d_tail != NULL_CLUSTER {
			let mut tail_hdr = self.read_cluster_header(self.sb.d_tail)?;
			tail_hdr.next = slots[0];
			self.write_cluster_header(self.sb.d_tail, &tail_hdr)?;
		}
		if self.sb.d_head == NULL_CLUSTER {
			self.sb.d_head = slots[0];
		}
		self.sb.d_tail = slots[n - 1];

		self.sb.d_zone_insert = ClusterCache::empty_insertion();
		self.store_superblock()
	}

	/// Dissociate a FREE-DIRTY cluster from its former owner, turning it
	/// FREE-CLEAN. `nInode` must match the cluster's current `stat`.
	pub(crate) fn clean_data_cluster(&mut self, n_inode: InodeNum, n_clust: ClusterNum) -> Result<()> {
		let mut hdr = self.read_cluster_header(n_clust)?;
		if hdr.stat != n_inode {
			log::error!("clean_data_cluster(): cluster {n_clust} stat {} != expected {n_inode}", hdr.stat);
			return Err(Error::Ewginodenb);
		}
		hdr.stat = NULL_INODE;
		self.write_cluster_header(n_clust, &hdr)
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
	fn cannot_free_cluster_zero() {
		let mut vol = harness();
		assert_eq!(vol.free_data_cluster(0), Err(Error::Einval));
	}

	#[test]
	fn alloc_then_free_preserves_free_count() {
		let mut vol = harness();
		let before = vol.superblock().d_zone_free;
		let c = vol.alloc_data_cluster(1).unwrap();
		assert_eq!(vol.superblock().d_zone_free, before - 1);
		vol.free_data_cluster(c).unwrap();
		assert_eq!(vol.superblock().d_zone_free, before);
	}

	#[test]
	fn exhausting_retrieval_cache_forces_replenish() {
		let mut vol = harness();
		let n = (DZONE_CACHE_SIZE + 5).min(vol.superblock().d_zone_free as usize - 1);
		let mut seen = std::collections::HashSet::new();
		for _ in 0..n {
			let c = vol.alloc_data_cluster(1).unwrap();
			assert!(seen.insert(c), "cluster {c} allocated twice");
		}
	}
}
