//! Volume formatter: lays down a fresh superblock, inode table and
//! free-cluster list on a blank backend, then mounts it. There is no
//! separate on-disk "unformatted" state to detect — callers are expected to
//! know whether a backend already holds a volume.

use std::io::{Seek, SeekFrom};

use crate::{
	blockreader::{Backend, BlockReader},
	decoder::Codec,
	error::{Error, Result},
	layout::{
		ClusterCache, ClusterHeader, DirCluster, DirEntry, Inode, InodeKind, Mode, MountStatus, Superblock,
		BLOCKS_PER_CLUSTER, BLOCK_SIZE, IPB, MAGIC_NUMBER, NULL_CLUSTER, NULL_INODE, PARTITION_NAME_SIZE, VERSION,
	},
	vol::Volume,
};

/// Format `backend` for `n_inodes` inodes and mount the result read-write.
/// `backend`'s current length determines the data zone's size: everything
/// past the inode table, rounded down to a whole number of clusters.
pub fn format_volume<B: Backend>(mut backend: B, n_inodes: u32) -> Result<Volume<B>> {
	if n_inodes == 0 {
		return Err(Error::Einval);
	}

	let total_bytes = backend.seek(SeekFrom::End(0))?;
	backend.seek(SeekFrom::Start(0))?;
	let total_blocks = (total_bytes / BLOCK_SIZE as u64) as u32;

	let ipb = IPB as u32;
	let i_table_start = 1u32;
	let i_table_size = (n_inodes + ipb - 1) / ipb;
	let d_zone_start = i_table_start + i_table_size;

	let bpc = BLOCKS_PER_CLUSTER as u32;
	let remaining = total_blocks.saturating_sub(d_zone_start);
	let d_zone_total = remaining / bpc;
	if d_zone_total == 0 {
		log::error!("format_volume(): backend too small for {n_inodes} inodes: no room for a data zone");
		return Err(Error::Enospc);
	}

	let mut codec = Codec::new(BlockReader::new(backend, true));
	let block_addr = |b: u32| b as u64 * BLOCK_SIZE as u64;
	let cluster_addr = |c: u32| block_addr(d_zone_start + c * bpc);
	let inode_addr = |n: u32| block_addr(i_table_start + n / ipb) + (n % ipb) as u64 * Inode::SIZE as u64;

	let now = Volume::<B>::now();

	let mut root = Inode {
		mode:      Mode::new(InodeKind::Dir, 0o755).0,
		ref_count: 2,
		owner:     0,
		group:     0,
		size:      crate::layout::DIR_CONTENT_SIZE as u64,
		clu_count: 1,
		v_d1:      now,
		v_d2:      now,
		ctime:     now,
		d:         [NULL_CLUSTER; crate::layout::N_DIRECT],
		i1:        NULL_CLUSTER,
		i2:        NULL_CLUSTER,
	};
	root.d[0] = 0;
	codec.encode_at(inode_addr(0), &root)?;

	for n in 1..n_inodes {
		let mut inode = Inode {
			mode:      Mode::new(InodeKind::FreeClean, 0).0,
			ref_count: 0,
			owner:     0,
			group:     0,
			size:      0,
			clu_count: 0,
			v_d1:      0,
			v_d2:      0,
			ctime:     0,
			d:         [NULL_CLUSTER; crate::layout::N_DIRECT],
			i1:        NULL_CLUSTER,
			i2:        NULL_CLUSTER,
		};
		inode.set_next_free(if n + 1 < n_inodes { n + 1 } else { NULL_INODE });
		inode.set_prev_free(if n > 1 { n - 1 } else { NULL_INODE });
		codec.encode_at(inode_addr(n), &inode)?;
	}

	let mut dot = DirEntry::clean();
	dot.n_inode = 0;
	dot.set_name(b".");
	let mut dotdot = DirEntry::clean();
	dotdot.n_inode = 0;
	dotdot.set_name(b"..");
	let mut entries = [DirEntry::clean(); crate::layout::DPC];
	entries[0] = dot;
	entries[1] = dotdot;
	let root_dir_cluster =
		DirCluster { header: ClusterHeader { stat: 0, prev: NULL_CLUSTER, next: NULL_CLUSTER }, entries };
	codec.encode_at(cluster_addr(0), &root_dir_cluster)?;

	for c in 1..d_zone_total {
		let prev = if c > 1 { c - 1 } else { NULL_CLUSTER };
		let next = if c + 1 < d_zone_total { c + 1 } else { NULL_CLUSTER };
		let hdr = ClusterHeader { stat: NULL_INODE, prev, next };
		codec.encode_at(cluster_addr(c), &hdr)?;
	}

	let sb = Superblock {
		magic: MAGIC_NUMBER,
		version: VERSION,
		name: [0u8; PARTITION_NAME_SIZE],
		m_stat: MountStatus::Pru,
		i_table_start,
		i_table_size,
		i_total: n_inodes,
		i_free: n_inodes - 1,
		i_head: if n_inodes > 1 { 1 } else { NULL_INODE },
		i_tail: if n_inodes > 1 { n_inodes - 1 } else { NULL_INODE },
		d_zone_start,
		d_zone_total,
		d_zone_free: d_zone_total - 1,
		d_head: if d_zone_total > 1 { 1 } else { NULL_CLUSTER },
		d_tail: if d_zone_total > 1 { d_zone_total - 1 } else { NULL_CLUSTER },
		d_zone_retriev: ClusterCache::empty_retrieval(),
		d_zone_insert: ClusterCache::empty_insertion(),
	};
	codec.encode_at(0, &sb)?;

	let backend = codec.into_inner().into_inner();
	Volume::mount(backend, true)
}

#[cfg(test)]
mod test {
	use std::io::Cursor;

	use super::*;

	#[test]
	fn fresh_volume_has_expected_free_counts() {
		let backend = Cursor::new(vec![0u8; 512 * 512]);
		let vol = format_volume(backend, 56).unwrap();
		let sb = vol.superblock();
		assert_eq!(sb.i_total, 56);
		assert_eq!(sb.i_free, 55);
		assert!(sb.d_zone_total > 0);
		assert_eq!(sb.d_zone_free, sb.d_zone_total - 1);
	}

	#[test]
	fn backend_too_small_is_enospc() {
		let backend = Cursor::new(vec![0u8; 512 * 2]);
		assert_eq!(format_volume(backend, 56).unwrap_err(), Error::Enospc);
	}
}
