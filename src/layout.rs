//! On-disk layout constants and records.
//!
//! Everything in this file is wire format: it must agree between whatever
//! formats a volume and whatever mounts it. Values are fixed at compile
//! time, the way the teacher's `data.rs` hard-codes `UFS_INOSZ`/`UFS_NDADDR`
//! rather than deriving them from a config file — a storage engine's byte
//! layout is not meant to be runtime-configurable.

use std::mem::size_of;

use bincode::{
	de::Decoder,
	enc::Encoder,
	error::{DecodeError, EncodeError},
	Decode, Encode,
};

/// Bytes per block (`B`).
pub const BLOCK_SIZE: usize = 512;
/// Blocks per cluster (`C`).
pub const BLOCKS_PER_CLUSTER: usize = 4;
/// Bytes per cluster.
pub const CLUSTER_SIZE: usize = BLOCK_SIZE * BLOCKS_PER_CLUSTER;

/// Direct references held inline in every inode.
pub const N_DIRECT: usize = 8;

/// Bytes of a cluster reference (a cluster number).
pub const REF_SIZE: usize = size_of::<u32>();

/// Size of a data cluster header: `stat`, `prev`, `next`, each a `u32`. Every
/// cluster carries this header, whether its payload is a byte stream, an
/// array of directory entries, or an array of cluster references — the
/// free-cluster repository relies on `stat` being there uniformly.
pub const CLUSTER_HEADER_SIZE: usize = 3 * size_of::<u32>();
/// Byte-stream payload bytes available per cluster (`BSLPC`), i.e. everything
/// after the header.
pub const BSLPC: usize = CLUSTER_SIZE - CLUSTER_HEADER_SIZE;

/// References per reference cluster (`RPC`): how many cluster numbers fit in
/// one cluster's payload area.
pub const RPC: usize = BSLPC / REF_SIZE;

/// Maximum length of a path component, excluding the terminating NUL.
pub const MAX_NAME: usize = 59;
/// On-disk size of one directory entry: a 4-byte inode number followed by a
/// fixed `MAX_NAME + 1` byte name field.
pub const DIR_ENTRY_SIZE: usize = size_of::<u32>() + MAX_NAME + 1;
/// Directory entries per cluster (`DPC`): how many fit in one cluster's
/// payload area.
pub const DPC: usize = BSLPC / DIR_ENTRY_SIZE;

/// Logical file-cluster indices addressable through direct, single-indirect
/// and double-indirect references.
pub const MAX_FILE_CLUSTERS: usize = N_DIRECT + RPC + RPC * RPC;

/// Maximum length of an absolute path, excluding the terminating NUL.
pub const MAX_PATH: usize = 511;
/// Bytes reserved in the superblock for the volume name.
pub const PARTITION_NAME_SIZE: usize = 20;

/// On-disk inode record size.
pub const INODE_SIZE: usize = 88;
/// Inodes per inode-table block (`IPB`). Integer division: a block may carry
/// unused trailing bytes if `INODE_SIZE` does not divide `BLOCK_SIZE` evenly.
pub const IPB: usize = BLOCK_SIZE / INODE_SIZE;

/// Free-cluster retrieval/insertion cache capacity held in the superblock.
pub const DZONE_CACHE_SIZE: usize = 50;

/// Stable magic number identifying a SOFS14 volume.
pub const MAGIC_NUMBER: u32 = 0x534f_4631;
/// Current on-disk format version.
pub const VERSION: u32 = 1;

/// Inode number. A plain integer, like the teacher's `InodeNum`, but we
/// don't need its `unsafe fn new` since nothing here packs extra bits into
/// it.
pub type InodeNum = u32;
/// Logical (data-zone-relative) cluster number.
pub type ClusterNum = u32;

/// Sentinel: absence of an inode reference.
pub const NULL_INODE: InodeNum = u32::MAX;
/// Sentinel: absence of a cluster reference.
pub const NULL_CLUSTER: ClusterNum = u32::MAX;

/// Mount status recorded in the superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
	/// Properly unmounted: the volume was cleanly flushed on last unmount.
	Pru,
	/// Not properly unmounted: signals a prior unclean shutdown.
	Npru,
}

impl MountStatus {
	pub(crate) fn from_raw(b: u8) -> Self {
		if b == 1 {
			Self::Pru
		} else {
			Self::Npru
		}
	}

	pub(crate) fn to_raw(self) -> u8 {
		match self {
			Self::Pru => 1,
			Self::Npru => 0,
		}
	}
}

impl Encode for MountStatus {
	fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
		self.to_raw().encode(encoder)
	}
}

impl Decode for MountStatus {
	fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
		Ok(Self::from_raw(u8::decode(decoder)?))
	}
}

/// One of the three kinds an in-use inode may be, or one of the two states
/// of a free inode. Packed into the inode's `mode` field alongside the nine
/// permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
	Dir,
	File,
	Symlink,
	/// Free-dirty: on the free list, but cluster references are still
	/// pending release.
	FreeDirty,
	/// Free-clean: on the free list, with no residual cluster references.
	/// This is the `FREE_CLT` sentinel kind.
	FreeClean,
}

const KIND_SHIFT: u16 = 9;
const KIND_MASK: u16 = 0b111 << KIND_SHIFT;
const PERM_MASK: u16 = 0o777;

impl InodeKind {
	fn from_bits(bits: u16) -> Option<Self> {
		match (bits & KIND_MASK) >> KIND_SHIFT {
			0 => Some(Self::Dir),
			1 => Some(Self::File),
			2 => Some(Self::Symlink),
			3 => Some(Self::FreeDirty),
			4 => Some(Self::FreeClean),
			_ => None,
		}
	}

	fn bits(self) -> u16 {
		let v = match self {
			Self::Dir => 0,
			Self::File => 1,
			Self::Symlink => 2,
			Self::FreeDirty => 3,
			Self::FreeClean => 4,
		};
		v << KIND_SHIFT
	}

	pub fn is_free(self) -> bool {
		matches!(self, Self::FreeDirty | Self::FreeClean)
	}
}

/// `mode` field: nine permission bits plus the inode-kind triad/pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode(pub u16);

pub const USR_R: u16 = 0o400;
pub const USR_W: u16 = 0o200;
pub const USR_X: u16 = 0o100;
pub const GRP_R: u16 = 0o040;
pub const GRP_W: u16 = 0o020;
pub const GRP_X: u16 = 0o010;
pub const OTH_R: u16 = 0o004;
pub const OTH_W: u16 = 0o002;
pub const OTH_X: u16 = 0o001;

impl Mode {
	pub fn new(kind: InodeKind, perm: u16) -> Self {
		Self(kind.bits() | (perm & PERM_MASK))
	}

	pub fn kind(self) -> Option<InodeKind> {
		InodeKind::from_bits(self.0)
	}

	pub fn perm(self) -> u16 {
		self.0 & PERM_MASK
	}

	pub fn with_kind(self, kind: InodeKind) -> Self {
		Self(kind.bits() | self.perm())
	}

	pub fn with_perm(self, perm: u16) -> Self {
		Self((self.0 & KIND_MASK) | (perm & PERM_MASK))
	}
}

/// Access mask for [`crate::Volume::access_granted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessMask {
	pub read:    bool,
	pub write:   bool,
	pub execute: bool,
}

impl AccessMask {
	pub const R: Self = Self { read: true, write: false, execute: false };
	pub const W: Self = Self { read: false, write: true, execute: false };
	pub const X: Self = Self { read: false, write: false, execute: true };
}

/// The calling principal's identity, checked against an inode's `owner`/
/// `group` by [`crate::Volume::access_granted`]. Stands in for the teacher's
/// `fuser::Request::{uid, gid}` now that there is no FUSE request to read
/// them off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
	pub uid: u32,
	pub gid: u32,
}

impl Credentials {
	pub const ROOT: Self = Self { uid: 0, gid: 0 };
}

/// Hard-link ceiling for a file or symlink inode (`refCount` is a `u16`, but
/// the top of that range is reserved the way most UFS-derived formats keep
/// a margin below the field's true limit).
pub const MAX_FILE_LINKS: u16 = u16::MAX - 1;
/// Hard-link ceiling for a directory inode: lower than [`MAX_FILE_LINKS`]
/// because every immediate subdirectory contributes one more link via its
/// own `..` entry, on top of the link the directory receives when it's first
/// created.
pub const MAX_DIR_LINKS: u16 = 32_000;

/// Cylinder-group-free UFS has no equivalent of this; it is SOFS14's own
/// cumulative per-cluster cache header. See spec.md §3.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct ClusterHeader {
	/// `NULL_INODE` when free; otherwise the inode this cluster is attached to.
	pub stat: u32,
	/// Free list: previous free cluster. In use: logical predecessor cluster.
	pub prev: u32,
	/// Free list: next free cluster. In use: logical successor cluster.
	pub next: u32,
}

impl ClusterHeader {
	pub const SIZE: usize = CLUSTER_HEADER_SIZE;

	pub fn free() -> Self {
		Self { stat: NULL_INODE, prev: NULL_CLUSTER, next: NULL_CLUSTER }
	}
}

/// A cluster used as a reference table: the header plus `RPC` cluster-number
/// slots, used for `i1` and for each level of `i2`'s two-level tree.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct RefCluster {
	pub header: ClusterHeader,
	pub slots:  [u32; RPC],
}

impl RefCluster {
	pub const SIZE: usize = CLUSTER_HEADER_SIZE + RPC * REF_SIZE;

	/// A freshly allocated reference cluster, NULL-filled, owned by `stat`.
	pub fn new(stat: u32) -> Self {
		Self { header: ClusterHeader { stat, prev: NULL_CLUSTER, next: NULL_CLUSTER }, slots: [NULL_CLUSTER; RPC] }
	}

	pub fn is_all_null(&self) -> bool {
		self.slots.iter().all(|&s| s == NULL_CLUSTER)
	}
}

const _: () = assert!(RefCluster::SIZE <= CLUSTER_SIZE);

/// A cluster used as a directory-entry block: the header plus `DPC` entries.
#[derive(Debug, Clone, Encode, Decode)]
pub struct DirCluster {
	pub header:  ClusterHeader,
	pub entries: [DirEntry; DPC],
}

impl DirCluster {
	pub const SIZE: usize = CLUSTER_HEADER_SIZE + DPC * DIR_ENTRY_SIZE;
}

/// Content bytes one directory cluster contributes to its inode's `size` —
/// `DPC × entrySize`, the header not counted. A directory's `size` is always
/// a whole multiple of this.
pub const DIR_CONTENT_SIZE: usize = DPC * DIR_ENTRY_SIZE;

const _: () = assert!(DirCluster::SIZE <= CLUSTER_SIZE);

/// A directory entry: `{nInode, name}`. See spec.md §3 for the three states
/// (CLEAN / IN USE / DELETED) encoded in `name[0]` and `name[MAX_NAME]`.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct DirEntry {
	pub n_inode: u32,
	pub name:    [u8; MAX_NAME + 1],
}

impl DirEntry {
	pub const SIZE: usize = DIR_ENTRY_SIZE;

	pub fn clean() -> Self {
		Self { n_inode: NULL_INODE, name: [0u8; MAX_NAME + 1] }
	}

	pub fn is_clean(&self) -> bool {
		self.name[0] == 0 && self.name[MAX_NAME] == 0
	}

	pub fn is_in_use(&self) -> bool {
		self.name[0] != 0
	}

	pub fn is_deleted(&self) -> bool {
		self.name[0] == 0 && self.name[MAX_NAME] != 0
	}

	/// Length of the live name, for IN-USE entries.
	pub fn name_bytes(&self) -> &[u8] {
		let end = self.name[1..MAX_NAME].iter().position(|&b| b == 0).map(|p| p + 1).unwrap_or(MAX_NAME);
		&self.name[..end]
	}

	pub fn set_name(&mut self, name: &[u8]) {
		self.name = [0u8; MAX_NAME + 1];
		self.name[..name.len()].copy_from_slice(name);
	}

	/// Mark this slot DELETED, preserving the original first byte at
	/// position `MAX_NAME`.
	pub fn mark_deleted(&mut self) {
		let first = self.name[0];
		self.name[0] = 0;
		self.name[MAX_NAME] = first;
	}
}

/// The fixed-size on-disk inode record.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct Inode {
	pub mode:      u16,
	pub ref_count: u16,
	pub owner:     u32,
	pub group:     u32,
	pub size:      u64,
	pub clu_count: u32,
	/// Union: `aTime` when in use, else the next free inode (`NULL_INODE` at
	/// the tail).
	pub v_d1:      i64,
	/// Union: `mTime` when in use, else the previous free inode
	/// (`NULL_INODE` at the head).
	pub v_d2:      i64,
	/// Status-change time; tracked alongside `aTime`/`mTime` whenever either
	/// changes.
	pub ctime:     i64,
	pub d:         [u32; N_DIRECT],
	pub i1:        u32,
	pub i2:        u32,
}

impl Inode {
	pub const SIZE: usize = INODE_SIZE;

	pub fn mode(&self) -> Mode {
		Mode(self.mode)
	}

	pub fn a_time(&self) -> i64 {
		self.v_d1
	}

	pub fn set_a_time(&mut self, t: i64) {
		self.v_d1 = t;
	}

	pub fn m_time(&self) -> i64 {
		self.v_d2
	}

	pub fn set_m_time(&mut self, t: i64) {
		self.v_d2 = t;
	}

	pub fn next_free(&self) -> u32 {
		self.v_d1 as u32
	}

	pub fn set_next_free(&mut self, n: u32) {
		self.v_d1 = n as i64;
	}

	pub fn prev_free(&self) -> u32 {
		self.v_d2 as u32
	}

	pub fn set_prev_free(&mut self, n: u32) {
		self.v_d2 = n as i64;
	}
}

/// Two caches of free-cluster references buffering list activity; see
/// spec.md §4.4.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct ClusterCache {
	pub slots: [u32; DZONE_CACHE_SIZE],
	pub idx:   u32,
}

impl ClusterCache {
	pub fn empty_retrieval() -> Self {
		Self { slots: [NULL_CLUSTER; DZONE_CACHE_SIZE], idx: DZONE_CACHE_SIZE as u32 }
	}

	pub fn empty_insertion() -> Self {
		Self { slots: [NULL_CLUSTER; DZONE_CACHE_SIZE], idx: 0 }
	}
}

/// The single in-memory/on-disk superblock image.
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct Superblock {
	pub magic:        u32,
	pub version:      u32,
	pub name:         [u8; PARTITION_NAME_SIZE],
	pub m_stat:       MountStatus,

	pub i_table_start: u32,
	pub i_table_size:  u32,
	pub i_total:       u32,
	pub i_free:        u32,
	pub i_head:        u32,
	pub i_tail:        u32,

	pub d_zone_start: u32,
	pub d_zone_total: u32,
	pub d_zone_free:  u32,
	pub d_head:       u32,
	pub d_tail:       u32,

	/// Retrieval cache: live entries are `[cache_idx, DZONE_CACHE_SIZE)`.
	pub d_zone_retriev: ClusterCache,
	/// Insertion cache: live entries are `[0, cache_idx)`.
	pub d_zone_insert:  ClusterCache,
}

/// On-disk byte size of the superblock image (block 0 holds this, padded to
/// `BLOCK_SIZE` by the formatter).
pub const SUPERBLOCK_WIRE_SIZE: usize = 4 + 4 + PARTITION_NAME_SIZE + 1
	+ 4 * 6
	+ 4 * 5
	+ (4 * DZONE_CACHE_SIZE + 4) * 2;

const _: () = assert!(SUPERBLOCK_WIRE_SIZE <= BLOCK_SIZE * BLOCKS_PER_CLUSTER);
