//! Superblock manager: one in-memory mutable image, loaded at mount and
//! flushed to block 0 whenever a component mutates it.

use super::Volume;
use crate::{
	blockreader::Backend,
	error::{Error, Result},
	layout::{Superblock, DZONE_CACHE_SIZE, NULL_CLUSTER, NULL_INODE},
};

impl<B: Backend> Volume<B> {
	/// The in-memory superblock image.
	pub fn superblock(&self) -> &Superblock {
		&self.sb
	}

	/// Write the in-memory image back to block 0.
	pub(crate) fn store_superblock(&mut self) -> Result<()> {
		self.assert_rw()?;
		let sb = self.sb;
		self.file.encode_at(0, &sb)?;
		log::trace!("store_superblock(): iFree={}, dZoneFree={}", sb.i_free, sb.d_zone_free);
		Ok(())
	}

	/// Fast structural check: out-of-range counts, head/tail and cache
	/// indices. Does not walk the free lists (that's `check::deep_check`).
	pub(crate) fn check_superblock(&self) -> Result<()> {
		let sb = &self.sb;

		if sb.i_free > sb.i_total {
			log::error!("check_superblock(): iFree {} > iTotal {}", sb.i_free, sb.i_total);
			return Err(Error::Elibbad);
		}
		let i_head_ok = sb.i_head == NULL_INODE || sb.i_head < sb.i_total;
		let i_tail_ok = sb.i_tail == NULL_INODE || sb.i_tail < sb.i_total;
		if !i_head_ok || !i_tail_ok {
			log::error!("check_superblock(): iHead/iTail out of range");
			return Err(Error::Elibbad);
		}
		if (sb.i_free == 0) != (sb.i_head == NULL_INODE) {
			log::error!("check_superblock(): iFree/iHead inconsistency");
			return Err(Error::Elibbad);
		}

		if sb.d_zone_free > sb.d_zone_total {
			log::error!("check_superblock(): dZoneFree {} > dZoneTotal {}", sb.d_zone_free, sb.d_zone_total);
			return Err(Error::Elibbad);
		}
		let d_head_ok = sb.d_head == NULL_CLUSTER || sb.d_head < sb.d_zone_total;
		let d_tail_ok = sb.d_tail == NULL_CLUSTER || sb.d_tail < sb.d_zone_total;
		if !d_head_ok || !d_tail_ok {
			log::error!("check_superblock(): dHead/dTail out of range");
			return Err(Error::Elibbad);
		}

		if sb.d_zone_retriev.idx as usize > DZONE_CACHE_SIZE || sb.d_zone_insert.idx as usize > DZONE_CACHE_SIZE {
			log::error!("check_superblock(): cache index out of range");
			return Err(Error::Elibbad);
		}

		Ok(())
	}
}
