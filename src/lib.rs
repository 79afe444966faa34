mod blockreader;
mod decoder;
pub mod error;
pub mod format;
pub mod layout;
mod vol;

pub use crate::{
    blockreader::{Backend, BlockReader},
    error::{Error, Result},
    format::format_volume,
    layout::{AccessMask, Credentials, InodeKind, InodeNum, Mode},
    vol::{ClusterOp, ExpectedStatus, LinkOp, UnlinkOp, Volume},
};
