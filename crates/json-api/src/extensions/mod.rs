//! Handler helper extensions.

mod depot;
mod idempotent;
mod result;

pub(crate) use depot::*;
pub(crate) use idempotent::*;
pub(crate) use result::*;
