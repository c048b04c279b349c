#![allow(async_fn_in_trait)]

pub mod mirror;
pub mod oauth2;
pub mod storage;

pub use crate::mirror::{configure_drive, SyncHandle};
