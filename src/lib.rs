pub mod align;
pub mod app;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod ebible;
pub mod error;
pub mod fs_util;
pub mod layout;
pub mod output;
pub mod project;
pub mod reference;
pub mod usfm;
pub mod versification;
