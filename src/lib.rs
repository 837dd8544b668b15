// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

pub mod cache;
pub mod catalog;
pub mod cms_api;
pub mod config;
pub mod error;
pub mod pages;
pub mod views;

pub use cache::{QueryCache, QueryKey, QueryOptions, QueryStatus, Snapshot, Subscription};
pub use catalog::{Catalog, Resource};
pub use cms_api::CmsClient;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use pages::{Page, PageView};
