pub mod config;
pub mod downloader;
pub mod error;
mod fs_utils;
pub mod lister;
pub mod progress;
mod response_info;

pub use downloader::{Downloader, DownloaderBuilder};
pub use lister::{Lister, Resource};
