//! Cloudinary artifact store module

pub mod client;
pub mod config;

pub use client::{sniff_mime, CloudinaryStore};
pub use config::CloudinaryConfig;
