pub mod client;
pub mod engine;
pub mod error;
pub mod helpers;
pub mod multipart;
pub mod presign;
pub mod upload;

pub use client::S3Client;
pub use error::UploadError;
