//! S3 protocol plumbing: signing, XML shapes, the HTTP client, and the
//! storage driver built on them.

pub mod client;
pub mod driver;
pub mod sign;
pub mod xml;

pub use client::S3Client;
pub use driver::S3Driver;
pub use sign::SigningCredentials;
