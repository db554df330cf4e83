//! Response handling module - Base64 payloads and JPEG encoding

pub mod base64;
pub mod jpeg;
