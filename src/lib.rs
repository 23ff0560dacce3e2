pub mod archive;
pub mod configure;
pub mod logger;
pub mod md5_utils;
pub mod transfer;
