pub mod init;
pub mod pull;
pub mod push;
pub mod repo;
pub mod status;
