pub mod codec;
pub mod repository;
