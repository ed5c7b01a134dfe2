pub mod dto;
pub mod toml_store_repository;

pub use crate::toml_store_repository::TomlStoreRepository;
