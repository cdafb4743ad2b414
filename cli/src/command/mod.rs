pub mod decrypt;
pub mod delete;
pub mod encrypt;
pub mod export;
pub mod gen_key;
pub mod import;
pub mod sign;
pub mod verify;
pub mod version;
