pub mod access_service;
pub mod auth_service;
pub mod doc_db_service;
pub mod memory;
pub mod presence_service;
