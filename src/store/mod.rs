pub mod connections;
pub mod files;
pub mod history;
