pub mod auth;
pub mod cleanup;
pub mod inference;
pub mod jobs;
pub mod presets;
pub mod storage;
pub mod worker;
