pub mod daily_usage;
pub mod generated_image;
pub mod job;
pub mod preset;
pub mod refresh_token;
pub mod user;
