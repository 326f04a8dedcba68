pub mod analysis;
pub mod application;
pub mod job;
pub mod outreach;
pub mod resume;
