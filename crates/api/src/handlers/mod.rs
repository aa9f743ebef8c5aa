pub mod jobs;
pub mod quota;
pub mod uploads;
