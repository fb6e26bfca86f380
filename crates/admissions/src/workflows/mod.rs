pub mod applications;
pub mod messages;
