pub mod budget;
pub mod catalog;
pub mod flight;
pub mod lesson_plan;
pub mod receipt;
pub mod request;
pub mod student;

pub use student::UserId;
