pub mod attendance;
pub mod classes;
pub mod core;
pub mod marks;
pub mod reports;
pub mod students;
