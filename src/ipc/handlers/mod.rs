pub mod analytics;
pub mod classes;
pub mod core;
pub mod marks;
pub mod reports;
pub mod setup;
pub mod students;
pub mod terms;
