pub mod core;
pub mod dashboards;
pub mod directory;
pub mod reports;
