pub mod report;
pub mod routing;
