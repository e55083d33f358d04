pub mod backend;
pub mod cli;
pub mod config;
pub mod detect;
pub mod export;
pub mod policy;
pub mod report;
pub mod sizes;
pub mod util;
pub mod validate;
