pub mod config;
pub mod ddb;
pub mod detector;
pub mod routes;
pub mod storage;
pub mod workflow;
