pub mod config;
pub mod engine;
pub mod http;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod routing;
pub mod sweeper;
