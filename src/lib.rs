pub mod config;
pub mod customers;
pub mod error;
pub mod ingress;
pub mod observability;
pub mod pipeline;
pub mod routes;
pub mod status;
