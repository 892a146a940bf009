pub mod app;
pub mod routes;
pub mod shutdown;
