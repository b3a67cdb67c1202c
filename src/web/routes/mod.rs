pub mod auth_routes;
pub mod device_routes;
pub mod script_routes;
