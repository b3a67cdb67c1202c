pub mod devices;
pub mod scripts;
pub mod server;
pub mod services;
pub mod storage;
pub mod web;
