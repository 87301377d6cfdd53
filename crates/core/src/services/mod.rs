pub mod polling_policy;
pub mod refresh_service;
pub mod scheduler;
pub mod session_service;
