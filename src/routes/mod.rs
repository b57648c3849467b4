pub mod auth;
pub mod billing;
pub mod domains;
pub mod health;
pub mod members;
pub mod organizations;
pub mod roles;
