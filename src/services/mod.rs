//! Use cases over the store. Each operation authorizes the acting user
//! before it writes anything.

pub mod domains;
pub mod members;
pub mod organizations;
pub mod roles;
pub mod users;
