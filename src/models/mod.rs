pub mod domain;
pub mod membership;
pub mod organization;
pub mod plan;
pub mod rbac;
pub mod user;
