pub mod entity;
pub mod metrics;
pub mod playbook;
pub mod recommendation;
