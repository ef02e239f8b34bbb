pub mod agent;
pub mod failure;
pub mod message;
pub mod order;
