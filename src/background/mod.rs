pub mod actors;
pub mod processor;
pub mod scheduler;
pub mod steps;
