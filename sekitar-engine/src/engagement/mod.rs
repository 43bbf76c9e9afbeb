pub mod decisions;
pub mod diamonds;
pub mod discovery;
pub mod scheduler;
pub mod swipes;
