pub mod memory_dead_letter;
pub mod memory_log;
pub mod memory_snapshot;
