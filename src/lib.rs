pub mod cell;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod grid;
pub mod net;
pub mod partition;
pub mod selection;
pub mod shm;
pub mod worker;
