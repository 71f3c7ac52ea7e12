pub mod executor;
pub mod plan;
pub mod spawner;

pub use executor::{Executor, Flow};
pub use spawner::OsSpawner;
