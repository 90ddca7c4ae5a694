pub mod keyed_pool;

pub use keyed_pool::{KeyedPool, PoolError};
