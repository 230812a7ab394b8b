pub mod error;
pub mod pool;
pub mod schema;
pub mod store;

pub use error::{Result, StoreError};
pub use pool::ConnectionPool;
pub use store::Store;
