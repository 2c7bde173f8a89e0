mod pool;

pub use pool::{connect, health_check, remove_database_from_url};
