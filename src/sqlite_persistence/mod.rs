mod versioned_schema;

pub use versioned_schema::*;

pub const BASE_DB_VERSION: usize = 99999;
