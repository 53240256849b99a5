mod error;
mod routes;

pub use self::error::AppError;
pub use self::routes::{router, AppState};
