pub mod memory;
pub mod mongo;

use mongodb::error::ErrorKind;

use crate::domain::DataAccessError;

impl From<mongodb::error::Error> for DataAccessError {
    fn from(value: mongodb::error::Error) -> Self {
        match *value.kind {
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::DnsResolve { .. } => Self::ConnectionError(Box::new(value)),
            ErrorKind::Command(_) | ErrorKind::Transaction { .. } => {
                Self::QueryError(Box::new(value))
            }
            ErrorKind::BsonDeserialization(_) => Self::ReadError(Box::new(value)),
            ErrorKind::Write(_) | ErrorKind::BulkWrite(_) | ErrorKind::BsonSerialization(_) => {
                Self::WriteError(Box::new(value))
            }
            _ => Self::ClientSideError(Box::new(value)),
        }
    }
}
