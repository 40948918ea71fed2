use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// Messages exchanged with the execution backend and notification consumers.
pub trait Message: Serialize + DeserializeOwned + Debug + Send + Sync + Clone {
    fn message_type() -> &'static str
    where
        Self: Sized;

    fn message_id(&self) -> &str;
}
