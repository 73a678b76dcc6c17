pub mod datastore;

pub use datastore::{Datastore, InMemoryDatastore, WriteOperation};
