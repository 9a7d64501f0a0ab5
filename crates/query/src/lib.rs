pub mod retrieve;

pub use retrieve::{GraphConnection, RetrievedContext, Retriever};
