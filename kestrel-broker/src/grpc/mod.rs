mod kestrel;

pub use kestrel::broker_service_server::{BrokerService, BrokerServiceServer};
pub use kestrel::*;
