mod kestrel;

pub use kestrel::broker_service_client::BrokerServiceClient;
pub use kestrel::*;
