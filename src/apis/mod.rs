pub mod event_listings;

pub use event_listings::EventListingsClient;
