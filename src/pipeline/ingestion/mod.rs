// Pipeline ingestion: paginated listing retrieval

pub mod bulk_fetcher;

pub use bulk_fetcher::{BulkListingFetcher, FetchReport};
