/// Origin-site defaults; every value here can be overridden from config.toml.
pub const DEFAULT_BASE_URL: &str = "https://ra.co";
pub const DEFAULT_GRAPHQL_URL: &str = "https://ra.co/graphql";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// GraphQL operation used for bulk event search
pub const LISTINGS_OPERATION: &str = "GET_EVENT_LISTINGS";

/// Intercepted requests whose URL contains this fragment are treated as listing queries
pub const QUERY_ENDPOINT_MARKER: &str = "graphql";

// Area identifiers are accepted only strictly inside this range
pub const AREA_ID_MIN_EXCLUSIVE: i64 = 0;
pub const AREA_ID_MAX_EXCLUSIVE: i64 = 10_000;

/// Recursion bound for the embedded page-state walk
pub const MAX_STATE_DEPTH: usize = 20;

/// Year-less dates further than this in the past are assumed to be next year
pub const YEAR_ROLLOVER_DAYS: i64 = 180;

/// Namespace for UUIDv5 event identities
pub const EVENT_UID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6f1c_2d8e_4b3a_5c97_8e10_a4d2_f35b_c901);

pub fn is_valid_area_id(value: i64) -> bool {
    value > AREA_ID_MIN_EXCLUSIVE && value < AREA_ID_MAX_EXCLUSIVE
}
