pub const MAX_METADATA_LEN: usize = 2048;
pub const MAX_PRINCIPAL_LEN: usize = 256;

pub const MAX_ACCOMMODATIONS_PER_TENANT: usize = 1_000_000;
pub const MAX_BOOKINGS_PER_ACCOMMODATION: usize = 100_000;

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 256;

/// Rows returned by one `events` query.
pub const MAX_EVENTS_PER_QUERY: usize = 10_000;
