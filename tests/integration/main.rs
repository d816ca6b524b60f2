//! Integration tests: full sync flows over in-memory sources.

mod mock_source;
mod sync_flow;
