//! Integration tests: drive the full ingest -> pool -> executor path.
