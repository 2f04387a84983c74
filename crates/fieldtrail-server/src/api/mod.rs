// ABOUTME: API module containing the HTTP handler functions for the fieldtrail REST API.
// ABOUTME: User CRUD, per-record history, and removal scheduling live in the users sub-module.

pub mod users;
