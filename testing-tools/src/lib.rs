// Testing Tools Library
//
// Manual integration checks against a running gateway.
// Currently includes:
// - sse-test-client: event relay and client consumer checks

pub mod output;
pub mod scenarios;
