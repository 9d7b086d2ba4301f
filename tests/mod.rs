mod support;

mod idempotency_tests;
mod provider_tests;
