#![allow(dead_code)]

pub use jobtail_test_utils::builders;
pub use jobtail_test_utils::recording_client;
pub use jobtail_test_utils::{append, eventually, init_tracing, with_timeout};
