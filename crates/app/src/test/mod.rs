//! Test infrastructure


pub(crate) use context::TestContext;
