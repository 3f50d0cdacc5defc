//! CLI command implementations

pub(crate) mod common;
pub(crate) mod extract;
pub(crate) mod layout;
pub(crate) mod ledger;
pub(crate) mod run;
pub(crate) mod validate;
