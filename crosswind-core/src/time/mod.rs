use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::types::{EventTime, Watermark};

mod timer_service;
mod watermark;

pub use timer_service::*;
pub use watermark::*;

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
