use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::aggregate::{AggregateFunction, AggregateFunction2};
use crate::time::{TimerService, EVENT_TIME_MAX, EVENT_TIME_MIN};
use crate::types::{EventTime, StreamData, StreamElement};

mod assigners;
mod operator;
mod policy;

pub use assigners::*;
pub use operator::*;
pub use policy::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/operator_tests.rs"]
mod operator_tests;
