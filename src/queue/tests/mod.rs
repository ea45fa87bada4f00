use super::test_helpers::*;
use super::*;
use crate::error::{Error, TaskError};
use crate::events::EventFilter;
use crate::task::Task;
use crate::types::{EventKind, Progress, Status, TaskKind};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;

mod admission;
mod registration;
