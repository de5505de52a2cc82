use std::result;

use crate::error::LiveError;

pub type Result<T> = result::Result<T, LiveError>;
