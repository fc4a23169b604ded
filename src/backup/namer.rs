use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

use std::ffi::{OsStr, OsString};
use std::fmt::{Debug, Display};
use std::sync::Arc;

/// Second resolution; two copies of one file within the same second share a name
pub static TIME_FORMAT: &str = "%Y-%m-%d:%H-%M-%S";
const TIME_PREFIX_LEN: usize = "YYYY-MM-DD:HH-MM-SS".len();

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Names backup copies after the time the copy runs, not the source's mtime
#[derive(Clone)]
pub struct Namer {
    clock: Arc<dyn Clock>,
}

impl Default for Namer {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl Debug for Namer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namer").finish_non_exhaustive()
    }
}

impl Namer {
    pub fn new<C: Clock + 'static>(clock: C) -> Self {
        Self {
            clock: Arc::new(clock),
        }
    }

    pub fn name_for(&self, original: &OsStr) -> OsString {
        timestamped_name(original, &self.clock.now())
    }
}

pub fn timestamped_name<T: TimeZone>(original: &OsStr, at: &DateTime<T>) -> OsString
where
    T::Offset: Display,
{
    let mut name = OsString::from(format!("{}_", at.format(TIME_FORMAT)));
    name.push(original);
    name
}

/// Splits a backup file name into its timestamp and the original file name
pub fn split_timestamped_name(file_name: &str) -> Option<(NaiveDateTime, &str)> {
    let time_str = file_name.get(..TIME_PREFIX_LEN)?;
    let original = file_name.get(TIME_PREFIX_LEN..)?.strip_prefix('_')?;
    if original.is_empty() {
        return None;
    }

    NaiveDateTime::parse_from_str(time_str, TIME_FORMAT)
        .ok()
        .map(|dt| (dt, original))
}
