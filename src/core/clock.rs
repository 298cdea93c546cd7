use chrono::{DateTime, Local, NaiveDate, Utc};

/// Source of "today" and "now". Tasks are partitioned by local calendar day;
/// completion instants are kept in UTC.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub today: fn() -> NaiveDate,
    pub now: fn() -> DateTime<Utc>,
}

impl Clock {
    pub fn system() -> Self {
        Self {
            today: || Local::now().date_naive(),
            now: Utc::now,
        }
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}
