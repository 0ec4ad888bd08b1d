use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Available,
    Blocked,
    Booked,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayStatus::Available => "available",
            DayStatus::Blocked => "blocked",
            DayStatus::Booked => "booked",
        }
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(DayStatus::Available),
            "blocked" => Ok(DayStatus::Blocked),
            "booked" => Ok(DayStatus::Booked),
            other => Err(format!("unknown day status: {other}")),
        }
    }
}

/// One calendar day of one listing. Days without a row are implicitly
/// available; `booked` rows always carry the owning booking id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityDay {
    pub tenant_id: String,
    pub listing_id: Uuid,
    pub date: NaiveDate,
    pub status: DayStatus,
    pub price_override: Option<Decimal>,
    pub booking_id: Option<Uuid>,
}

/// `[from, to)` as individual days, ascending.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = from;
    while day < to {
        dates.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

// Wire types shared between the listings service and its internal callers.

#[derive(Debug, Serialize, Deserialize)]
pub struct BookDatesRequest {
    pub booking_id: Uuid,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockDatesRequest {
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConflictsResponse {
    pub conflicts: Vec<NaiveDate>,
}
